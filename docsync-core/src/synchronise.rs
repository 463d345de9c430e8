//! High-level pipeline: orchestrates scan → classify → hierarchy → render →
//! media → push for a markdown tree.
//!
//! This module provides the top-level orchestration logic for synchronising
//! a local markdown tree into a remote page-graph backend. It implements a
//! coordinated per-document state machine that:
//!   - Scans the source tree (or loads the one file in single-file mode)
//!   - Skips documents whose content hash matches the recorded state
//!   - Ensures the chain of parent containers exists remotely, top-down
//!   - Renders markdown through the external [`Renderer`] boundary
//!   - Resolves every embedded asset through the [`MediaResolver`] cache
//!   - Creates or replaces the remote page and records the result in state
//!
//! # Major Types
//! - [`SyncMode`]: whole-tree batch vs force single-file
//! - [`SyncReport`]: per-document outcomes plus summary counts
//!
//! # Responsibilities
//! - Partial-failure tolerance: a failed document is logged and counted, the
//!   pass continues with the remaining documents
//! - State is only recorded for documents that fully completed, hash and
//!   remote id together in one durable write
//! - Dry-run short-circuits before any mutating backend call
//!
//! # Error Handling
//! Per-document errors are caught at this boundary. Errors before the loop
//! (bad configuration, unreadable source dir) abort the run.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Supporting types: [`SyncReport`], [`DocumentOutcome`].

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::config::SyncOptions;
use crate::contract::{AssetConverter, AssetRef, Backend, EmbeddedAsset, Renderer};
use crate::convert::inject_assets;
use crate::detect::{classify, DocClass};
use crate::error::SyncError;
use crate::hierarchy::{ensure_container_chain, verify_live};
use crate::media::MediaResolver;
use crate::retry::{with_retry, RetryPolicy};
use crate::scan::{load_document, scan_tree, Document};
use crate::state::{now_rfc3339, PageRecord, StateStore};

/// What to synchronise.
#[derive(Debug, Clone)]
pub enum SyncMode {
    /// The whole tree, skipping unchanged documents.
    Tree,
    /// One file, force path: change detection is bypassed and any existing
    /// remote page is deleted and recreated rather than updated in place.
    Single(PathBuf),
}

/// How one document ended up.
#[derive(Debug, Clone)]
pub enum DocumentOutcome {
    Created { remote_id: String },
    Updated { remote_id: String },
    Skipped,
    /// Dry-run: the document would have been synced.
    Planned,
    Failed { error: String },
}

#[derive(Debug)]
pub struct DocumentReport {
    pub path: String,
    pub outcome: DocumentOutcome,
}

/// Final summary of a pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub planned: usize,
    pub failed: usize,
    pub documents: Vec<DocumentReport>,
}

impl SyncReport {
    fn record(&mut self, path: String, outcome: DocumentOutcome) {
        match &outcome {
            DocumentOutcome::Created { .. } => self.created += 1,
            DocumentOutcome::Updated { .. } => self.updated += 1,
            DocumentOutcome::Skipped => self.skipped += 1,
            DocumentOutcome::Planned => self.planned += 1,
            DocumentOutcome::Failed { .. } => self.failed += 1,
        }
        self.documents.push(DocumentReport { path, outcome });
    }
}

/// Entrypoint: runs one batch pass according to options and mode.
///
/// Documents are processed sequentially so an abort between documents never
/// leaves a partially completed one recorded as synced; within a document,
/// asset uploads are capped by the resolver's semaphore.
pub async fn synchronise<B, R, C>(
    options: &SyncOptions,
    mode: SyncMode,
    backend: &B,
    renderer: &R,
    converter: &C,
    store: &mut StateStore,
) -> Result<SyncReport, SyncError>
where
    B: Backend + ?Sized,
    R: Renderer + ?Sized,
    C: AssetConverter + ?Sized,
{
    let excludes = options.compiled_excludes()?;
    let retry = RetryPolicy::new(options.retry_limit);
    let mut media = MediaResolver::new(options.upload_concurrency);

    let (documents, force) = match &mode {
        SyncMode::Tree => (scan_tree(&options.source_dir, &excludes)?, false),
        SyncMode::Single(file) => (vec![load_document(&options.source_dir, file)?], true),
    };
    info!(
        documents = documents.len(),
        force = force,
        dry_run = options.dry_run,
        "Starting sync pass"
    );

    let mut report = SyncReport::default();
    for document in &documents {
        match sync_document(
            options, force, backend, renderer, converter, store, &mut media, &retry, document,
        )
        .await
        {
            Ok(outcome) => report.record(document.rel_path.clone(), outcome),
            Err(e) => {
                error!(path = %document.rel_path, error = %e, "Document sync failed");
                report.record(
                    document.rel_path.clone(),
                    DocumentOutcome::Failed {
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    info!(
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        planned = report.planned,
        failed = report.failed,
        "Sync pass complete"
    );
    Ok(report)
}

/// Per-document state machine:
/// classify → (skip) → ensure hierarchy → render → resolve media → push →
/// record state.
#[allow(clippy::too_many_arguments)]
async fn sync_document<B, R, C>(
    options: &SyncOptions,
    force: bool,
    backend: &B,
    renderer: &R,
    converter: &C,
    store: &mut StateStore,
    media: &mut MediaResolver,
    retry: &RetryPolicy,
    document: &Document,
) -> Result<DocumentOutcome, SyncError>
where
    B: Backend + ?Sized,
    R: Renderer + ?Sized,
    C: AssetConverter + ?Sized,
{
    let class = classify(document, store.state());
    if !force && class == DocClass::Unchanged {
        debug!(path = %document.rel_path, "Unchanged, skipping");
        return Ok(DocumentOutcome::Skipped);
    }
    if options.dry_run {
        info!(path = %document.rel_path, class = ?class, "Dry run: would sync");
        return Ok(DocumentOutcome::Planned);
    }

    let parent_id = ensure_container_chain(
        backend,
        store,
        retry,
        &options.root_container_id,
        &document.hierarchy,
    )
    .await?;

    let rendered = renderer
        .render(&document.content)
        .await
        .map_err(|e| SyncError::Render(format!("{}: {e}", document.rel_path)))?;

    let anchored: Vec<(String, AssetRef)> = rendered
        .assets
        .iter()
        .map(|asset| (asset.placeholder.clone(), anchor_local_ref(document, asset)))
        .collect();
    let resolved = media
        .resolve_batch(backend, renderer, converter, store, retry, options, &anchored)
        .await?;
    let mut content = rendered.content;
    inject_assets(&mut content, &resolved);

    let title = rendered
        .title
        .clone()
        .unwrap_or_else(|| title_from_path(&document.rel_path));

    let existing = store.state().pages.get(&document.rel_path).cloned();
    let outcome = if force {
        if let Some(record) = &existing {
            match verify_live(backend, retry, &record.remote_id).await {
                Ok(()) => {
                    with_retry(retry, "delete_page", || {
                        backend.delete_page(&record.remote_id)
                    })
                    .await?;
                    info!(path = %document.rel_path, old_id = %record.remote_id, "Force mode: deleted prior page");
                }
                Err(SyncError::ResourceGone(reason)) => {
                    warn!(path = %document.rel_path, reason = %reason, "Prior page already gone, skipping delete");
                }
                Err(e) => return Err(e),
            }
            let key = document.rel_path.clone();
            store.mutate(|s| {
                s.pages.remove(&key);
            })?;
        }
        let id = with_retry(retry, "create_page", || {
            backend.create_page(&parent_id, &title, &content)
        })
        .await?;
        DocumentOutcome::Created { remote_id: id }
    } else {
        let live_existing = match &existing {
            Some(record) => match verify_live(backend, retry, &record.remote_id).await {
                Ok(()) => Some(record.remote_id.clone()),
                Err(SyncError::ResourceGone(reason)) => {
                    warn!(
                        path = %document.rel_path,
                        reason = %reason,
                        "Recorded page is gone, creating a replacement"
                    );
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };
        match live_existing {
            Some(remote_id) => {
                with_retry(retry, "replace_page_content", || {
                    backend.replace_page_content(&remote_id, &title, &content)
                })
                .await?;
                DocumentOutcome::Updated { remote_id }
            }
            None => {
                let id = with_retry(retry, "create_page", || {
                    backend.create_page(&parent_id, &title, &content)
                })
                .await?;
                DocumentOutcome::Created { remote_id: id }
            }
        }
    };

    let remote_id = match &outcome {
        DocumentOutcome::Created { remote_id } | DocumentOutcome::Updated { remote_id } => {
            remote_id.clone()
        }
        _ => unreachable!("push always yields created or updated"),
    };
    // Hash and remote id land in one durable write.
    let key = document.rel_path.clone();
    let hash = document.content_hash.clone();
    store.mutate(|s| {
        s.pages.insert(
            key,
            PageRecord {
                remote_id: remote_id.clone(),
                content_hash: hash,
                last_synced_at: now_rfc3339(),
            },
        );
    })?;
    info!(path = %document.rel_path, remote_id = %remote_id, outcome = ?outcome, "Document synced");

    Ok(outcome)
}

/// Relative local image references are anchored to the document's directory;
/// the renderer only sees markdown text and cannot know where it lives.
fn anchor_local_ref(document: &Document, asset: &EmbeddedAsset) -> AssetRef {
    match &asset.reference {
        AssetRef::Local(path) if path.is_relative() => {
            let dir = document
                .abs_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_default();
            AssetRef::Local(dir.join(path))
        }
        other => other.clone(),
    }
}

fn title_from_path(rel_path: &str) -> String {
    rel_path
        .rsplit('/')
        .next()
        .unwrap_or(rel_path)
        .trim_end_matches(".md")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_falls_back_to_file_stem() {
        assert_eq!(title_from_path("docs/a/one.md"), "one");
        assert_eq!(title_from_path("intro.md"), "intro");
    }
}
