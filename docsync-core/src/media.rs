//! Idempotent media upload with two cache layers.
//!
//! Identity of an asset is the SHA-256 of its processed bytes, so identical
//! images referenced from several documents (or via different paths/URLs)
//! upload exactly once. The per-run cache lives inside [`MediaResolver`] and
//! dies with it; the persisted `media` map in [`SyncState`] survives runs
//! and is revalidated against the backend before a recorded id is reused.
//! A recorded asset found trashed or deleted is re-uploaded; stale ids are
//! never silently reused.
//!
//! A document's assets resolve as one batch: materialization, revalidation
//! and uploads each fan out concurrently, with physical uploads capped by a
//! semaphore sized from `upload_concurrency`.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::SyncOptions;
use crate::contract::{AssetConverter, AssetRef, Backend, BackendError, Renderer};
use crate::detect::sha256_hex;
use crate::error::SyncError;
use crate::hierarchy::verify_live;
use crate::retry::{with_retry, RetryPolicy};
use crate::state::{now_rfc3339, MediaRecord, StateStore, SyncState};

/// A stable public reference to an uploaded asset, usable inside page
/// content.
#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub remote_id: String,
    pub public_url: String,
}

/// Asset bytes after materialization (read, download or diagram render) and
/// optional format conversion.
struct ProcessedAsset {
    bytes: Vec<u8>,
    mime_type: String,
    file_name: String,
}

/// Owns the per-run asset cache and the cap on simultaneous uploads.
/// Lifetime is exactly one sync pass; construct a fresh one per run.
pub struct MediaResolver {
    run_cache: HashMap<String, ResolvedAsset>,
    upload_permits: Arc<Semaphore>,
    http: reqwest::Client,
}

impl MediaResolver {
    pub fn new(upload_concurrency: usize) -> Self {
        Self {
            run_cache: HashMap::new(),
            upload_permits: Arc::new(Semaphore::new(upload_concurrency.max(1))),
            http: reqwest::Client::new(),
        }
    }

    /// Resolves one document's asset references to their public remote
    /// counterparts, uploading at most once per distinct content hash across
    /// the run. Independent assets are processed concurrently; uploads
    /// acquire a semaphore permit each so at most `upload_concurrency` are
    /// in flight.
    pub async fn resolve_batch<B, R, C>(
        &mut self,
        backend: &B,
        renderer: &R,
        converter: &C,
        store: &mut StateStore,
        retry: &RetryPolicy,
        options: &SyncOptions,
        assets: &[(String, AssetRef)],
    ) -> Result<HashMap<String, ResolvedAsset>, SyncError>
    where
        B: Backend + ?Sized,
        R: Renderer + ?Sized,
        C: AssetConverter + ?Sized,
    {
        if assets.is_empty() {
            return Ok(HashMap::new());
        }

        let resolver = &*self;
        let materialized = try_join_all(assets.iter().map(|(placeholder, reference)| async move {
            let processed = resolver
                .materialize(backend, renderer, converter, retry, reference)
                .await?;
            let hash = sha256_hex(&processed.bytes);
            Ok::<_, SyncError>((placeholder.clone(), hash, processed))
        }))
        .await?;

        // Dedupe by hash; only the first occurrence of each distinct content
        // proceeds to revalidation or upload.
        let mut placeholder_hashes = Vec::with_capacity(materialized.len());
        let mut seen = HashSet::new();
        let mut recorded = Vec::new();
        let mut to_upload = Vec::new();
        for (placeholder, hash, processed) in materialized {
            placeholder_hashes.push((placeholder, hash.clone()));
            if self.run_cache.contains_key(&hash) || !seen.insert(hash.clone()) {
                debug!(hash = %hash, "Asset resolved from run cache");
                continue;
            }
            match store.state().media.get(&hash).cloned() {
                Some(record) => recorded.push((hash, processed, record)),
                None => to_upload.push((hash, processed)),
            }
        }

        // Revalidate recorded ids concurrently; stale ones fall through to
        // upload and are never reused.
        let checked = try_join_all(recorded.into_iter().map(|(hash, processed, record)| async move {
            match verify_live(backend, retry, &record.remote_id).await {
                Ok(()) => Ok((hash, processed, record, true)),
                Err(SyncError::ResourceGone(_)) => Ok((hash, processed, record, false)),
                Err(e) => Err(e),
            }
        }))
        .await?;
        for (hash, processed, record, live) in checked {
            if live {
                debug!(hash = %hash, remote_id = %record.remote_id, "Adopting recorded asset");
                self.run_cache.insert(
                    hash,
                    ResolvedAsset {
                        remote_id: record.remote_id,
                        public_url: record.public_url,
                    },
                );
            } else {
                warn!(
                    hash = %hash,
                    stale_id = %record.remote_id,
                    "Recorded asset is trashed or deleted, re-uploading"
                );
                to_upload.push((hash, processed));
            }
        }

        if !to_upload.is_empty() {
            let container_id = self
                .ensure_media_container(backend, store, retry, options)
                .await?;
            let permits = &self.upload_permits;
            let uploads = to_upload.into_iter().map(|(hash, processed)| {
                let container_id = container_id.clone();
                async move {
                    let _permit = permits.acquire().await.map_err(|e| {
                        SyncError::Configuration(format!("upload semaphore closed: {e}"))
                    })?;
                    let uploaded = with_retry(retry, "upload_asset", || {
                        backend.upload_asset(
                            &container_id,
                            &processed.file_name,
                            &processed.mime_type,
                            processed.bytes.clone(),
                        )
                    })
                    .await?;
                    if options.publish_assets {
                        with_retry(retry, "set_public", || backend.set_public(&uploaded.id))
                            .await?;
                    }
                    info!(
                        hash = %hash,
                        remote_id = %uploaded.id,
                        file_name = %processed.file_name,
                        size = processed.bytes.len(),
                        "Uploaded asset"
                    );
                    Ok::<_, SyncError>((hash, processed, uploaded))
                }
            });
            for (hash, processed, uploaded) in try_join_all(uploads).await? {
                let record_hash = hash.clone();
                store.mutate(|s: &mut SyncState| {
                    s.media.insert(
                        record_hash,
                        MediaRecord {
                            remote_id: uploaded.id.clone(),
                            public_url: uploaded.public_url.clone(),
                            file_name: processed.file_name.clone(),
                            size: processed.bytes.len() as u64,
                            uploaded_at: now_rfc3339(),
                        },
                    );
                })?;
                self.run_cache.insert(
                    hash,
                    ResolvedAsset {
                        remote_id: uploaded.id,
                        public_url: uploaded.public_url,
                    },
                );
            }
        }

        let mut resolved = HashMap::with_capacity(placeholder_hashes.len());
        for (placeholder, hash) in placeholder_hashes {
            let asset = match self.run_cache.get(&hash) {
                Some(asset) => asset.clone(),
                None => unreachable!("every materialized hash is resolved above"),
            };
            resolved.insert(placeholder, asset);
        }
        Ok(resolved)
    }

    /// Turns a reference into bytes ready for hashing and upload: local read,
    /// download or diagram render, then format conversion when the backend
    /// rejects the MIME type. Conversion failure falls back to the original
    /// bytes with a warning.
    async fn materialize<B, R, C>(
        &self,
        backend: &B,
        renderer: &R,
        converter: &C,
        retry: &RetryPolicy,
        asset: &AssetRef,
    ) -> Result<ProcessedAsset, SyncError>
    where
        B: Backend + ?Sized,
        R: Renderer + ?Sized,
        C: AssetConverter + ?Sized,
    {
        let raw = match asset {
            AssetRef::Local(path) => {
                let bytes = std::fs::read(path)?;
                ProcessedAsset {
                    bytes,
                    mime_type: mime_for_path(path).to_string(),
                    file_name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "asset".to_string()),
                }
            }
            AssetRef::Remote(url) => self.download(retry, url).await?,
            AssetRef::Diagram { source, kind } => {
                let bytes = renderer
                    .render_diagram(source, *kind)
                    .await
                    .map_err(|e| SyncError::Render(format!("diagram render failed: {e}")))?;
                let (mime, file_name) = if looks_like_svg(&bytes) {
                    ("image/svg+xml", "diagram.svg")
                } else {
                    ("image/png", "diagram.png")
                };
                ProcessedAsset {
                    bytes,
                    mime_type: mime.to_string(),
                    file_name: file_name.to_string(),
                }
            }
        };

        if backend.accepts_mime(&raw.mime_type) {
            return Ok(raw);
        }
        match converter.convert(&raw.bytes, &raw.mime_type) {
            Ok(converted) => {
                debug!(
                    from = %raw.mime_type,
                    to = %converted.mime_type,
                    "Converted asset to a backend-supported format"
                );
                Ok(ProcessedAsset {
                    file_name: rename_for_mime(&raw.file_name, &converted.mime_type),
                    bytes: converted.bytes,
                    mime_type: converted.mime_type,
                })
            }
            Err(e) => {
                let err = SyncError::Conversion(format!("{}: {e}", raw.file_name));
                warn!(
                    mime_type = %raw.mime_type,
                    error = %err,
                    "Uploading original bytes unmodified"
                );
                Ok(raw)
            }
        }
    }

    /// Downloads a remote asset into memory, where conversion and hashing
    /// operate. 429 and 5xx responses count as transient and retry.
    async fn download(&self, retry: &RetryPolicy, url: &str) -> Result<ProcessedAsset, SyncError> {
        let (bytes, content_type) = with_retry(retry, "download_asset", || async {
            let response = self.http.get(url).send().await.map_err(|e| {
                BackendError::Transient {
                    status: None,
                    message: format!("download {url}: {e}"),
                }
            })?;
            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(BackendError::Transient {
                    status: Some(status.as_u16()),
                    message: format!("download {url}"),
                });
            }
            if !status.is_success() {
                return Err(BackendError::Other(format!(
                    "download {url}: status {status}"
                )));
            }
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
            let bytes = response.bytes().await.map_err(|e| BackendError::Transient {
                status: None,
                message: format!("download body {url}: {e}"),
            })?;
            Ok((bytes.to_vec(), content_type))
        })
        .await?;

        let file_name = url
            .split('?')
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|n| !n.is_empty())
            .unwrap_or("asset")
            .to_string();
        let mime_type =
            content_type.unwrap_or_else(|| mime_for_path(Path::new(&file_name)).to_string());
        Ok(ProcessedAsset {
            bytes,
            mime_type,
            file_name,
        })
    }

    /// Returns the remote folder hosting uploads, creating and recording it
    /// on first use, and recreating it if it was trashed out-of-band.
    async fn ensure_media_container<B: Backend + ?Sized>(
        &self,
        backend: &B,
        store: &mut StateStore,
        retry: &RetryPolicy,
        options: &SyncOptions,
    ) -> Result<String, SyncError> {
        if let Some(id) = store.state().media_container_id.clone() {
            match verify_live(backend, retry, &id).await {
                Ok(()) => return Ok(id),
                Err(SyncError::ResourceGone(reason)) => {
                    warn!(stale_id = %id, reason = %reason, "Media container is gone, recreating");
                }
                Err(e) => return Err(e),
            }
        }
        let created = with_retry(retry, "create_container", || {
            backend.create_container(&options.root_container_id, &options.media_container_name)
        })
        .await?;
        info!(remote_id = %created, name = %options.media_container_name, "Created media container");
        store.mutate(|s: &mut SyncState| {
            s.media_container_id = Some(created.clone());
        })?;
        Ok(created)
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start();
    head.starts_with("<svg") || head.starts_with("<?xml")
}

fn rename_for_mime(file_name: &str, mime_type: &str) -> String {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    match mime_type {
        "image/png" => format!("{stem}.png"),
        "image/jpeg" => format!("{stem}.jpg"),
        _ => file_name.to_string(),
    }
}
