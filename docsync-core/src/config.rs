use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SyncError;

fn default_retry_limit() -> u32 {
    3
}

fn default_upload_concurrency() -> usize {
    4
}

fn default_media_container_name() -> String {
    "docsync-media".to_string()
}

fn default_publish_assets() -> bool {
    true
}

/// Tunable options for one sync run, consumed by the orchestrator.
/// Credentials live with the backend implementation, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Root of the local markdown tree.
    pub source_dir: PathBuf,
    /// Path of the persisted JSON snapshot.
    pub state_file: PathBuf,
    /// Remote id of the container all synced pages live under.
    pub root_container_id: String,
    /// Regex patterns matched against relative paths; matches are skipped.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Attempts per backend call before a transient failure surfaces.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Cap on simultaneous outbound upload/create calls.
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
    /// Display name of the remote folder hosting uploaded assets.
    #[serde(default = "default_media_container_name")]
    pub media_container_name: String,
    /// Whether uploaded assets are marked publicly accessible so pages can
    /// embed them.
    #[serde(default = "default_publish_assets")]
    pub publish_assets: bool,
    /// Report what would happen without any mutating backend call.
    #[serde(default)]
    pub dry_run: bool,
}

impl SyncOptions {
    /// Options with every tunable at its default.
    pub fn new(
        source_dir: impl Into<PathBuf>,
        state_file: impl Into<PathBuf>,
        root_container_id: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            state_file: state_file.into(),
            root_container_id: root_container_id.into(),
            exclude: Vec::new(),
            retry_limit: default_retry_limit(),
            upload_concurrency: default_upload_concurrency(),
            media_container_name: default_media_container_name(),
            publish_assets: default_publish_assets(),
            dry_run: false,
        }
    }

    pub fn compiled_excludes(&self) -> Result<Vec<Regex>, SyncError> {
        self.exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    SyncError::Configuration(format!("invalid exclude pattern '{pattern}': {e}"))
                })
            })
            .collect()
    }

    pub fn trace_loaded(&self) {
        info!(
            source_dir = %self.source_dir.display(),
            state_file = %self.state_file.display(),
            root_container_id = %self.root_container_id,
            excludes = self.exclude.len(),
            retry_limit = self.retry_limit,
            upload_concurrency = self.upload_concurrency,
            dry_run = self.dry_run,
            "Loaded sync options"
        );
        debug!(?self, "Sync options (full debug)");
    }
}
