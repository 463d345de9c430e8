//! Persistent sync state: one JSON snapshot per project.
//!
//! The snapshot is the single source of truth for "does a remote counterpart
//! already exist", subject to revalidation against the backend before trust.
//! Every mutation is persisted immediately and atomically (write to a temp
//! file in the same directory, then rename over the target), so a crash
//! mid-run never loses the record of a resource that was already created
//! remotely and never leaves a half-written file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SyncError;

const STATE_VERSION: u32 = 1;

fn default_version() -> u32 {
    STATE_VERSION
}

/// A directory-derived remote node that exists purely to hold children.
/// Keyed in [`SyncState::containers`] by the full hierarchy path from the
/// sync root, so same-named directories in different branches never collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub remote_id: String,
    pub display_name: String,
    #[serde(default)]
    pub created_at: String,
}

/// Remote counterpart of one source file, keyed by its path relative to the
/// sync root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub remote_id: String,
    pub content_hash: String,
    #[serde(default)]
    pub last_synced_at: String,
}

/// An uploaded asset, keyed by the content hash of its processed bytes.
/// Identical images referenced from multiple documents upload exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub remote_id: String,
    pub public_url: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub uploaded_at: String,
}

/// The persisted root structure.
///
/// Every field defaults so snapshots written by older versions load, and
/// unknown top-level keys written by newer versions are preserved across a
/// load/persist cycle via the flattened `extra` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerRecord>,
    #[serde(default)]
    pub pages: BTreeMap<String, PageRecord>,
    #[serde(default)]
    pub media: BTreeMap<String, MediaRecord>,
    /// Dedicated remote container hosting uploaded assets, created lazily on
    /// first upload.
    #[serde(default)]
    pub media_container_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Current time as an RFC 3339 string, for the `*_at` record fields.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Owns the snapshot file for the duration of one run.
///
/// A lock file next to the snapshot rejects concurrent invocations against
/// the same state; concurrent runs would silently corrupt it otherwise.
pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
    state: SyncState,
}

impl StateStore {
    /// Loads the snapshot at `path`, falling back to an empty default when
    /// the file is missing or unreadable. Corruption is never fatal, but it
    /// is logged prominently since it risks duplicate remote resources.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let lock_path = lock_path_for(&path);
        acquire_lock(&lock_path)?;

        let state = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<SyncState>(&bytes) {
                Ok(state) => {
                    debug!(
                        path = %path.display(),
                        pages = state.pages.len(),
                        containers = state.containers.len(),
                        media = state.media.len(),
                        "Loaded sync state snapshot"
                    );
                    state
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "STATE SNAPSHOT CORRUPT: starting from empty state; \
                         previously synced resources may be recreated remotely"
                    );
                    SyncState {
                        version: STATE_VERSION,
                        ..SyncState::default()
                    }
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No sync state snapshot yet, starting empty");
                SyncState {
                    version: STATE_VERSION,
                    ..SyncState::default()
                }
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "STATE SNAPSHOT UNREADABLE: starting from empty state"
                );
                SyncState {
                    version: STATE_VERSION,
                    ..SyncState::default()
                }
            }
        };

        Ok(Self {
            path,
            lock_path,
            state,
        })
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Applies `f` to the in-memory state and immediately persists the
    /// result. Callers must not batch several logical mutations across one
    /// call: each remotely created resource gets its own durable record.
    pub fn mutate(&mut self, f: impl FnOnce(&mut SyncState)) -> Result<(), SyncError> {
        f(&mut self.state);
        self.persist()
    }

    fn persist(&self) -> Result<(), SyncError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        let json = serde_json::to_vec_pretty(&self.state)
            .map_err(|e| SyncError::StateCorruption(format!("serialize failed: {e}")))?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| SyncError::Io(e.error))?;
        debug!(path = %self.path.display(), "Persisted sync state snapshot");
        Ok(())
    }
}

impl Drop for StateStore {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            warn!(path = %self.lock_path.display(), error = %e, "Failed to remove lock file");
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

fn acquire_lock(lock_path: &Path) -> Result<(), SyncError> {
    if let Some(dir) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            let _ = writeln!(file, "{}", std::process::id());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(SyncError::Configuration(format!(
                "another sync appears to be running (lock file {} exists); \
                 remove it manually if that run crashed",
                lock_path.display()
            )))
        }
        Err(e) => Err(e.into()),
    }
}
