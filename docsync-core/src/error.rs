use crate::contract::BackendError;

/// Error taxonomy for a sync run.
///
/// Classification is by variant, never by message inspection: the backend
/// contract already returns typed [`BackendError`]s, and the orchestrator
/// decides per variant whether to retry, recreate, fall back or abort.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A retryable backend failure that exhausted its retry budget.
    #[error("backend call '{operation}' still failing after {attempts} attempts: {source}")]
    Transient {
        operation: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    /// A previously recorded remote resource is trashed or deleted.
    /// Recoverable: callers recreate the resource and update state.
    #[error("remote resource gone: {0}")]
    ResourceGone(String),

    /// Asset format conversion failed. Callers fall back to uploading the
    /// original bytes; this never aborts a run.
    #[error("asset conversion failed: {0}")]
    Conversion(String),

    /// The persisted snapshot could not be read. Callers fall back to an
    /// empty state; logged prominently since it risks duplicate remote
    /// resources.
    #[error("state snapshot unreadable: {0}")]
    StateCorruption(String),

    /// Missing or invalid required configuration. Fatal before any backend
    /// call is made.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The markdown or diagram renderer failed for a document.
    #[error("render failed: {0}")]
    Render(String),

    /// A non-retryable backend failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
