//! # contract: universal interfaces between the sync engine and the outside world
//!
//! This module defines the traits the orchestrator depends on and the concrete
//! supporting types they exchange:
//!
//! - [`Backend`]: remote primitives of a document-hosting service (create
//!   container/page, upload asset, existence checks, permissions).
//! - [`Renderer`]: the pure content-conversion boundary, markdown in,
//!   backend-native content tree plus embedded asset references out.
//! - [`AssetConverter`]: optional format conversion for assets the backend
//!   cannot embed directly.
//!
//! ## Interface & Extensibility
//! - Implement [`Backend`] to target a new document service (wiki, page
//!   graph, drive). All methods are async; errors are the typed
//!   [`BackendError`] so callers classify failures by variant.
//! - Implement [`Renderer`] to plug in a different markdown pipeline.
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall` so consumers can generate
//!   deterministic mocks for unit/integration tests.

use async_trait::async_trait;
use std::path::PathBuf;

use mockall::automock;

/// Typed failure of a single backend call.
///
/// Every mutating backend call is a non-idempotent network operation, so the
/// distinction between `Transient` (safe to retry) and everything else is the
/// contract implementors must honour.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Network hiccup, rate limit or server-side error. Retryable.
    #[error("transient backend failure (status {status:?}): {message}")]
    Transient { status: Option<u16>, message: String },

    /// The addressed remote resource does not exist (deleted out-of-band).
    #[error("resource not found: {0}")]
    Gone(String),

    /// Credentials rejected. Not retryable.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Anything else the backend reported.
    #[error("backend failure: {0}")]
    Other(String),
}

/// Metadata of an existing remote resource, as returned by existence checks.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    pub name: String,
    /// Trashed resources count as invalid: recorded ids pointing at them
    /// must never be reused.
    pub trashed: bool,
    pub mime_type: Option<String>,
}

/// Result of a successful asset upload.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub id: String,
    /// Stable reference usable inside page content for embedding.
    pub public_url: String,
}

/// Remote primitives of one document-hosting backend.
///
/// The trait is agnostic of authentication and transport details; the
/// implementor handles base URLs, tokens and wire formats. Implemented by
/// real clients and by test mocks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Create a child container (a node that exists only to hold pages)
    /// under `parent_id`. Returns the new remote id.
    async fn create_container(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<String, BackendError>;

    /// Fetch metadata for any remote resource (container, page or asset).
    /// A deleted resource yields [`BackendError::Gone`].
    async fn get_resource(&self, id: &str) -> Result<Resource, BackendError>;

    /// Create a page under `parent_id` with the given rendered content tree.
    async fn create_page(
        &self,
        parent_id: &str,
        title: &str,
        content: &serde_json::Value,
    ) -> Result<String, BackendError>;

    /// Replace the full content of an existing page.
    async fn replace_page_content(
        &self,
        id: &str,
        title: &str,
        content: &serde_json::Value,
    ) -> Result<(), BackendError>;

    /// Delete a page. Used only by force mode.
    async fn delete_page(&self, id: &str) -> Result<(), BackendError>;

    /// Upload raw asset bytes into the given container. Returns the remote
    /// id and a public reference.
    async fn upload_asset(
        &self,
        parent_id: &str,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedAsset, BackendError>;

    /// Mark an uploaded asset publicly accessible so pages can embed it.
    async fn set_public(&self, id: &str) -> Result<(), BackendError>;

    /// Whether the backend can embed assets of this MIME type directly.
    /// Rejected types go through the [`AssetConverter`] first.
    fn accepts_mime(&self, mime_type: &str) -> bool;
}

/// Diagram languages the renderer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramKind {
    Mermaid,
    PlantUml,
    Graphviz,
}

impl DiagramKind {
    /// Maps a fenced-code-block language tag to a diagram kind, if any.
    pub fn from_fence_tag(tag: &str) -> Option<Self> {
        match tag {
            "mermaid" => Some(DiagramKind::Mermaid),
            "plantuml" | "puml" => Some(DiagramKind::PlantUml),
            "dot" | "graphviz" => Some(DiagramKind::Graphviz),
            _ => None,
        }
    }
}

/// A reference to an embeddable asset found in a document.
///
/// Identity for caching purposes is always the content hash of the
/// materialized bytes, never this reference: two different references to
/// identical bytes resolve to one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    /// A file on disk, relative references already resolved by the renderer.
    Local(PathBuf),
    /// An image hosted elsewhere, downloaded before processing.
    Remote(String),
    /// An embedded diagram source, rendered to image bytes first.
    Diagram { source: String, kind: DiagramKind },
}

/// One embedded asset inside a rendered document: the placeholder token the
/// renderer left in the content tree, and the reference to resolve.
#[derive(Debug, Clone)]
pub struct EmbeddedAsset {
    pub placeholder: String,
    pub reference: AssetRef,
}

/// Output of the pure markdown rendering boundary.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    /// Title extracted from the document, if any. Callers fall back to the
    /// file stem.
    pub title: Option<String>,
    /// Backend-native content tree. Placeholder tokens from `assets` are
    /// rewritten to public URLs before pushing.
    pub content: serde_json::Value,
    pub assets: Vec<EmbeddedAsset>,
}

/// Pure content conversion: markdown in, content tree and asset references
/// out. Supplied externally; the engine never interprets markdown itself.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        markdown: &str,
    ) -> Result<RenderedDocument, Box<dyn std::error::Error + Send + Sync>>;

    /// Render a diagram source to image bytes (typically PNG or SVG).
    async fn render_diagram(
        &self,
        source: &str,
        kind: DiagramKind,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Result of an asset format conversion.
#[derive(Debug, Clone)]
pub struct ConvertedAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Converts asset bytes into a format the backend accepts (e.g. SVG to PNG).
///
/// Failure is non-fatal: the media resolver logs a warning and uploads the
/// original bytes unmodified.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait AssetConverter: Send + Sync {
    fn convert(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<ConvertedAsset, Box<dyn std::error::Error + Send + Sync>>;
}

/// Converter used when no image-processing capability is available.
/// Always fails, which makes the media resolver fall back to the original
/// bytes with a warning.
pub struct NoConversion;

impl AssetConverter for NoConversion {
    fn convert(
        &self,
        _bytes: &[u8],
        mime_type: &str,
    ) -> Result<ConvertedAsset, Box<dyn std::error::Error + Send + Sync>> {
        Err(format!("no converter available for {mime_type}").into())
    }
}
