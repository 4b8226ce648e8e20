use thiserror::Error;

use crate::annotation::{AnnotationId, AnnotationKind};

/// Source bytes could not be turned into a document. Fatal for the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentLoadError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("PDF contains no pages")]
    NoPages,

    #[error("Document load was cancelled")]
    Cancelled,
}

/// A single page failed to rasterize. The rest of the document still renders.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Page {page_number} failed to render: {reason}")]
pub struct PageRenderError {
    pub page_number: u32,
    pub reason: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageDecodeError {
    #[error("Image data is empty")]
    Empty,

    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("Unsupported image format (expected PNG or JPEG)")]
    UnsupportedFormat,

    #[error("Invalid PNG data: {0}")]
    Png(String),

    #[error("Invalid JPEG data: {0}")]
    Jpeg(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Annotation not found: {0}")]
    NotFound(AnnotationId),

    #[error("Annotation {id} is a {actual:?}, patch targets {requested:?}")]
    KindMismatch {
        id: AnnotationId,
        actual: AnnotationKind,
        requested: AnnotationKind,
    },

    #[error("Signature {0} is finalized and read-only")]
    SignatureFinalized(AnnotationId),

    #[error("Invalid snapshot JSON: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Nothing captured: draw at least one stroke or upload an image")]
    Incomplete,

    #[error("Signature is already finalized")]
    Finalized,

    #[error(transparent)]
    Image(#[from] ImageDecodeError),

    #[error("Failed to encode signature image: {0}")]
    EncodeError(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Structural failure while burning. Per-annotation problems never surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BurnError {
    #[error(transparent)]
    Document(#[from] DocumentLoadError),

    #[error("Failed to serialize PDF: {0}")]
    SerializationError(String),
}

/// One annotation could not be burned and was skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotationBurnError {
    #[error("Page {0} does not exist in the document")]
    PageMissing(u32),

    #[error(transparent)]
    Image(#[from] ImageDecodeError),
}

/// The source document could not be downloaded.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to fetch {url}: {reason}")]
pub struct FetchError {
    pub url: String,
    pub reason: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpenError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Load(#[from] DocumentLoadError),
}

/// Upload of the burned document failed. The store is untouched, so retrying is safe.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveTransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveError {
    #[error("A save is already in flight")]
    InFlight,

    #[error("No document is open")]
    NotOpen,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Burn(#[from] BurnError),

    #[error("Failed to serialize annotation summary: {0}")]
    SerializationError(String),

    #[error(transparent)]
    Transport(#[from] SaveTransportError),
}

impl SaveError {
    /// Whether the same save can be retried without re-deriving state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SaveError::InFlight | SaveError::Fetch(_) | SaveError::Transport(_)
        )
    }
}
