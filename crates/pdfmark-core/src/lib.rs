//! PDF annotation overlay and burn pipeline
//!
//! This crate renders PDF pages to raster surfaces, tracks text, signature
//! and selection fields placed over them in screen coordinates, and burns
//! those fields into a new PDF using lopdf.
//!
//! Pipeline:
//! - `render`: parse the source and rasterize pages at the render scale
//! - `store` / `controller`: create and edit annotations, gesture by gesture
//! - `burn`: map screen space to PDF space and write native page content
//! - `session`: single-flight save through a `PersistenceGateway`

pub mod annotation;
pub mod burn;
pub mod capture;
pub mod config;
pub mod controller;
pub mod coords;
pub mod embed;
pub mod error;
pub mod render;
pub mod session;
pub mod store;
pub mod summary;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, Field, SelectionAction, TextAlign, TextStyle,
};
pub use burn::{burn, burn_with_report, BurnOptions, BurnReport, SkippedAnnotation};
pub use capture::{CaptureMode, SignatureCapture};
pub use config::EditorConfig;
pub use controller::{ControllerState, Outcome, Overlay, OverlayEvent, OverlayLayer, ResizeHandle};
pub use coords::{to_pdf_space, to_screen_space, PdfRect, ScreenRect};
pub use error::{
    AnnotationBurnError, BurnError, CaptureError, ControllerError, DocumentLoadError, FetchError,
    ImageDecodeError, OpenError, PageRenderError, SaveError, SaveTransportError, StoreError,
};
pub use render::{
    BlankRasterizer, CancelToken, Page, PageRasterizer, PdfSurfaceRenderer, RenderedPage, Surface,
};
pub use session::{DocumentSource, EditorSession, PersistenceGateway, SaveSlot};
pub use store::{AnnotationPatch, AnnotationStore, Snapshot};
pub use summary::{summarize, SummaryEntry};
