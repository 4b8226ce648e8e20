//! Editing session: open, annotate, save
//!
//! Ties the pieces together for one document. Opening fetches and renders
//! the source; edits flow through the overlay controllers into the store;
//! saving burns a snapshot of the store and hands the result to a
//! [`PersistenceGateway`]. Only one save runs at a time.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::annotation::{AnnotationId, AnnotationKind};
use crate::burn::{burn_with_report, BurnReport};
use crate::config::EditorConfig;
use crate::controller::{OverlayEvent, OverlayLayer, Outcome};
use crate::error::{
    ControllerError, DocumentLoadError, FetchError, OpenError, SaveError, SaveTransportError,
};
use crate::render::{
    default_placement, page_at_offset, CancelToken, Page, PageRasterizer, PdfSurfaceRenderer,
    RenderedPage,
};
use crate::store::{AnnotationPatch, AnnotationStore};
use crate::summary::summary_json;

/// Where the source PDF bytes come from (usually a presigned URL)
pub trait DocumentSource {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Where the burned PDF and its annotation summary go
pub trait PersistenceGateway {
    fn upload(
        &self,
        document_id: &str,
        pdf: Vec<u8>,
        summary_json: String,
    ) -> impl Future<Output = Result<(), SaveTransportError>> + Send;
}

/// Ticket for the single save allowed in flight. Released on drop.
#[derive(Debug)]
pub struct SaveSlot {
    flag: Arc<AtomicBool>,
}

impl SaveSlot {
    pub fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag: Arc::clone(flag) })
    }
}

impl Drop for SaveSlot {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct EditorSession {
    config: EditorConfig,
    document_id: String,
    source_url: Option<String>,
    pages: Vec<RenderedPage>,
    store: AnnotationStore,
    overlay: OverlayLayer,
    cancel: CancelToken,
    saving: Arc<AtomicBool>,
}

impl EditorSession {
    pub fn new(config: EditorConfig, document_id: impl Into<String>) -> Self {
        Self {
            config,
            document_id: document_id.into(),
            source_url: None,
            pages: Vec::new(),
            store: AnnotationStore::new(),
            overlay: OverlayLayer::new(),
            cancel: CancelToken::new(),
            saving: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Token that aborts the current (or next) `open` when cancelled
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fetch and render the source document, replacing any previous one.
    pub async fn open<S, R>(
        &mut self,
        source: &S,
        url: &str,
        rasterizer: R,
    ) -> Result<(), OpenError>
    where
        S: DocumentSource,
        R: PageRasterizer,
    {
        let loaded = self.fetch_and_render(source, url, rasterizer).await;
        if self.cancel.is_cancelled() {
            self.cancel = CancelToken::new();
        }
        let pages = loaded?;

        self.pages = pages;
        self.source_url = Some(url.to_string());
        self.store = AnnotationStore::new();
        self.overlay = OverlayLayer::new();
        tracing::info!(
            document_id = %self.document_id,
            pages = self.pages.len(),
            "document opened"
        );
        Ok(())
    }

    async fn fetch_and_render<S, R>(
        &self,
        source: &S,
        url: &str,
        rasterizer: R,
    ) -> Result<Vec<RenderedPage>, OpenError>
    where
        S: DocumentSource,
        R: PageRasterizer,
    {
        let bytes = source.fetch(url).await?;
        if self.cancel.is_cancelled() {
            return Err(DocumentLoadError::Cancelled.into());
        }
        let renderer = PdfSurfaceRenderer::new(self.config.render_scale, rasterizer);
        Ok(renderer.load_cancellable(&bytes, &self.cancel)?)
    }

    pub fn is_open(&self) -> bool {
        self.source_url.is_some()
    }

    pub fn pages(&self) -> &[RenderedPage] {
        &self.pages
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn overlay(&self) -> &OverlayLayer {
        &self.overlay
    }

    fn page_geometry(&self) -> Vec<Page> {
        self.pages.iter().map(|p| p.page).collect()
    }

    /// Page under a scroll offset, for the page indicator
    pub fn current_page(&self, scroll_offset: f64) -> Option<u32> {
        let heights: Vec<f64> = self.pages.iter().map(|p| p.page.raster_height as f64).collect();
        page_at_offset(&heights, self.config.page_gap, scroll_offset)
    }

    /// Toolbar action: create a field of `kind` centred in the viewport.
    pub fn place(
        &mut self,
        kind: AnnotationKind,
        scroll_offset: f64,
        viewport_height: f64,
    ) -> Option<AnnotationId> {
        let (page_number, rect) = default_placement(
            &self.page_geometry(),
            self.config.page_gap,
            scroll_offset,
            viewport_height,
            kind,
        )?;
        let id = self.store.create(kind, page_number, rect);

        if kind == AnnotationKind::TextField && self.config.text != Default::default() {
            let patch = AnnotationPatch {
                style: Some(self.config.text.clone()),
                ..AnnotationPatch::default()
            };
            if let Err(error) = self.store.update(id, patch) {
                tracing::warn!(
                    annotation_id = %id,
                    error = %error,
                    "default text style not applied"
                );
            }
        }
        self.overlay.sync(&self.store);
        Some(id)
    }

    pub fn dispatch(
        &mut self,
        id: AnnotationId,
        event: OverlayEvent,
    ) -> Result<Outcome, ControllerError> {
        self.overlay.dispatch(&mut self.store, id, event)
    }

    /// Page change: commit drafts, abandon gestures
    pub fn navigate(&mut self) {
        self.overlay.navigate(&mut self.store);
    }

    pub fn undo(&mut self) -> bool {
        let changed = self.store.undo();
        self.overlay.sync(&self.store);
        changed
    }

    pub fn redo(&mut self) -> bool {
        let changed = self.store.redo();
        self.overlay.sync(&self.store);
        changed
    }

    /// Whether a save is running; the UI disables its trigger meanwhile
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    /// Burn the current annotations into the source PDF and upload it.
    ///
    /// Works on a snapshot taken when the save starts. A second call while
    /// one is running fails with [`SaveError::InFlight`]. The store is never
    /// modified, so any failure can simply be retried.
    pub async fn save<S, G>(&self, source: &S, gateway: &G) -> Result<BurnReport, SaveError>
    where
        S: DocumentSource,
        G: PersistenceGateway,
    {
        let _slot = SaveSlot::acquire(&self.saving).ok_or(SaveError::InFlight)?;
        let url = self.source_url.as_deref().ok_or(SaveError::NotOpen)?;
        let snapshot = self.store.snapshot();

        tracing::info!(
            document_id = %self.document_id,
            annotations = snapshot.len(),
            "save started"
        );

        let original = source.fetch(url).await?;
        let report = burn_with_report(
            &original,
            snapshot.annotations(),
            self.config.render_scale,
            &self.config.burn_options(),
        )?;
        let summary = summary_json(snapshot.annotations())?;

        if let Err(error) = gateway
            .upload(&self.document_id, report.pdf.clone(), summary)
            .await
        {
            tracing::warn!(document_id = %self.document_id, error = %error, "upload failed");
            return Err(error.into());
        }

        tracing::info!(
            document_id = %self.document_id,
            burned = report.burned,
            skipped = report.skipped.len(),
            "save completed"
        );
        Ok(report)
    }
}
