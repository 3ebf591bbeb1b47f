//! Per-canvas render context.
//!
//! A [`Compositor`] owns one canvas (preview or live). Assigning it a
//! `(schedule, layout)` pair loads static layers, the text layer and video
//! leases; after that every refresh tick paints
//! background → video (z ascending) → text → foreground.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use director_common::config::{CompositorDefaults, DirectorConfig};
use director_common::error::DirectorResult;
use director_common::{PROGRAM_HEIGHT, PROGRAM_WIDTH};
use director_media_sources::{CaptureConfig, MediaSourceManager, StreamLease};
use director_program_model::{Composition, Layout, MediaElement, ProgramStore, Rect};
use image::Rgba;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::assets::{AssetLoader, ImageCache};
use crate::font::FontProvider;
use crate::frame_loop::{FrameLoop, LoopStats, RefreshSignal};
use crate::scaling::{clip_draw, compute_draw, program_to_canvas};
use crate::surface::{color_or, Bitmap, RasterSurface, Surface, OPAQUE_BLACK};
use crate::text_cache::TextLayerCache;

const PROGRAM_SIZE: (u32, u32) = (PROGRAM_WIDTH, PROGRAM_HEIGHT);

/// Which output a compositor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanvasKind {
    Preview,
    Live,
}

impl fmt::Display for CanvasKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CanvasKind::Preview => "preview",
            CanvasKind::Live => "live",
        })
    }
}

/// Lifecycle of a render context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositorState {
    /// Nothing assigned yet.
    #[default]
    Idle,
    /// Loading with nothing to show meanwhile.
    Loading,
    /// Loading a replacement while the previous composition keeps drawing.
    Reloading,
    Running,
    /// The assigned schedule or layout could not be loaded.
    Failed,
    Disposed,
}

/// A `(schedule, layout)` pair shown on a canvas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramSlot {
    pub schedule_id: String,
    pub layout_id: String,
}

impl ProgramSlot {
    pub fn new(schedule_id: impl Into<String>, layout_id: impl Into<String>) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            layout_id: layout_id.into(),
        }
    }

    pub fn matches(&self, schedule_id: &str, layout_id: &str) -> bool {
        self.schedule_id == schedule_id && self.layout_id == layout_id
    }
}

impl fmt::Display for ProgramSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.schedule_id, self.layout_id)
    }
}

/// What one frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameStats {
    pub frame_index: u64,
    pub state: CompositorState,
    /// Video elements painted with a frame.
    pub videos_drawn: u32,
    /// Video elements skipped because no frame was decodable yet.
    pub videos_pending: u32,
    /// Video elements without a usable stream.
    pub videos_missing: u32,
    /// Streams whose playback failed to start this frame.
    pub playback_failures: u32,
}

/// Diagnostic view of one media element's binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaBindingInfo {
    /// Stable `layout:element` key.
    pub key: String,
    pub element_id: String,
    pub source_id: Option<String>,
    pub has_stream: bool,
    pub is_playing: bool,
}

/// Shared services every compositor draws on.
pub struct CompositorServices {
    pub store: Arc<dyn ProgramStore>,
    pub media: Arc<MediaSourceManager>,
    pub images: Arc<ImageCache>,
    pub text_cache: Arc<TextLayerCache>,
    pub capture: CaptureConfig,
    pub defaults: CompositorDefaults,
}

impl CompositorServices {
    /// Wire up the image cache, font provider and text cache from `config`.
    pub fn new(
        config: &DirectorConfig,
        store: Arc<dyn ProgramStore>,
        media: Arc<MediaSourceManager>,
        loader: Arc<dyn AssetLoader>,
    ) -> Arc<Self> {
        let images = Arc::new(ImageCache::new(
            Arc::clone(&loader),
            Duration::from_millis(config.compositor.asset_timeout_ms),
        ));
        let fonts = Arc::new(FontProvider::new(config.text.clone(), loader));
        let text_cache = Arc::new(TextLayerCache::new(
            Arc::clone(&store),
            Arc::clone(&images),
            fonts,
            config.text.clone(),
        ));
        Arc::new(Self {
            store,
            media,
            images,
            text_cache,
            capture: CaptureConfig::from(&config.capture),
            defaults: config.compositor.clone(),
        })
    }
}

struct MediaBinding {
    key: String,
    element: MediaElement,
    /// Element rectangle in canvas pixels.
    dest: Rect,
    stream: Option<StreamLease>,
}

impl MediaBinding {
    fn info(&self) -> MediaBindingInfo {
        let handle = self.stream.as_ref().and_then(StreamLease::handle);
        MediaBindingInfo {
            key: self.key.clone(),
            element_id: self.element.id.clone(),
            source_id: self.element.source_id.clone(),
            has_stream: handle.is_some(),
            is_playing: handle.is_some_and(|h| h.is_playing()),
        }
    }
}

/// Everything loaded for one composition. Dropping it releases every lease.
struct RenderContext {
    slot: ProgramSlot,
    background: Option<Bitmap>,
    foreground: Option<Bitmap>,
    text: Bitmap,
    /// Sorted by ascending z index.
    media: Vec<MediaBinding>,
}

struct ContextState {
    status: CompositorState,
    assignment: Option<ProgramSlot>,
    context: Option<RenderContext>,
    frames: u64,
}

struct Inner {
    kind: CanvasKind,
    services: Arc<CompositorServices>,
    canvas: Mutex<Box<dyn Surface>>,
    state: Mutex<ContextState>,
    // Bumped under the state lock by every assign/switch/dispose; a load
    // only installs its result if the generation is unchanged.
    generation: AtomicU64,
    frame_loop: Mutex<Option<FrameLoop>>,
    fallback_color: Rgba<u8>,
    error_color: Rgba<u8>,
}

/// Render context for one canvas. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Compositor {
    inner: Arc<Inner>,
}

/// Non-owning reference held by the frame loop.
#[derive(Clone)]
pub struct WeakCompositor(Weak<Inner>);

impl WeakCompositor {
    pub fn upgrade(&self) -> Option<Compositor> {
        self.0.upgrade().map(|inner| Compositor { inner })
    }
}

impl Compositor {
    pub fn new(kind: CanvasKind, services: Arc<CompositorServices>, canvas: Box<dyn Surface>) -> Self {
        let fallback_color = color_or(&services.defaults.fallback_color, OPAQUE_BLACK);
        let error_color = color_or(&services.defaults.error_color, OPAQUE_BLACK);
        Self {
            inner: Arc::new(Inner {
                kind,
                services,
                canvas: Mutex::new(canvas),
                state: Mutex::new(ContextState {
                    status: CompositorState::Idle,
                    assignment: None,
                    context: None,
                    frames: 0,
                }),
                generation: AtomicU64::new(0),
                frame_loop: Mutex::new(None),
                fallback_color,
                error_color,
            }),
        }
    }

    /// A compositor over a CPU raster canvas.
    pub fn with_raster(
        kind: CanvasKind,
        services: Arc<CompositorServices>,
        width: u32,
        height: u32,
    ) -> Self {
        Self::new(kind, services, Box::new(RasterSurface::new(width, height)))
    }

    pub fn kind(&self) -> CanvasKind {
        self.inner.kind
    }

    pub fn services(&self) -> &Arc<CompositorServices> {
        &self.inner.services
    }

    pub fn state(&self) -> CompositorState {
        self.inner.state.lock().status
    }

    /// The pair this canvas is assigned, including while loading.
    pub fn assignment(&self) -> Option<ProgramSlot> {
        self.inner.state.lock().assignment.clone()
    }

    /// The pair currently being drawn, if any.
    pub fn displayed(&self) -> Option<ProgramSlot> {
        self.inner
            .state
            .lock()
            .context
            .as_ref()
            .map(|c| c.slot.clone())
    }

    pub fn is_assigned(&self, schedule_id: &str, layout_id: &str) -> bool {
        self.inner
            .state
            .lock()
            .assignment
            .as_ref()
            .is_some_and(|s| s.matches(schedule_id, layout_id))
    }

    pub fn media_bindings(&self) -> Vec<MediaBindingInfo> {
        self.inner
            .state
            .lock()
            .context
            .as_ref()
            .map(|c| c.media.iter().map(MediaBinding::info).collect())
            .unwrap_or_default()
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        let canvas = self.inner.canvas.lock();
        (canvas.width(), canvas.height())
    }

    /// Copy of the canvas as last painted.
    pub fn snapshot(&self) -> Bitmap {
        self.inner.canvas.lock().to_bitmap()
    }

    pub fn downgrade(&self) -> WeakCompositor {
        WeakCompositor(Arc::downgrade(&self.inner))
    }

    /// Dispose whatever is shown, then load `(schedule_id, layout_id)`.
    ///
    /// Fails with a data-not-found error when either id is unknown; the
    /// canvas then paints the error color.
    pub async fn assign(&self, schedule_id: &str, layout_id: &str) -> DirectorResult<()> {
        let slot = ProgramSlot::new(schedule_id, layout_id);
        let (generation, previous) = {
            let mut state = self.inner.state.lock();
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            state.status = CompositorState::Loading;
            state.assignment = Some(slot.clone());
            (generation, state.context.take())
        };
        if let Some(previous) = previous {
            tracing::debug!(canvas = %self.inner.kind, slot = %previous.slot, "Render context disposed");
        }
        self.load_and_install(generation, slot).await
    }

    /// Load `(schedule_id, layout_id)` while the current composition keeps
    /// drawing, then swap.
    ///
    /// Sources used by both compositions stay referenced throughout, so
    /// their hardware is never restarted.
    pub async fn switch_to(&self, schedule_id: &str, layout_id: &str) -> DirectorResult<()> {
        let slot = ProgramSlot::new(schedule_id, layout_id);
        let generation = {
            let mut state = self.inner.state.lock();
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            state.status = if state.context.is_some() {
                CompositorState::Reloading
            } else {
                CompositorState::Loading
            };
            state.assignment = Some(slot.clone());
            generation
        };
        self.load_and_install(generation, slot).await
    }

    /// Reload the assigned pair, picking up edited layout data.
    pub async fn refresh(&self) -> DirectorResult<()> {
        let Some(slot) = self.assignment() else {
            tracing::debug!(canvas = %self.inner.kind, "Refresh of unassigned canvas ignored");
            return Ok(());
        };
        self.switch_to(&slot.schedule_id, &slot.layout_id).await
    }

    /// Stop the frame loop, release every stream and drop all bitmaps.
    ///
    /// Loads still in flight are discarded when they complete.
    pub fn dispose(&self) {
        let previous = {
            let mut state = self.inner.state.lock();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            state.status = CompositorState::Disposed;
            state.assignment = None;
            state.context.take()
        };
        self.stop_frame_loop();
        let released = previous.as_ref().map_or(0, |c| c.media.len());
        drop(previous);
        self.inner.canvas.lock().clear();
        tracing::info!(canvas = %self.inner.kind, released, "Compositor disposed");
    }

    /// Drive [`render_frame`](Self::render_frame) from `signal` until
    /// disposed. Replaces any running loop.
    pub fn start_frame_loop(&self, signal: Box<dyn RefreshSignal>) {
        let next = FrameLoop::spawn(self.downgrade(), signal);
        if let Some(previous) = self.inner.frame_loop.lock().replace(next) {
            previous.stop();
        }
    }

    pub fn stop_frame_loop(&self) {
        if let Some(frame_loop) = self.inner.frame_loop.lock().take() {
            frame_loop.stop();
        }
    }

    /// Statistics of the running frame loop.
    pub fn loop_stats(&self) -> Option<LoopStats> {
        self.inner.frame_loop.lock().as_ref().map(FrameLoop::stats)
    }

    async fn load_and_install(&self, generation: u64, slot: ProgramSlot) -> DirectorResult<()> {
        let started = Instant::now();
        let loaded = self.load(generation, &slot).await;

        let mut state = self.inner.state.lock();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            drop(state);
            tracing::debug!(canvas = %self.inner.kind, %slot, "Superseded load discarded");
            return Ok(());
        }

        match loaded {
            Ok(context) => {
                let videos = context.media.len();
                state.status = CompositorState::Running;
                let previous = state.context.replace(context);
                drop(state);
                drop(previous);
                tracing::info!(
                    canvas = %self.inner.kind,
                    %slot,
                    videos,
                    load_ms = started.elapsed().as_millis() as u64,
                    "Composition running"
                );
                Ok(())
            }
            Err(e) => {
                state.status = CompositorState::Failed;
                let previous = state.context.take();
                drop(state);
                drop(previous);
                tracing::error!(canvas = %self.inner.kind, %slot, error = %e, "Composition failed to load");
                Err(e)
            }
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) != generation
    }

    async fn load(&self, generation: u64, slot: &ProgramSlot) -> DirectorResult<RenderContext> {
        let services = &self.inner.services;
        let composition = services.store.resolve(&slot.schedule_id, &slot.layout_id)?;
        let (width, height) = self.canvas_size();

        let background_url = composition.layout.effective_background_url(&composition.plan);
        let foreground_url = composition.layout.effective_foreground_url(&composition.plan);

        // Static layers and text load concurrently; video is acquired
        // element by element alongside them.
        let (background, foreground, text, media) = tokio::join!(
            self.load_static(background_url, "background", (width, height)),
            self.load_static(foreground_url, "foreground", (width, height)),
            services.text_cache.layer_for(&composition),
            self.acquire_media(generation, &composition, (width, height)),
        );

        Ok(RenderContext {
            slot: slot.clone(),
            background,
            foreground,
            text: text.resized(width, height),
            media,
        })
    }

    async fn load_static(
        &self,
        url: Option<String>,
        layer: &'static str,
        size: (u32, u32),
    ) -> Option<Bitmap> {
        let url = url?;
        match self.inner.services.images.get(&url).await {
            Ok(bitmap) => Some(bitmap.resized(size.0, size.1)),
            Err(e) => {
                tracing::warn!(
                    canvas = %self.inner.kind,
                    layer,
                    url = %url,
                    error = %e,
                    "Static layer unavailable, painting fallback color"
                );
                None
            }
        }
    }

    /// Lease a stream for every media element, one at a time in layout order.
    async fn acquire_media(
        &self,
        generation: u64,
        composition: &Composition,
        canvas: (u32, u32),
    ) -> Vec<MediaBinding> {
        let Composition { layout, .. } = composition;
        let services = &self.inner.services;
        let mut bindings = Vec::new();

        for element in layout.media_elements() {
            if self.is_stale(generation) {
                // The result will be discarded; stop acquiring.
                break;
            }
            let stream = match &element.source_id {
                Some(source_id) => match services.media.lease(source_id, &services.capture).await {
                    Ok(lease) => Some(lease),
                    Err(e) => {
                        tracing::warn!(
                            canvas = %self.inner.kind,
                            element_id = %element.id,
                            source_id = %source_id,
                            error = %e,
                            "Capture failed, element shows no video"
                        );
                        None
                    }
                },
                None => None,
            };
            bindings.push(MediaBinding {
                key: binding_key(layout, element),
                element: element.clone(),
                dest: program_to_canvas(&element.rect, PROGRAM_SIZE, canvas),
                stream,
            });
        }

        bindings.sort_by_key(|b| b.element.z_index);
        bindings
    }

    /// Paint one frame. Never waits: anything not ready is skipped.
    pub fn render_frame(&self) -> FrameStats {
        let mut state = self.inner.state.lock();
        let mut canvas = self.inner.canvas.lock();
        let canvas_size = (canvas.width(), canvas.height());
        state.frames += 1;
        let mut stats = FrameStats {
            frame_index: state.frames,
            state: state.status,
            ..FrameStats::default()
        };
        let status = state.status;

        let Some(context) = state.context.as_mut() else {
            match status {
                CompositorState::Failed => canvas.fill(self.inner.error_color),
                CompositorState::Loading | CompositorState::Reloading => {
                    canvas.fill(self.inner.fallback_color)
                }
                CompositorState::Idle | CompositorState::Running | CompositorState::Disposed => {
                    canvas.clear()
                }
            }
            return stats;
        };

        for binding in &mut context.media {
            let Some(handle) = binding.stream.as_mut().and_then(StreamLease::handle_mut) else {
                continue;
            };
            if handle.is_playing() {
                continue;
            }
            if let Err(e) = handle.play() {
                stats.playback_failures += 1;
                tracing::debug!(
                    canvas = %self.inner.kind,
                    key = %binding.key,
                    error = %e,
                    "Playback did not start, retrying next frame"
                );
            }
        }

        canvas.clear();
        match &context.background {
            Some(background) => canvas.draw_bitmap(background),
            None => canvas.fill(self.inner.fallback_color),
        }

        for binding in &context.media {
            let element = &binding.element;
            let handle = binding
                .stream
                .as_ref()
                .and_then(StreamLease::handle)
                .filter(|h| h.is_active());
            let Some(handle) = handle else {
                if !element.transparent_background {
                    canvas.fill_rect(&binding.dest, OPAQUE_BLACK);
                }
                stats.videos_missing += 1;
                continue;
            };
            let Some(frame) = handle.current_frame() else {
                stats.videos_pending += 1;
                continue;
            };

            if !element.transparent_background {
                canvas.fill_rect(&binding.dest, OPAQUE_BLACK);
            }
            // Fit is resolved in program pixels, then scaled onto the canvas.
            let draw = compute_draw(
                frame.width() as f64,
                frame.height() as f64,
                &element.rect,
                element.fit_mode,
            )
            .and_then(|draw| clip_draw(&draw, &element.rect));
            if let Some(draw) = draw {
                let dest = program_to_canvas(&draw.dest, PROGRAM_SIZE, canvas_size);
                canvas.draw_image(frame.image(), &draw.source, &dest);
            }
            stats.videos_drawn += 1;
        }

        canvas.draw_bitmap(&context.text);
        if let Some(foreground) = &context.foreground {
            canvas.draw_bitmap(foreground);
        }
        stats
    }
}

fn binding_key(layout: &Layout, element: &MediaElement) -> String {
    format!("{}:{}", layout.id, element.id)
}

impl fmt::Debug for Compositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Compositor")
            .field("kind", &self.inner.kind)
            .field("status", &state.status)
            .field("assignment", &state.assignment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetLoader;
    use director_common::error::{AssetLoadError, CaptureError, DirectorError};
    use director_media_sources::synthetic::SyntheticBackend;
    use director_media_sources::{MediaSourceKind, MediaSourceRegistry, SourceDescriptor};
    use director_program_model::{FitMode, InMemoryProgramStore, LayoutElement, Plan, Schedule};
    use image::RgbaImage;
    use tokio::sync::Semaphore;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// Each fetch consumes one permit from the gate.
    struct GatedLoader {
        inner: Arc<MemoryAssetLoader>,
        gate: Arc<Semaphore>,
    }

    #[async_trait::async_trait]
    impl AssetLoader for GatedLoader {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetLoadError> {
            self.gate
                .acquire()
                .await
                .map_err(|_| AssetLoadError::fetch(url, "gate closed"))?
                .forget();
            self.inner.fetch(url).await
        }
    }

    struct Fixture {
        backend: Arc<SyntheticBackend>,
        store: Arc<InMemoryProgramStore>,
        loader: Arc<MemoryAssetLoader>,
        services: Arc<CompositorServices>,
    }

    fn media(id: &str, source: Option<&str>, rect: Rect, z: i32) -> LayoutElement {
        LayoutElement::Media(MediaElement {
            id: id.to_string(),
            rect,
            z_index: z,
            source_id: source.map(str::to_string),
            fit_mode: FitMode::Stretch,
            transparent_background: false,
        })
    }

    fn fixture() -> Fixture {
        fixture_with_gate(None)
    }

    fn fixture_with_gate(gate: Option<Arc<Semaphore>>) -> Fixture {
        let backend = Arc::new(
            SyntheticBackend::new()
                .with_camera("cam1", "Camera 1")
                .with_camera("cam2", "Camera 2")
                .with_source_size("window:1", (640, 360)),
        );
        let registry = Arc::new(MediaSourceRegistry::new());
        for id in ["cam1", "cam2"] {
            registry.register(SourceDescriptor::new(id, MediaSourceKind::Camera, id));
        }
        registry.register(SourceDescriptor::new(
            "window:1",
            MediaSourceKind::Window,
            "Slides",
        ));
        let media = Arc::new(MediaSourceManager::new(registry, backend.clone()));

        let store = Arc::new(InMemoryProgramStore::new());
        let mut plan = Plan::new("p1");
        plan.background_url = Some("bg.png".to_string());
        store.upsert_plan(plan);
        let mut schedule = Schedule::new("s1");
        schedule.plan_id = Some("p1".to_string());
        store.upsert_schedule(schedule);

        let mut layout = Layout::new("l1");
        layout.elements = vec![self::media(
            "m1",
            Some("cam1"),
            Rect::new(0.0, 0.0, 960.0, 540.0),
            0,
        )];
        store.upsert_layout(layout).unwrap();

        let loader = Arc::new(MemoryAssetLoader::new());
        loader
            .insert_image("bg.png", &RgbaImage::from_pixel(16, 9, BLUE))
            .unwrap();

        let mut config = DirectorConfig::default();
        config.text.fallback_font_paths.clear();
        let assets: Arc<dyn AssetLoader> = match gate {
            Some(gate) => Arc::new(GatedLoader {
                inner: loader.clone(),
                gate,
            }),
            None => loader.clone(),
        };
        let services = CompositorServices::new(&config, store.clone(), media, assets);
        Fixture {
            backend,
            store,
            loader,
            services,
        }
    }

    fn compositor(fx: &Fixture, kind: CanvasKind) -> Compositor {
        Compositor::with_raster(kind, fx.services.clone(), 192, 108)
    }

    fn pixel(c: &Compositor, x: u32, y: u32) -> Rgba<u8> {
        *c.snapshot().image().get_pixel(x, y)
    }

    #[tokio::test]
    async fn test_assign_loads_and_draws_layers() {
        let fx = fixture();
        let c = compositor(&fx, CanvasKind::Preview);
        assert_eq!(c.state(), CompositorState::Idle);

        c.assign("s1", "l1").await.unwrap();
        assert_eq!(c.state(), CompositorState::Running);
        assert_eq!(fx.services.media.registry().reference_count("cam1"), 1);

        let stats = c.render_frame();
        assert_eq!(stats.videos_drawn, 1);
        assert_eq!(stats.state, CompositorState::Running);
        // Video covers the top-left quarter; the plan background the rest.
        assert_ne!(pixel(&c, 10, 10), BLUE);
        assert_eq!(pixel(&c, 150, 80), BLUE);

        let bindings = c.media_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].key, "l1:m1");
        assert!(bindings[0].is_playing);
    }

    #[tokio::test]
    async fn test_missing_layout_fails_with_error_fill() {
        let fx = fixture();
        let c = compositor(&fx, CanvasKind::Live);
        let err = c.assign("s1", "ghost").await.unwrap_err();
        assert!(err.is_data_not_found());
        assert_eq!(c.state(), CompositorState::Failed);

        c.render_frame();
        let expected = color_or(&DirectorConfig::default().compositor.error_color, OPAQUE_BLACK);
        assert_eq!(pixel(&c, 5, 5), expected);
    }

    #[tokio::test]
    async fn test_capture_failure_degrades_one_element() {
        let fx = fixture();
        fx.backend.fail_with(
            "cam2",
            CaptureError::PermissionDenied {
                source_id: "cam2".to_string(),
            },
        );
        let mut layout = Layout::new("l2");
        layout.elements = vec![
            media("a", Some("cam2"), Rect::new(0.0, 0.0, 960.0, 540.0), 0),
            media("b", Some("cam1"), Rect::new(960.0, 540.0, 960.0, 540.0), 1),
        ];
        fx.store.upsert_layout(layout).unwrap();

        let c = compositor(&fx, CanvasKind::Preview);
        c.assign("s1", "l2").await.unwrap();
        let stats = c.render_frame();
        assert_eq!(stats.videos_missing, 1);
        assert_eq!(stats.videos_drawn, 1);
        assert_eq!(pixel(&c, 10, 10), OPAQUE_BLACK);
    }

    #[tokio::test]
    async fn test_pending_frame_is_skipped_not_blacked() {
        let fx = fixture();
        let c = compositor(&fx, CanvasKind::Preview);
        c.assign("s1", "l1").await.unwrap();
        fx.backend.feed("cam1").unwrap().set_ready(false);

        let stats = c.render_frame();
        assert_eq!(stats.videos_pending, 1);
        assert_eq!(stats.videos_drawn, 0);
        assert_eq!(pixel(&c, 10, 10), BLUE);

        fx.backend.feed("cam1").unwrap().set_ready(true);
        assert_eq!(c.render_frame().videos_drawn, 1);
    }

    #[tokio::test]
    async fn test_z_order_paints_higher_elements_last() {
        let fx = fixture();
        let mut layout = Layout::new("l3");
        let overlap = Rect::new(0.0, 0.0, 960.0, 540.0);
        // Listed high-z first; painted low-z first.
        layout.elements = vec![
            media("top", None, overlap, 5),
            media("bottom", Some("cam1"), overlap, 1),
        ];
        fx.store.upsert_layout(layout).unwrap();

        let c = compositor(&fx, CanvasKind::Preview);
        c.assign("s1", "l3").await.unwrap();
        c.render_frame();
        // The sourceless element on top blacks out the video under it.
        assert_eq!(pixel(&c, 10, 10), OPAQUE_BLACK);
        let keys: Vec<String> = c.media_bindings().into_iter().map(|b| b.key).collect();
        assert_eq!(keys, vec!["l3:bottom", "l3:top"]);
    }

    #[tokio::test]
    async fn test_transparent_element_without_frame_shows_background() {
        let fx = fixture();
        let mut layout = Layout::new("l4");
        layout.elements = vec![LayoutElement::Media(MediaElement {
            id: "m".to_string(),
            rect: Rect::new(0.0, 0.0, 960.0, 540.0),
            z_index: 0,
            source_id: None,
            fit_mode: FitMode::Fill,
            transparent_background: true,
        })];
        fx.store.upsert_layout(layout).unwrap();

        let c = compositor(&fx, CanvasKind::Preview);
        c.assign("s1", "l4").await.unwrap();
        c.render_frame();
        assert_eq!(pixel(&c, 10, 10), BLUE);
    }

    #[tokio::test]
    async fn test_foreground_paints_over_everything() {
        let fx = fixture();
        fx.loader
            .insert_image("fg.png", &RgbaImage::from_pixel(4, 4, RED))
            .unwrap();
        let mut layout = fx.store.layout("l1").unwrap();
        layout.id = "l5".to_string();
        layout.foreground_url = Some("fg.png".to_string());
        fx.store.upsert_layout(layout).unwrap();

        let c = compositor(&fx, CanvasKind::Live);
        c.assign("s1", "l5").await.unwrap();
        c.render_frame();
        assert_eq!(pixel(&c, 10, 10), RED);
        assert_eq!(pixel(&c, 150, 80), RED);
    }

    #[tokio::test]
    async fn test_missing_background_paints_fallback() {
        let fx = fixture();
        let mut layout = fx.store.layout("l1").unwrap();
        layout.id = "l6".to_string();
        layout.background_url = Some("missing.png".to_string());
        fx.store.upsert_layout(layout).unwrap();

        let c = compositor(&fx, CanvasKind::Preview);
        c.assign("s1", "l6").await.unwrap();
        c.render_frame();
        assert_eq!(pixel(&c, 150, 80), OPAQUE_BLACK);
    }

    #[tokio::test]
    async fn test_switch_keeps_shared_source_open() {
        let fx = fixture();
        let mut other = fx.store.layout("l1").unwrap();
        other.id = "l7".to_string();
        fx.store.upsert_layout(other).unwrap();

        let c = compositor(&fx, CanvasKind::Live);
        c.assign("s1", "l1").await.unwrap();
        c.switch_to("s1", "l7").await.unwrap();

        assert_eq!(c.displayed(), Some(ProgramSlot::new("s1", "l7")));
        assert_eq!(fx.backend.open_count("cam1"), 1);
        assert_eq!(fx.services.media.registry().reference_count("cam1"), 1);

        // Assign disposes first, so the hardware is reopened.
        c.assign("s1", "l1").await.unwrap();
        assert_eq!(fx.backend.open_count("cam1"), 2);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_layout_edits() {
        let fx = fixture();
        let c = compositor(&fx, CanvasKind::Preview);
        c.assign("s1", "l1").await.unwrap();

        let mut layout = fx.store.layout("l1").unwrap();
        layout
            .elements
            .push(media("m2", Some("cam2"), Rect::new(960.0, 0.0, 960.0, 540.0), 1));
        fx.store.upsert_layout(layout).unwrap();

        c.refresh().await.unwrap();
        assert_eq!(c.state(), CompositorState::Running);
        assert_eq!(c.media_bindings().len(), 2);
        assert_eq!(fx.services.media.registry().reference_count("cam2"), 1);
        assert_eq!(fx.backend.open_count("cam1"), 1);
    }

    #[tokio::test]
    async fn test_dispose_mid_load_releases_late_streams() {
        let gate = Arc::new(Semaphore::new(0));
        let fx = fixture_with_gate(Some(gate.clone()));
        let c = compositor(&fx, CanvasKind::Preview);

        let loading = {
            let c = c.clone();
            tokio::spawn(async move { c.assign("s1", "l1").await })
        };
        // The camera is leased while the background fetch waits on the gate.
        while fx.services.media.registry().reference_count("cam1") == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(c.state(), CompositorState::Loading);
        assert_eq!(c.render_frame().state, CompositorState::Loading);

        c.dispose();
        gate.add_permits(8);
        loading.await.unwrap().unwrap();

        assert_eq!(c.state(), CompositorState::Disposed);
        assert!(c.displayed().is_none());
        assert_eq!(fx.services.media.registry().reference_count("cam1"), 0);
        assert_eq!(fx.backend.live_feed_count("cam1"), 0);
    }

    #[tokio::test]
    async fn test_reloading_keeps_previous_frame_drawing() {
        let gate = Arc::new(Semaphore::new(1));
        let fx = fixture_with_gate(Some(gate.clone()));
        let c = compositor(&fx, CanvasKind::Live);
        c.assign("s1", "l1").await.unwrap();

        // Cached background means the reload only waits on a new asset.
        let mut layout = fx.store.layout("l1").unwrap();
        layout.foreground_url = Some("fg.png".to_string());
        fx.store.upsert_layout(layout).unwrap();
        fx.loader
            .insert_image("fg.png", &RgbaImage::from_pixel(2, 2, RED))
            .unwrap();

        let reloading = {
            let c = c.clone();
            tokio::spawn(async move { c.refresh().await })
        };
        while c.state() != CompositorState::Reloading {
            tokio::task::yield_now().await;
        }
        let stats = c.render_frame();
        assert_eq!(stats.state, CompositorState::Reloading);
        assert_eq!(stats.videos_drawn, 1);
        assert_eq!(pixel(&c, 150, 80), BLUE);

        gate.add_permits(1);
        reloading.await.unwrap().unwrap();
        c.render_frame();
        assert_eq!(pixel(&c, 150, 80), RED);
    }

    #[tokio::test]
    async fn test_disposed_compositor_can_be_reassigned() {
        let fx = fixture();
        let c = compositor(&fx, CanvasKind::Preview);
        c.assign("s1", "l1").await.unwrap();
        c.dispose();
        assert!(c.snapshot().is_transparent());
        assert_eq!(c.assignment(), None);

        c.assign("s1", "l1").await.unwrap();
        assert_eq!(c.state(), CompositorState::Running);
        assert!(matches!(
            c.assign("nope", "l1").await,
            Err(DirectorError::DataNotFound(_))
        ));
        assert_eq!(fx.services.media.registry().reference_count("cam1"), 0);
    }

    #[tokio::test]
    async fn test_center_fit_matches_across_canvas_sizes() {
        let fx = fixture();
        let mut layout = Layout::new("centered");
        layout.elements = vec![LayoutElement::Media(MediaElement {
            id: "slides".to_string(),
            rect: Rect::new(0.0, 0.0, 960.0, 540.0),
            z_index: 0,
            source_id: Some("window:1".to_string()),
            fit_mode: FitMode::Center,
            transparent_background: false,
        })];
        fx.store.upsert_layout(layout).unwrap();

        let live = Compositor::with_raster(CanvasKind::Live, fx.services.clone(), 1920, 1080);
        let preview = Compositor::with_raster(CanvasKind::Preview, fx.services.clone(), 192, 108);
        live.assign("s1", "centered").await.unwrap();
        preview.assign("s1", "centered").await.unwrap();
        assert_eq!(live.render_frame().videos_drawn, 1);
        assert_eq!(preview.render_frame().videos_drawn, 1);

        // 640x360 sits at native size inside the 960x540 tile, offset by
        // (160, 90) in program pixels, on both canvases.
        assert_eq!(pixel(&live, 48, 27), OPAQUE_BLACK);
        assert_ne!(pixel(&live, 170, 100), OPAQUE_BLACK);
        assert_eq!(pixel(&preview, 4, 2), OPAQUE_BLACK);
        assert_ne!(pixel(&preview, 17, 10), OPAQUE_BLACK);
        // Outside the tile the plan background shows.
        assert_eq!(pixel(&live, 1000, 600), BLUE);
        assert_eq!(pixel(&preview, 100, 60), BLUE);
    }

    #[tokio::test]
    async fn test_failed_playback_is_counted_and_retried() {
        let fx = fixture();
        let mut layout = Layout::new("pair");
        layout.elements = vec![
            media("left", Some("cam1"), Rect::new(0.0, 0.0, 960.0, 540.0), 0),
            media("right", Some("cam2"), Rect::new(960.0, 0.0, 960.0, 540.0), 1),
        ];
        fx.store.upsert_layout(layout).unwrap();

        let c = compositor(&fx, CanvasKind::Live);
        c.assign("s1", "pair").await.unwrap();
        // Streams are started by the first frame; cam2 is gone before then.
        fx.backend.feed("cam2").unwrap().remove_device();

        let first = c.render_frame();
        assert_eq!(first.playback_failures, 1);
        assert_eq!(first.videos_missing, 1);
        assert_eq!(first.videos_drawn, 1);
        assert_eq!(pixel(&c, 150, 10), OPAQUE_BLACK);
        assert_ne!(pixel(&c, 10, 10), OPAQUE_BLACK);
        assert_ne!(pixel(&c, 10, 10), BLUE);

        let second = c.render_frame();
        assert_eq!(second.playback_failures, 1);
        assert_eq!(second.videos_drawn, 1);

        let bindings = c.media_bindings();
        assert!(bindings.iter().any(|b| b.key == "pair:left" && b.is_playing));
        assert!(bindings.iter().any(|b| b.key == "pair:right" && !b.is_playing));
    }
}
