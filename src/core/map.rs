use crate::{
    animation::{easing::EasingType, pan::PanAnimation, zoom::ZoomController},
    constants::{DEFAULT_FLY_DURATION_MS, MAX_PYRAMID_LEVEL, TILE_SIZE},
    core::{
        bounds::Bounds,
        config::{EngineConfig, EngineProfile, InertiaOptions},
        geo::{Point, Size},
        viewport::{level_factor, level_of, ViewState},
    },
    input::{
        events::{EventBus, InputEvent, MapEvent},
        handler::InputController,
    },
    prelude::Arc,
    rendering::{
        compositor::{FrameCompositor, FrameReport},
        context::{RenderContextProvider, TextureStore},
    },
    tiles::{cache::TileCache, pipeline::TilePipeline, source::TileSource},
    traits::ViewMutator,
    Result,
};
use crossbeam_channel::Receiver;
use instant::Instant;

/// Where tiles come from and the pyramid they form
#[derive(Clone)]
pub struct TileSourceOptions {
    pub source: Arc<dyn TileSource>,
    pub tile_size: u32,
    pub min_zoom: u8,
    /// Deepest level of the pyramid; its pixels are the native pixels
    pub max_zoom: u8,
    pub wrap_x: bool,
    /// Drop every cached texture of the previous source
    pub clear_cache: bool,
}

impl TileSourceOptions {
    pub fn new(source: Arc<dyn TileSource>, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            source,
            tile_size: TILE_SIZE,
            min_zoom,
            max_zoom,
            wrap_x: false,
            clear_cache: true,
        }
    }
}

impl std::fmt::Debug for TileSourceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSourceOptions")
            .field("tile_size", &self.tile_size)
            .field("min_zoom", &self.min_zoom)
            .field("max_zoom", &self.max_zoom)
            .field("wrap_x", &self.wrap_x)
            .field("clear_cache", &self.clear_cache)
            .finish()
    }
}

/// Target of an animated move. Missing fields keep the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlyToOptions {
    /// Native pixels
    pub center: Option<Point>,
    pub zoom: Option<f64>,
    pub duration_ms: Option<f64>,
    pub easing: Option<EasingType>,
}

/// The camera plus the event stream it reports to
#[derive(Debug, Default)]
pub struct MapView {
    state: ViewState,
    events: EventBus,
}

impl MapView {
    pub fn state(&self) -> &ViewState {
        &self.state
    }
}

impl ViewMutator for MapView {
    fn view(&self) -> &ViewState {
        &self.state
    }

    fn commit_view(&mut self, center: Point, zoom: f64) {
        if !center.is_finite() {
            return;
        }
        let zoom = self.state.clamp_zoom(zoom);
        let zoom_changed = zoom != self.state.zoom;
        self.state.zoom = zoom;
        self.state.center = center;
        let center = self.state.center_native();
        self.events.emit(MapEvent::Move { center, zoom });
        if zoom_changed {
            self.events.emit(MapEvent::Zoom { zoom });
        }
    }

    fn emit(&mut self, event: MapEvent) {
        self.events.emit(event);
    }
}

/// The tile streaming and viewport engine.
///
/// Owns the view, the tile cache and pipeline, the zoom and pan animations
/// and the input controller. The host forwards input with
/// [`MapEngine::handle_input`] and calls [`MapEngine::render_frame`] once per
/// animation frame; everything else happens inside those two calls.
pub struct MapEngine {
    view: MapView,
    config: EngineConfig,
    cache: TileCache,
    pipeline: TilePipeline,
    zoom: ZoomController,
    pan: PanAnimation,
    input: InputController,
    compositor: FrameCompositor,
    frame: u64,
    clock: Instant,
}

impl MapEngine {
    pub fn new(profile: EngineProfile) -> Self {
        Self::with_config(profile.resolve())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            view: MapView::default(),
            cache: TileCache::new(config.tiles.max_tiles),
            pipeline: TilePipeline::with_config(TILE_SIZE, &config.tiles),
            zoom: ZoomController::new(config.zoom.clone()),
            pan: PanAnimation::new(config.inertia.clone()),
            input: InputController::new(config.wheel.clone()),
            compositor: FrameCompositor::new(&config),
            frame: 0,
            clock: Instant::now(),
            config,
        }
    }

    /// Milliseconds since the engine was created, for hosts without their
    /// own frame clock
    pub fn now_ms(&self) -> f64 {
        self.clock.elapsed().as_secs_f64() * 1000.0
    }

    pub fn view(&self) -> &ViewState {
        &self.view.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn pipeline(&self) -> &TilePipeline {
        &self.pipeline
    }

    pub fn zoom_controller(&self) -> &ZoomController {
        &self.zoom
    }

    pub fn pan_animation(&self) -> &PanAnimation {
        &self.pan
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Center in native pixels
    pub fn center(&self) -> Point {
        self.view.state.center_native()
    }

    pub fn zoom(&self) -> f64 {
        self.view.state.zoom
    }

    pub fn subscribe(&mut self) -> Receiver<MapEvent> {
        self.view.events.subscribe()
    }

    pub fn is_animating(&self) -> bool {
        self.zoom.is_easing() || self.pan.is_active()
    }

    /// Replaces the whole configuration. The cache shrinks immediately if
    /// the new budget is smaller.
    pub fn set_config(&mut self, config: EngineConfig, store: &mut dyn TextureStore) {
        self.cache.set_max_tiles(config.tiles.max_tiles, store);
        self.pipeline.configure(&config.tiles);
        self.zoom.set_config(config.zoom.clone());
        self.pan.set_options(config.inertia.clone());
        self.input.set_wheel_config(config.wheel.clone());
        self.compositor.configure(&config);
        self.config = config;
    }

    /// Moves the center to native pixel coordinates, hard clamped.
    pub fn set_center(&mut self, x: f64, y: f64) {
        let target = Point::new(x, y);
        if !target.is_finite() {
            return;
        }
        let mut next = self.view.state.clone();
        next.set_center_native(target);
        self.view.commit_view(next.center, next.zoom);
        self.emit_move_end();
    }

    /// Zooms around the viewport center, cancelling any zoom ease.
    pub fn set_zoom(&mut self, zoom: f64) {
        if !zoom.is_finite() {
            return;
        }
        self.zoom.cancel(&mut self.view);
        let before = self.view.state.zoom;
        let mut next = self.view.state.clone();
        next.set_zoom(zoom);
        self.view.commit_view(next.center, next.zoom);
        self.emit_move_end();
        if next.zoom != before {
            self.view.emit(MapEvent::ZoomEnd { zoom: next.zoom });
        }
    }

    /// Switches the tile source. The native center is kept; zoom limits and
    /// horizontal wrapping follow the new pyramid.
    pub fn set_tile_source(&mut self, options: TileSourceOptions, store: &mut dyn TextureStore) {
        let tile_size = if options.tile_size == 0 {
            TILE_SIZE
        } else {
            options.tile_size
        };
        let max_level = options.max_zoom.min(MAX_PYRAMID_LEVEL);
        let min_level = options.min_zoom.min(max_level);

        let had_source = self.pipeline.has_source();
        let state = &self.view.state;
        if options.clear_cache || tile_size != state.tile_size {
            self.pipeline
                .set_source(Some(options.source.clone()), tile_size, &mut self.cache, store);
        } else {
            self.pipeline
                .replace_source(Some(options.source.clone()), &mut self.cache);
        }

        let native = state.center_native();
        let mut next = state.clone();
        next.tile_size = tile_size;
        next.native_level = max_level;
        next.wrap_x = options.wrap_x;
        next.min_zoom = min_level as f64;
        next.max_zoom = max_level as f64;
        next.zoom = next.clamp_zoom(next.zoom);
        if had_source {
            next.center = native.multiply(level_factor(max_level, next.z_int()));
        } else {
            next.center = next.world_center(next.z_int());
        }
        next.center = next.constrain(next.center, next.z_int(), next.scale());
        self.view.state.tile_size = next.tile_size;
        self.view.state.native_level = next.native_level;
        self.view.state.wrap_x = next.wrap_x;
        self.view.state.min_zoom = next.min_zoom;
        self.view.state.max_zoom = next.max_zoom;
        self.view.commit_view(next.center, next.zoom);

        self.compositor.reset_load();
        log::info!(
            "tile source set: levels {}..={}, tile size {}, wrap_x {}",
            min_level,
            max_level,
            tile_size,
            options.wrap_x
        );
        self.schedule_baseline();
    }

    fn schedule_baseline(&mut self) {
        if !self.config.tiles.baseline_prefetch || !self.pipeline.has_source() {
            return;
        }
        let state = &self.view.state;
        let min_level = level_of(state.min_zoom).min(state.native_level);
        let level = self
            .config
            .tiles
            .baseline_level
            .unwrap_or(min_level)
            .clamp(min_level, state.native_level);
        self.pipeline.schedule_baseline_prefetch(level, &mut self.cache);
    }

    /// Applies a new canvas size (CSS pixels) and device pixel ratio.
    pub fn resize(&mut self, width: f64, height: f64, dpr: f64) {
        if !(width.is_finite() && height.is_finite()) {
            return;
        }
        let size = Size::new(width.max(0.0), height.max(0.0));
        self.view.state.set_viewport(size, dpr);
        self.compositor.invalidate_screen_cache();
        let dpr = self.view.state.dpr;
        self.view.emit(MapEvent::Resize {
            width: size.width,
            height: size.height,
            dpr,
        });
    }

    pub fn set_wheel_speed(&mut self, speed: f64) {
        self.input.set_wheel_speed(speed);
        self.config.wheel.speed = self.input.wheel_config().speed;
    }

    pub fn set_inertia_options(&mut self, options: InertiaOptions) {
        self.pan.set_options(options.clone());
        self.config.inertia = options;
    }

    /// Limits the center to `bounds` (native pixels); `None` removes the limit.
    pub fn set_max_bounds_px(&mut self, bounds: Option<Bounds>) {
        let mut next = self.view.state.clone();
        next.set_max_bounds(bounds);
        self.view.state.max_bounds_px = next.max_bounds_px;
        if next.center != self.view.state.center {
            self.view.commit_view(next.center, next.zoom);
            self.emit_move_end();
        }
    }

    /// Drag resistance past the max bounds, 0.0 (none) to 1.0 (solid)
    pub fn set_max_bounds_viscosity(&mut self, viscosity: f64) {
        if viscosity.is_finite() {
            self.view.state.viscosity = viscosity.clamp(0.0, 1.0);
        }
    }

    pub fn set_free_pan(&mut self, free_pan: bool) {
        self.view.state.free_pan = free_pan;
    }

    /// Animates to a new center and zoom. Cancels any zoom ease.
    pub fn fly_to(&mut self, options: FlyToOptions, now_ms: f64) {
        self.zoom.cancel(&mut self.view);
        let state = &self.view.state;
        let center = options.center.unwrap_or_else(|| state.center_native());
        let zoom = options.zoom.unwrap_or(state.zoom);
        let duration = options
            .duration_ms
            .filter(|d| d.is_finite())
            .unwrap_or(DEFAULT_FLY_DURATION_MS);
        let easing = options.easing.unwrap_or_default();
        self.pan.fly_to(center, zoom, duration, easing, now_ms, &self.view);
    }

    pub fn cancel_pan_anim(&mut self) {
        self.pan.cancel(&mut self.view);
    }

    pub fn cancel_zoom_anim(&mut self) {
        self.zoom.cancel(&mut self.view);
    }

    /// Forwards one input event from the viewport container.
    pub fn handle_input(&mut self, event: &InputEvent, now_ms: f64) {
        let interacted = self
            .input
            .handle(event, now_ms, &mut self.view, &mut self.zoom, &mut self.pan);
        if interacted {
            self.pipeline.note_interaction(now_ms);
        }
    }

    /// Advances running animations. Returns whether any is still running.
    pub fn tick(&mut self, now_ms: f64) -> bool {
        let zooming = self.zoom.step(now_ms, &mut self.view);
        let panning = self.pan.step(now_ms, &mut self.view);
        if zooming || panning {
            self.pipeline.note_interaction(now_ms);
        }
        zooming || panning
    }

    /// Runs one frame: animations, finished loads, compositing, new loads.
    pub fn render_frame(&mut self, provider: &mut dyn RenderContextProvider, now_ms: f64) -> Result<FrameReport> {
        self.tick(now_ms);
        self.frame += 1;
        let report = self.compositor.render(
            &self.view.state,
            self.zoom.lod_lock(),
            &mut self.cache,
            &mut self.pipeline,
            provider,
            self.frame,
            now_ms,
        )?;
        if report.load_complete {
            log::debug!("base level complete after {} frames", self.frame);
            self.view.emit(MapEvent::Load);
        }
        Ok(report)
    }

    /// Releases every texture and forgets all tile state. Safe after the
    /// GPU context was lost; tiles are requested again on the next frame.
    pub fn clear(&mut self, store: &mut dyn TextureStore) {
        self.pipeline.clear(&mut self.cache, store);
        self.compositor.invalidate_screen_cache();
        self.schedule_baseline();
    }

    fn emit_move_end(&mut self) {
        let center = self.view.state.center_native();
        let zoom = self.view.state.zoom;
        self.view.emit(MapEvent::MoveEnd { center, zoom });
    }
}

impl Default for MapEngine {
    fn default() -> Self {
        Self::new(EngineProfile::default())
    }
}
