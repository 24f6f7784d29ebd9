//! One frame of tile compositing.
//!
//! Draw order, back to front: the screen cache, coarser fallback levels
//! (only while the base level is incomplete), the base level and finally the
//! next level cross-faded in by the fractional zoom.

use crate::constants::{CROSSFADE_MIN_FRACTION, FULL_COVERAGE};
use crate::core::config::EngineConfig;
use crate::core::geo::TileCoord;
use crate::core::viewport::{level_of, ViewState};
use crate::prelude::HashSet;
use crate::rendering::context::RenderContextProvider;
use crate::rendering::raster::{LevelDraw, LevelPass, RasterRenderer};
use crate::rendering::screen_cache::{ScreenCache, ViewStamp};
use crate::tiles::cache::TileCache;
use crate::tiles::pipeline::TilePipeline;
use crate::tiles::queue::TilePriority;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelRole {
    Fallback,
    Base,
    CrossFade,
}

/// What a frame drew and requested
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub levels: Vec<(LevelDraw, LevelRole)>,
    pub base_level: u8,
    /// Ready fraction of the base level before this frame's draws
    pub base_coverage: f64,
    pub screen_cache_used: bool,
    /// Tiles requested this frame; everything else was pruned from the queue
    pub wanted: HashSet<TileCoord>,
    /// Loads applied at the start of the frame
    pub completed: usize,
    /// Loads started at the end of the frame
    pub started: usize,
    /// True on the first frame after a source change whose base level is
    /// fully covered
    pub load_complete: bool,
}

impl FrameReport {
    pub fn level(&self, role: LevelRole) -> impl Iterator<Item = &LevelDraw> {
        self.levels
            .iter()
            .filter(move |(_, r)| *r == role)
            .map(|(draw, _)| draw)
    }
}

#[derive(Debug)]
pub struct FrameCompositor {
    renderer: RasterRenderer,
    screen_cache: ScreenCache,
    crossfade: bool,
    loaded: bool,
}

impl FrameCompositor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            renderer: RasterRenderer,
            screen_cache: ScreenCache::new(config.screen_cache.clone()),
            crossfade: config.tiles.next_level_crossfade,
            loaded: false,
        }
    }

    pub fn configure(&mut self, config: &EngineConfig) {
        self.screen_cache.set_config(config.screen_cache.clone());
        self.crossfade = config.tiles.next_level_crossfade;
    }

    pub fn screen_cache(&self) -> &ScreenCache {
        &self.screen_cache
    }

    pub fn invalidate_screen_cache(&mut self) {
        self.screen_cache.invalidate();
    }

    /// Arms the load notification for a new source
    pub fn reset_load(&mut self) {
        self.loaded = false;
        self.screen_cache.invalidate();
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Renders one frame: applies finished loads, composites every level,
    /// prunes stale queued work and starts new loads.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        view: &ViewState,
        lod_lock: Option<u8>,
        cache: &mut TileCache,
        pipeline: &mut TilePipeline,
        provider: &mut dyn RenderContextProvider,
        frame: u64,
        now_ms: f64,
    ) -> Result<FrameReport> {
        let mut report = FrameReport {
            completed: pipeline.drain_completions(cache, provider, frame),
            ..FrameReport::default()
        };

        provider.begin_frame(view.viewport, view.dpr)?;

        let min_level = level_of(view.min_zoom).min(view.native_level);
        let max_level = view.native_level;
        let base = lod_lock.unwrap_or_else(|| view.z_int()).clamp(min_level, max_level);
        report.base_level = base;

        let base_pass = self.pass(view, base, 1.0, Some(TilePriority::Visible));
        let stamp = ViewStamp {
            z_int: base,
            scale: base_pass.scale,
            top_left_world: base_pass.top_left,
            viewport_css: view.viewport,
            dpr: view.dpr,
        };
        report.base_coverage = self.renderer.coverage(&base_pass, cache);

        if report.base_coverage < FULL_COVERAGE {
            report.screen_cache_used = self.screen_cache.draw(&stamp, provider);
            for level in min_level..base {
                let pass = self.pass(view, level, 1.0, None);
                let draw = self.renderer.draw_tiles_for_level(&pass, cache, pipeline, provider, frame);
                report.levels.push((draw, LevelRole::Fallback));
            }
        }

        let draw = self
            .renderer
            .draw_tiles_for_level(&base_pass, cache, pipeline, provider, frame);
        report.wanted.extend(draw.wanted.iter().copied());
        report.levels.push((draw, LevelRole::Base));

        let fraction = (view.zoom - base as f64).clamp(0.0, 1.0);
        if self.crossfade && fraction > CROSSFADE_MIN_FRACTION && base < max_level {
            let pass = self.pass(view, base + 1, fraction as f32, Some(TilePriority::Prefetch));
            let draw = self.renderer.draw_tiles_for_level(&pass, cache, pipeline, provider, frame);
            report.wanted.extend(draw.wanted.iter().copied());
            report.levels.push((draw, LevelRole::CrossFade));
        }

        self.screen_cache.update(&stamp, provider)?;

        if !self.loaded && report.base_coverage >= FULL_COVERAGE && pipeline.has_source() {
            self.loaded = true;
            report.load_complete = true;
        }

        let mut keep = report.wanted.clone();
        keep.extend(cache.pinned().copied());
        pipeline.cancel_unwanted(&keep, cache);
        pipeline.set_view(view.z_int(), view.center);
        report.started = pipeline.process(now_ms, cache);

        provider.end_frame()?;
        Ok(report)
    }

    fn pass(&self, view: &ViewState, level: u8, alpha: f32, enqueue: Option<TilePriority>) -> LevelPass {
        let (top_left, scale) = view.frame_at_level(level);
        LevelPass {
            level,
            top_left,
            scale,
            viewport: view.viewport,
            dpr: view.dpr,
            tile_size: view.tile_size,
            wrap_x: view.wrap_x,
            alpha,
            enqueue,
        }
    }
}
