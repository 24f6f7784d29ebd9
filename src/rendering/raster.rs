use crate::core::geo::{tiles_per_axis, Point, Size, TileCoord};
use crate::rendering::context::{RenderContextProvider, ScreenRect};
use crate::tiles::cache::TileCache;
use crate::tiles::pipeline::TilePipeline;
use crate::tiles::queue::TilePriority;

/// Inclusive range of (unwrapped) tile indices covering the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub level: u8,
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl TileRange {
    /// Tiles of `level` intersecting a viewport whose top-left corner is at
    /// `top_left` (level pixels) drawn at `scale`. Rows outside the grid are
    /// dropped; columns too unless the map wraps horizontally.
    pub fn visible(
        level: u8,
        top_left: Point,
        scale: f64,
        viewport: Size,
        tile_size: u32,
        wrap_x: bool,
    ) -> Option<Self> {
        if viewport.is_empty() || scale <= 0.0 || !top_left.is_finite() {
            return None;
        }
        let ts = tile_size as f64;
        let n = tiles_per_axis(level) as i64;
        let right = top_left.x + viewport.width / scale;
        let bottom = top_left.y + viewport.height / scale;

        let mut min_x = (top_left.x / ts).floor() as i64;
        let mut max_x = (right / ts).ceil() as i64 - 1;
        let min_y = ((top_left.y / ts).floor() as i64).max(0);
        let max_y = ((bottom / ts).ceil() as i64 - 1).min(n - 1);
        if !wrap_x {
            min_x = min_x.max(0);
            max_x = max_x.min(n - 1);
        }
        if min_x > max_x || min_y > max_y {
            return None;
        }
        Some(Self {
            level,
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn len(&self) -> usize {
        ((self.max_x - self.min_x + 1) * (self.max_y - self.min_y + 1)) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unwrapped grid positions paired with the tile they show
    pub fn tiles(&self, wrap_x: bool) -> impl Iterator<Item = (i64, i64, TileCoord)> + '_ {
        let level = self.level;
        (self.min_y..=self.max_y).flat_map(move |y| {
            (self.min_x..=self.max_x).filter_map(move |x| {
                TileCoord::checked(level, x, y, wrap_x).map(|coord| (x, y, coord))
            })
        })
    }
}

/// How one pyramid level is drawn this frame
#[derive(Debug, Clone, Copy)]
pub struct LevelPass {
    pub level: u8,
    pub top_left: Point,
    pub scale: f64,
    pub viewport: Size,
    pub dpr: f64,
    pub tile_size: u32,
    pub wrap_x: bool,
    pub alpha: f32,
    /// Priority for missing tiles; `None` draws what is ready and requests
    /// nothing.
    pub enqueue: Option<TilePriority>,
}

impl LevelPass {
    pub fn range(&self) -> Option<TileRange> {
        TileRange::visible(
            self.level,
            self.top_left,
            self.scale,
            self.viewport,
            self.tile_size,
            self.wrap_x,
        )
    }
}

/// What a level pass drew
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelDraw {
    pub level: u8,
    /// Every visible tile of the level, ready or not
    pub wanted: Vec<TileCoord>,
    pub drawn: usize,
    pub coverage: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RasterRenderer;

impl RasterRenderer {
    /// Draws the ready tiles of one level and requests the missing ones.
    pub fn draw_tiles_for_level(
        &self,
        pass: &LevelPass,
        cache: &mut TileCache,
        pipeline: &mut TilePipeline,
        provider: &mut dyn RenderContextProvider,
        frame: u64,
    ) -> LevelDraw {
        let mut out = LevelDraw {
            level: pass.level,
            coverage: 1.0,
            ..LevelDraw::default()
        };
        let Some(range) = pass.range() else {
            return out;
        };

        let ts = pass.tile_size as f64;
        let mut visible = 0usize;
        for (x, y, coord) in range.tiles(pass.wrap_x) {
            visible += 1;
            out.wanted.push(coord);
            match cache.texture(&coord) {
                Some(texture) => {
                    let min = Point::new(
                        (x as f64 * ts - pass.top_left.x) * pass.scale,
                        (y as f64 * ts - pass.top_left.y) * pass.scale,
                    );
                    let max = Point::new(min.x + ts * pass.scale, min.y + ts * pass.scale);
                    let rect = ScreenRect::from_corners(min, max, pass.dpr);
                    if rect.is_visible_in(pass.viewport) {
                        provider.draw_quad(texture, rect, pass.alpha);
                    }
                    cache.touch(&coord, frame);
                    out.drawn += 1;
                }
                None => {
                    if let Some(priority) = pass.enqueue {
                        pipeline.enqueue(coord, priority, cache);
                    }
                }
            }
        }
        if visible > 0 {
            out.coverage = out.drawn as f64 / visible as f64;
        }
        out
    }

    /// Ready fraction of the level's visible tiles; 1.0 when nothing is
    /// visible.
    pub fn coverage(&self, pass: &LevelPass, cache: &TileCache) -> f64 {
        let Some(range) = pass.range() else {
            return 1.0;
        };
        let mut visible = 0usize;
        let mut ready = 0usize;
        for (_, _, coord) in range.tiles(pass.wrap_x) {
            visible += 1;
            if cache.is_ready(&coord) {
                ready += 1;
            }
        }
        if visible == 0 {
            1.0
        } else {
            ready as f64 / visible as f64
        }
    }
}
