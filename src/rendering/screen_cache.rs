use crate::constants::{SCREEN_CACHE_MAX_RATIO, SCREEN_CACHE_MIN_RATIO};
use crate::core::config::ScreenCacheConfig;
use crate::core::geo::{Point, Size};
use crate::rendering::context::{RenderContextProvider, ScreenRect, TextureHandle};
use crate::Result;

/// The view a frame was rendered with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewStamp {
    pub z_int: u8,
    pub scale: f64,
    pub top_left_world: Point,
    pub viewport_css: Size,
    pub dpr: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenCacheSnapshot {
    pub texture: TextureHandle,
    pub z_int: u8,
    pub scale: f64,
    pub top_left_world: Point,
    pub viewport_css: Size,
    pub dpr: f64,
}

impl ScreenCacheSnapshot {
    /// Where the snapshot lands on screen for `current`, if it is still
    /// close enough to be useful.
    pub fn placement(&self, current: &ViewStamp) -> Option<ScreenRect> {
        if self.viewport_css != current.viewport_css || self.dpr != current.dpr {
            return None;
        }
        if self.z_int != current.z_int || self.scale <= 0.0 {
            return None;
        }
        let ratio = current.scale / self.scale;
        if ratio <= SCREEN_CACHE_MIN_RATIO || ratio >= SCREEN_CACHE_MAX_RATIO {
            return None;
        }
        let offset = self
            .top_left_world
            .subtract(&current.top_left_world)
            .multiply(current.scale);
        let half = current.viewport_css.half();
        if offset.x.abs() > half.x || offset.y.abs() > half.y {
            return None;
        }
        Some(ScreenRect::new(
            offset.x as f32,
            offset.y as f32,
            (self.viewport_css.width * ratio) as f32,
            (self.viewport_css.height * ratio) as f32,
        ))
    }
}

/// Last frame's raster output, reused as an underlay while new tiles stream
/// in during small pans and zooms.
#[derive(Debug, Default)]
pub struct ScreenCache {
    snapshot: Option<ScreenCacheSnapshot>,
    config: ScreenCacheConfig,
}

impl ScreenCache {
    pub fn new(config: ScreenCacheConfig) -> Self {
        Self {
            snapshot: None,
            config,
        }
    }

    pub fn set_config(&mut self, config: ScreenCacheConfig) {
        if !config.enabled {
            self.snapshot = None;
        }
        self.config = config;
    }

    pub fn snapshot(&self) -> Option<&ScreenCacheSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.snapshot = None;
    }

    /// Captures the frame drawn so far, tagged with the view that produced it.
    pub fn update(&mut self, view: &ViewStamp, provider: &mut dyn RenderContextProvider) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        self.snapshot = provider.snapshot_frame()?.map(|texture| ScreenCacheSnapshot {
            texture,
            z_int: view.z_int,
            scale: view.scale,
            top_left_world: view.top_left_world,
            viewport_css: view.viewport_css,
            dpr: view.dpr,
        });
        Ok(())
    }

    /// Draws the snapshot under the current frame when still valid. Returns
    /// whether it was drawn.
    pub fn draw(&self, current: &ViewStamp, provider: &mut dyn RenderContextProvider) -> bool {
        if !self.config.enabled {
            return false;
        }
        let Some(snapshot) = &self.snapshot else {
            return false;
        };
        match snapshot.placement(current) {
            Some(rect) => {
                provider.draw_quad(snapshot.texture, rect, self.config.alpha);
                true
            }
            None => false,
        }
    }
}
