//! Contracts between the engine and whatever owns the GPU.
//!
//! The engine never talks to a graphics API directly. It uploads decoded
//! tiles through [`TextureStore`] and issues textured, alpha-blended quads
//! through [`RenderContextProvider`]. `headless` records these calls for
//! tests; `wgpu_backend` (feature `render`) executes them.

use crate::core::geo::{Point, Size};
use crate::tiles::decode::DecodedTile;
use crate::Result;

/// Opaque reference to a texture owned by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// Axis-aligned rectangle in CSS pixels, canvas relative
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanning two corners. Tile edges are snapped outward to
    /// whole device pixels so neighbouring tiles never leave a seam.
    pub fn from_corners(min: Point, max: Point, dpr: f64) -> Self {
        let dpr = if dpr > 0.0 { dpr } else { 1.0 };
        let x0 = (min.x * dpr).floor() / dpr;
        let y0 = (min.y * dpr).floor() / dpr;
        let x1 = (max.x * dpr).ceil() / dpr;
        let y1 = (max.y * dpr).ceil() / dpr;
        Self::new(x0 as f32, y0 as f32, (x1 - x0) as f32, (y1 - y0) as f32)
    }

    pub fn is_visible_in(&self, viewport: Size) -> bool {
        self.width > 0.0
            && self.height > 0.0
            && self.x < viewport.width as f32
            && self.y < viewport.height as f32
            && self.x + self.width > 0.0
            && self.y + self.height > 0.0
    }
}

/// Upload/release of tile textures. Uploads must produce a mip-mapped,
/// clamp-to-edge, linearly filtered texture.
pub trait TextureStore {
    fn upload(&mut self, tile: &DecodedTile) -> Result<TextureHandle>;

    fn release(&mut self, texture: TextureHandle);
}

/// Per-frame drawing surface
pub trait RenderContextProvider: TextureStore {
    /// Starts a frame and clears the target
    fn begin_frame(&mut self, viewport: Size, dpr: f64) -> Result<()>;

    /// Draws `texture` stretched over `rect` with the given opacity. Later
    /// quads are blended over earlier ones.
    fn draw_quad(&mut self, texture: TextureHandle, rect: ScreenRect, alpha: f32);

    /// Copies everything drawn so far into a persistent snapshot texture and
    /// returns its handle. Providers without snapshot support return `None`.
    fn snapshot_frame(&mut self) -> Result<Option<TextureHandle>>;

    /// Submits the frame
    fn end_frame(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_snaps_outward_to_device_pixels() {
        let rect = ScreenRect::from_corners(Point::new(10.2, 3.7), Point::new(20.1, 4.2), 2.0);
        assert_eq!(rect.x, 10.0);
        assert_eq!(rect.y, 3.5);
        assert_eq!(rect.width, 10.5);
        assert_eq!(rect.height, 1.0);
    }

    #[test]
    fn test_rect_visibility() {
        let viewport = Size::new(100.0, 100.0);
        assert!(ScreenRect::new(90.0, 90.0, 20.0, 20.0).is_visible_in(viewport));
        assert!(!ScreenRect::new(100.0, 0.0, 20.0, 20.0).is_visible_in(viewport));
        assert!(!ScreenRect::new(-20.0, 0.0, 20.0, 20.0).is_visible_in(viewport));
    }
}
