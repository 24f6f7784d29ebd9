use crate::core::bounds::Bounds;
use crate::core::geo::{world_size, Point, Size};
use crate::constants::{MAX_PYRAMID_LEVEL, TILE_SIZE};
use serde::{Deserialize, Serialize};

/// The camera: where the map is looking and how far it may go.
///
/// `center` is kept in world pixels of level `floor(zoom)`, so it is rescaled
/// whenever the integer level changes. Native pixels are pixels of the
/// deepest pyramid level (`native_level`), the coordinate space callers use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub center: Point,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub native_level: u8,
    pub tile_size: u32,
    pub wrap_x: bool,
    pub free_pan: bool,
    /// Limits for the center in native pixels
    pub max_bounds_px: Option<Bounds>,
    /// Resistance when dragging past `max_bounds_px` (0.0 = loose, 1.0 = solid)
    pub viscosity: f64,
    /// Canvas size in CSS pixels
    pub viewport: Size,
    pub dpr: f64,
}

impl ViewState {
    pub fn new(tile_size: u32, min_zoom: f64, max_zoom: f64, native_level: u8) -> Self {
        let mut state = Self {
            tile_size,
            min_zoom,
            max_zoom,
            native_level: native_level.min(MAX_PYRAMID_LEVEL),
            ..Self::default()
        };
        state.zoom = min_zoom;
        state.center = state.world_center(state.z_int());
        state
    }

    /// Integer pyramid level the center is expressed in
    pub fn z_int(&self) -> u8 {
        level_of(self.zoom)
    }

    /// Scale of level `z_int()` pixels to CSS pixels, in `[1, 2)`
    pub fn scale(&self) -> f64 {
        2_f64.powf(self.zoom - self.z_int() as f64)
    }

    pub fn world_size(&self, z: u8) -> f64 {
        world_size(self.tile_size, z)
    }

    pub fn world_center(&self, z: u8) -> Point {
        let half = self.world_size(z) / 2.0;
        Point::new(half, half)
    }

    /// Center re-expressed at another pyramid level
    pub fn center_at_level(&self, level: u8) -> Point {
        self.center.multiply(level_factor(self.z_int(), level))
    }

    /// Top-left corner (level pixels) and scale used to draw `level` for the
    /// current view. `level` may differ from `z_int()` during LOD locks and
    /// for fallback or cross-fade passes.
    pub fn frame_at_level(&self, level: u8) -> (Point, f64) {
        let scale = 2_f64.powf(self.zoom - level as f64);
        let center = self.center_at_level(level);
        let half = self.viewport.half();
        (Point::new(center.x - half.x / scale, center.y - half.y / scale), scale)
    }

    pub fn top_left_world(&self) -> Point {
        self.frame_at_level(self.z_int()).0
    }

    /// Screen (CSS px, canvas relative) to world pixels of `z_int()`
    pub fn screen_to_world(&self, screen: &Point) -> Point {
        let scale = self.scale();
        self.top_left_world().add(&screen.multiply(1.0 / scale))
    }

    pub fn world_to_screen(&self, world: &Point) -> Point {
        world.subtract(&self.top_left_world()).multiply(self.scale())
    }

    /// Screen position to native pixels
    pub fn screen_to_native(&self, screen: &Point) -> Point {
        self.screen_to_world(screen)
            .multiply(level_factor(self.z_int(), self.native_level))
    }

    pub fn center_native(&self) -> Point {
        self.center_at_level(self.native_level)
    }

    /// Share of the world (at `zoom`) visible in the viewport. 1.0 means the
    /// whole map fits on screen.
    pub fn world_coverage(&self, zoom: f64) -> f64 {
        let world_css = world_size(self.tile_size, 0) * 2_f64.powf(zoom);
        if world_css <= 0.0 {
            return 1.0;
        }
        let fx = (self.viewport.width / world_css).min(1.0);
        let fy = (self.viewport.height / world_css).min(1.0);
        fx * fy
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_finite() {
            zoom.clamp(self.min_zoom, self.max_zoom)
        } else {
            self.zoom
        }
    }

    /// Moves the center to a native-pixel position, hard clamped.
    pub fn set_center_native(&mut self, native: Point) {
        if !native.is_finite() {
            return;
        }
        let world = native.multiply(level_factor(self.native_level, self.z_int()));
        self.center = self.constrain(world, self.z_int(), self.scale());
    }

    /// Changes zoom around the screen center, keeping the native center.
    pub fn set_zoom(&mut self, zoom: f64) {
        let zoom = self.clamp_zoom(zoom);
        let z_from = self.z_int();
        let z_to = level_of(zoom);
        let center = self.center.multiply(level_factor(z_from, z_to));
        self.zoom = zoom;
        self.center = self.constrain(center, z_to, self.scale());
    }

    pub fn set_zoom_limits(&mut self, min_zoom: f64, max_zoom: f64) {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom.max(min_zoom);
        self.set_zoom(self.zoom);
    }

    pub fn set_viewport(&mut self, viewport: Size, dpr: f64) {
        self.viewport = viewport;
        if dpr.is_finite() && dpr > 0.0 {
            self.dpr = dpr;
        }
        self.center = self.constrain(self.center, self.z_int(), self.scale());
    }

    pub fn set_max_bounds(&mut self, bounds: Option<Bounds>) {
        self.max_bounds_px = bounds.filter(|b| b.is_valid());
        self.center = self.constrain(self.center, self.z_int(), self.scale());
    }

    /// World clamp followed by the hard max-bounds limit
    pub fn constrain(&self, center: Point, z_int: u8, scale: f64) -> Point {
        let clamped = clamp_center_world(
            center,
            self.world_size(z_int),
            scale,
            self.viewport,
            self.wrap_x,
            self.free_pan,
        );
        self.limit_to_max_bounds(clamped, z_int, scale, 1.0)
    }

    /// Center position as seen by a drag: world clamp, then max bounds with
    /// the configured viscosity.
    pub fn constrain_drag(&self, center: Point) -> Point {
        let z_int = self.z_int();
        let scale = self.scale();
        let clamped = clamp_center_world(
            center,
            self.world_size(z_int),
            scale,
            self.viewport,
            self.wrap_x,
            self.free_pan,
        );
        self.limit_to_max_bounds(clamped, z_int, scale, self.viscosity)
    }

    fn limit_to_max_bounds(&self, center: Point, z_int: u8, scale: f64, viscosity: f64) -> Point {
        let Some(bounds) = self.max_bounds_px else {
            return center;
        };
        let level = bounds.scaled(level_factor(self.native_level, z_int));
        let half = self.viewport.half().multiply(1.0 / scale);
        let inner = Bounds::new(level.min.add(&half), level.max.subtract(&half));
        if inner.is_valid() && inner.contains(&center) {
            return center;
        }
        let mid = level.center();
        let limit = |value: f64, span: f64, half: f64, mid: f64, lo: f64, hi: f64| -> f64 {
            if span <= 2.0 * half {
                mid
            } else if value < lo {
                viscous_limit(value, lo, viscosity)
            } else if value > hi {
                viscous_limit(value, hi, viscosity)
            } else {
                value
            }
        };
        Point::new(
            limit(center.x, level.width(), half.x, mid.x, inner.min.x, inner.max.x),
            limit(center.y, level.height(), half.y, mid.y, inner.min.y, inner.max.y),
        )
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            center: Point::default(),
            zoom: 0.0,
            min_zoom: 0.0,
            max_zoom: 0.0,
            native_level: 0,
            tile_size: TILE_SIZE,
            wrap_x: false,
            free_pan: false,
            max_bounds_px: None,
            viscosity: 1.0,
            viewport: Size::default(),
            dpr: 1.0,
        }
    }
}

/// Integer level for a fractional zoom
pub fn level_of(zoom: f64) -> u8 {
    zoom.floor().clamp(0.0, MAX_PYRAMID_LEVEL as f64) as u8
}

/// Factor converting pixels of level `from` into pixels of level `to`
pub fn level_factor(from: u8, to: u8) -> f64 {
    2_f64.powi(to as i32 - from as i32)
}

/// Pulls `value` back toward `threshold`; viscosity 1.0 pins it there.
fn viscous_limit(value: f64, threshold: f64, viscosity: f64) -> f64 {
    value - (value - threshold) * viscosity.clamp(0.0, 1.0)
}

/// Keeps the viewport over the world.
///
/// Per axis the visible half extent is `viewport / (2 * scale)` world pixels.
/// If the world is no larger than the viewport along an axis the center is
/// pinned to the world's middle; otherwise it is clamped so no empty space
/// shows. X is left alone when the map wraps horizontally, and free pan
/// disables clamping entirely.
pub fn clamp_center_world(
    target: Point,
    world: f64,
    scale: f64,
    viewport: Size,
    wrap_x: bool,
    free_pan: bool,
) -> Point {
    if free_pan {
        return target;
    }
    let clamp_axis = |value: f64, view: f64| -> f64 {
        let half = view / (2.0 * scale);
        if half >= world / 2.0 {
            world / 2.0
        } else {
            value.clamp(half, world - half)
        }
    };
    let x = if wrap_x {
        target.x
    } else {
        clamp_axis(target.x, viewport.width)
    };
    Point::new(x, clamp_axis(target.y, viewport.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ViewState {
        let mut view = ViewState::new(256, 0.0, 5.0, 5);
        view.set_viewport(Size::new(256.0, 256.0), 1.0);
        view
    }

    #[test]
    fn test_clamp_small_world_centers() {
        let c = clamp_center_world(
            Point::new(500.0, 500.0),
            256.0,
            1.0,
            Size::new(800.0, 600.0),
            false,
            false,
        );
        assert_eq!(c, Point::new(128.0, 128.0));
    }

    #[test]
    fn test_clamp_keeps_edges_inside() {
        let c = clamp_center_world(
            Point::new(-50.0, 9000.0),
            2048.0,
            1.0,
            Size::new(800.0, 600.0),
            false,
            false,
        );
        assert_eq!(c, Point::new(400.0, 2048.0 - 300.0));
    }

    #[test]
    fn test_clamp_wrap_and_free_pan() {
        let target = Point::new(-5000.0, 100.0);
        let wrapped = clamp_center_world(target, 2048.0, 1.0, Size::new(800.0, 600.0), true, false);
        assert_eq!(wrapped.x, -5000.0);
        assert_eq!(wrapped.y, 300.0);
        let free = clamp_center_world(target, 2048.0, 1.0, Size::new(800.0, 600.0), false, true);
        assert_eq!(free, target);
    }

    #[test]
    fn test_native_center_survives_zoom_changes() {
        let mut view = view();
        view.set_zoom(5.0);
        view.set_center_native(Point::new(4000.0, 3000.0));
        view.set_zoom(2.5);
        view.set_zoom(5.0);
        let c = view.center_native();
        assert!((c.x - 4000.0).abs() < 1e-9);
        assert!((c.y - 3000.0).abs() < 1e-9);
    }

    #[test]
    fn test_screen_world_round_trip() {
        let mut view = view();
        view.set_zoom(3.4);
        view.set_center_native(Point::new(4096.0, 4096.0));
        let screen = Point::new(17.0, 203.0);
        let back = view.world_to_screen(&view.screen_to_world(&screen));
        assert!((back.x - screen.x).abs() < 1e-9);
        assert!((back.y - screen.y).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_is_clamped_and_ignores_nan() {
        let mut view = view();
        view.set_zoom(99.0);
        assert_eq!(view.zoom, 5.0);
        view.set_zoom(f64::NAN);
        assert_eq!(view.zoom, 5.0);
        view.set_zoom(-3.0);
        assert_eq!(view.zoom, 0.0);
    }

    #[test]
    fn test_max_bounds_hard_and_viscous() {
        let mut view = view();
        view.set_zoom(5.0);
        view.set_max_bounds(Some(Bounds::from_coords(1000.0, 1000.0, 3000.0, 3000.0)));
        view.set_center_native(Point::new(0.0, 0.0));
        assert_eq!(view.center_native(), Point::new(1128.0, 1128.0));

        view.viscosity = 0.5;
        let dragged = view.constrain_drag(Point::new(1028.0, 2000.0));
        assert_eq!(dragged, Point::new(1078.0, 2000.0));
    }

    #[test]
    fn test_world_coverage() {
        let view = view();
        assert_eq!(view.world_coverage(0.0), 1.0);
        assert!((view.world_coverage(1.0) - 0.25).abs() < 1e-12);
    }
}
