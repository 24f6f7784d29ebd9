//! Eased, anchored zoom.
//!
//! Every zoom change (wheel, pinch, programmatic) goes through
//! [`ZoomController::apply_anchored_zoom`], which keeps a screen point fixed
//! while the level changes, then clamps and commits the view.

use crate::animation::easing::{progress, EasingType, Tweenable};
use crate::constants::{
    CENTER_LOCK_ENGAGE_COVERAGE, CENTER_LOCK_MIN_MS, CENTER_LOCK_RELEASE_COVERAGE,
    MAX_OUT_CENTER_BIAS,
};
use crate::core::config::ZoomEasingConfig;
use crate::core::geo::Point;
use crate::core::viewport::{level_factor, level_of};
use crate::input::events::MapEvent;
use crate::traits::ViewMutator;
use serde::{Deserialize, Serialize};

/// Which screen point stays put while zooming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorMode {
    /// The anchor passed with the request (usually the cursor)
    Pointer,
    /// The viewport center
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomAnimation {
    pub from: f64,
    pub to: f64,
    /// Screen position in CSS pixels
    pub anchor: Point,
    pub anchor_mode: AnchorMode,
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl ZoomAnimation {
    pub fn sample(&self, now_ms: f64) -> (f64, bool) {
        let t = progress(now_ms, self.start_ms, self.duration_ms);
        let eased = EasingType::EaseOutCubic.apply(t);
        (self.from.lerp(&self.to, eased), t >= 1.0)
    }
}

#[derive(Debug, Default)]
pub struct ZoomController {
    config: ZoomEasingConfig,
    animation: Option<ZoomAnimation>,
    lod_lock: Option<u8>,
    center_lock_since: Option<f64>,
}

impl ZoomController {
    pub fn new(config: ZoomEasingConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ZoomEasingConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ZoomEasingConfig) {
        self.config = config;
    }

    pub fn is_easing(&self) -> bool {
        self.animation.is_some()
    }

    pub fn animation(&self) -> Option<&ZoomAnimation> {
        self.animation.as_ref()
    }

    /// Level the compositor should use as its base while an ease runs
    pub fn lod_lock(&self) -> Option<u8> {
        self.lod_lock
    }

    /// Starts (or retargets) an eased zoom by `dz`.
    pub fn start_ease(
        &mut self,
        dz: f64,
        anchor: Point,
        mode: AnchorMode,
        now_ms: f64,
        view: &mut dyn ViewMutator,
    ) {
        if !dz.is_finite() {
            return;
        }
        let current = match &self.animation {
            Some(anim) => anim.sample(now_ms).0,
            None => view.view().zoom,
        };
        let to = view.view().clamp_zoom(current + dz);
        if (to - current).abs() < 1e-9 && self.animation.is_none() {
            return;
        }
        let duration_ms = self.config.duration_ms(to - current);
        self.animation = Some(ZoomAnimation {
            from: current,
            to,
            anchor,
            anchor_mode: mode,
            start_ms: now_ms,
            duration_ms,
        });
        self.lod_lock = Some(level_of(current));
        log::debug!("zoom ease {:.3} -> {:.3} over {:.0}ms", current, to, duration_ms);
    }

    /// Advances the ease. Returns whether an ease is still running.
    pub fn step(&mut self, now_ms: f64, view: &mut dyn ViewMutator) -> bool {
        let Some(anim) = self.animation else {
            return false;
        };
        let (zoom, done) = anim.sample(now_ms);
        self.apply_anchored_zoom(zoom, anim.anchor, anim.anchor_mode, now_ms, view);
        if done {
            self.finish(view);
        }
        !done
    }

    /// Stops a running ease where it is.
    pub fn cancel(&mut self, view: &mut dyn ViewMutator) {
        if self.animation.is_some() {
            self.finish(view);
        }
    }

    fn finish(&mut self, view: &mut dyn ViewMutator) {
        self.animation = None;
        self.lod_lock = None;
        let zoom = view.view().zoom;
        view.emit(MapEvent::ZoomEnd { zoom });
    }

    /// Sets the zoom to `target` keeping `anchor` (CSS px) fixed on screen,
    /// then clamps and commits the view.
    pub fn apply_anchored_zoom(
        &mut self,
        target: f64,
        anchor: Point,
        mode: AnchorMode,
        now_ms: f64,
        view: &mut dyn ViewMutator,
    ) {
        let state = view.view();
        let z1 = state.zoom;
        let z2 = state.clamp_zoom(target);
        let (z_int1, z_int2) = (level_of(z1), level_of(z2));
        let s1 = 2_f64.powf(z1 - z_int1 as f64);
        let s2 = 2_f64.powf(z2 - z_int2 as f64);
        let factor = level_factor(z_int1, z_int2);
        let half = state.viewport.half();
        let c1 = state.center;

        let centered = c1.multiply(factor);
        let anchored = match mode {
            AnchorMode::Center => centered,
            AnchorMode::Pointer => {
                let top_left1 = c1.subtract(&half.multiply(1.0 / s1));
                let world1 = top_left1.add(&anchor.multiply(1.0 / s1));
                let world2 = world1.multiply(factor);
                let top_left2 = world2.subtract(&anchor.multiply(1.0 / s2));
                top_left2.add(&half.multiply(1.0 / s2))
            }
        };

        // Zooming out drifts toward the center-anchored result
        let mut center = if z2 < z1 {
            let weight = (self.config.out_center_bias * (z1 - z2).abs()).clamp(0.0, MAX_OUT_CENTER_BIAS);
            anchored.lerp(&centered, weight)
        } else {
            anchored
        };

        let coverage = state.world_coverage(z2);
        if self.center_locked(state.wrap_x, coverage, now_ms) {
            center = centered;
        }

        let center = state.constrain(center, z_int2, s2);
        view.commit_view(center, z2);
    }

    /// Hysteresis for forcing center anchoring once the whole world is on
    /// screen, so the map does not swim around the cursor at minimum zoom.
    fn center_locked(&mut self, wrap_x: bool, coverage: f64, now_ms: f64) -> bool {
        if wrap_x {
            self.center_lock_since = None;
            return false;
        }
        match self.center_lock_since {
            Some(since) => {
                if coverage < CENTER_LOCK_RELEASE_COVERAGE && now_ms - since >= CENTER_LOCK_MIN_MS {
                    self.center_lock_since = None;
                    false
                } else {
                    true
                }
            }
            None if coverage >= CENTER_LOCK_ENGAGE_COVERAGE => {
                self.center_lock_since = Some(now_ms);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::geo::Size;
    use crate::core::viewport::ViewState;

    /// Bare view host recording emitted events
    pub(crate) struct TestView {
        pub state: ViewState,
        pub events: Vec<MapEvent>,
    }

    impl TestView {
        pub fn new(max_zoom: f64) -> Self {
            let mut state = ViewState::new(256, 0.0, max_zoom, max_zoom as u8);
            state.set_viewport(Size::new(800.0, 600.0), 1.0);
            Self {
                state,
                events: Vec::new(),
            }
        }
    }

    impl ViewMutator for TestView {
        fn view(&self) -> &ViewState {
            &self.state
        }

        fn commit_view(&mut self, center: Point, zoom: f64) {
            self.state.zoom = self.state.clamp_zoom(zoom);
            self.state.center = center;
            self.events.push(MapEvent::Zoom { zoom: self.state.zoom });
        }

        fn emit(&mut self, event: MapEvent) {
            self.events.push(event);
        }
    }

    fn unbiased() -> ZoomController {
        ZoomController::new(ZoomEasingConfig {
            out_center_bias: 0.0,
            ..ZoomEasingConfig::default()
        })
    }

    #[test]
    fn test_anchored_zoom_round_trip() {
        let mut view = TestView::new(8.0);
        view.state.free_pan = true;
        view.state.set_zoom(3.0);
        view.state.set_center_native(Point::new(4096.0, 4096.0));
        let start = view.state.center_native();
        let anchor = Point::new(620.0, 130.0);

        let mut zoom = unbiased();
        zoom.apply_anchored_zoom(4.2, anchor, AnchorMode::Pointer, 0.0, &mut view);
        assert!((view.state.zoom - 4.2).abs() < 1e-12);
        zoom.apply_anchored_zoom(3.0, anchor, AnchorMode::Pointer, 0.0, &mut view);

        let end = view.state.center_native();
        assert!((end.x - start.x).abs() < 1e-6);
        assert!((end.y - start.y).abs() < 1e-6);
    }

    #[test]
    fn test_pointer_anchor_stays_fixed() {
        let mut view = TestView::new(8.0);
        view.state.set_zoom(5.0);
        view.state.set_center_native(Point::new(20000.0, 30000.0));
        let anchor = Point::new(100.0, 500.0);
        let before = view.state.screen_to_native(&anchor);

        let mut zoom = unbiased();
        zoom.apply_anchored_zoom(6.7, anchor, AnchorMode::Pointer, 0.0, &mut view);
        let after = view.state.screen_to_native(&anchor);
        assert!((before.x - after.x).abs() < 1e-6);
        assert!((before.y - after.y).abs() < 1e-6);
    }

    /// Native center after zooming out from 8 at the top-left corner
    fn zoom_out_from_corner(config: ZoomEasingConfig, to: f64) -> Point {
        let mut view = TestView::new(8.0);
        view.state.free_pan = true;
        view.state.set_zoom(8.0);
        view.state.set_center_native(Point::new(30000.0, 30000.0));
        let mut zoom = ZoomController::new(config);
        zoom.apply_anchored_zoom(to, Point::new(0.0, 0.0), AnchorMode::Pointer, 0.0, &mut view);
        view.state.center_native()
    }

    fn with_bias(out_center_bias: f64) -> ZoomEasingConfig {
        ZoomEasingConfig {
            out_center_bias,
            ..ZoomEasingConfig::default()
        }
    }

    #[test]
    fn test_zoom_out_bias_pulls_toward_center_result() {
        let centered = Point::new(30000.0, 30000.0);
        let pointer = zoom_out_from_corner(with_bias(0.0), 7.0);
        let biased = zoom_out_from_corner(ZoomEasingConfig::default(), 7.0);
        assert!(biased.distance_to(&centered) < pointer.distance_to(&centered));

        // One level out with the default bias moves 15% of the way
        let expected = pointer.lerp(&centered, 0.15);
        assert!((biased.x - expected.x).abs() < 1e-6);
        assert!((biased.y - expected.y).abs() < 1e-6);
    }

    #[test]
    fn test_zoom_out_bias_is_capped() {
        let centered = Point::new(30000.0, 30000.0);
        let pointer = zoom_out_from_corner(with_bias(0.0), 3.5);
        let expected = pointer.lerp(&centered, MAX_OUT_CENTER_BIAS);

        // 0.15 * 4.5 and 0.3 * 4.5 both exceed the cap
        for config in [ZoomEasingConfig::default(), with_bias(0.3)] {
            let biased = zoom_out_from_corner(config, 3.5);
            assert!((biased.x - expected.x).abs() < 1e-6);
            assert!((biased.y - expected.y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_center_lock_hysteresis() {
        let mut view = TestView::new(8.0);
        view.state.set_zoom(2.0);
        let mut zoom = ZoomController::new(ZoomEasingConfig::default());
        let anchor = Point::new(10.0, 10.0);

        // At 1.3 the world covers about 95% of the 800x600 viewport
        assert!(view.state.world_coverage(1.3) > CENTER_LOCK_RELEASE_COVERAGE);
        assert!(view.state.world_coverage(1.3) < CENTER_LOCK_ENGAGE_COVERAGE);
        zoom.apply_anchored_zoom(1.3, anchor, AnchorMode::Pointer, 0.0, &mut view);
        assert!(zoom.center_lock_since.is_none());

        zoom.apply_anchored_zoom(1.0, anchor, AnchorMode::Pointer, 10.0, &mut view);
        assert_eq!(zoom.center_lock_since, Some(10.0));
        assert_eq!(view.state.center, Point::new(256.0, 256.0));

        // Below the release threshold, but not held long enough yet
        zoom.apply_anchored_zoom(2.0, anchor, AnchorMode::Pointer, 100.0, &mut view);
        assert_eq!(zoom.center_lock_since, Some(10.0));
        assert_eq!(view.state.center, Point::new(512.0, 512.0));

        // Held long enough, but coverage is still above the release threshold
        zoom.apply_anchored_zoom(1.3, anchor, AnchorMode::Pointer, 400.0, &mut view);
        assert_eq!(zoom.center_lock_since, Some(10.0));

        zoom.apply_anchored_zoom(2.0, anchor, AnchorMode::Pointer, 420.0, &mut view);
        assert!(zoom.center_lock_since.is_none());
    }

    #[test]
    fn test_center_lock_off_when_wrapping() {
        let mut view = TestView::new(8.0);
        view.state.wrap_x = true;
        view.state.set_zoom(2.0);
        let mut zoom = unbiased();
        zoom.apply_anchored_zoom(0.5, Point::new(10.0, 10.0), AnchorMode::Pointer, 0.0, &mut view);
        assert!(zoom.center_lock_since.is_none());
    }

    #[test]
    fn test_ease_runs_to_target_and_emits_zoomend() {
        let mut view = TestView::new(8.0);
        view.state.set_zoom(3.0);
        let mut zoom = ZoomController::new(ZoomEasingConfig::default());
        zoom.start_ease(1.0, Point::new(400.0, 300.0), AnchorMode::Center, 0.0, &mut view);
        assert!(zoom.is_easing());
        assert_eq!(zoom.lod_lock(), Some(3));
        assert_eq!(zoom.animation().unwrap().duration_ms, 390.0);

        assert!(zoom.step(100.0, &mut view));
        assert!(view.state.zoom > 3.0 && view.state.zoom < 4.0);
        assert!(!zoom.step(390.0, &mut view));
        assert_eq!(view.state.zoom, 4.0);
        assert!(!zoom.is_easing());
        assert_eq!(zoom.lod_lock(), None);
        assert!(matches!(view.events.last(), Some(MapEvent::ZoomEnd { .. })));
    }

    #[test]
    fn test_retarget_samples_current_zoom() {
        let mut view = TestView::new(8.0);
        view.state.set_zoom(3.0);
        let mut zoom = ZoomController::new(ZoomEasingConfig::default());
        zoom.start_ease(2.0, Point::new(400.0, 300.0), AnchorMode::Center, 0.0, &mut view);
        zoom.step(100.0, &mut view);
        let sampled = zoom.animation().unwrap().sample(100.0).0;
        zoom.start_ease(0.5, Point::new(400.0, 300.0), AnchorMode::Center, 100.0, &mut view);
        let anim = zoom.animation().unwrap();
        assert!((anim.from - sampled).abs() < 1e-12);
        assert!((anim.to - (sampled + 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_ease_target_is_clamped() {
        let mut view = TestView::new(4.0);
        view.state.set_zoom(3.5);
        let mut zoom = ZoomController::new(ZoomEasingConfig::default());
        zoom.start_ease(2.0, Point::default(), AnchorMode::Center, 0.0, &mut view);
        assert_eq!(zoom.animation().unwrap().to, 4.0);
    }
}
