//! Inertia and fly-to.
//!
//! Both are tracks in native pixels so a fly-to can cross integer levels
//! without rescaling its endpoints. Only one pan track runs at a time.

use crate::animation::easing::{progress, EasingType, Tweenable};
use crate::constants::INERTIA_MIN_SPEED;
use crate::core::config::InertiaOptions;
use crate::core::geo::Point;
use crate::core::viewport::{level_factor, level_of};
use crate::input::events::MapEvent;
use crate::traits::ViewMutator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanKind {
    Inertia,
    FlyTo,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanTrack {
    pub kind: PanKind,
    pub from_center: Point,
    pub to_center: Point,
    pub from_zoom: f64,
    pub to_zoom: f64,
    pub start_ms: f64,
    pub duration_ms: f64,
    pub easing: EasingType,
}

impl PanTrack {
    /// Native center, zoom and whether the track is complete
    pub fn sample(&self, now_ms: f64) -> (Point, f64, bool) {
        let t = progress(now_ms, self.start_ms, self.duration_ms);
        let eased = self.easing.apply(t);
        (
            self.from_center.lerp(&self.to_center, eased),
            self.from_zoom.lerp(&self.to_zoom, eased),
            t >= 1.0,
        )
    }
}

#[derive(Debug, Default)]
pub struct PanAnimation {
    options: InertiaOptions,
    track: Option<PanTrack>,
}

impl PanAnimation {
    pub fn new(options: InertiaOptions) -> Self {
        Self {
            options,
            track: None,
        }
    }

    pub fn options(&self) -> &InertiaOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: InertiaOptions) {
        self.options = options;
    }

    pub fn is_active(&self) -> bool {
        self.track.is_some()
    }

    pub fn track(&self) -> Option<&PanTrack> {
        self.track.as_ref()
    }

    /// Starts a glide from a drag release. `velocity` is the pointer speed in
    /// CSS px/s; the map keeps moving in that direction and decelerates.
    /// Returns false when inertia is off or the release was too slow.
    pub fn start_inertia(&mut self, velocity: Point, now_ms: f64, view: &dyn ViewMutator) -> bool {
        if !self.options.enabled || !velocity.is_finite() {
            return false;
        }
        let speed = (velocity.x * velocity.x + velocity.y * velocity.y).sqrt();
        if speed < INERTIA_MIN_SPEED {
            return false;
        }
        let limited = speed.min(self.options.max_speed);
        let rate = self.options.deceleration * self.options.ease_linearity;
        if rate <= 0.0 {
            return false;
        }
        let duration_s = limited / rate;
        // Distance covered while decelerating linearly from `limited` to 0
        let offset_css = velocity.multiply(limited / speed * duration_s / 2.0);

        let state = view.view();
        let to_native = level_factor(state.z_int(), state.native_level) / state.scale();
        let from = state.center_native();
        let to = from.subtract(&offset_css.multiply(to_native));

        self.track = Some(PanTrack {
            kind: PanKind::Inertia,
            from_center: from,
            to_center: to,
            from_zoom: state.zoom,
            to_zoom: state.zoom,
            start_ms: now_ms,
            duration_ms: duration_s * 1000.0,
            easing: self.options.easing,
        });
        log::debug!("inertia {:.0}px/s for {:.0}ms", limited, duration_s * 1000.0);
        true
    }

    /// Animates center (native pixels) and zoom together.
    pub fn fly_to(
        &mut self,
        center: Point,
        zoom: f64,
        duration_ms: f64,
        easing: EasingType,
        now_ms: f64,
        view: &dyn ViewMutator,
    ) {
        let state = view.view();
        let center = if center.is_finite() {
            center
        } else {
            state.center_native()
        };
        self.track = Some(PanTrack {
            kind: PanKind::FlyTo,
            from_center: state.center_native(),
            to_center: center,
            from_zoom: state.zoom,
            to_zoom: state.clamp_zoom(zoom),
            start_ms: now_ms,
            duration_ms: duration_ms.max(0.0),
            easing,
        });
    }

    /// Advances the running track. Returns whether it is still running.
    pub fn step(&mut self, now_ms: f64, view: &mut dyn ViewMutator) -> bool {
        let Some(track) = self.track else {
            return false;
        };
        let (native, zoom, done) = track.sample(now_ms);
        let state = view.view();
        let zoom = state.clamp_zoom(zoom);
        let z_int = level_of(zoom);
        let scale = 2_f64.powf(zoom - z_int as f64);
        let world = native.multiply(level_factor(state.native_level, z_int));
        let center = state.constrain(world, z_int, scale);
        view.commit_view(center, zoom);
        if done {
            self.finish(track, view);
        }
        !done
    }

    /// Stops the running track where it is.
    pub fn cancel(&mut self, view: &mut dyn ViewMutator) {
        if let Some(track) = self.track {
            self.finish(track, view);
        }
    }

    fn finish(&mut self, track: PanTrack, view: &mut dyn ViewMutator) {
        self.track = None;
        let state = view.view();
        let (center, zoom) = (state.center_native(), state.zoom);
        view.emit(MapEvent::MoveEnd { center, zoom });
        if track.from_zoom != track.to_zoom {
            view.emit(MapEvent::ZoomEnd { zoom });
        }
    }
}
