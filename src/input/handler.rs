use crate::animation::pan::PanAnimation;
use crate::animation::zoom::{AnchorMode, ZoomController};
use crate::constants::{INERTIA_SAMPLE_WINDOW_MS, WHEEL_LINES_PER_PAGE, WHEEL_PIXELS_PER_LINE};
use crate::core::config::WheelConfig;
use crate::core::geo::Point;
use crate::input::events::{InputEvent, MapEvent, PointerButton, TouchPhase, TouchPoint, WheelDeltaMode};
use crate::traits::ViewMutator;
use std::collections::VecDeque;

/// An active drag, tracked in world pixels of the level it started on so
/// viscous clamping does not compound across moves.
#[derive(Debug, Clone, Copy)]
struct DragState {
    last: Point,
    raw_center: Point,
    zoom: f64,
    moved: bool,
}

#[derive(Debug, Clone, Copy)]
struct PinchState {
    distance: f64,
    centroid: Point,
}

/// Turns raw pointer, wheel and touch input into view changes.
///
/// The controller owns only gesture state; the view, zoom easing and pan
/// animation are borrowed per event.
#[derive(Debug)]
pub struct InputController {
    enabled: bool,
    wheel: WheelConfig,
    drag: Option<DragState>,
    pinch: Option<PinchState>,
    samples: VecDeque<(f64, Point)>,
}

impl Default for InputController {
    fn default() -> Self {
        Self::new(WheelConfig::default())
    }
}

impl InputController {
    pub fn new(wheel: WheelConfig) -> Self {
        Self {
            enabled: true,
            wheel,
            drag: None,
            pinch: None,
            samples: VecDeque::new(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.drag = None;
            self.pinch = None;
            self.samples.clear();
        }
    }

    pub fn wheel_config(&self) -> &WheelConfig {
        &self.wheel
    }

    pub fn set_wheel_config(&mut self, wheel: WheelConfig) {
        self.wheel = wheel;
    }

    pub fn set_wheel_speed(&mut self, speed: f64) {
        if speed.is_finite() && speed > 0.0 {
            self.wheel.speed = speed;
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch.is_some()
    }

    /// Applies one input event. Returns true when the event counts as user
    /// interaction (anything but a hover).
    pub fn handle(
        &mut self,
        event: &InputEvent,
        now_ms: f64,
        view: &mut dyn ViewMutator,
        zoom: &mut ZoomController,
        pan: &mut PanAnimation,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        match event {
            InputEvent::PointerDown { position, button } => {
                emit_pointer(view, *position, Some(*button), PointerPhase::Down);
                if *button == PointerButton::Primary {
                    zoom.cancel(view);
                    pan.cancel(view);
                    self.start_drag(*position, now_ms, view);
                }
                true
            }
            InputEvent::PointerMove { position } => {
                emit_pointer(view, *position, None, PointerPhase::Move);
                if self.drag.is_some() {
                    self.drag_to(*position, now_ms, view);
                    true
                } else {
                    false
                }
            }
            InputEvent::PointerUp { position, button } => {
                emit_pointer(view, *position, Some(*button), PointerPhase::Up);
                if *button == PointerButton::Primary && self.drag.is_some() {
                    self.drag_to(*position, now_ms, view);
                    self.end_drag(now_ms, view, zoom, pan);
                }
                true
            }
            InputEvent::Wheel {
                position,
                delta_y,
                mode,
                ctrl,
            } => {
                let dz = self.wheel_zoom_delta(*delta_y, *mode, *ctrl);
                if dz != 0.0 {
                    pan.cancel(view);
                    let anchor = zoom.config().wheel_anchor;
                    zoom.start_ease(dz, *position, anchor, now_ms, view);
                }
                true
            }
            InputEvent::Touch { phase, touches } => {
                self.handle_touch(*phase, touches, now_ms, view, zoom, pan);
                true
            }
        }
    }

    /// Wheel delta to zoom delta: normalize to lines, scale by the plain or
    /// Ctrl speed and clamp spikes. Scrolling down zooms out.
    pub fn wheel_zoom_delta(&self, delta_y: f64, mode: WheelDeltaMode, ctrl: bool) -> f64 {
        if !delta_y.is_finite() {
            return 0.0;
        }
        let lines = match mode {
            WheelDeltaMode::Pixel => delta_y / WHEEL_PIXELS_PER_LINE,
            WheelDeltaMode::Line => delta_y,
            WheelDeltaMode::Page => delta_y * WHEEL_LINES_PER_PAGE,
        };
        let speed = if ctrl { self.wheel.ctrl_speed } else { self.wheel.speed };
        let max = self.wheel.max_delta.abs();
        (-lines * speed).clamp(-max, max)
    }

    fn handle_touch(
        &mut self,
        phase: TouchPhase,
        touches: &[TouchPoint],
        now_ms: f64,
        view: &mut dyn ViewMutator,
        zoom: &mut ZoomController,
        pan: &mut PanAnimation,
    ) {
        if matches!(phase, TouchPhase::Cancel) {
            self.drag = None;
            self.samples.clear();
            if self.pinch.take().is_some() {
                emit_move_end(view);
                let zoom = view.view().zoom;
                view.emit(MapEvent::ZoomEnd { zoom });
            }
            return;
        }

        if touches.len() >= 2 {
            let (a, b) = (touches[0].position, touches[1].position);
            let centroid = Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
            let distance = a.distance_to(&b);
            match self.pinch {
                None => {
                    self.drag = None;
                    self.samples.clear();
                    zoom.cancel(view);
                    pan.cancel(view);
                    self.pinch = Some(PinchState { distance, centroid });
                }
                Some(prev) => {
                    if prev.distance > 0.0 && distance > 0.0 {
                        let target = view.view().zoom + (distance / prev.distance).log2();
                        zoom.apply_anchored_zoom(target, centroid, AnchorMode::Pointer, now_ms, view);
                    }
                    let state = view.view();
                    let shift = centroid.subtract(&prev.centroid).multiply(1.0 / state.scale());
                    let center = state.constrain(
                        state.center.subtract(&shift),
                        state.z_int(),
                        state.scale(),
                    );
                    view.commit_center(center);
                    self.pinch = Some(PinchState { distance, centroid });
                }
            }
            return;
        }

        if self.pinch.take().is_some() {
            emit_move_end(view);
            let zoom = view.view().zoom;
            view.emit(MapEvent::ZoomEnd { zoom });
            // A finger left over from the pinch becomes a fresh drag
            if let Some(touch) = touches.first() {
                self.start_drag(touch.position, now_ms, view);
            }
            return;
        }

        match (phase, touches.first()) {
            (TouchPhase::Start, Some(touch)) => {
                zoom.cancel(view);
                pan.cancel(view);
                self.start_drag(touch.position, now_ms, view);
            }
            (TouchPhase::Move, Some(touch)) => {
                if self.drag.is_some() {
                    self.drag_to(touch.position, now_ms, view);
                }
            }
            (TouchPhase::End, None) => {
                if self.drag.is_some() {
                    self.end_drag(now_ms, view, zoom, pan);
                }
            }
            _ => {}
        }
    }

    fn start_drag(&mut self, position: Point, now_ms: f64, view: &dyn ViewMutator) {
        let state = view.view();
        self.drag = Some(DragState {
            last: position,
            raw_center: state.center,
            zoom: state.zoom,
            moved: false,
        });
        self.samples.clear();
        self.samples.push_back((now_ms, position));
    }

    fn drag_to(&mut self, position: Point, now_ms: f64, view: &mut dyn ViewMutator) {
        let Some(mut drag) = self.drag else {
            return;
        };
        let state = view.view();
        if state.zoom != drag.zoom {
            drag.raw_center = state.center;
            drag.zoom = state.zoom;
        }
        let delta = position.subtract(&drag.last);
        if delta.x != 0.0 || delta.y != 0.0 {
            drag.raw_center = drag.raw_center.subtract(&delta.multiply(1.0 / state.scale()));
            let center = state.constrain_drag(drag.raw_center);
            view.commit_center(center);
            drag.moved = true;
        }
        drag.last = position;
        self.drag = Some(drag);

        self.samples.push_back((now_ms, position));
        while let Some((t, _)) = self.samples.front() {
            if now_ms - t > INERTIA_SAMPLE_WINDOW_MS {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn end_drag(
        &mut self,
        now_ms: f64,
        view: &mut dyn ViewMutator,
        zoom: &mut ZoomController,
        pan: &mut PanAnimation,
    ) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        let velocity = self.release_velocity(now_ms);
        self.samples.clear();
        if !drag.moved {
            return;
        }

        // Snap back inside hard bounds after a viscous drag
        let state = view.view();
        let snapped = state.constrain(state.center, state.z_int(), state.scale());
        if snapped != state.center {
            view.commit_center(snapped);
        }

        // Inertia owns the zoom for its whole track
        zoom.cancel(view);
        if !pan.start_inertia(velocity, now_ms, view) {
            emit_move_end(view);
        }
    }

    /// Pointer velocity (CSS px/s) over the samples inside the inertia window
    fn release_velocity(&self, now_ms: f64) -> Point {
        let recent: Vec<&(f64, Point)> = self
            .samples
            .iter()
            .filter(|(t, _)| now_ms - t <= INERTIA_SAMPLE_WINDOW_MS)
            .collect();
        match (recent.first(), recent.last()) {
            (Some((t0, p0)), Some((t1, p1))) if t1 > t0 => {
                p1.subtract(p0).multiply(1000.0 / (t1 - t0))
            }
            _ => Point::default(),
        }
    }
}

enum PointerPhase {
    Down,
    Move,
    Up,
}

fn emit_pointer(view: &mut dyn ViewMutator, screen: Point, button: Option<PointerButton>, phase: PointerPhase) {
    let native = view.view().screen_to_native(&screen);
    let button = button.unwrap_or(PointerButton::Primary);
    let event = match phase {
        PointerPhase::Down => MapEvent::PointerDown { native, screen, button },
        PointerPhase::Move => MapEvent::PointerMove { native, screen },
        PointerPhase::Up => MapEvent::PointerUp { native, screen, button },
    };
    view.emit(event);
}

fn emit_move_end(view: &mut dyn ViewMutator) {
    let state = view.view();
    let (center, zoom) = (state.center_native(), state.zoom);
    view.emit(MapEvent::MoveEnd { center, zoom });
}
