use crate::core::geo::Point;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Raw input forwarded by the viewport container. Positions are CSS pixels
/// relative to the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    PointerDown {
        position: Point,
        button: PointerButton,
    },
    PointerMove {
        position: Point,
    },
    PointerUp {
        position: Point,
        button: PointerButton,
    },
    /// Wheel or trackpad scroll; positive `delta_y` scrolls down (zooms out)
    Wheel {
        position: Point,
        delta_y: f64,
        mode: WheelDeltaMode,
        ctrl: bool,
    },
    Touch {
        phase: TouchPhase,
        touches: Vec<TouchPoint>,
    },
}

/// Unit of a wheel delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WheelDeltaMode {
    Pixel,
    Line,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
    Other(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// One active finger; `touches` always lists every finger still down
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub id: u64,
    pub position: Point,
}

impl InputEvent {
    /// Gets the primary position associated with this event, if any
    pub fn position(&self) -> Option<Point> {
        match self {
            InputEvent::PointerDown { position, .. }
            | InputEvent::PointerMove { position }
            | InputEvent::PointerUp { position, .. }
            | InputEvent::Wheel { position, .. } => Some(*position),
            InputEvent::Touch { touches, .. } => touches.first().map(|t| t.position),
        }
    }

    pub fn is_touch_event(&self) -> bool {
        matches!(self, InputEvent::Touch { .. })
    }
}

/// Notifications emitted by the engine after state commits. Positions are
/// native pixels unless noted.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    Move { center: Point, zoom: f64 },
    MoveEnd { center: Point, zoom: f64 },
    Zoom { zoom: f64 },
    ZoomEnd { zoom: f64 },
    PointerDown { native: Point, screen: Point, button: PointerButton },
    PointerMove { native: Point, screen: Point },
    PointerUp { native: Point, screen: Point, button: PointerButton },
    /// The base level finished loading for the first time after a source
    /// change
    Load,
    Resize { width: f64, height: f64, dpr: f64 },
}

/// Fan-out of [`MapEvent`]s to any number of subscribers. Subscribers whose
/// receiver was dropped are forgotten on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<MapEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<MapEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: MapEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_event_position() {
        let wheel = InputEvent::Wheel {
            position: Point::new(10.0, 20.0),
            delta_y: 3.0,
            mode: WheelDeltaMode::Line,
            ctrl: false,
        };
        assert_eq!(wheel.position(), Some(Point::new(10.0, 20.0)));
        assert!(!wheel.is_touch_event());

        let touch = InputEvent::Touch {
            phase: TouchPhase::End,
            touches: vec![],
        };
        assert_eq!(touch.position(), None);
    }

    #[test]
    fn test_bus_fans_out_and_drops_closed_subscribers() {
        let mut bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.emit(MapEvent::Load);
        assert_eq!(a.try_recv().unwrap(), MapEvent::Load);
        assert_eq!(b.try_recv().unwrap(), MapEvent::Load);

        drop(b);
        bus.emit(MapEvent::Zoom { zoom: 2.0 });
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(a.try_recv().unwrap(), MapEvent::Zoom { zoom: 2.0 });
    }
}
