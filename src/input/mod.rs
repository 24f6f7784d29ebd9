pub mod events;
pub mod handler;

pub use events::{
    EventBus, InputEvent, MapEvent, PointerButton, TouchPhase, TouchPoint, WheelDeltaMode,
};
pub use handler::InputController;
