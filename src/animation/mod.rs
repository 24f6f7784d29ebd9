pub mod easing;
pub mod pan;
pub mod zoom;

pub use easing::{EasingType, Tweenable};
pub use pan::{PanAnimation, PanKind};
pub use zoom::{AnchorMode, ZoomController};
