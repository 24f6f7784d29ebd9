//! Shared trait abstractions
//!
//! Capabilities handed between components so that zoom, pan and input code
//! can move the camera without owning the engine.

use crate::core::geo::Point;
use crate::core::viewport::ViewState;
use crate::input::events::MapEvent;

/// Write access to the camera.
///
/// Implementors own the [`ViewState`] and the event stream. `commit_view`
/// is the single place a new center/zoom pair lands; it emits `move` (and
/// `zoom` when the zoom changed) after the state is updated.
pub trait ViewMutator {
    fn view(&self) -> &ViewState;

    /// Commits a center (world pixels of `floor(zoom)`, already clamped) and
    /// a zoom (clamped by the implementor).
    fn commit_view(&mut self, center: Point, zoom: f64);

    fn emit(&mut self, event: MapEvent);

    /// Moves the center without changing zoom
    fn commit_center(&mut self, center: Point) {
        let zoom = self.view().zoom;
        self.commit_view(center, zoom);
    }
}
