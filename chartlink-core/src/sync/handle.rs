//! The viewport side of a rendering surface.

use crate::domain::{Viewport, ViewportPatch};
use crate::panes::SurfaceError;
use std::collections::BTreeMap;

/// What the sync coordinator needs from a pane.
pub trait ViewportHandle {
    /// The pane's current viewport as the surface sees it.
    fn viewport(&self) -> Viewport;

    /// Apply a patch programmatically.
    ///
    /// This is the silent path: implementations should not report the change
    /// back as a user interaction. Surfaces that cannot avoid it must say so
    /// through [`ViewportHandle::echoes_applies`].
    fn apply_viewport(&mut self, patch: &ViewportPatch) -> Result<(), SurfaceError>;

    /// True when every successful `apply_viewport` comes back later, in order,
    /// as a reported change.
    fn echoes_applies(&self) -> bool {
        false
    }

    /// Value of every series on this pane at exactly `time`, keyed by series title.
    /// Empty when the pane has nothing at that time.
    fn series_prices_at(&self, time: i64) -> BTreeMap<String, f64>;
}
