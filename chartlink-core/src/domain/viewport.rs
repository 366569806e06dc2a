//! Shared viewport state: visible time range, logical bar range, crosshair.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewportError {
    #[error("time range is inverted: from {from} > to {to}")]
    InvertedTimeRange { from: i64, to: i64 },

    #[error("logical range is invalid: from {from}, to {to}")]
    InvalidLogicalRange { from: f64, to: f64 },

    #[error("crosshair coordinates must be finite")]
    NonFiniteCrosshair,
}

/// Visible time window in UNIX seconds, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }
}

/// Visible window in bar-index space. Fractional indices are allowed (partial bars).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogicalRange {
    pub from: f64,
    pub to: f64,
}

impl LogicalRange {
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }
}

/// Crosshair position plus the series prices shown at it.
///
/// `series_prices` is pane-local: each pane fills in its own lookups, and an
/// empty map means "no marker", not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crosshair {
    pub time: i64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub series_prices: BTreeMap<String, f64>,
}

impl Crosshair {
    pub fn at(time: i64, x: f64, y: f64) -> Self {
        Self {
            time,
            x,
            y,
            series_prices: BTreeMap::new(),
        }
    }
}

/// Crosshair part of a patch: moved somewhere, or hidden (pointer left the chart).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CrosshairUpdate {
    Moved(Crosshair),
    Hidden,
}

/// Partial viewport change. Each dimension is independent; `None` leaves it alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewportPatch {
    pub time_range: Option<TimeRange>,
    pub logical_range: Option<LogicalRange>,
    pub crosshair: Option<CrosshairUpdate>,
}

impl ViewportPatch {
    pub fn time_range(range: TimeRange) -> Self {
        Self {
            time_range: Some(range),
            ..Self::default()
        }
    }

    pub fn logical_range(range: LogicalRange) -> Self {
        Self {
            logical_range: Some(range),
            ..Self::default()
        }
    }

    pub fn crosshair(crosshair: Crosshair) -> Self {
        Self {
            crosshair: Some(CrosshairUpdate::Moved(crosshair)),
            ..Self::default()
        }
    }

    pub fn hide_crosshair() -> Self {
        Self {
            crosshair: Some(CrosshairUpdate::Hidden),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.time_range.is_none() && self.logical_range.is_none() && self.crosshair.is_none()
    }

    pub fn validate(&self) -> Result<(), ViewportError> {
        if let Some(r) = self.time_range {
            if r.from > r.to {
                return Err(ViewportError::InvertedTimeRange { from: r.from, to: r.to });
            }
        }
        if let Some(r) = self.logical_range {
            if !r.from.is_finite() || !r.to.is_finite() || r.from > r.to {
                return Err(ViewportError::InvalidLogicalRange { from: r.from, to: r.to });
            }
        }
        if let Some(CrosshairUpdate::Moved(c)) = &self.crosshair {
            if !c.x.is_finite() || !c.y.is_finite() {
                return Err(ViewportError::NonFiniteCrosshair);
            }
        }
        Ok(())
    }
}

/// The viewport every pane must agree on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub time_range: Option<TimeRange>,
    pub logical_range: Option<LogicalRange>,
    pub crosshair: Option<Crosshair>,
}

impl Viewport {
    /// Merge a patch; last write wins per dimension.
    pub fn apply(&mut self, patch: &ViewportPatch) {
        if let Some(range) = patch.time_range {
            self.time_range = Some(range);
        }
        if let Some(range) = patch.logical_range {
            self.logical_range = Some(range);
        }
        match &patch.crosshair {
            Some(CrosshairUpdate::Moved(c)) => self.crosshair = Some(c.clone()),
            Some(CrosshairUpdate::Hidden) => self.crosshair = None,
            None => {}
        }
    }

    /// Patch that brings another pane fully in line with this viewport.
    ///
    /// Unset ranges are left out rather than cleared.
    pub fn as_patch(&self) -> ViewportPatch {
        ViewportPatch {
            time_range: self.time_range,
            logical_range: self.logical_range,
            crosshair: Some(match &self.crosshair {
                Some(c) => CrosshairUpdate::Moved(c.clone()),
                None => CrosshairUpdate::Hidden,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_merges_dimensions_independently() {
        let mut vp = Viewport::default();
        vp.apply(&ViewportPatch::time_range(TimeRange::new(10, 20)));
        vp.apply(&ViewportPatch::logical_range(LogicalRange::new(0.0, 50.0)));
        assert_eq!(vp.time_range, Some(TimeRange::new(10, 20)));
        assert_eq!(vp.logical_range, Some(LogicalRange::new(0.0, 50.0)));

        vp.apply(&ViewportPatch::crosshair(Crosshair::at(15, 1.0, 2.0)));
        assert_eq!(vp.crosshair.as_ref().map(|c| c.time), Some(15));
        assert_eq!(vp.time_range, Some(TimeRange::new(10, 20)));

        vp.apply(&ViewportPatch::hide_crosshair());
        assert!(vp.crosshair.is_none());
    }

    #[test]
    fn last_write_wins() {
        let mut vp = Viewport::default();
        vp.apply(&ViewportPatch::time_range(TimeRange::new(1, 2)));
        vp.apply(&ViewportPatch::time_range(TimeRange::new(3, 4)));
        assert_eq!(vp.time_range, Some(TimeRange::new(3, 4)));
    }

    #[test]
    fn validation_rejects_inverted_ranges() {
        assert!(ViewportPatch::time_range(TimeRange::new(5, 1)).validate().is_err());
        assert!(ViewportPatch::logical_range(LogicalRange::new(f64::NAN, 1.0))
            .validate()
            .is_err());
        assert!(ViewportPatch::crosshair(Crosshair::at(1, f64::INFINITY, 0.0))
            .validate()
            .is_err());
        assert!(ViewportPatch::time_range(TimeRange::new(1, 1)).validate().is_ok());
    }

    #[test]
    fn as_patch_reproduces_viewport() {
        let mut vp = Viewport::default();
        vp.apply(&ViewportPatch::time_range(TimeRange::new(100, 200)));
        vp.apply(&ViewportPatch::crosshair(Crosshair::at(150, 3.0, 4.0)));

        let mut other = Viewport::default();
        other.apply(&vp.as_patch());
        assert_eq!(other, vp);
    }
}
