//! Rendering surface contract.
//!
//! A surface is one chart pane in the host's renderer. The engine only talks
//! to it through these traits, so any charting backend can sit behind them.

use super::registry::PaneRole;
use crate::domain::{Candle, PaneId, SeriesHandle, SeriesPoint};
use crate::sync::ViewportHandle;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurfaceError {
    #[error("surface for {0} has been disposed")]
    Disposed(PaneId),

    #[error("unknown series handle {0:?}")]
    UnknownSeries(SeriesHandle),

    #[error("surface rejected the operation: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    Line,
    Histogram,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStyle {
    pub title: String,
    pub color: String,
    pub line_width: u32,
}

impl SeriesStyle {
    pub fn new(title: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            color: color.into(),
            line_width: 2,
        }
    }
}

pub trait ChartSurface: ViewportHandle {
    fn add_series(&mut self, kind: SeriesKind, style: SeriesStyle) -> Result<SeriesHandle, SurfaceError>;

    /// Replace the series' points wholesale.
    fn set_series_data(&mut self, handle: SeriesHandle, points: &[SeriesPoint]) -> Result<(), SurfaceError>;

    fn set_candles(&mut self, candles: &[Candle]) -> Result<(), SurfaceError>;

    fn remove_series(&mut self, handle: SeriesHandle) -> Result<(), SurfaceError>;
}

/// Creates and destroys surfaces for panes.
pub trait SurfaceFactory {
    type Surface: ChartSurface;

    fn create(&mut self, pane: PaneId, role: PaneRole) -> Result<Self::Surface, SurfaceError>;

    fn dispose(&mut self, pane: PaneId, surface: Self::Surface);
}
