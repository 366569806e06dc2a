//! Headless in-memory surface, used by the CLI and tests.
//!
//! The `user_*` methods simulate interaction: they update the surface's own
//! viewport and return the patch a host would report as
//! `EngineEvent::PaneViewportChanged`.

use super::registry::PaneRole;
use super::surface::{ChartSurface, SeriesKind, SeriesStyle, SurfaceError, SurfaceFactory};
use crate::domain::{
    Candle, Crosshair, LogicalRange, PaneId, SeriesHandle, SeriesPoint, TimeRange, Viewport,
    ViewportPatch,
};
use crate::sync::ViewportHandle;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct MemorySeries {
    pub kind: SeriesKind,
    pub style: SeriesStyle,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone)]
pub struct MemorySurface {
    pane: PaneId,
    role: PaneRole,
    viewport: Viewport,
    series: BTreeMap<SeriesHandle, MemorySeries>,
    candles: Vec<Candle>,
    next_series: u64,
    /// Report programmatic applies as interactions, like a chart widget
    /// without a silent setter would.
    echo_applies: bool,
    outbox: Vec<ViewportPatch>,
    fail_applies: bool,
    applied: Vec<ViewportPatch>,
    data_pushes: usize,
}

impl MemorySurface {
    pub fn new(pane: PaneId, role: PaneRole) -> Self {
        Self {
            pane,
            role,
            viewport: Viewport::default(),
            series: BTreeMap::new(),
            candles: Vec::new(),
            next_series: 1,
            echo_applies: false,
            outbox: Vec::new(),
            fail_applies: false,
            applied: Vec::new(),
            data_pushes: 0,
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo_applies = echo;
        self
    }

    pub fn pane(&self) -> PaneId {
        self.pane
    }

    pub fn role(&self) -> PaneRole {
        self.role
    }

    pub fn series(&self) -> impl Iterator<Item = &MemorySeries> {
        self.series.values()
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn series_titles(&self) -> Vec<String> {
        self.series.values().map(|s| s.style.title.clone()).collect()
    }

    pub fn series_by_title(&self, title: &str) -> Option<&MemorySeries> {
        self.series.values().find(|s| s.style.title == title)
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Patches received through the silent path, oldest first.
    pub fn applied(&self) -> &[ViewportPatch] {
        &self.applied
    }

    /// Number of `set_series_data` calls so far.
    pub fn data_pushes(&self) -> usize {
        self.data_pushes
    }

    /// Make every subsequent `apply_viewport` fail.
    pub fn set_fail_applies(&mut self, fail: bool) {
        self.fail_applies = fail;
    }

    /// Echoed patches waiting for the host to report them.
    pub fn take_outbox(&mut self) -> Vec<ViewportPatch> {
        std::mem::take(&mut self.outbox)
    }

    pub fn user_scroll(&mut self, range: TimeRange) -> ViewportPatch {
        self.user_change(ViewportPatch::time_range(range))
    }

    pub fn user_zoom(&mut self, range: LogicalRange) -> ViewportPatch {
        self.user_change(ViewportPatch::logical_range(range))
    }

    pub fn user_move_crosshair(&mut self, time: i64, x: f64, y: f64) -> ViewportPatch {
        let mut crosshair = Crosshair::at(time, x, y);
        crosshair.series_prices = self.series_prices_at(time);
        self.user_change(ViewportPatch::crosshair(crosshair))
    }

    pub fn user_leave(&mut self) -> ViewportPatch {
        self.user_change(ViewportPatch::hide_crosshair())
    }

    fn user_change(&mut self, patch: ViewportPatch) -> ViewportPatch {
        self.viewport.apply(&patch);
        patch
    }
}

impl ViewportHandle for MemorySurface {
    fn viewport(&self) -> Viewport {
        self.viewport.clone()
    }

    fn apply_viewport(&mut self, patch: &ViewportPatch) -> Result<(), SurfaceError> {
        if self.fail_applies {
            return Err(SurfaceError::Rejected(format!("{} refuses viewport updates", self.pane)));
        }
        self.viewport.apply(patch);
        self.applied.push(patch.clone());
        if self.echo_applies {
            self.outbox.push(patch.clone());
        }
        Ok(())
    }

    fn echoes_applies(&self) -> bool {
        self.echo_applies
    }

    fn series_prices_at(&self, time: i64) -> BTreeMap<String, f64> {
        self.series
            .values()
            .filter_map(|s| {
                s.points
                    .binary_search_by_key(&time, |p| p.time)
                    .ok()
                    .map(|i| (s.style.title.clone(), s.points[i].value))
            })
            .collect()
    }
}

impl ChartSurface for MemorySurface {
    fn add_series(&mut self, kind: SeriesKind, style: SeriesStyle) -> Result<SeriesHandle, SurfaceError> {
        let handle = SeriesHandle(self.next_series);
        self.next_series += 1;
        self.series.insert(
            handle,
            MemorySeries {
                kind,
                style,
                points: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn set_series_data(&mut self, handle: SeriesHandle, points: &[SeriesPoint]) -> Result<(), SurfaceError> {
        let series = self
            .series
            .get_mut(&handle)
            .ok_or(SurfaceError::UnknownSeries(handle))?;
        series.points = points.to_vec();
        self.data_pushes += 1;
        Ok(())
    }

    fn set_candles(&mut self, candles: &[Candle]) -> Result<(), SurfaceError> {
        self.candles = candles.to_vec();
        Ok(())
    }

    fn remove_series(&mut self, handle: SeriesHandle) -> Result<(), SurfaceError> {
        self.series
            .remove(&handle)
            .map(|_| ())
            .ok_or(SurfaceError::UnknownSeries(handle))
    }
}

/// Factory for [`MemorySurface`]s. Keeps a log of what it created and disposed.
#[derive(Debug, Default)]
pub struct MemorySurfaceFactory {
    echo_applies: bool,
    created: Vec<PaneId>,
    disposed: Vec<PaneId>,
}

impl MemorySurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surfaces created from now on echo programmatic applies.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo_applies = echo;
        self
    }

    pub fn created(&self) -> &[PaneId] {
        &self.created
    }

    pub fn disposed(&self) -> &[PaneId] {
        &self.disposed
    }
}

impl SurfaceFactory for MemorySurfaceFactory {
    type Surface = MemorySurface;

    fn create(&mut self, pane: PaneId, role: PaneRole) -> Result<MemorySurface, SurfaceError> {
        self.created.push(pane);
        Ok(MemorySurface::new(pane, role).with_echo(self.echo_applies))
    }

    fn dispose(&mut self, pane: PaneId, _surface: MemorySurface) {
        self.disposed.push(pane);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices_at_only_exact_samples() {
        let mut s = MemorySurface::new(PaneId(1), PaneRole::Main);
        let h = s
            .add_series(SeriesKind::Line, SeriesStyle::new("SMA", "#fff"))
            .unwrap();
        s.set_series_data(h, &[SeriesPoint::new(10, 1.5), SeriesPoint::new(20, 2.5)])
            .unwrap();
        assert_eq!(s.series_prices_at(20).get("SMA"), Some(&2.5));
        assert!(s.series_prices_at(15).is_empty());
    }

    #[test]
    fn echo_only_when_enabled() {
        let patch = ViewportPatch::time_range(TimeRange::new(0, 10));
        let mut quiet = MemorySurface::new(PaneId(1), PaneRole::Main);
        quiet.apply_viewport(&patch).unwrap();
        assert!(quiet.take_outbox().is_empty());
        assert!(!quiet.echoes_applies());

        let mut loud = MemorySurface::new(PaneId(2), PaneRole::Main).with_echo(true);
        loud.apply_viewport(&patch).unwrap();
        assert_eq!(loud.take_outbox(), vec![patch]);
        assert!(loud.echoes_applies());
    }

    #[test]
    fn removing_unknown_series_fails() {
        let mut s = MemorySurface::new(PaneId(1), PaneRole::Main);
        assert!(matches!(
            s.remove_series(SeriesHandle(9)),
            Err(SurfaceError::UnknownSeries(_))
        ));
    }
}
