//! Everything that can happen to a chart.

use crate::backend::BackendError;
use crate::domain::{
    Candle, FetchTicket, IndicatorId, MarketContext, NoticeId, PaneId, SeriesPayload, ViewportPatch,
};
use crate::indicators::{NewIndicator, PlotTarget};
use crate::sync::SyncOutcome;
use std::collections::BTreeMap;

/// Input to [`ChartEngine::handle`](super::ChartEngine::handle): user actions,
/// pane interactions and fetch completions.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Raw user input; normalized and validated by the engine.
    SetSymbol(String),
    SetInterval(String),
    AddIndicator(NewIndicator),
    RemoveIndicator(IndicatorId),
    SetEnabled {
        id: IndicatorId,
        enabled: bool,
    },
    SetParameters {
        id: IndicatorId,
        parameters: BTreeMap<String, f64>,
    },
    SetPlotTarget {
        id: IndicatorId,
        target: PlotTarget,
    },
    SetColor {
        id: IndicatorId,
        color: String,
    },
    /// Edited source for a custom indicator, typically after a rejection.
    ResubmitCustom {
        id: IndicatorId,
        source_code: String,
    },
    /// The user scrolled, zoomed or moved the crosshair on a pane.
    PaneViewportChanged {
        pane: PaneId,
        patch: ViewportPatch,
    },
    CandlesLoaded {
        ticket: FetchTicket,
        context: MarketContext,
        result: Result<Vec<Candle>, BackendError>,
    },
    IndicatorComputed {
        ticket: FetchTicket,
        result: Result<SeriesPayload, BackendError>,
    },
    DismissNotice(NoticeId),
}

/// What handling an event amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Added(IndicatorId),
    /// Whether anything was removed.
    Removed(bool),
    Synced(SyncOutcome),
    /// A completion that no longer matters (superseded context or ticket).
    Discarded,
}
