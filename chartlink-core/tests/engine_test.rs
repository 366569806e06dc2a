//! Integration tests for the chart engine.
//!
//! Tests:
//! 1. AAPL/1d SMA(20) overlay scenario
//! 2. RSI(14) separate pane scenario, including crosshair prices
//! 3. Disable/enable without refetch
//! 4. Parameter changes isolated to one instance
//! 5. Shared in-flight fetches and stale-response discard
//! 6. Custom indicator rejection and resubmission
//! 7. Context changes, result cache and eviction
//! 8. Preference persistence across engine restarts

use chartlink_core::backend::{Backend, BackendError, SyntheticBackend};
use chartlink_core::config::EngineConfig;
use chartlink_core::domain::{
    Candle, CrosshairUpdate, IndicatorId, Interval, SeriesPayload, Symbol,
};
use chartlink_core::engine::{ChartEngine, EngineEvent, EventOutcome, NoticeKind};
use chartlink_core::fetch::{run_job, FetchJob, FetchRequest, FetchTarget, QueueDispatcher};
use chartlink_core::indicators::{FetchStatus, IndicatorKind, NewIndicator, PlotTarget};
use chartlink_core::panes::{MemorySurfaceFactory, SurfaceFactory};
use chartlink_core::persistence::MemoryPreferences;
use chartlink_core::sync::ViewportHandle;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

type Engine = ChartEngine<MemorySurfaceFactory, QueueDispatcher>;

const BARS: usize = 120;

fn backend() -> SyntheticBackend {
    SyntheticBackend::new(7).with_bars(BARS)
}

fn engine_with(config: &EngineConfig, prefs: MemoryPreferences) -> Engine {
    ChartEngine::new(config, MemorySurfaceFactory::new(), QueueDispatcher::new(), Box::new(prefs)).unwrap()
}

fn engine() -> Engine {
    engine_with(&EngineConfig::default(), MemoryPreferences::new())
}

fn add(engine: &mut Engine, new: NewIndicator) -> IndicatorId {
    match engine.handle(EngineEvent::AddIndicator(new)).unwrap() {
        EventOutcome::Added(id) => id,
        other => panic!("unexpected outcome {other:?}"),
    }
}

fn indicator_jobs(engine: &Engine) -> Vec<FetchRequest> {
    engine
        .dispatcher()
        .jobs()
        .filter_map(|job| match job {
            FetchJob::Indicator(req) => Some(req.clone()),
            FetchJob::Candles { .. } => None,
        })
        .collect()
}

fn main_series_count(engine: &Engine) -> usize {
    engine.surface(engine.main_pane()).unwrap().series_count()
}

/// Synthetic backend that can be switched to fail every request.
struct SwitchableBackend {
    inner: SyntheticBackend,
    failing: Cell<bool>,
}

impl SwitchableBackend {
    fn new() -> Self {
        Self { inner: backend(), failing: Cell::new(false) }
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.failing.get() {
            Err(BackendError::Http { status: 503, message: "maintenance".into() })
        } else {
            Ok(())
        }
    }
}

impl Backend for SwitchableBackend {
    fn fetch_candles(&self, symbol: &Symbol, interval: Interval) -> Result<Vec<Candle>, BackendError> {
        self.check()?;
        self.inner.fetch_candles(symbol, interval)
    }

    fn compute_indicator(
        &self,
        symbol: &Symbol,
        interval: Interval,
        name: &str,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<SeriesPayload, BackendError> {
        self.check()?;
        self.inner.compute_indicator(symbol, interval, name, parameters)
    }

    fn compute_custom_indicator(
        &self,
        symbol: &Symbol,
        interval: Interval,
        source_code: &str,
        name: &str,
    ) -> Result<SeriesPayload, BackendError> {
        self.check()?;
        self.inner.compute_custom_indicator(symbol, interval, source_code, name)
    }

    fn name(&self) -> &str {
        "switchable"
    }
}

// ── 1. SMA overlay ───────────────────────────────────────────────────

#[test]
fn sma_overlay_on_aapl_daily() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::builtin("SMA").param("period", 20.0));

    let jobs = indicator_jobs(&e);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].symbol.as_str(), "AAPL");
    assert_eq!(jobs[0].interval, Interval::Day1);
    assert_eq!(
        jobs[0].target,
        FetchTarget::BuiltIn {
            name: "SMA".into(),
            parameters: [("period".to_string(), 20.0)].into(),
        }
    );
    assert_eq!(e.store().get(id).unwrap().status, FetchStatus::Pending);
    assert_eq!(main_series_count(&e), 0);

    e.run_pending(&backend()).unwrap();

    let inst = e.store().get(id).unwrap();
    assert_eq!(inst.status, FetchStatus::Ready);
    assert_eq!(inst.data.as_ref().unwrap().point_count(), BARS - 19);
    assert_eq!(e.candles().len(), BARS);

    let main = e.surface(e.main_pane()).unwrap();
    assert_eq!(main.series_titles(), vec!["SMA(period=20)".to_string()]);
    assert_eq!(main.candles().len(), BARS);
    assert!(e.pane_layout().is_empty());
    assert_eq!(e.registry().len(), 1);
}

// ── 2. RSI separate pane ─────────────────────────────────────────────

#[test]
fn rsi_gets_a_dedicated_pane() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::builtin("RSI"));

    // The pane exists while the computation is pending.
    let pane = e.pane_of(id).unwrap();
    assert_eq!(e.pane_layout(), &[pane]);
    assert_eq!(e.surface(pane).unwrap().series_count(), 0);
    assert!(e.coordinator().is_linked(pane));

    e.run_pending(&backend()).unwrap();
    let surface = e.surface(pane).unwrap();
    let series = surface.series_by_title("RSI(period=14)").unwrap();
    assert_eq!(series.points.len(), BARS - 14);
    assert!(series.points.iter().all(|p| (0.0..=100.0).contains(&p.value)));
    assert_eq!(main_series_count(&e), 0);

    // Crosshair on the main pane shows the RSI value on the RSI pane.
    let time = e.candles().last().unwrap().time;
    let patch = e.surface_mut(e.main_pane()).unwrap().user_move_crosshair(time, 100.0, 50.0);
    let main = e.main_pane();
    e.handle(EngineEvent::PaneViewportChanged { pane: main, patch }).unwrap();
    let crosshair = e.surface(pane).unwrap().viewport().crosshair.unwrap();
    assert_eq!(crosshair.time, time);
    assert!(crosshair.series_prices.contains_key("RSI(period=14)"));
}

#[test]
fn removing_a_separate_indicator_destroys_its_pane() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::builtin("MACD"));
    let pane = e.pane_of(id).unwrap();

    let outcome = e.handle(EngineEvent::RemoveIndicator(id)).unwrap();
    assert_eq!(outcome, EventOutcome::Removed(true));
    assert!(e.registry().get(pane).is_none());
    assert!(!e.coordinator().is_linked(pane));
    assert_eq!(e.factory().disposed(), &[pane]);
    assert_eq!(
        e.handle(EngineEvent::RemoveIndicator(id)).unwrap(),
        EventOutcome::Removed(false)
    );

    // The late completion lands nowhere.
    e.run_pending(&backend()).unwrap();
    assert!(e.store().is_empty());
    assert_eq!(e.registry().len(), 1);
}

#[test]
fn retargeting_moves_series_without_refetch() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::builtin("RSI"));
    e.run_pending(&backend()).unwrap();
    let dispatched = e.dispatcher().dispatched();
    let pane = e.pane_of(id).unwrap();

    e.handle(EngineEvent::SetPlotTarget { id, target: PlotTarget::Overlay }).unwrap();
    assert!(e.registry().get(pane).is_none());
    assert_eq!(main_series_count(&e), 1);
    assert_eq!(e.dispatcher().dispatched(), dispatched);
}

// ── 3. Disable / enable ──────────────────────────────────────────────

#[test]
fn toggling_does_not_refetch() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::builtin("EMA"));
    e.run_pending(&backend()).unwrap();
    let dispatched = e.dispatcher().dispatched();
    let before = e.store().get(id).unwrap().data.clone().unwrap();

    e.handle(EngineEvent::SetEnabled { id, enabled: false }).unwrap();
    assert_eq!(main_series_count(&e), 0);
    e.handle(EngineEvent::SetEnabled { id, enabled: true }).unwrap();

    assert_eq!(e.dispatcher().dispatched(), dispatched);
    let inst = e.store().get(id).unwrap();
    assert_eq!(inst.status, FetchStatus::Ready);
    assert!(Arc::ptr_eq(inst.data.as_ref().unwrap(), &before));
    let main = e.surface(e.main_pane()).unwrap();
    assert_eq!(main.series().next().unwrap().points.len(), before.point_count());
}

// ── 4. Parameter isolation ───────────────────────────────────────────

#[test]
fn parameter_change_touches_one_instance() {
    let mut e = engine();
    let a = add(&mut e, NewIndicator::builtin("SMA"));
    let b = add(&mut e, NewIndicator::builtin("SMA").color("#123456"));
    e.run_pending(&backend()).unwrap();
    let dispatched = e.dispatcher().dispatched();

    e.handle(EngineEvent::SetParameters { id: a, parameters: [("period".to_string(), 50.0)].into() })
        .unwrap();

    let ia = e.store().get(a).unwrap();
    assert_eq!(ia.status, FetchStatus::Pending);
    assert!(ia.data.is_none());
    let ib = e.store().get(b).unwrap();
    assert_eq!(ib.status, FetchStatus::Ready);
    assert!(ib.data.is_some());

    assert_eq!(e.dispatcher().dispatched(), dispatched + 1);
    let jobs = indicator_jobs(&e);
    assert_eq!(jobs.len(), 1);
    assert!(matches!(
        &jobs[0].target,
        FetchTarget::BuiltIn { parameters, .. } if parameters["period"] == 50.0
    ));
}

#[test]
fn invalid_parameters_leave_instance_untouched() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::builtin("SMA"));
    e.run_pending(&backend()).unwrap();
    let result = e.handle(EngineEvent::SetParameters {
        id,
        parameters: [("period".to_string(), -3.0)].into(),
    });
    assert!(result.is_err());
    assert_eq!(e.store().get(id).unwrap().status, FetchStatus::Ready);
}

// ── 5. Shared fetches and stale responses ────────────────────────────

#[test]
fn identical_indicators_share_one_fetch() {
    let mut e = engine();
    let a = add(&mut e, NewIndicator::builtin("BB"));
    let b = add(&mut e, NewIndicator::builtin("BB").color("#000000"));
    assert_eq!(indicator_jobs(&e).len(), 1);

    e.run_pending(&backend()).unwrap();
    let da = e.store().get(a).unwrap().data.clone().unwrap();
    let db = e.store().get(b).unwrap().data.clone().unwrap();
    assert!(Arc::ptr_eq(&da, &db));
    // Two overlays, three bands each.
    assert_eq!(main_series_count(&e), 6);
}

#[test]
fn stale_results_are_discarded() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::builtin("SMA"));
    let old_job = e.dispatcher_mut().pop_back().unwrap();
    assert!(matches!(old_job, FetchJob::Indicator(_)));

    e.handle(EngineEvent::SetParameters { id, parameters: [("period".to_string(), 30.0)].into() })
        .unwrap();

    let b = backend();
    e.handle(run_job(&b, old_job)).unwrap();
    let inst = e.store().get(id).unwrap();
    assert_eq!(inst.status, FetchStatus::Pending);
    assert!(inst.data.is_none());
    assert_eq!(main_series_count(&e), 0);

    e.run_pending(&b).unwrap();
    let inst = e.store().get(id).unwrap();
    assert_eq!(inst.status, FetchStatus::Ready);
    assert_eq!(inst.data.as_ref().unwrap().point_count(), BARS - 29);
}

#[test]
fn out_of_order_completions_settle_on_latest() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::builtin("EMA"));
    e.handle(EngineEvent::SetParameters { id, parameters: [("period".to_string(), 21.0)].into() })
        .unwrap();

    // Newest first, then the superseded one.
    let b = backend();
    while let Some(job) = e.dispatcher_mut().pop_back() {
        e.handle(run_job(&b, job)).unwrap();
    }
    let inst = e.store().get(id).unwrap();
    assert_eq!(inst.status, FetchStatus::Ready);
    assert_eq!(inst.parameters["period"], 21.0);
    assert_eq!(inst.data.as_ref().unwrap().point_count(), BARS - 20);
}

// ── 6. Custom indicators ─────────────────────────────────────────────

const REJECTED: &str = "Custom indicator not found in the executed code";

#[test]
fn custom_rejection_then_resubmit() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::custom("My Line", "result = df['Close']"));
    e.run_pending(&backend()).unwrap();

    let inst = e.store().get(id).unwrap();
    assert_eq!(inst.status, FetchStatus::Error);
    assert_eq!(inst.last_error.as_deref(), Some(REJECTED));
    assert_eq!(inst.kind, IndicatorKind::Custom);
    assert_eq!(inst.source_code.as_deref(), Some("result = df['Close']"));
    assert_eq!(e.notices().len(), 1);
    assert_eq!(e.notices()[0].kind, NoticeKind::InvalidCustomIndicator);
    assert_eq!(e.notices()[0].message, REJECTED);
    assert_eq!(e.notices()[0].indicator, Some(id));

    e.handle(EngineEvent::ResubmitCustom {
        id,
        source_code: "custom_indicator = df['Close'].rolling(5).mean()".into(),
    })
    .unwrap();
    assert!(e.notices().is_empty());
    assert_eq!(e.store().get(id).unwrap().status, FetchStatus::Pending);

    e.run_pending(&backend()).unwrap();
    assert_eq!(e.store().get(id).unwrap().status, FetchStatus::Ready);
    assert_eq!(main_series_count(&e), 1);
}

#[test]
fn resubmitting_unchanged_code_retries_without_stale_error() {
    let mut e = engine();
    let code = "result = df['Close']";
    let id = add(&mut e, NewIndicator::custom("My Line", code));
    e.run_pending(&backend()).unwrap();
    assert_eq!(e.store().get(id).unwrap().last_error.as_deref(), Some(REJECTED));

    e.handle(EngineEvent::ResubmitCustom { id, source_code: code.into() }).unwrap();
    let inst = e.store().get(id).unwrap();
    assert_eq!(inst.status, FetchStatus::Pending);
    assert!(inst.last_error.is_none());
    assert_eq!(e.dispatcher().len(), 1);

    e.run_pending(&backend()).unwrap();
    assert_eq!(e.store().get(id).unwrap().last_error.as_deref(), Some(REJECTED));
}

#[test]
fn failed_refetch_keeps_last_known_good_data() {
    let mut e = engine();
    let code = "custom_indicator = df['Close'] * 2";
    let id = add(&mut e, NewIndicator::custom("Double", code));
    let flaky = SwitchableBackend::new();
    e.run_pending(&flaky).unwrap();
    assert_eq!(e.store().get(id).unwrap().status, FetchStatus::Ready);

    e.handle(EngineEvent::ResubmitCustom { id, source_code: code.into() }).unwrap();
    flaky.failing.set(true);
    e.run_pending(&flaky).unwrap();

    let inst = e.store().get(id).unwrap();
    assert_eq!(inst.status, FetchStatus::Error);
    assert!(inst.data.is_some());
    assert_eq!(main_series_count(&e), 1);
    assert_eq!(e.notices()[0].kind, NoticeKind::FetchFailed);
    assert!(e.notices()[0].message.contains("503"));

    // No automatic retry.
    assert!(e.dispatcher().is_empty());
}

// ── 7. Context changes and caching ───────────────────────────────────

#[test]
fn symbol_switch_refetches_and_switch_back_hits_cache() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::builtin("SMA"));
    e.run_pending(&backend()).unwrap();

    e.handle(EngineEvent::SetSymbol(" msft ".into())).unwrap();
    assert_eq!(e.context().to_string(), "MSFT@1d");
    let inst = e.store().get(id).unwrap();
    assert_eq!(inst.status, FetchStatus::Pending);
    assert!(inst.data.is_none());
    assert_eq!(main_series_count(&e), 0);
    let jobs = indicator_jobs(&e);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].symbol.as_str(), "MSFT");
    e.run_pending(&backend()).unwrap();

    e.handle(EngineEvent::SetSymbol("AAPL".into())).unwrap();
    assert!(indicator_jobs(&e).is_empty());
    assert_eq!(e.store().get(id).unwrap().status, FetchStatus::Ready);
    assert_eq!(main_series_count(&e), 1);
}

#[test]
fn interval_change_is_validated_and_normalized() {
    let mut e = engine();
    e.handle(EngineEvent::SetInterval("1W".into())).unwrap();
    assert_eq!(e.context().interval, Interval::Week1);
    assert!(e.handle(EngineEvent::SetInterval("7d".into())).is_err());
    assert_eq!(e.context().interval, Interval::Week1);
}

#[test]
fn small_cache_evicts_oldest_results() {
    let config = EngineConfig { cache_capacity: 1, ..EngineConfig::default() };
    let mut e = engine_with(&config, MemoryPreferences::new());
    add(&mut e, NewIndicator::builtin("SMA"));
    add(&mut e, NewIndicator::builtin("EMA"));
    e.run_pending(&backend()).unwrap();

    e.handle(EngineEvent::SetSymbol("MSFT".into())).unwrap();
    e.run_pending(&backend()).unwrap();
    e.handle(EngineEvent::SetSymbol("AAPL".into())).unwrap();
    assert_eq!(indicator_jobs(&e).len(), 2);
    assert_eq!(e.controller().cache().len(), 1);
}

// ── 8. Persistence ───────────────────────────────────────────────────

#[test]
fn indicators_survive_restart() {
    let prefs = MemoryPreferences::new();
    {
        let mut e = engine_with(&EngineConfig::default(), prefs.clone());
        let rsi = add(&mut e, NewIndicator::builtin("RSI").param("period", 7.0));
        add(&mut e, NewIndicator::custom("Mine", "custom_indicator = df['Close']"));
        e.handle(EngineEvent::SetEnabled { id: rsi, enabled: false }).unwrap();
        e.handle(EngineEvent::SetColor { id: rsi, color: "#ABCDEF".into() }).unwrap();
    }
    assert_eq!(prefs.saved().len(), 2);

    let e = engine_with(&EngineConfig::default(), prefs.clone());
    let list = e.store().list();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].name, "RSI");
    assert_eq!(list[0].parameters["period"], 7.0);
    assert!(!list[0].enabled);
    assert_eq!(list[0].color, "#ABCDEF");
    assert_eq!(list[0].plot_target, PlotTarget::Separate);
    assert_eq!(list[1].kind, IndicatorKind::Custom);
    assert_eq!(list[1].source_code.as_deref(), Some("custom_indicator = df['Close']"));

    // Only the enabled custom indicator is fetched on startup.
    assert_eq!(indicator_jobs(&e).len(), 1);
    assert!(e.pane_layout().is_empty());
}

#[test]
fn viewport_and_fetch_events_are_not_persisted() {
    let prefs = MemoryPreferences::new();
    let mut e = engine_with(&EngineConfig::default(), prefs.clone());
    add(&mut e, NewIndicator::builtin("SMA"));
    let saves = prefs.save_count();
    e.run_pending(&backend()).unwrap();
    e.handle(EngineEvent::SetSymbol("MSFT".into())).unwrap();
    assert_eq!(prefs.save_count(), saves);
}

#[test]
fn surface_factory_failure_is_reported_at_startup() {
    struct Broken;
    impl SurfaceFactory for Broken {
        type Surface = chartlink_core::panes::MemorySurface;
        fn create(
            &mut self,
            _pane: chartlink_core::domain::PaneId,
            _role: chartlink_core::panes::PaneRole,
        ) -> Result<Self::Surface, chartlink_core::panes::SurfaceError> {
            Err(chartlink_core::panes::SurfaceError::Rejected("no display".into()))
        }
        fn dispose(&mut self, _pane: chartlink_core::domain::PaneId, _surface: Self::Surface) {}
    }

    let result = ChartEngine::new(
        &EngineConfig::default(),
        Broken,
        QueueDispatcher::new(),
        Box::new(MemoryPreferences::new()),
    );
    assert!(result.is_err());
}

#[test]
fn crosshair_hide_reaches_every_pane() {
    let mut e = engine();
    let id = add(&mut e, NewIndicator::builtin("RSI"));
    e.run_pending(&backend()).unwrap();
    let pane = e.pane_of(id).unwrap();
    let main = e.main_pane();

    let patch = e.surface_mut(pane).unwrap().user_move_crosshair(0, 1.0, 1.0);
    e.handle(EngineEvent::PaneViewportChanged { pane, patch }).unwrap();
    assert!(e.surface(main).unwrap().viewport().crosshair.is_some());

    let patch = e.surface_mut(pane).unwrap().user_leave();
    e.handle(EngineEvent::PaneViewportChanged { pane, patch }).unwrap();
    assert!(e.surface(main).unwrap().viewport().crosshair.is_none());
    let last = e.surface(main).unwrap().applied().last().cloned().unwrap();
    assert_eq!(last.crosshair, Some(CrosshairUpdate::Hidden));
}
