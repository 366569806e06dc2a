//! Chart engine: the explicit state container tying everything together.
//!
//! One [`ChartEngine`] owns the indicator store, fetch controller, pane
//! allocator, pane registry, sync coordinator, notices and candles for one
//! chart. [`ChartEngine::handle`] processes a single event to completion and
//! then settles: fetch reconcile, dispatch, pane reconcile, and a preference
//! save when the indicator list changed.

pub mod event;
pub mod notice;

pub use event::{EngineEvent, EventOutcome};
pub use notice::{Notice, NoticeKind};

use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::domain::{
    validate_candles, Candle, FetchTicket, IndicatorId, Interval, MarketContext, NoticeId, PaneId,
    SeriesPayload, Symbol, ViewportPatch,
};
use crate::error::{EngineError, EngineResult};
use crate::fetch::{FetchController, FetchDispatcher, FetchJob, QueueDispatcher, WorkerDispatcher};
use crate::indicators::{IndicatorStore, StoreSnapshot};
use crate::panes::{ChartSurface, Pane, PaneAllocator, PaneRegistry, PaneRole, SurfaceFactory};
use crate::persistence::{PreferenceStore, SavedIndicator};
use crate::sync::SyncCoordinator;
use std::time::Duration;

pub struct ChartEngine<F: SurfaceFactory, D: FetchDispatcher> {
    store: IndicatorStore,
    controller: FetchController,
    allocator: PaneAllocator,
    registry: PaneRegistry<F::Surface>,
    coordinator: SyncCoordinator,
    factory: F,
    dispatcher: D,
    preferences: Box<dyn PreferenceStore>,
    main_pane: PaneId,
    candles: Vec<Candle>,
    /// Outstanding candle load and the context it was issued for.
    candle_request: Option<(FetchTicket, MarketContext)>,
    notices: Vec<Notice>,
    next_notice: u64,
}

impl<F: SurfaceFactory, D: FetchDispatcher> ChartEngine<F, D> {
    /// Build an engine: create and link the main pane, restore saved
    /// indicators, request candles and the first round of computations.
    pub fn new(
        config: &EngineConfig,
        mut factory: F,
        dispatcher: D,
        preferences: Box<dyn PreferenceStore>,
    ) -> EngineResult<Self> {
        let context = config.context()?;
        let mut registry = PaneRegistry::new();
        let mut coordinator = SyncCoordinator::new();

        let main_pane = registry.allocate_id();
        let surface = factory.create(main_pane, PaneRole::Main)?;
        registry.insert(Pane {
            id: main_pane,
            role: PaneRole::Main,
            surface,
        });
        coordinator.register_pane(&mut registry, main_pane)?;

        let mut store = IndicatorStore::new(context, config.palette.clone());
        for saved in preferences.load() {
            if let Err(e) = store.add(saved.to_new_indicator()) {
                tracing::warn!(name = %saved.name, error = %e, "saved indicator skipped");
            }
        }

        let mut engine = Self {
            store,
            controller: FetchController::new(config.cache_capacity),
            allocator: PaneAllocator::new(),
            registry,
            coordinator,
            factory,
            dispatcher,
            preferences,
            main_pane,
            candles: Vec::new(),
            candle_request: None,
            notices: Vec::new(),
            next_notice: 1,
        };
        tracing::info!(
            context = %engine.store.context(),
            indicators = engine.store.len(),
            "chart engine started"
        );
        engine.request_candles();
        engine.settle(false);
        Ok(engine)
    }

    /// Process one event to completion.
    pub fn handle(&mut self, event: EngineEvent) -> EngineResult<EventOutcome> {
        let (outcome, persist) = match event {
            EngineEvent::SetSymbol(raw) => {
                let symbol = Symbol::parse(&raw)?;
                let interval = self.store.context().interval;
                self.change_context(MarketContext::new(symbol, interval));
                (EventOutcome::Applied, false)
            }
            EngineEvent::SetInterval(raw) => {
                let interval: Interval = raw.parse()?;
                let symbol = self.store.context().symbol.clone();
                self.change_context(MarketContext::new(symbol, interval));
                (EventOutcome::Applied, false)
            }
            EngineEvent::AddIndicator(new) => {
                let id = self.store.add(new)?;
                (EventOutcome::Added(id), true)
            }
            EngineEvent::RemoveIndicator(id) => {
                let removed = self.store.remove(id);
                self.controller.forget(id);
                self.notices.retain(|n| n.indicator != Some(id));
                (EventOutcome::Removed(removed), removed)
            }
            EngineEvent::SetEnabled { id, enabled } => {
                let changed = self.store.set_enabled(id, enabled)?;
                (EventOutcome::Applied, changed)
            }
            EngineEvent::SetParameters { id, parameters } => {
                self.store.set_parameters(id, parameters)?;
                (EventOutcome::Applied, true)
            }
            EngineEvent::SetPlotTarget { id, target } => {
                let changed = self.store.set_plot_target(id, target)?;
                (EventOutcome::Applied, changed)
            }
            EngineEvent::SetColor { id, color } => {
                let changed = self.store.set_color(id, color)?;
                (EventOutcome::Applied, changed)
            }
            EngineEvent::ResubmitCustom { id, source_code } => {
                self.store.set_source(id, source_code)?;
                self.controller.forget(id);
                if let Some(inst) = self.store.get(id) {
                    self.controller.invalidate(&inst.fingerprint);
                }
                self.notices.retain(|n| {
                    !(n.indicator == Some(id) && n.kind == NoticeKind::InvalidCustomIndicator)
                });
                (EventOutcome::Applied, true)
            }
            EngineEvent::PaneViewportChanged { pane, patch } => {
                return self.on_viewport_changed(pane, &patch);
            }
            EngineEvent::CandlesLoaded {
                ticket,
                context,
                result,
            } => (self.on_candles(ticket, context, result), false),
            EngineEvent::IndicatorComputed { ticket, result } => {
                (self.on_indicator_computed(ticket, result), false)
            }
            EngineEvent::DismissNotice(id) => {
                self.notices.retain(|n| n.id != id);
                (EventOutcome::Applied, false)
            }
        };
        self.settle(persist);
        Ok(outcome)
    }

    fn on_viewport_changed(&mut self, pane: PaneId, patch: &ViewportPatch) -> EngineResult<EventOutcome> {
        let outcome = self
            .coordinator
            .on_pane_viewport_changed(&mut self.registry, pane, patch)?;
        Ok(EventOutcome::Synced(outcome))
    }

    fn change_context(&mut self, context: MarketContext) {
        if &context == self.store.context() {
            return;
        }
        let invalidated = self.store.set_context(context);
        tracing::info!(
            context = %self.store.context(),
            invalidated = invalidated.len(),
            "market context changed"
        );
        self.request_candles();
    }

    fn request_candles(&mut self) {
        let ticket = self.controller.issue_ticket();
        let context = self.store.context().clone();
        tracing::info!(%ticket, %context, "candle fetch issued");
        self.candle_request = Some((ticket, context.clone()));
        self.dispatcher.dispatch(FetchJob::Candles { ticket, context });
    }

    fn on_candles(
        &mut self,
        ticket: FetchTicket,
        context: MarketContext,
        result: Result<Vec<Candle>, crate::backend::BackendError>,
    ) -> EventOutcome {
        let current = matches!(&self.candle_request, Some((t, c)) if *t == ticket && *c == context);
        if !current {
            tracing::debug!(%ticket, %context, "superseded candle response discarded");
            return EventOutcome::Discarded;
        }
        self.candle_request = None;

        let candles = result
            .map_err(|e| EngineError::FetchFailed(e.to_string()))
            .and_then(|candles| {
                validate_candles(&candles)?;
                Ok(candles)
            });
        match candles {
            Ok(candles) => {
                if let Some(surface) = self.registry.surface_mut(self.main_pane) {
                    if let Err(e) = surface.set_candles(&candles) {
                        tracing::warn!(error = %e, "main pane rejected candles");
                    }
                }
                tracing::info!(%context, bars = candles.len(), "candles loaded");
                self.candles = candles;
            }
            Err(e) => {
                tracing::warn!(%context, error = %e, "candle load failed; keeping previous candles");
                self.push_notice(NoticeKind::FetchFailed, None, format!("{context}: {e}"));
            }
        }
        EventOutcome::Applied
    }

    fn on_indicator_computed(
        &mut self,
        ticket: FetchTicket,
        result: Result<SeriesPayload, crate::backend::BackendError>,
    ) -> EventOutcome {
        let resolutions = self.controller.complete(ticket, result);
        if resolutions.is_empty() {
            return EventOutcome::Discarded;
        }
        for resolution in resolutions {
            let id = resolution.indicator;
            let applied = match resolution.outcome {
                Ok(data) => self.store.apply_computed_data(id, &resolution.fingerprint, data),
                Err(error) => {
                    let (kind, message) = NoticeKind::describe(&error);
                    let marked = self.store.mark_error(id, &resolution.fingerprint, message.clone());
                    if marked.is_ok() {
                        self.push_notice(kind, Some(id), message);
                    }
                    marked
                }
            };
            match applied {
                Ok(()) => {}
                Err(e @ EngineError::StaleResponseDiscarded { .. }) => {
                    tracing::debug!(indicator = %id, reason = %e, "stale indicator result discarded");
                }
                Err(e) => tracing::debug!(indicator = %id, error = %e, "indicator result dropped"),
            }
        }
        EventOutcome::Applied
    }

    fn push_notice(&mut self, kind: NoticeKind, indicator: Option<IndicatorId>, message: String) {
        let id = NoticeId(self.next_notice);
        self.next_notice += 1;
        self.notices.push(Notice {
            id,
            kind,
            indicator,
            message,
        });
    }

    /// Fetch reconcile → dispatch → pane reconcile → optional preference save.
    fn settle(&mut self, persist: bool) {
        let plan = self.controller.reconcile(&self.store.snapshot());
        for hit in plan.cache_hits {
            if let Err(e) = self
                .store
                .apply_computed_data(hit.indicator, &hit.fingerprint, hit.data)
            {
                tracing::debug!(indicator = %hit.indicator, error = %e, "cache hit not applied");
            }
        }
        for id in plan.pending {
            if let Err(e) = self.store.mark_pending(id) {
                tracing::debug!(indicator = %id, error = %e, "pending mark skipped");
            }
        }
        let issued = plan.requests.len();
        for request in plan.requests {
            self.dispatcher.dispatch(FetchJob::Indicator(request));
        }
        if issued > 0 {
            tracing::debug!(issued, in_flight = self.controller.in_flight_count(), "indicator fetches dispatched");
        }

        let snapshot = self.store.snapshot();
        self.allocator.reconcile(
            &snapshot,
            &mut self.registry,
            &mut self.coordinator,
            &mut self.factory,
        );

        if persist {
            let saved: Vec<SavedIndicator> = snapshot.iter().map(SavedIndicator::from_instance).collect();
            if let Err(e) = self.preferences.save(&saved) {
                tracing::warn!(error = %e, "failed to save indicator preferences");
            }
        }
    }

    pub fn context(&self) -> &MarketContext {
        self.store.context()
    }

    pub fn store(&self) -> &IndicatorStore {
        &self.store
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn main_pane(&self) -> PaneId {
        self.main_pane
    }

    /// Indicator panes below the main pane, in store order.
    pub fn pane_layout(&self) -> &[PaneId] {
        self.allocator.pane_layout()
    }

    pub fn pane_of(&self, id: IndicatorId) -> Option<PaneId> {
        self.allocator.pane_of(id)
    }

    pub fn registry(&self) -> &PaneRegistry<F::Surface> {
        &self.registry
    }

    pub fn surface(&self, pane: PaneId) -> Option<&F::Surface> {
        self.registry.surface(pane)
    }

    /// Mutable access for hosts that drive user interaction on a surface.
    pub fn surface_mut(&mut self, pane: PaneId) -> Option<&mut F::Surface> {
        self.registry.surface_mut(pane)
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn controller(&self) -> &FetchController {
        &self.controller
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }
}

impl<F: SurfaceFactory> ChartEngine<F, QueueDispatcher> {
    /// Run queued jobs against `backend` and feed the results back until the
    /// queue stays empty. Returns the number of completions handled.
    pub fn run_pending<B: Backend + ?Sized>(&mut self, backend: &B) -> EngineResult<usize> {
        let mut handled = 0;
        while !self.dispatcher.is_empty() {
            for event in self.dispatcher.run_all(backend) {
                self.handle(event)?;
                handled += 1;
            }
        }
        Ok(handled)
    }
}

impl<F: SurfaceFactory> ChartEngine<F, WorkerDispatcher> {
    /// Handle every completion the worker has produced so far.
    pub fn pump(&mut self) -> EngineResult<usize> {
        let events = self.dispatcher.drain();
        let handled = events.len();
        for event in events {
            self.handle(event)?;
        }
        Ok(handled)
    }

    /// Wait up to `timeout` for one completion and handle it.
    pub fn pump_blocking(&mut self, timeout: Duration) -> EngineResult<bool> {
        match self.dispatcher.recv_timeout(timeout) {
            Some(event) => {
                self.handle(event)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
