//! Indicator fetch controller.
//!
//! Decides which instances need a computation, deduplicates identical
//! computations by fingerprint, and turns completed fetches into per-instance
//! resolutions. It never touches the store itself: the engine applies the
//! plan and the resolutions, and the store's fingerprint guard has the final
//! word on whether a result is still current.

use super::cache::ResultCache;
use crate::backend::BackendError;
use crate::domain::{FetchTicket, IndicatorId, Interval, SeriesPayload, Symbol};
use crate::error::EngineError;
use crate::fingerprint::Fingerprint;
use crate::indicators::{IndicatorInstance, IndicatorKind, StoreSnapshot};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// What to compute.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchTarget {
    BuiltIn {
        name: String,
        parameters: BTreeMap<String, f64>,
    },
    Custom {
        name: String,
        source_code: String,
    },
}

impl FetchTarget {
    fn for_instance(inst: &IndicatorInstance) -> Self {
        match (inst.kind, &inst.source_code) {
            (IndicatorKind::Custom, Some(code)) => FetchTarget::Custom {
                name: inst.name.clone(),
                source_code: code.clone(),
            },
            _ => FetchTarget::BuiltIn {
                name: inst.name.clone(),
                parameters: inst.parameters.clone(),
            },
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, FetchTarget::Custom { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            FetchTarget::BuiltIn { name, .. } | FetchTarget::Custom { name, .. } => name,
        }
    }
}

/// One computation to run against the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub fingerprint: Fingerprint,
    pub symbol: Symbol,
    pub interval: Interval,
    pub target: FetchTarget,
}

/// A result served from the cache without a fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub indicator: IndicatorId,
    pub fingerprint: Fingerprint,
    pub data: Arc<SeriesPayload>,
}

/// Output of one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPlan {
    /// New fetches to dispatch.
    pub requests: Vec<FetchRequest>,
    pub cache_hits: Vec<CacheHit>,
    /// Instances now waiting on a new or already in-flight fetch.
    pub pending: Vec<IndicatorId>,
}

impl FetchPlan {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.cache_hits.is_empty() && self.pending.is_empty()
    }
}

/// A completed fetch as seen by one waiting instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub indicator: IndicatorId,
    pub fingerprint: Fingerprint,
    pub outcome: Result<Arc<SeriesPayload>, EngineError>,
}

#[derive(Debug, Clone)]
struct InFlight {
    ticket: FetchTicket,
    waiters: Vec<IndicatorId>,
    custom: bool,
}

#[derive(Debug)]
pub struct FetchController {
    next_ticket: u64,
    /// Last fingerprint requested on behalf of each instance.
    requested: HashMap<IndicatorId, Fingerprint>,
    in_flight: HashMap<Fingerprint, InFlight>,
    tickets: HashMap<FetchTicket, Fingerprint>,
    cache: ResultCache,
}

impl FetchController {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            next_ticket: 1,
            requested: HashMap::new(),
            in_flight: HashMap::new(),
            tickets: HashMap::new(),
            cache: ResultCache::new(cache_capacity),
        }
    }

    /// Tickets are shared with candle loads so every job is distinguishable.
    pub fn issue_ticket(&mut self) -> FetchTicket {
        let ticket = FetchTicket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Drop the request record for an instance so the next reconcile fetches
    /// it again (edit-and-resubmit, removal).
    pub fn forget(&mut self, id: IndicatorId) {
        self.requested.remove(&id);
    }

    /// Drop a cached result so the next request for it goes to the backend.
    pub fn invalidate(&mut self, fingerprint: &Fingerprint) -> bool {
        self.cache.remove(fingerprint).is_some()
    }

    pub fn reconcile(&mut self, snapshot: &StoreSnapshot) -> FetchPlan {
        self.requested.retain(|id, _| snapshot.get(*id).is_some());

        let mut plan = FetchPlan::default();
        for inst in snapshot.iter().filter(|i| i.enabled) {
            if self.requested.get(&inst.id) == Some(&inst.fingerprint) {
                continue;
            }
            self.requested.insert(inst.id, inst.fingerprint.clone());

            if let Some(data) = self.cache.get(&inst.fingerprint) {
                tracing::debug!(indicator = %inst.id, fingerprint = inst.fingerprint.short(), "served from cache");
                plan.cache_hits.push(CacheHit {
                    indicator: inst.id,
                    fingerprint: inst.fingerprint.clone(),
                    data,
                });
                continue;
            }

            if let Some(flight) = self.in_flight.get_mut(&inst.fingerprint) {
                if !flight.waiters.contains(&inst.id) {
                    flight.waiters.push(inst.id);
                }
                tracing::debug!(indicator = %inst.id, ticket = %flight.ticket, "attached to in-flight fetch");
                plan.pending.push(inst.id);
                continue;
            }

            let ticket = self.issue_ticket();
            let target = FetchTarget::for_instance(inst);
            self.in_flight.insert(
                inst.fingerprint.clone(),
                InFlight {
                    ticket,
                    waiters: vec![inst.id],
                    custom: target.is_custom(),
                },
            );
            self.tickets.insert(ticket, inst.fingerprint.clone());
            tracing::info!(
                indicator = %inst.id,
                %ticket,
                name = target.name(),
                context = %snapshot.context,
                "indicator fetch issued"
            );
            plan.requests.push(FetchRequest {
                ticket,
                fingerprint: inst.fingerprint.clone(),
                symbol: snapshot.context.symbol.clone(),
                interval: snapshot.context.interval,
                target,
            });
            plan.pending.push(inst.id);
        }
        plan
    }

    /// Resolve a finished fetch for every instance waiting on it.
    ///
    /// Successful payloads are validated and cached before fan-out. Unknown
    /// tickets resolve to nothing.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<SeriesPayload, BackendError>,
    ) -> Vec<Resolution> {
        let Some(fingerprint) = self.tickets.remove(&ticket) else {
            tracing::debug!(%ticket, "completion for unknown ticket ignored");
            return Vec::new();
        };
        let Some(flight) = self.in_flight.remove(&fingerprint) else {
            return Vec::new();
        };

        let outcome = match result {
            Ok(payload) => match payload.sanitize() {
                Ok(clean) => {
                    let data = Arc::new(clean);
                    self.cache.insert(fingerprint.clone(), Arc::clone(&data));
                    Ok(data)
                }
                Err(e) => Err(EngineError::MalformedPayload(e)),
            },
            Err(BackendError::Rejected(message)) if flight.custom => {
                Err(EngineError::InvalidCustomIndicator(message))
            }
            Err(e) => Err(EngineError::FetchFailed(e.to_string())),
        };

        if let Err(e) = &outcome {
            tracing::warn!(%ticket, error = %e, waiters = flight.waiters.len(), "indicator fetch failed");
        }

        flight
            .waiters
            .into_iter()
            .map(|indicator| Resolution {
                indicator,
                fingerprint: fingerprint.clone(),
                outcome: outcome.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Interval, MarketContext, SeriesPoint};
    use crate::indicators::{IndicatorStore, NewIndicator};

    fn store() -> IndicatorStore {
        let ctx = MarketContext::new(Symbol::parse("AAPL").unwrap(), Interval::Day1);
        IndicatorStore::new(ctx, Vec::new())
    }

    fn payload() -> SeriesPayload {
        SeriesPayload::Single(vec![SeriesPoint::new(1, 1.0), SeriesPoint::new(2, f64::NAN)])
    }

    #[test]
    fn identical_fingerprints_share_one_fetch() {
        let mut s = store();
        let a = s.add(NewIndicator::builtin("SMA")).unwrap();
        let b = s.add(NewIndicator::builtin("SMA")).unwrap();
        let mut c = FetchController::new(8);

        let plan = c.reconcile(&s.snapshot());
        assert_eq!(plan.requests.len(), 1);
        assert_eq!(plan.pending, vec![a, b]);

        let resolutions = c.complete(plan.requests[0].ticket, Ok(payload()));
        let ids: Vec<_> = resolutions.iter().map(|r| r.indicator).collect();
        assert_eq!(ids, vec![a, b]);
        let data = resolutions[0].outcome.as_ref().unwrap();
        assert_eq!(data.point_count(), 1);
        assert!(Arc::ptr_eq(data, resolutions[1].outcome.as_ref().unwrap()));
    }

    #[test]
    fn requested_fingerprints_are_not_refetched() {
        let mut s = store();
        let a = s.add(NewIndicator::builtin("RSI")).unwrap();
        let mut c = FetchController::new(8);
        let plan = c.reconcile(&s.snapshot());
        assert_eq!(plan.requests.len(), 1);
        assert!(c.reconcile(&s.snapshot()).is_empty());

        s.set_enabled(a, false).unwrap();
        assert!(c.reconcile(&s.snapshot()).is_empty());
        s.set_enabled(a, true).unwrap();
        assert!(c.reconcile(&s.snapshot()).is_empty());
    }

    #[test]
    fn disabled_instances_are_not_fetched() {
        let mut s = store();
        s.add(NewIndicator::builtin("EMA").enabled(false)).unwrap();
        let mut c = FetchController::new(8);
        assert!(c.reconcile(&s.snapshot()).is_empty());
    }

    #[test]
    fn cached_results_skip_the_backend() {
        let mut s = store();
        let a = s.add(NewIndicator::builtin("SMA")).unwrap();
        let mut c = FetchController::new(8);
        let plan = c.reconcile(&s.snapshot());
        c.complete(plan.requests[0].ticket, Ok(payload()));

        s.set_parameters(a, [("period".to_string(), 50.0)].into()).unwrap();
        assert_eq!(c.reconcile(&s.snapshot()).requests.len(), 1);

        s.set_parameters(a, [("period".to_string(), 20.0)].into()).unwrap();
        let plan = c.reconcile(&s.snapshot());
        assert!(plan.requests.is_empty());
        assert_eq!(plan.cache_hits.len(), 1);
        assert_eq!(plan.cache_hits[0].indicator, a);
    }

    #[test]
    fn custom_rejection_keeps_message() {
        let mut s = store();
        s.add(NewIndicator::custom("Mine", "x = 1")).unwrap();
        let mut c = FetchController::new(8);
        let plan = c.reconcile(&s.snapshot());
        assert!(plan.requests[0].target.is_custom());
        let res = c.complete(
            plan.requests[0].ticket,
            Err(BackendError::Rejected("Custom indicator not found in the executed code".into())),
        );
        assert_eq!(
            res[0].outcome,
            Err(EngineError::InvalidCustomIndicator(
                "Custom indicator not found in the executed code".into()
            ))
        );
    }

    #[test]
    fn failures_are_not_retried_until_forgotten() {
        let mut s = store();
        let a = s.add(NewIndicator::builtin("SMA")).unwrap();
        let mut c = FetchController::new(8);
        let plan = c.reconcile(&s.snapshot());
        let res = c.complete(plan.requests[0].ticket, Err(BackendError::Network("down".into())));
        assert!(matches!(res[0].outcome, Err(EngineError::FetchFailed(_))));
        assert!(c.reconcile(&s.snapshot()).is_empty());

        c.forget(a);
        assert_eq!(c.reconcile(&s.snapshot()).requests.len(), 1);
    }

    #[test]
    fn malformed_payloads_fail_and_are_not_cached() {
        let mut s = store();
        s.add(NewIndicator::builtin("SMA")).unwrap();
        let mut c = FetchController::new(8);
        let plan = c.reconcile(&s.snapshot());
        let bad = SeriesPayload::Single(vec![SeriesPoint::new(5, 1.0), SeriesPoint::new(3, 1.0)]);
        let res = c.complete(plan.requests[0].ticket, Ok(bad));
        assert!(matches!(res[0].outcome, Err(EngineError::MalformedPayload(_))));
        assert!(c.cache().is_empty());
    }

    #[test]
    fn unknown_ticket_resolves_nothing() {
        let mut c = FetchController::new(8);
        assert!(c.complete(FetchTicket(99), Ok(payload())).is_empty());
    }
}
