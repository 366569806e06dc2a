//! Pane allocator: keeps panes and series in line with the indicator store.
//!
//! Reconciliation is incremental: each instance has at most one binding, and
//! a pass only touches bindings whose desired shape or data changed. Running
//! it twice on the same snapshot does nothing the second time.

use super::registry::{Pane, PaneRegistry, PaneRole};
use super::surface::{ChartSurface, SeriesKind, SeriesStyle, SurfaceFactory};
use crate::domain::{IndicatorId, PaneId, SeriesHandle, SeriesPayload, SINGLE_LINE_KEY};
use crate::indicators::{IndicatorInstance, PlotTarget, StoreSnapshot};
use crate::sync::SyncCoordinator;
use std::collections::HashMap;
use std::sync::Arc;

/// Counts of what one reconcile pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationReport {
    pub panes_created: usize,
    pub panes_destroyed: usize,
    pub series_added: usize,
    pub series_removed: usize,
    pub data_pushes: usize,
}

impl AllocationReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone)]
struct Binding {
    target: PlotTarget,
    pane: PaneId,
    /// `(line key, handle)` in payload draw order.
    series: Vec<(String, SeriesHandle)>,
    color: String,
    label: String,
    data: Option<Arc<SeriesPayload>>,
}

#[derive(Debug, Default)]
pub struct PaneAllocator {
    bindings: HashMap<IndicatorId, Binding>,
    layout: Vec<PaneId>,
}

impl PaneAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Separate panes in store order.
    pub fn pane_layout(&self) -> &[PaneId] {
        &self.layout
    }

    /// The pane an instance is currently drawn on, if any.
    pub fn pane_of(&self, id: IndicatorId) -> Option<PaneId> {
        self.bindings.get(&id).map(|b| b.pane)
    }

    pub fn reconcile<F: SurfaceFactory>(
        &mut self,
        snapshot: &StoreSnapshot,
        registry: &mut PaneRegistry<F::Surface>,
        coordinator: &mut SyncCoordinator,
        factory: &mut F,
    ) -> AllocationReport {
        let mut report = AllocationReport::default();

        // Tear down bindings that should not exist or changed target.
        let stale: Vec<IndicatorId> = self
            .bindings
            .iter()
            .filter(|(id, binding)| {
                snapshot
                    .get(**id)
                    .and_then(desired_target)
                    .map_or(true, |target| target != binding.target)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(binding) = self.bindings.remove(&id) {
                self.teardown(id, binding, registry, coordinator, factory, &mut report);
            }
        }

        for inst in snapshot.iter() {
            let Some(target) = desired_target(inst) else {
                continue;
            };
            if !self.bindings.contains_key(&inst.id) {
                let pane = match target {
                    PlotTarget::Overlay => match registry.main_pane() {
                        Some(pane) => pane,
                        None => {
                            tracing::warn!(indicator = %inst.id, "no main pane; overlay skipped");
                            continue;
                        }
                    },
                    PlotTarget::Separate => {
                        match create_pane(inst.id, registry, coordinator, factory) {
                            Some(pane) => {
                                report.panes_created += 1;
                                pane
                            }
                            None => continue,
                        }
                    }
                };
                self.bindings.insert(
                    inst.id,
                    Binding {
                        target,
                        pane,
                        series: Vec::new(),
                        color: inst.color.clone(),
                        label: inst.label(),
                        data: None,
                    },
                );
            }
            if let Some(binding) = self.bindings.get_mut(&inst.id) {
                sync_series(inst, binding, registry, &mut report);
            }
        }

        self.layout = snapshot
            .iter()
            .filter_map(|inst| {
                self.bindings
                    .get(&inst.id)
                    .filter(|b| b.target == PlotTarget::Separate)
                    .map(|b| b.pane)
            })
            .collect();

        if !report.is_noop() {
            tracing::debug!(?report, "panes reconciled");
        }
        report
    }

    fn teardown<F: SurfaceFactory>(
        &mut self,
        id: IndicatorId,
        binding: Binding,
        registry: &mut PaneRegistry<F::Surface>,
        coordinator: &mut SyncCoordinator,
        factory: &mut F,
        report: &mut AllocationReport,
    ) {
        match binding.target {
            PlotTarget::Overlay => {
                if let Some(surface) = registry.surface_mut(binding.pane) {
                    detach_series(surface, id, binding.series.iter().map(|(_, h)| *h), report);
                }
            }
            PlotTarget::Separate => {
                coordinator.unregister_pane(binding.pane);
                if let Some(pane) = registry.remove(binding.pane) {
                    factory.dispose(pane.id, pane.surface);
                }
                report.panes_destroyed += 1;
                tracing::info!(indicator = %id, pane = %binding.pane, "indicator pane destroyed");
            }
        }
    }
}

/// Where an instance should be drawn right now, if anywhere.
///
/// A separate pane exists for as long as the instance is enabled and
/// targeted there, data or not; overlays need data to exist at all.
fn desired_target(inst: &IndicatorInstance) -> Option<PlotTarget> {
    if !inst.enabled {
        return None;
    }
    match inst.plot_target {
        PlotTarget::Separate => Some(PlotTarget::Separate),
        PlotTarget::Overlay if inst.data.is_some() => Some(PlotTarget::Overlay),
        PlotTarget::Overlay => None,
    }
}

fn create_pane<F: SurfaceFactory>(
    id: IndicatorId,
    registry: &mut PaneRegistry<F::Surface>,
    coordinator: &mut SyncCoordinator,
    factory: &mut F,
) -> Option<PaneId> {
    let pane = registry.allocate_id();
    let role = PaneRole::Indicator(id);
    let surface = match factory.create(pane, role) {
        Ok(surface) => surface,
        Err(e) => {
            tracing::warn!(indicator = %id, error = %e, "failed to create indicator pane");
            return None;
        }
    };
    registry.insert(Pane { id: pane, role, surface });
    if let Err(e) = coordinator.register_pane(registry, pane) {
        tracing::warn!(indicator = %id, error = %e, "failed to link indicator pane");
    }
    tracing::info!(indicator = %id, %pane, "indicator pane created");
    Some(pane)
}

/// Remove series from a surface. A failed removal is logged and the handle
/// forgotten either way.
fn detach_series<S: ChartSurface>(
    surface: &mut S,
    id: IndicatorId,
    handles: impl IntoIterator<Item = SeriesHandle>,
    report: &mut AllocationReport,
) {
    for handle in handles {
        if let Err(e) = surface.remove_series(handle) {
            tracing::warn!(indicator = %id, error = %e, "failed to remove series");
        }
        report.series_removed += 1;
    }
}

/// Bring a binding's series in line with the instance's data and style.
fn sync_series<S: ChartSurface>(
    inst: &IndicatorInstance,
    binding: &mut Binding,
    registry: &mut PaneRegistry<S>,
    report: &mut AllocationReport,
) {
    let Some(surface) = registry.surface_mut(binding.pane) else {
        return;
    };

    let Some(data) = &inst.data else {
        detach_series(surface, inst.id, binding.series.drain(..).map(|(_, h)| h), report);
        binding.data = None;
        return;
    };

    let keys = data.line_keys();
    let label = inst.label();
    let shape_changed = binding.series.len() != keys.len()
        || binding.series.iter().zip(&keys).any(|((k, _), key)| k != key)
        || binding.color != inst.color
        || binding.label != label;

    if shape_changed {
        detach_series(surface, inst.id, binding.series.drain(..).map(|(_, h)| h), report);
        binding.color = inst.color.clone();
        binding.label = label;
        binding.data = None;
        for key in &keys {
            let kind = if key == "histogram" {
                SeriesKind::Histogram
            } else {
                SeriesKind::Line
            };
            let title = series_title(&binding.label, key);
            match surface.add_series(kind, SeriesStyle::new(title, binding.color.clone())) {
                Ok(handle) => {
                    binding.series.push((key.clone(), handle));
                    report.series_added += 1;
                }
                Err(e) => tracing::warn!(indicator = %inst.id, error = %e, "failed to add series"),
            }
        }
    }

    let unchanged = binding
        .data
        .as_ref()
        .is_some_and(|current| Arc::ptr_eq(current, data));
    if unchanged {
        return;
    }
    for (key, points) in data.lines() {
        let Some((_, handle)) = binding.series.iter().find(|(k, _)| k == key) else {
            continue;
        };
        match surface.set_series_data(*handle, points) {
            Ok(()) => report.data_pushes += 1,
            Err(e) => tracing::warn!(indicator = %inst.id, error = %e, "failed to push series data"),
        }
    }
    binding.data = Some(Arc::clone(data));
}

/// Series title shown in legends and used as the crosshair price key.
pub fn series_title(label: &str, key: &str) -> String {
    if key == SINGLE_LINE_KEY {
        label.to_string()
    } else {
        format!("{label} {key}")
    }
}
