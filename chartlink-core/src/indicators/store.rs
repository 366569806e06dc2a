//! Indicator store: the single writer of indicator instance state.
//!
//! User-facing mutators (`add`, `remove`, `set_*`) change definitions and
//! presentation. Fetch-facing mutators (`mark_pending`, `apply_computed_data`,
//! `mark_error`) change data and status, and refuse results whose
//! fingerprint no longer matches the instance.

use super::catalog::{self, palette_color};
use super::instance::{
    FetchStatus, IndicatorDefinition, IndicatorInstance, IndicatorKind, NewIndicator, PlotTarget,
};
use crate::domain::{IndicatorId, MarketContext, SeriesPayload};
use crate::error::{EngineError, EngineResult};
use crate::fingerprint::{Fingerprint, FingerprintInput};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Consistent, owned view of the store at one point in time.
///
/// Payloads are shared via `Arc`, so taking a snapshot is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub context: MarketContext,
    pub instances: Vec<IndicatorInstance>,
}

impl StoreSnapshot {
    pub fn get(&self, id: IndicatorId) -> Option<&IndicatorInstance> {
        self.instances.iter().find(|i| i.id == id)
    }

    pub fn position(&self, id: IndicatorId) -> Option<usize> {
        self.instances.iter().position(|i| i.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndicatorInstance> {
        self.instances.iter()
    }
}

/// Ordered list of indicator instances for one chart.
#[derive(Debug, Clone)]
pub struct IndicatorStore {
    instances: Vec<IndicatorInstance>,
    context: MarketContext,
    palette: Vec<String>,
    next_id: u64,
}

impl IndicatorStore {
    pub fn new(context: MarketContext, palette: Vec<String>) -> Self {
        Self {
            instances: Vec::new(),
            context,
            palette,
            next_id: 1,
        }
    }

    pub fn context(&self) -> &MarketContext {
        &self.context
    }

    pub fn list(&self) -> &[IndicatorInstance] {
        &self.instances
    }

    pub fn get(&self, id: IndicatorId) -> Option<&IndicatorInstance> {
        self.instances.iter().find(|i| i.id == id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            context: self.context.clone(),
            instances: self.instances.clone(),
        }
    }

    /// Create an instance. Starts `Idle`, enabled unless overridden.
    pub fn add(&mut self, new: NewIndicator) -> EngineResult<IndicatorId> {
        let slot = (self.next_id - 1) as usize;
        let (kind, name, parameters, source_code, catalog_target, catalog_color) =
            match new.definition {
                IndicatorDefinition::BuiltIn { name, parameters } => {
                    let spec = catalog::lookup(&name)
                        .ok_or_else(|| EngineError::UnknownBuiltin(name.clone()))?;
                    let parameters = spec.resolve_parameters(&parameters)?;
                    (
                        IndicatorKind::BuiltIn,
                        spec.name.to_string(),
                        parameters,
                        None,
                        spec.default_target,
                        Some(spec.color.to_string()),
                    )
                }
                IndicatorDefinition::Custom(def) => {
                    let name = def.name.trim().to_string();
                    if name.is_empty() {
                        return Err(EngineError::InvalidDefinition("name must not be empty".into()));
                    }
                    if def.source_code.trim().is_empty() {
                        return Err(EngineError::InvalidDefinition("source code must not be empty".into()));
                    }
                    (
                        IndicatorKind::Custom,
                        name,
                        BTreeMap::new(),
                        Some(def.source_code),
                        PlotTarget::Overlay,
                        None,
                    )
                }
            };

        let id = IndicatorId(self.next_id);
        self.next_id += 1;

        let color = new
            .color
            .or(catalog_color)
            .unwrap_or_else(|| palette_color(&self.palette, slot));

        let fingerprint = compute_fingerprint(
            &self.context,
            kind,
            &name,
            &parameters,
            source_code.as_deref(),
        );

        self.instances.push(IndicatorInstance {
            id,
            kind,
            name,
            parameters,
            source_code,
            plot_target: new.plot_target.unwrap_or(catalog_target),
            enabled: new.enabled.unwrap_or(true),
            color,
            data: None,
            fingerprint,
            status: FetchStatus::Idle,
            last_error: None,
        });
        tracing::debug!(%id, "indicator added");
        Ok(id)
    }

    /// Delete an instance. Unknown ids are a no-op; returns whether anything was removed.
    pub fn remove(&mut self, id: IndicatorId) -> bool {
        let before = self.instances.len();
        self.instances.retain(|i| i.id != id);
        before != self.instances.len()
    }

    /// Presentation-only: fingerprint, data and status are untouched.
    pub fn set_enabled(&mut self, id: IndicatorId, enabled: bool) -> EngineResult<bool> {
        let inst = self.get_mut(id)?;
        let changed = inst.enabled != enabled;
        inst.enabled = enabled;
        Ok(changed)
    }

    /// Presentation-only: fingerprint, data and status are untouched.
    pub fn set_plot_target(&mut self, id: IndicatorId, target: PlotTarget) -> EngineResult<bool> {
        let inst = self.get_mut(id)?;
        let changed = inst.plot_target != target;
        inst.plot_target = target;
        Ok(changed)
    }

    /// Presentation-only: fingerprint, data and status are untouched.
    pub fn set_color(&mut self, id: IndicatorId, color: impl Into<String>) -> EngineResult<bool> {
        let color = color.into();
        let inst = self.get_mut(id)?;
        let changed = inst.color != color;
        inst.color = color;
        Ok(changed)
    }

    /// Replace parameters. Built-ins are resolved against the catalog (missing keys take defaults).
    ///
    /// Returns true when the fingerprint changed, in which case the instance
    /// is reset to `Pending` with no data.
    pub fn set_parameters(
        &mut self,
        id: IndicatorId,
        parameters: BTreeMap<String, f64>,
    ) -> EngineResult<bool> {
        let inst = self.get(id).ok_or(EngineError::UnknownIndicator(id))?;
        let resolved = match inst.kind {
            IndicatorKind::BuiltIn => catalog::lookup(&inst.name)
                .ok_or_else(|| EngineError::UnknownBuiltin(inst.name.clone()))?
                .resolve_parameters(&parameters)?,
            IndicatorKind::Custom => {
                if let Some((name, _)) = parameters.iter().find(|(_, v)| !v.is_finite()) {
                    return Err(EngineError::InvalidParameter {
                        name: name.clone(),
                        reason: "must be a finite number".into(),
                    });
                }
                parameters
            }
        };

        let context = self.context.clone();
        let inst = self.get_mut(id)?;
        inst.parameters = resolved;
        Ok(refresh_fingerprint(inst, &context))
    }

    /// Replace a custom indicator's source (edit-and-resubmit after a rejection).
    pub fn set_source(&mut self, id: IndicatorId, source_code: impl Into<String>) -> EngineResult<bool> {
        let source_code = source_code.into();
        if source_code.trim().is_empty() {
            return Err(EngineError::InvalidDefinition("source code must not be empty".into()));
        }
        let context = self.context.clone();
        let inst = self.get_mut(id)?;
        if inst.kind != IndicatorKind::Custom {
            return Err(EngineError::InvalidDefinition(format!(
                "{id} is a built-in indicator and has no source"
            )));
        }
        inst.source_code = Some(source_code);
        Ok(refresh_fingerprint(inst, &context))
    }

    /// Switch symbol/interval. Every fingerprint includes the context, so all
    /// instances are re-fingerprinted; returns the ids that were invalidated.
    pub fn set_context(&mut self, context: MarketContext) -> Vec<IndicatorId> {
        if context == self.context {
            return Vec::new();
        }
        self.context = context;
        let context = self.context.clone();
        self.instances
            .iter_mut()
            .filter_map(|inst| refresh_fingerprint(inst, &context).then_some(inst.id))
            .collect()
    }

    /// A fetch has been issued (or joined) for the instance's current fingerprint.
    pub fn mark_pending(&mut self, id: IndicatorId) -> EngineResult<()> {
        let inst = self.get_mut(id)?;
        inst.status = FetchStatus::Pending;
        inst.last_error = None;
        Ok(())
    }

    /// Merge a computed payload. Refused with `StaleResponseDiscarded` when
    /// `fingerprint` is not the instance's current one.
    pub fn apply_computed_data(
        &mut self,
        id: IndicatorId,
        fingerprint: &Fingerprint,
        data: Arc<SeriesPayload>,
    ) -> EngineResult<()> {
        let inst = self.get_mut(id)?;
        ensure_current(inst, fingerprint)?;
        inst.data = Some(data);
        inst.status = FetchStatus::Ready;
        inst.last_error = None;
        Ok(())
    }

    /// Record a failed fetch. Last-known-good data is kept.
    pub fn mark_error(
        &mut self,
        id: IndicatorId,
        fingerprint: &Fingerprint,
        message: impl Into<String>,
    ) -> EngineResult<()> {
        let inst = self.get_mut(id)?;
        ensure_current(inst, fingerprint)?;
        inst.status = FetchStatus::Error;
        inst.last_error = Some(message.into());
        Ok(())
    }

    fn get_mut(&mut self, id: IndicatorId) -> EngineResult<&mut IndicatorInstance> {
        self.instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(EngineError::UnknownIndicator(id))
    }
}

fn compute_fingerprint(
    context: &MarketContext,
    kind: IndicatorKind,
    name: &str,
    parameters: &BTreeMap<String, f64>,
    source_code: Option<&str>,
) -> Fingerprint {
    FingerprintInput {
        context,
        kind,
        name,
        parameters,
        source_code,
    }
    .fingerprint()
}

/// Recompute the fingerprint; on change, drop data so stale numbers are never shown as current.
fn refresh_fingerprint(inst: &mut IndicatorInstance, context: &MarketContext) -> bool {
    let fingerprint = compute_fingerprint(
        context,
        inst.kind,
        &inst.name,
        &inst.parameters,
        inst.source_code.as_deref(),
    );
    if fingerprint == inst.fingerprint {
        return false;
    }
    inst.fingerprint = fingerprint;
    inst.status = FetchStatus::Pending;
    inst.data = None;
    inst.last_error = None;
    true
}

fn ensure_current(inst: &IndicatorInstance, fingerprint: &Fingerprint) -> EngineResult<()> {
    if &inst.fingerprint == fingerprint {
        Ok(())
    } else {
        Err(EngineError::StaleResponseDiscarded {
            indicator: inst.id,
            fetched: fingerprint.short().to_string(),
            current: inst.fingerprint.short().to_string(),
        })
    }
}
