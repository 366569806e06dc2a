//! Sync coordinator: owns the shared viewport and fans changes out to panes.
//!
//! A change reported by one pane is merged into the shared viewport and then
//! applied to every other linked pane through the silent apply path. The
//! originating pane is never written back to.
//!
//! Surfaces that report their own applies (`echoes_applies`) get a per-pane
//! queue of the patches applied to them. An incoming change from such a pane
//! that equals the oldest queued patch is its echo and is dropped; any other
//! change is genuine and clears the queue. Silent surfaces never have changes
//! suppressed.

use super::handle::ViewportHandle;
use crate::domain::{CrosshairUpdate, PaneId, Viewport, ViewportPatch};
use crate::error::{EngineError, EngineResult};
use crate::panes::PaneRegistry;
use std::collections::{HashMap, VecDeque};

/// Pending echoes remembered per echoing pane.
const ECHO_WINDOW: usize = 8;

/// What happened to a reported viewport change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Merged and applied to these panes (origin excluded, failures excluded).
    Propagated { targets: Vec<PaneId> },
    /// The change was our own apply coming back; nothing was done.
    SuppressedEcho,
    /// The origin is not linked (never registered, or already unregistered).
    UnknownOrigin,
}

#[derive(Debug, Default)]
pub struct SyncCoordinator {
    viewport: Viewport,
    linked: Vec<PaneId>,
    expected_echoes: HashMap<PaneId, VecDeque<ViewportPatch>>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared viewport.
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Linked panes in registration order.
    pub fn linked_panes(&self) -> &[PaneId] {
        &self.linked
    }

    pub fn is_linked(&self, pane: PaneId) -> bool {
        self.linked.contains(&pane)
    }

    /// Link a pane that is already in the registry.
    ///
    /// The first pane seeds the shared viewport from its surface; every later
    /// pane is brought in line with the shared viewport immediately.
    pub fn register_pane<S: ViewportHandle>(
        &mut self,
        registry: &mut PaneRegistry<S>,
        pane: PaneId,
    ) -> EngineResult<()> {
        let surface = registry
            .surface_mut(pane)
            .ok_or(EngineError::UnknownPane(pane))?;
        if self.linked.contains(&pane) {
            return Ok(());
        }

        if self.linked.is_empty() {
            self.viewport = surface.viewport();
        } else {
            let patch = localize(&self.viewport.as_patch(), surface);
            let echoes = surface.echoes_applies();
            match surface.apply_viewport(&patch) {
                Ok(()) if echoes => self.expect_echo(pane, patch),
                Ok(()) => {}
                Err(e) => tracing::warn!(%pane, error = %e, "initial viewport apply failed"),
            }
        }
        self.linked.push(pane);
        tracing::debug!(%pane, linked = self.linked.len(), "pane linked");
        Ok(())
    }

    /// Unlink a pane. Returns false if it was not linked.
    pub fn unregister_pane(&mut self, pane: PaneId) -> bool {
        self.expected_echoes.remove(&pane);
        let before = self.linked.len();
        self.linked.retain(|p| *p != pane);
        before != self.linked.len()
    }

    /// Handle a viewport change reported by `origin`.
    pub fn on_pane_viewport_changed<S: ViewportHandle>(
        &mut self,
        registry: &mut PaneRegistry<S>,
        origin: PaneId,
        patch: &ViewportPatch,
    ) -> EngineResult<SyncOutcome> {
        patch.validate()?;

        if !self.linked.contains(&origin) {
            tracing::debug!(%origin, "viewport change from unlinked pane ignored");
            return Ok(SyncOutcome::UnknownOrigin);
        }

        if self.take_echo(origin, patch) {
            tracing::debug!(%origin, "echoed viewport change suppressed");
            return Ok(SyncOutcome::SuppressedEcho);
        }

        if patch.is_empty() {
            return Ok(SyncOutcome::Propagated { targets: Vec::new() });
        }

        self.viewport.apply(patch);

        let others: Vec<PaneId> = self.linked.iter().copied().filter(|p| *p != origin).collect();
        let mut targets = Vec::with_capacity(others.len());
        for target in others {
            let Some(surface) = registry.surface_mut(target) else {
                continue;
            };
            let local = localize(patch, surface);
            let echoes = surface.echoes_applies();
            match surface.apply_viewport(&local) {
                Ok(()) => {
                    if echoes {
                        self.expect_echo(target, local);
                    }
                    targets.push(target);
                }
                Err(e) => {
                    tracing::warn!(pane = %target, error = %e, "viewport apply failed; pane skipped");
                }
            }
        }
        Ok(SyncOutcome::Propagated { targets })
    }

    fn expect_echo(&mut self, pane: PaneId, patch: ViewportPatch) {
        let queue = self.expected_echoes.entry(pane).or_default();
        if queue.len() == ECHO_WINDOW {
            queue.pop_front();
        }
        queue.push_back(patch);
    }

    /// Echoes arrive in apply order, so only the oldest pending patch can match.
    /// A mismatch is a user change and makes every pending echo obsolete.
    fn take_echo(&mut self, pane: PaneId, patch: &ViewportPatch) -> bool {
        let Some(queue) = self.expected_echoes.get_mut(&pane) else {
            return false;
        };
        if queue.front() == Some(patch) {
            queue.pop_front();
            return true;
        }
        if !queue.is_empty() {
            tracing::debug!(pane = %pane, dropped = queue.len(), "user change supersedes pending echoes");
            queue.clear();
        }
        false
    }
}

/// Replace the crosshair's prices with the target pane's own series values.
fn localize<S: ViewportHandle>(patch: &ViewportPatch, surface: &S) -> ViewportPatch {
    let mut local = patch.clone();
    if let Some(CrosshairUpdate::Moved(crosshair)) = &mut local.crosshair {
        crosshair.series_prices = surface.series_prices_at(crosshair.time);
    }
    local
}
