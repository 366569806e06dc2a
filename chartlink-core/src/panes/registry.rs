//! Live panes and their surfaces.

use crate::domain::{IndicatorId, PaneId};

/// What a pane is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneRole {
    /// Price pane: candles plus overlay indicators.
    Main,
    /// Dedicated pane for one separate-target indicator.
    Indicator(IndicatorId),
}

#[derive(Debug)]
pub struct Pane<S> {
    pub id: PaneId,
    pub role: PaneRole,
    pub surface: S,
}

/// Ordered collection of live panes. Pane ids are never reused.
#[derive(Debug)]
pub struct PaneRegistry<S> {
    panes: Vec<Pane<S>>,
    next_id: u64,
}

impl<S> Default for PaneRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> PaneRegistry<S> {
    pub fn new() -> Self {
        Self {
            panes: Vec::new(),
            next_id: 1,
        }
    }

    /// Reserve the id for a pane about to be created.
    pub fn allocate_id(&mut self) -> PaneId {
        let id = PaneId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, pane: Pane<S>) {
        self.panes.push(pane);
    }

    pub fn remove(&mut self, id: PaneId) -> Option<Pane<S>> {
        let idx = self.panes.iter().position(|p| p.id == id)?;
        Some(self.panes.remove(idx))
    }

    pub fn get(&self, id: PaneId) -> Option<&Pane<S>> {
        self.panes.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: PaneId) -> Option<&mut Pane<S>> {
        self.panes.iter_mut().find(|p| p.id == id)
    }

    pub fn surface(&self, id: PaneId) -> Option<&S> {
        self.get(id).map(|p| &p.surface)
    }

    pub fn surface_mut(&mut self, id: PaneId) -> Option<&mut S> {
        self.get_mut(id).map(|p| &mut p.surface)
    }

    pub fn main_pane(&self) -> Option<PaneId> {
        self.panes
            .iter()
            .find(|p| p.role == PaneRole::Main)
            .map(|p| p.id)
    }

    pub fn pane_for(&self, indicator: IndicatorId) -> Option<PaneId> {
        self.panes
            .iter()
            .find(|p| p.role == PaneRole::Indicator(indicator))
            .map(|p| p.id)
    }

    pub fn ids(&self) -> Vec<PaneId> {
        self.panes.iter().map(|p| p.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pane<S>> {
        self.panes.iter()
    }

    pub fn len(&self) -> usize {
        self.panes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }
}
