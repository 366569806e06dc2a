//! Bounded result cache keyed by fingerprint.

use crate::domain::SeriesPayload;
use crate::fingerprint::Fingerprint;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Insertion-ordered cache; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct ResultCache {
    capacity: usize,
    entries: HashMap<Fingerprint, Arc<SeriesPayload>>,
    order: VecDeque<Fingerprint>,
}

impl ResultCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<SeriesPayload>> {
        self.entries.get(fingerprint).cloned()
    }

    pub fn insert(&mut self, fingerprint: Fingerprint, payload: Arc<SeriesPayload>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(fingerprint.clone(), payload).is_some() {
            return;
        }
        self.order.push_back(fingerprint);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Option<Arc<SeriesPayload>> {
        let removed = self.entries.remove(fingerprint)?;
        self.order.retain(|f| f != fingerprint);
        Some(removed)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
