// Element map (Section 4.1): a bidirectional mapping between keys of a
// single kind and cache elements, augmented with a "miss in progress"
// marker set.

use std::collections::HashMap;
use std::hash::Hash;

use super::element::ElementId;

/// One per key kind. `present` holds keys whose element is fully
/// registered; `missed` holds keys whose load is currently in flight.
/// Invariant I2 (enforced by construction, not checked at runtime on
/// every call): a key never appears in both maps at once.
pub(super) struct ElementMap<K, E> {
    present: HashMap<K, ElementId<E>>,
    missed: HashMap<K, bool>,
}

impl<K: Clone + Eq + Hash, E> ElementMap<K, E> {
    pub fn new() -> Self {
        ElementMap {
            present: HashMap::new(),
            missed: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<ElementId<E>> {
        self.present.get(key).copied()
    }

    pub fn is_present(&self, key: &K) -> bool {
        self.present.contains_key(key)
    }

    pub fn is_missed(&self, key: &K) -> bool {
        self.missed.contains_key(key)
    }

    /// Mark `key` as missed (a loader is now in flight for it).
    /// Precondition: `key` is absent from `present`.
    pub fn set_missed(&mut self, key: K) {
        debug_assert!(!self.present.contains_key(&key));
        self.missed.insert(key, false);
    }

    /// Flip the `handled` flag for a missed key, leaving the entry in
    /// place. The entry itself is removed only when the loader's `put`
    /// actually inserts (or, for a negative load, explicitly clears) it.
    pub fn set_miss_handled(&mut self, key: &K) {
        if let Some(handled) = self.missed.get_mut(key) {
            *handled = true;
        }
    }

    /// Clear a missed marker outright (used for negative loads and once
    /// a positive load has registered the element).
    pub fn clear_missed(&mut self, key: &K) {
        self.missed.remove(key);
    }

    /// Insert a new present entry. Precondition: `key` is absent from
    /// `present`.
    pub fn insert(&mut self, key: K, id: ElementId<E>) {
        let prior = self.present.insert(key.clone(), id);
        debug_assert!(prior.is_none(), "element_map insert requires key absent");
        self.missed.remove(&key);
    }

    /// Remove a present entry. Precondition: `key` is present.
    pub fn remove(&mut self, key: &K) {
        let removed = self.present.remove(key);
        debug_assert!(removed.is_some(), "element_map remove requires key present");
    }
}
