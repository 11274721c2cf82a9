// Multi-map base (Section 4.2): owns one element map per key kind plus
// one reverse map keyed by entity-snapshot identity, and provides
// atomic registration/deregistration of an element across all its
// non-null keys.

use std::collections::HashSet;

use super::element::{CacheElement, ElementId};
use super::element_map::ElementMap;
use super::entity::{Entity, Lookup};

pub(super) struct MultiMapBase<E: Entity> {
    id_map: ElementMap<E::IdKey, E>,
    name_map: ElementMap<E::NameKey, E>,
    aux_map: ElementMap<E::AuxKey, E>,
    /// The reverse map keyed by entity-snapshot identity (the fourth key
    /// kind in the spec). Since an `ElementId` and the `CacheElement` it
    /// names are in a 1:1 bijection by construction, the identity key
    /// collapses to the id itself: no separate pointer-keyed hash map is
    /// needed to preserve the "does this exact snapshot exist" check the
    /// source performs.
    snapshot_map: HashSet<ElementId<E>>,
}

impl<E: Entity> MultiMapBase<E> {
    pub fn new() -> Self {
        MultiMapBase {
            id_map: ElementMap::new(),
            name_map: ElementMap::new(),
            aux_map: ElementMap::new(),
            snapshot_map: HashSet::new(),
        }
    }

    pub fn get(&self, key: &Lookup<E>) -> Option<ElementId<E>> {
        match key {
            Lookup::Id(k) => self.id_map.get(k),
            Lookup::Name(k) => self.name_map.get(k),
            Lookup::Aux(k) => self.aux_map.get(k),
        }
    }

    pub fn is_present(&self, key: &Lookup<E>) -> bool {
        match key {
            Lookup::Id(k) => self.id_map.is_present(k),
            Lookup::Name(k) => self.name_map.is_present(k),
            Lookup::Aux(k) => self.aux_map.is_present(k),
        }
    }

    pub fn is_missed(&self, key: &Lookup<E>) -> bool {
        match key {
            Lookup::Id(k) => self.id_map.is_missed(k),
            Lookup::Name(k) => self.name_map.is_missed(k),
            Lookup::Aux(k) => self.aux_map.is_missed(k),
        }
    }

    pub fn set_missed(&mut self, key: Lookup<E>) {
        match key {
            Lookup::Id(k) => self.id_map.set_missed(k),
            Lookup::Name(k) => self.name_map.set_missed(k),
            Lookup::Aux(k) => self.aux_map.set_missed(k),
        }
    }

    /// A negative load (`put(key, None)`) consumes the missed entry
    /// outright rather than merely flagging it handled, so that the
    /// waiting loop in `get` (which loops `while is_missed`) is
    /// guaranteed to observe completion. Returns whether `key` had been
    /// missed at all (controls whether a broadcast is warranted).
    pub fn clear_missed(&mut self, key: &Lookup<E>) -> bool {
        let was_missed = self.is_missed(key);
        if was_missed {
            match key {
                Lookup::Id(k) => self.id_map.clear_missed(k),
                Lookup::Name(k) => self.name_map.clear_missed(k),
                Lookup::Aux(k) => self.aux_map.clear_missed(k),
            }
        }
        was_missed
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot_map.len()
    }

    pub fn snapshot_ids(&self) -> Vec<ElementId<E>> {
        self.snapshot_map.iter().copied().collect()
    }

    /// Mirrors the source's per-kind `is_missed` / `set_miss_handled`
    /// checks run against an element's own derived keys during `put`.
    /// Returns whether any of the element's non-null keys was missed.
    pub fn mark_keys_handled(&mut self, element: &CacheElement<E>) -> bool {
        let mut any_missed = false;
        if let Some(k) = &element.id_key {
            if self.id_map.is_missed(k) {
                any_missed = true;
                self.id_map.set_miss_handled(k);
            }
        }
        if let Some(k) = &element.name_key {
            if self.name_map.is_missed(k) {
                any_missed = true;
                self.name_map.set_miss_handled(k);
            }
        }
        if let Some(k) = &element.aux_key {
            if self.aux_map.is_missed(k) {
                any_missed = true;
                self.aux_map.set_miss_handled(k);
            }
        }
        any_missed
    }

    pub fn all_keys_present(&self, element: &CacheElement<E>) -> bool {
        element.id_key.as_ref().map_or(true, |k| self.id_map.is_present(k))
            && element.name_key.as_ref().map_or(true, |k| self.name_map.is_present(k))
            && element.aux_key.as_ref().map_or(true, |k| self.aux_map.is_present(k))
    }

    pub fn no_keys_present(&self, element: &CacheElement<E>) -> bool {
        element.id_key.as_ref().map_or(true, |k| !self.id_map.is_present(k))
            && element.name_key.as_ref().map_or(true, |k| !self.name_map.is_present(k))
            && element.aux_key.as_ref().map_or(true, |k| !self.aux_map.is_present(k))
    }

    /// Register `id` under every non-null key of `element`, and in the
    /// snapshot map. Precondition: none of those keys are present yet
    /// (checked by `ElementMap::insert`'s debug assertion).
    pub fn add_single_element(&mut self, id: ElementId<E>, element: &CacheElement<E>) {
        if let Some(k) = &element.id_key {
            self.id_map.insert(k.clone(), id);
        }
        if let Some(k) = &element.name_key {
            self.name_map.insert(k.clone(), id);
        }
        if let Some(k) = &element.aux_key {
            self.aux_map.insert(k.clone(), id);
        }
        self.snapshot_map.insert(id);
    }

    /// Deregister `id` from every non-null key of `element`, and from
    /// the snapshot map. Precondition: every non-null key is present and
    /// not missed (checked by `ElementMap::remove`'s debug assertion).
    pub fn remove_single_element(&mut self, id: ElementId<E>, element: &CacheElement<E>) {
        if let Some(k) = &element.id_key {
            debug_assert!(!self.id_map.is_missed(k));
            self.id_map.remove(k);
        }
        if let Some(k) = &element.name_key {
            debug_assert!(!self.name_map.is_missed(k));
            self.name_map.remove(k);
        }
        if let Some(k) = &element.aux_key {
            debug_assert!(!self.aux_map.is_missed(k));
            self.aux_map.remove(k);
        }
        self.snapshot_map.remove(&id);
    }
}
