// Shared multi-map (Section 4 / 7): the cache façade itself. Owns the
// element arena, the three index maps plus the snapshot map, the free
// list, and the bounded element pool behind one mutex, and coalesces
// concurrent misses on the same key through one condition variable.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{DbError, Result};

use super::autolocker::DeferredDrop;
use super::element::{slot, slot_mut, CacheElement, CacheHandle, ElementId};
use super::entity::{Entity, Loader, Lookup};
use super::free_list::FreeList;
use super::multi_map_base::MultiMapBase;

/// Default element capacity for a freshly constructed cache, chosen to
/// match the teacher's `query_cache`'s default entry ceiling.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Floor on `pool_capacity` once `capacity` is non-zero, so a small cache
/// still gets some wrapper reuse instead of allocating on every put.
pub const MIN_POOL_CAPACITY: usize = 16;

/// Configuration for a [`SharedMultiMap`].
#[derive(Debug, Clone)]
pub struct DictionaryCacheConfig {
    /// Maximum number of live entities the cache holds before it starts
    /// evicting unreferenced elements to make room. Zero is a valid,
    /// supported configuration: every unpinned insertion is evicted the
    /// moment it is no longer in use.
    pub capacity: usize,
    /// Maximum number of reset wrapper elements kept around for reuse
    /// once destroyed. Bounds the cache's worst-case memory footprint
    /// independently of `capacity`.
    pub pool_capacity: usize,
}

impl Default for DictionaryCacheConfig {
    fn default() -> Self {
        DictionaryCacheConfig {
            capacity: DEFAULT_CAPACITY,
            pool_capacity: DEFAULT_CAPACITY.max(MIN_POOL_CAPACITY),
        }
    }
}

impl DictionaryCacheConfig {
    pub fn new(capacity: usize) -> Self {
        DictionaryCacheConfig {
            capacity,
            pool_capacity: capacity.max(MIN_POOL_CAPACITY),
        }
    }

    /// Reject only the combination that would defeat the element pool's
    /// purpose: a non-zero capacity with no pool at all, which would
    /// force every single `put` to allocate a fresh wrapper. A zero
    /// `capacity` by itself is left valid (it is an explicit boundary
    /// case: every unpinned insertion is evicted immediately).
    pub fn validate(&self) -> Result<()> {
        if self.capacity != 0 && self.pool_capacity == 0 {
            return Err(DbError::DictionaryCache(
                "pool_capacity must be non-zero when capacity is non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The outcome of a [`SharedMultiMap::get`] call.
pub enum GetOutcome<E: Entity> {
    /// The entity was already cached (or arrived while we waited for a
    /// concurrent load to finish); `usage` has been incremented.
    Hit(CacheHandle<E>),
    /// A concurrent load for this key just completed negatively.
    NotFound,
    /// No entry and no load in flight: the caller is now responsible for
    /// loading the entity and calling `put` with the result.
    Load,
}

struct Inner<E: Entity> {
    arena: Vec<Option<CacheElement<E>>>,
    free_slots: Vec<usize>,
    maps: MultiMapBase<E>,
    free_list: FreeList<E>,
    element_pool: Vec<ElementId<E>>,
    capacity: usize,
    pool_capacity: usize,
}

impl<E: Entity> Inner<E> {
    fn new(config: &DictionaryCacheConfig) -> Self {
        Inner {
            arena: Vec::new(),
            free_slots: Vec::new(),
            maps: MultiMapBase::new(),
            free_list: FreeList::new(),
            element_pool: Vec::new(),
            capacity: config.capacity,
            pool_capacity: config.pool_capacity,
        }
    }

    /// Hand out a fresh, empty element slot: reuse a pooled (already
    /// reset) element first, then a vacated slot, then grow the arena.
    fn obtain_element(&mut self) -> ElementId<E> {
        if let Some(id) = self.element_pool.pop() {
            return id;
        }
        if let Some(index) = self.free_slots.pop() {
            let id = ElementId::new(index);
            self.arena[index] = Some(CacheElement::empty());
            return id;
        }
        tracing::debug!(
            pool_capacity = self.pool_capacity,
            "element pool empty, allocating a fresh wrapper"
        );
        let index = self.arena.len();
        self.arena.push(Some(CacheElement::empty()));
        ElementId::new(index)
    }

    /// If `key` names a live element, pin it (increment `usage`,
    /// detaching it from the free list if it was idle) and return it.
    fn use_if_present(&mut self, key: &Lookup<E>) -> Option<ElementId<E>> {
        let id = self.maps.get(key)?;
        if slot(&self.arena, id).is_free() {
            self.free_list.remove(&mut self.arena, id);
        }
        slot_mut(&mut self.arena, id).usage += 1;
        Some(id)
    }

    fn map_capacity_exceeded(&self) -> bool {
        self.maps.snapshot_len() > self.capacity
    }

    fn pool_capacity_exceeded(&self) -> bool {
        self.element_pool.len() >= self.pool_capacity
    }

    /// Tear down an unreferenced, non-sticky, registered element: drop
    /// its keys from the index maps, schedule its entity for deferred
    /// destruction, and either recycle the wrapper into the pool or
    /// schedule the wrapper itself for deferred destruction.
    fn remove(&mut self, id: ElementId<E>, deferred: &mut DeferredDrop<E>) {
        let mut element = self.arena[id.index()].take().expect("element slot unoccupied");
        debug_assert!(element.usage == 1 && !element.sticky && element.registered);
        self.maps.remove_single_element(id, &element);
        if let Some(entity) = element.object.take() {
            deferred.auto_delete_entity(entity);
        }
        if !self.pool_capacity_exceeded() {
            element.reinit();
            self.arena[id.index()] = Some(element);
            self.element_pool.push(id);
        } else {
            tracing::debug!(
                pool_capacity = self.pool_capacity,
                "element pool at capacity, destroying evicted wrapper instead of recycling it"
            );
            self.free_slots.push(id.index());
            deferred.auto_delete_element(element);
        }
    }

    /// Evict least-recently-used idle elements until the snapshot count
    /// is back within `capacity`, or the free list runs dry.
    fn rectify_free_list(&mut self, deferred: &mut DeferredDrop<E>) {
        while self.map_capacity_exceeded() {
            let Some(id) = self.free_list.get_lru() else {
                break;
            };
            tracing::debug!(
                capacity = self.capacity,
                live = self.maps.snapshot_len(),
                "evicting least recently used idle element over capacity"
            );
            self.free_list.remove(&mut self.arena, id);
            slot_mut(&mut self.arena, id).usage = 1;
            self.remove(id, deferred);
        }
    }

    /// Drop stickiness from every element and evict every element that
    /// is (or becomes) unreferenced, regardless of `capacity`.
    fn evict_all_unused(&mut self, deferred: &mut DeferredDrop<E>) {
        for id in self.maps.snapshot_ids() {
            let (was_sticky, now_idle) = {
                let e = slot_mut(&mut self.arena, id);
                let was_sticky = e.sticky;
                if was_sticky {
                    e.sticky = false;
                }
                (was_sticky, e.usage == 0)
            };
            if was_sticky && now_idle {
                self.free_list.add_last(&mut self.arena, id);
            }
        }
        while let Some(id) = self.free_list.get_lru() {
            self.free_list.remove(&mut self.arena, id);
            slot_mut(&mut self.arena, id).usage = 1;
            self.remove(id, deferred);
        }
    }
}

/// A concurrent, multi-indexed, reference-counted cache of entity
/// snapshots. One mutex guards all bookkeeping; entity and wrapper
/// destruction always happens after the mutex is released, via
/// [`DeferredDrop`].
pub struct SharedMultiMap<E: Entity> {
    inner: Mutex<Inner<E>>,
    miss_cv: Condvar,
}

impl<E: Entity> SharedMultiMap<E> {
    pub fn new(config: DictionaryCacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(SharedMultiMap {
            inner: Mutex::new(Inner::new(&config)),
            miss_cv: Condvar::new(),
        })
    }

    /// Look up `key`. Returns a pinned handle on a hit, `NotFound` if a
    /// concurrent load for this key just failed, or `Load` if the caller
    /// must now load the entity itself and report the outcome via `put`.
    pub fn get(&self, key: Lookup<E>) -> GetOutcome<E> {
        let mut guard = self.inner.lock();
        if let Some(id) = guard.use_if_present(&key) {
            return GetOutcome::Hit(CacheHandle::new(id));
        }
        if guard.maps.is_missed(&key) {
            while guard.maps.is_missed(&key) {
                self.miss_cv.wait(&mut guard);
            }
            return match guard.use_if_present(&key) {
                Some(id) => GetOutcome::Hit(CacheHandle::new(id)),
                None => GetOutcome::NotFound,
            };
        }
        guard.maps.set_missed(key);
        GetOutcome::Load
    }

    /// Report the outcome of a load previously requested via `get`'s
    /// `Load` result (or register a brand-new entity unconditionally).
    /// `None` reports a negative load. Returns a pinned handle to the
    /// entity now resident under `key`'s kind, unless the load was
    /// negative.
    pub fn put(&self, key: Lookup<E>, entity: Option<E>) -> Option<CacheHandle<E>> {
        let mut guard = self.inner.lock();
        let mut deferred = DeferredDrop::default();

        let entity = match entity {
            Some(e) => e,
            None => {
                let was_missed = guard.maps.clear_missed(&key);
                drop(guard);
                if was_missed {
                    self.miss_cv.notify_all();
                }
                drop(deferred);
                return None;
            }
        };

        let id = guard.obtain_element();
        {
            let e = slot_mut(&mut guard.arena, id);
            e.object = Some(Arc::new(entity));
            e.recreate_keys();
            debug_assert!(
                e.id_key.is_some() || e.name_key.is_some() || e.aux_key.is_some(),
                "an entity must derive at least one non-null key"
            );
        }

        let any_missed = {
            let element = slot(&guard.arena, id);
            guard.maps.mark_keys_handled(element)
        };
        let all_present = {
            let element = slot(&guard.arena, id);
            guard.maps.all_keys_present(element)
        };
        let none_present = {
            let element = slot(&guard.arena, id);
            guard.maps.no_keys_present(element)
        };

        let handle = if none_present {
            guard.rectify_free_list(&mut deferred);
            {
                let e = slot_mut(&mut guard.arena, id);
                e.usage = 1;
                e.registered = true;
            }
            {
                let element = slot(&guard.arena, id);
                guard.maps.add_single_element(id, element);
            }
            CacheHandle::new(id)
        } else if all_present {
            debug_assert!(!any_missed);
            // Another thread registered this entity's keys first; our
            // freshly obtained element loses the race and is recycled.
            let mut losing = guard.arena[id.index()].take().expect("element slot unoccupied");
            if let Some(obj) = losing.object.take() {
                deferred.auto_delete_entity(obj);
            }
            if !guard.pool_capacity_exceeded() {
                losing.reinit();
                guard.arena[id.index()] = Some(losing);
                guard.element_pool.push(id);
            } else {
                guard.free_slots.push(id.index());
                deferred.auto_delete_element(losing);
            }
            guard
                .use_if_present(&key)
                .map(CacheHandle::new)
                .expect("winning element must already be registered")
        } else {
            unreachable!("entity keys must be either all present or all absent after put");
        };

        drop(guard);
        if any_missed {
            self.miss_cv.notify_all();
        }
        drop(deferred);
        Some(handle)
    }

    /// Release one reference to a previously pinned handle. An element
    /// that drops to zero references (and is not sticky) joins the free
    /// list and may be evicted immediately if the cache is over capacity.
    pub fn release(&self, handle: CacheHandle<E>) {
        let mut guard = self.inner.lock();
        let mut deferred = DeferredDrop::default();
        let id = handle.id;
        let (usage, sticky) = {
            let e = slot_mut(&mut guard.arena, id);
            debug_assert!(e.usage > 0, "release on an element with no outstanding references");
            e.usage -= 1;
            (e.usage, e.sticky)
        };
        if usage == 0 && !sticky {
            guard.free_list.add_last(&mut guard.arena, id);
            guard.rectify_free_list(&mut deferred);
        }
        drop(guard);
        drop(deferred);
    }

    /// Unconditionally evict `handle`'s element, even if it is sticky.
    /// Precondition: the caller holds the sole outstanding reference.
    pub fn drop(&self, handle: CacheHandle<E>) {
        let mut guard = self.inner.lock();
        let mut deferred = DeferredDrop::default();
        let id = handle.id;
        {
            let e = slot_mut(&mut guard.arena, id);
            debug_assert!(e.usage == 1, "drop requires the sole outstanding reference");
            e.sticky = false;
        }
        guard.remove(id, &mut deferred);
        drop(guard);
        drop(deferred);
    }

    /// Swap the entity behind `handle` for `new_entity`, keeping the
    /// handle (and its `ElementId`) stable. The old entity is scheduled
    /// for deferred destruction.
    pub fn replace(&self, handle: CacheHandle<E>, new_entity: E) {
        let mut guard = self.inner.lock();
        let mut deferred = DeferredDrop::default();
        let id = handle.id;
        {
            let e = slot(&guard.arena, id);
            debug_assert!(e.usage == 1, "replace requires the sole outstanding reference");
        }
        {
            let element = slot(&guard.arena, id);
            guard.maps.remove_single_element(id, element);
        }
        {
            let e = slot_mut(&mut guard.arena, id);
            if let Some(old) = e.object.take() {
                deferred.auto_delete_entity(old);
            }
            e.object = Some(Arc::new(new_entity));
            e.recreate_keys();
        }
        {
            let element = slot(&guard.arena, id);
            guard.maps.add_single_element(id, element);
        }
        drop(guard);
        drop(deferred);
    }

    /// Mark (or unmark) `handle`'s element as sticky, exempting it from
    /// (or re-admitting it to) LRU eviction while unreferenced.
    pub fn set_sticky(&self, handle: CacheHandle<E>, sticky: bool) {
        let mut guard = self.inner.lock();
        let id = handle.id;
        let e = slot_mut(&mut guard.arena, id);
        debug_assert!(e.usage == 1, "set_sticky requires the sole outstanding reference");
        if e.sticky != sticky {
            e.sticky = sticky;
        }
    }

    /// Evict every currently unreferenced element, ignoring stickiness
    /// and `capacity`. Exposed publicly as `evict_idle`.
    pub fn evict_idle(&self) {
        let mut guard = self.inner.lock();
        let mut deferred = DeferredDrop::default();
        guard.evict_all_unused(&mut deferred);
        drop(guard);
        drop(deferred);
    }

    /// Tear the cache down: evict everything evictable, then warn (in
    /// debug builds, assert) if anything is still pinned.
    pub fn shutdown(&self) {
        let mut guard = self.inner.lock();
        let mut deferred = DeferredDrop::default();
        guard.capacity = 0;
        guard.evict_all_unused(&mut deferred);
        if guard.maps.snapshot_len() > 0 {
            tracing::warn!(
                remaining = guard.maps.snapshot_len(),
                "dictionary cache shutdown with pinned elements still outstanding"
            );
            debug_assert!(false, "shutdown with pinned elements outstanding");
        }
        guard.free_slots.clear();
        let pool = std::mem::take(&mut guard.element_pool);
        let arena = std::mem::take(&mut guard.arena);
        drop(guard);
        drop(pool);
        drop(arena);
        drop(deferred);
    }

    /// Convenience wrapper combining `get` and `put` around an external
    /// [`Loader`]: the common case where the caller has nothing special
    /// to do between a miss and loading the entity.
    pub fn get_or_load<L: Loader<E>>(&self, key: Lookup<E>, loader: &L) -> Result<Option<CacheHandle<E>>> {
        match self.get(key.clone()) {
            GetOutcome::Hit(handle) => Ok(Some(handle)),
            GetOutcome::NotFound => Ok(None),
            GetOutcome::Load => {
                let loaded = loader.load(&key)?;
                Ok(self.put(key, loaded))
            }
        }
    }

    /// Clone out the entity snapshot behind `handle`, so the caller can
    /// read it without holding the cache lock.
    pub fn object(&self, handle: CacheHandle<E>) -> Arc<E> {
        let guard = self.inner.lock();
        slot(&guard.arena, handle.id)
            .object
            .clone()
            .expect("handle names a registered element")
    }

    /// Number of distinct entities currently registered in the cache.
    pub fn len(&self) -> usize {
        self.inner.lock().maps.snapshot_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of reset wrapper elements currently held for reuse.
    pub fn pool_len(&self) -> usize {
        self.inner.lock().element_pool.len()
    }

    /// Number of currently unreferenced, non-sticky, evictable elements.
    pub fn free_list_len(&self) -> usize {
        self.inner.lock().free_list.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary_cache::entity::kinds::SchemaEntity;

    fn schema(id: u64, name: &str) -> SchemaEntity {
        SchemaEntity { id, name: name.to_string() }
    }

    #[test]
    fn put_then_get_by_id_and_name() {
        let cache: SharedMultiMap<SchemaEntity> =
            SharedMultiMap::new(DictionaryCacheConfig::default()).unwrap();
        let key = Lookup::id(1);
        assert!(matches!(cache.get(key.clone()), GetOutcome::Load));
        let handle = cache.put(key, Some(schema(1, "db1"))).unwrap();
        assert_eq!(cache.object(handle).name, "db1");
        cache.release(handle);

        match cache.get(Lookup::name("db1".to_string())) {
            GetOutcome::Hit(h) => {
                assert_eq!(cache.object(h).id, 1);
                cache.release(h);
            }
            _ => panic!("expected hit by name after insertion by id"),
        }
    }

    #[test]
    fn negative_put_reports_not_found_to_waiters() {
        let cache: SharedMultiMap<SchemaEntity> =
            SharedMultiMap::new(DictionaryCacheConfig::default()).unwrap();
        let key = Lookup::id(7);
        assert!(matches!(cache.get(key.clone()), GetOutcome::Load));
        assert!(cache.put(key.clone(), None).is_none());
        assert!(matches!(cache.get(key), GetOutcome::Load));
    }

    #[test]
    fn zero_capacity_evicts_immediately_on_release() {
        let cache: SharedMultiMap<SchemaEntity> =
            SharedMultiMap::new(DictionaryCacheConfig::new(0)).unwrap();
        let key = Lookup::id(1);
        let handle = cache.put(key, Some(schema(1, "db1"))).unwrap();
        assert_eq!(cache.len(), 1);
        cache.release(handle);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn sticky_element_survives_release_until_unset() {
        let cache: SharedMultiMap<SchemaEntity> =
            SharedMultiMap::new(DictionaryCacheConfig::new(0)).unwrap();
        let handle = cache.put(Lookup::id(1), Some(schema(1, "db1"))).unwrap();
        cache.set_sticky(handle, true);
        cache.release(handle);
        assert_eq!(cache.len(), 1, "sticky element must not be evicted while idle");

        let handle = match cache.get(Lookup::id(1)) {
            GetOutcome::Hit(h) => h,
            _ => panic!("sticky element should still be cached"),
        };
        cache.set_sticky(handle, false);
        cache.release(handle);
        assert_eq!(cache.len(), 0, "un-stickied element should now be evicted");
    }

    #[test]
    fn capacity_evicts_lru_on_overflow() {
        let cache: SharedMultiMap<SchemaEntity> =
            SharedMultiMap::new(DictionaryCacheConfig::new(1)).unwrap();
        let h1 = cache.put(Lookup::id(1), Some(schema(1, "a"))).unwrap();
        cache.release(h1);
        let h2 = cache.put(Lookup::id(2), Some(schema(2, "b"))).unwrap();
        cache.release(h2);

        assert_eq!(cache.len(), 1);
        assert!(matches!(cache.get(Lookup::id(1)), GetOutcome::Load), "id 1 should have been evicted");
    }

    #[test]
    fn replace_swaps_entity_keeping_handle() {
        let cache: SharedMultiMap<SchemaEntity> =
            SharedMultiMap::new(DictionaryCacheConfig::default()).unwrap();
        let handle = cache.put(Lookup::id(1), Some(schema(1, "old"))).unwrap();
        cache.replace(handle, schema(1, "new"));
        assert_eq!(cache.object(handle).name, "new");
        cache.release(handle);
    }

    #[test]
    fn drop_evicts_even_when_sticky() {
        let cache: SharedMultiMap<SchemaEntity> =
            SharedMultiMap::new(DictionaryCacheConfig::default()).unwrap();
        let handle = cache.put(Lookup::id(1), Some(schema(1, "db1"))).unwrap();
        cache.set_sticky(handle, true);
        cache.drop(handle);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn evict_idle_clears_sticky_unreferenced_elements() {
        let cache: SharedMultiMap<SchemaEntity> =
            SharedMultiMap::new(DictionaryCacheConfig::default()).unwrap();
        let handle = cache.put(Lookup::id(1), Some(schema(1, "db1"))).unwrap();
        cache.set_sticky(handle, true);
        cache.release(handle);
        assert_eq!(cache.len(), 1);
        cache.evict_idle();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn recycled_element_is_reused_from_pool() {
        let cache: SharedMultiMap<SchemaEntity> =
            SharedMultiMap::new(DictionaryCacheConfig::new(0)).unwrap();
        let handle = cache.put(Lookup::id(1), Some(schema(1, "a"))).unwrap();
        cache.release(handle);
        assert_eq!(cache.pool_len(), 1);

        let handle = cache.put(Lookup::id(2), Some(schema(2, "b"))).unwrap();
        assert_eq!(cache.pool_len(), 0, "obtain_element should have reused the pooled wrapper");
        cache.release(handle);
    }

    struct AlwaysLoads(SchemaEntity);

    impl Loader<SchemaEntity> for AlwaysLoads {
        fn load(&self, _key: &Lookup<SchemaEntity>) -> Result<Option<SchemaEntity>> {
            Ok(Some(self.0.clone()))
        }
    }

    #[test]
    fn get_or_load_drives_miss_through_loader() {
        let cache: SharedMultiMap<SchemaEntity> =
            SharedMultiMap::new(DictionaryCacheConfig::default()).unwrap();
        let loader = AlwaysLoads(schema(1, "db1"));
        let handle = cache
            .get_or_load(Lookup::id(1), &loader)
            .unwrap()
            .expect("loader reported a positive load");
        assert_eq!(cache.object(handle).name, "db1");
        cache.release(handle);

        // Second call hits the cache and never touches the loader.
        let handle = cache.get_or_load(Lookup::id(1), &loader).unwrap().unwrap();
        cache.release(handle);
    }
}
