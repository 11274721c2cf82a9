// Autolocker / deferred destructor (Section 4.4).
//
// Destructors of entities (and of discarded wrapper elements) can be
// arbitrarily expensive — freeing large blobs, touching the allocator —
// and must never run while the cache's mutex is held. `DeferredDrop`
// is an append-only accumulator built up while the lock is held; the
// caller drops the mutex guard first, then drops this, which runs every
// queued destructor in registration order on the calling thread.
//
// In the source this is folded into the `Autolocker` RAII type that also
// owns the mutex guard. Rust's explicit `drop(guard)` makes the two
// halves (release the lock, then run deferred destructors) clearer when
// kept as separate values with an explicit drop order, so that is how
// every public operation in `shared_map.rs` uses it:
//
//     let mut guard = self.inner.lock();
//     let mut deferred = DeferredDrop::default();
//     // ... mutate state, queue entities/elements into `deferred` ...
//     drop(guard);
//     drop(deferred); // entities and elements destroyed here, unlocked

use std::sync::Arc;

use super::element::CacheElement;
use super::entity::Entity;

pub(super) struct DeferredDrop<E: Entity> {
    entities: Vec<Arc<E>>,
    elements: Vec<CacheElement<E>>,
}

impl<E: Entity> Default for DeferredDrop<E> {
    fn default() -> Self {
        DeferredDrop { entities: Vec::new(), elements: Vec::new() }
    }
}

impl<E: Entity> DeferredDrop<E> {
    pub fn auto_delete_entity(&mut self, entity: Arc<E>) {
        self.entities.push(entity);
    }

    pub fn auto_delete_element(&mut self, element: CacheElement<E>) {
        self.elements.push(element);
    }
}

// `Vec`'s `Drop` impl destroys its elements front-to-back, which keeps
// the "destroy in registration order" contract without any extra code;
// entities are dropped before wrapper elements, matching the order the
// source enqueues them in `remove()`/`put()`.
