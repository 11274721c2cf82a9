// Cache element: the wrapper owning one immutable entity snapshot plus
// the bookkeeping the shared map needs to pin, evict, and recycle it.

use std::sync::Arc;

use super::entity::Entity;

/// Opaque handle into the cache's element arena.
///
/// `ElementId` is the non-owning reference every index map stores in
/// place of a pointer to `CacheElement`: the arena (`Vec<CacheElement<E>>`
/// owned by the shared map) is the sole owner, and every map, the free
/// list, and the element pool refer to elements only by this index.
#[derive(Debug)]
pub struct ElementId<E>(pub(super) usize, std::marker::PhantomData<E>);

impl<E> ElementId<E> {
    pub(super) fn new(index: usize) -> Self {
        ElementId(index, std::marker::PhantomData)
    }

    pub(super) fn index(&self) -> usize {
        self.0
    }
}

impl<E> Clone for ElementId<E> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<E> Copy for ElementId<E> {}
impl<E> PartialEq for ElementId<E> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<E> Eq for ElementId<E> {}
impl<E> std::hash::Hash for ElementId<E> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

/// A reference-counted handle returned to callers of `get`/`put`.
///
/// Unlike an `Arc`, releasing this handle is not automatic: the caller
/// must explicitly call [`super::SharedMultiMap::release`]. This mirrors
/// the source's manual pin/unpin discipline deliberately rather than
/// wrapping it in `Drop` — the spec's `release`/`drop`/`replace`/
/// `set_sticky` operations are distinct, caller-driven API calls, not
/// scope-exit cleanup.
#[derive(Debug)]
pub struct CacheHandle<E> {
    pub(super) id: ElementId<E>,
}

impl<E> Clone for CacheHandle<E> {
    fn clone(&self) -> Self {
        CacheHandle { id: self.id }
    }
}
impl<E> Copy for CacheHandle<E> {}
impl<E> PartialEq for CacheHandle<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<E> Eq for CacheHandle<E> {}

impl<E> CacheHandle<E> {
    pub(super) fn new(id: ElementId<E>) -> Self {
        CacheHandle { id }
    }
}

/// The wrapper around one entity: owns the entity's shared snapshot,
/// the pin count, stickiness, the derived keys, and the free-list links.
///
/// A `CacheElement` always occupies a slot in the arena; an "empty"
/// element (unregistered, waiting in the pool or never yet used) simply
/// has `object == None`.
pub(super) struct CacheElement<E: Entity> {
    pub object: Option<Arc<E>>,
    pub usage: usize,
    pub sticky: bool,
    pub registered: bool,
    pub id_key: Option<E::IdKey>,
    pub name_key: Option<E::NameKey>,
    pub aux_key: Option<E::AuxKey>,
    // Intrusive doubly-linked free-list links, valid only while the
    // element is actually on the free list.
    pub prev: Option<ElementId<E>>,
    pub next: Option<ElementId<E>>,
}

impl<E: Entity> CacheElement<E> {
    pub fn empty() -> Self {
        CacheElement {
            object: None,
            usage: 0,
            sticky: false,
            registered: false,
            id_key: None,
            name_key: None,
            aux_key: None,
            prev: None,
            next: None,
        }
    }

    /// Reset a pooled element back to the state `empty()` would produce,
    /// in place, so it can be reused for a new entity without an
    /// allocation (I5: pooled elements are unregistered with a null
    /// object).
    pub fn reinit(&mut self) {
        self.object = None;
        self.usage = 0;
        self.sticky = false;
        self.registered = false;
        self.id_key = None;
        self.name_key = None;
        self.aux_key = None;
        self.prev = None;
        self.next = None;
    }

    /// Regenerate the derived keys from the currently installed object.
    pub fn recreate_keys(&mut self) {
        let object = self.object.as_deref().expect("recreate_keys on an empty element");
        self.id_key = object.id_key();
        self.name_key = object.name_key();
        self.aux_key = object.aux_key();
    }

    pub fn is_free(&self) -> bool {
        self.usage == 0 && !self.sticky
    }
}

/// Arena slot accessors shared by `shared_map` and `free_list`. A `None`
/// slot is either never-allocated or was returned to `free_slots` for
/// index reuse by a future allocation; every live `ElementId` in any
/// index map, the free list, or the element pool names an occupied slot.
pub(super) fn slot<E: Entity>(arena: &[Option<CacheElement<E>>], id: ElementId<E>) -> &CacheElement<E> {
    arena[id.index()].as_ref().expect("element slot unoccupied")
}

pub(super) fn slot_mut<E: Entity>(
    arena: &mut [Option<CacheElement<E>>],
    id: ElementId<E>,
) -> &mut CacheElement<E> {
    arena[id.index()].as_mut().expect("element slot unoccupied")
}
