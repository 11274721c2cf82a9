// Free list (Section 4.3): a doubly linked, FIFO-order LRU list of
// unreferenced, non-sticky elements. Links are embedded in
// `CacheElement` itself, so no allocation is needed on insert or remove.

use super::element::{slot_mut, CacheElement, ElementId};
use super::entity::Entity;

pub(super) struct FreeList<E: Entity> {
    head: Option<ElementId<E>>, // least recently freed
    tail: Option<ElementId<E>>, // most recently freed
    len: usize,
}

impl<E: Entity> FreeList<E> {
    pub fn new() -> Self {
        FreeList { head: None, tail: None, len: 0 }
    }

    pub fn length(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `id` as the most-recently-freed entry.
    pub fn add_last(&mut self, arena: &mut [Option<CacheElement<E>>], id: ElementId<E>) {
        let tail = self.tail;
        {
            let e = slot_mut(arena, id);
            e.prev = tail;
            e.next = None;
        }
        match tail {
            Some(t) => slot_mut(arena, t).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    /// Detach `id` from wherever it sits in the list.
    pub fn remove(&mut self, arena: &mut [Option<CacheElement<E>>], id: ElementId<E>) {
        let (prev, next) = {
            let e = slot_mut(arena, id);
            (e.prev, e.next)
        };
        match prev {
            Some(p) => slot_mut(arena, p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => slot_mut(arena, n).prev = prev,
            None => self.tail = prev,
        }
        {
            let e = slot_mut(arena, id);
            e.prev = None;
            e.next = None;
        }
        self.len -= 1;
    }

    /// Peek the least recently used entry (the head) without removing it.
    pub fn get_lru(&self) -> Option<ElementId<E>> {
        self.head
    }
}
