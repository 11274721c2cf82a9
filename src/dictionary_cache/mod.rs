//! Dictionary cache: a concurrent, multi-indexed, reference-counted
//! object cache for database metadata entities (tables, schemas,
//! charsets, collations, tablespaces).
//!
//! ```text
//!                        ┌─────────────────────────┐
//!   get(key) ───────────▶│                         │
//!                        │     SharedMultiMap       │──▶ CacheHandle
//!   put(key, entity) ───▶│  (one Mutex + Condvar)   │
//!                        │                         │
//!                        │  ┌───────────────────┐  │
//!                        │  │ MultiMapBase       │  │   id / name / aux
//!                        │  │  (3 ElementMaps +  │◀─┼── key lookups
//!                        │  │   snapshot set)    │  │
//!                        │  └─────────┬─────────┘  │
//!                        │            │ ElementId   │
//!                        │  ┌─────────▼─────────┐  │
//!                        │  │ arena: Vec<Option< │  │
//!                        │  │   CacheElement>>   │  │
//!                        │  └──┬──────────────┬──┘  │
//!                        │     │ FreeList     │ element_pool
//!                        │     ▼ (LRU)        ▼ (reuse)
//!                        └─────────────────────────┘
//! ```
//!
//! A miss on `get` is coalesced: the first caller for a key becomes
//! responsible for loading it and reporting the result through `put`;
//! every other caller for the same key blocks on a condition variable
//! until that `put` resolves the miss, instead of issuing a redundant
//! load. Destructor work for evicted entities and wrapper elements is
//! always deferred until after the mutex is released, via an internal
//! deferred-drop queue built up while the lock is held.

mod autolocker;
mod element;
mod element_map;
mod entity;
mod free_list;
mod multi_map_base;
mod shared_map;

pub use element::CacheHandle;
pub use entity::{kinds, Entity, Loader, Lookup};
pub use shared_map::{
    DictionaryCacheConfig, GetOutcome, SharedMultiMap, DEFAULT_CAPACITY, MIN_POOL_CAPACITY,
};
