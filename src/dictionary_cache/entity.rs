// The Entity trait and the Loader protocol: the boundary interfaces the
// dictionary cache core is defined against (Section 6 of the spec). The
// entity types themselves are external collaborators — these are kept
// deliberately thin, just enough to exercise the three key kinds.

use std::hash::Hash;

use crate::error::Result;

/// Every type cached by a `SharedMultiMap` implements `Entity`. It
/// exposes up to three derived keys of distinct kinds; at least one must
/// be non-null for any entity accepted by `put`.
pub trait Entity: Send + Sync + 'static {
    type IdKey: Clone + Eq + Hash + Send + Sync;
    type NameKey: Clone + Eq + Hash + Send + Sync;
    type AuxKey: Clone + Eq + Hash + Send + Sync;

    fn id_key(&self) -> Option<Self::IdKey>;
    fn name_key(&self) -> Option<Self::NameKey>;
    fn aux_key(&self) -> Option<Self::AuxKey>;
}

/// A lookup key for one of an entity's key kinds. This is the Rust
/// analogue of the source's template parameter `K`: instead of
/// instantiating `get`/`put` once per key type, `Lookup` collapses the
/// three kinds into a single enum matched on internally.
pub enum Lookup<E: Entity> {
    Id(E::IdKey),
    Name(E::NameKey),
    Aux(E::AuxKey),
}

impl<E: Entity> Clone for Lookup<E> {
    fn clone(&self) -> Self {
        match self {
            Lookup::Id(k) => Lookup::Id(k.clone()),
            Lookup::Name(k) => Lookup::Name(k.clone()),
            Lookup::Aux(k) => Lookup::Aux(k.clone()),
        }
    }
}

impl<E: Entity> Lookup<E> {
    pub fn id(key: E::IdKey) -> Self {
        Lookup::Id(key)
    }
    pub fn name(key: E::NameKey) -> Self {
        Lookup::Name(key)
    }
    pub fn aux(key: E::AuxKey) -> Self {
        Lookup::Aux(key)
    }
}

/// The external loader protocol (Section 6). Implemented by callers, not
/// by the cache: `get_or_load` drives exactly the three steps the spec
/// requires of a loader (call `get`, load outside the lock on a miss,
/// always `put` the outcome).
pub trait Loader<E: Entity> {
    fn load(&self, key: &Lookup<E>) -> Result<Option<E>>;
}

/// Minimal metadata entity kinds, mirroring the source's instantiated
/// types (abstract table, charset, collation, schema, tablespace). These
/// are intentionally thin value objects: the entity types and their key
/// generators are external collaborators per the spec's scope, not part
/// of the core being implemented here.
pub mod kinds {
    use super::Entity;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TableEntity {
        pub id: u64,
        pub schema_id: u64,
        pub name: String,
    }

    impl Entity for TableEntity {
        type IdKey = u64;
        type NameKey = (u64, String);
        type AuxKey = ();

        fn id_key(&self) -> Option<u64> {
            Some(self.id)
        }
        fn name_key(&self) -> Option<(u64, String)> {
            Some((self.schema_id, self.name.clone()))
        }
        fn aux_key(&self) -> Option<()> {
            None
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SchemaEntity {
        pub id: u64,
        pub name: String,
    }

    impl Entity for SchemaEntity {
        type IdKey = u64;
        type NameKey = String;
        type AuxKey = ();

        fn id_key(&self) -> Option<u64> {
            Some(self.id)
        }
        fn name_key(&self) -> Option<String> {
            Some(self.name.clone())
        }
        fn aux_key(&self) -> Option<()> {
            None
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CharsetEntity {
        pub id: u64,
        pub name: String,
    }

    impl Entity for CharsetEntity {
        type IdKey = u64;
        type NameKey = String;
        type AuxKey = ();

        fn id_key(&self) -> Option<u64> {
            Some(self.id)
        }
        fn name_key(&self) -> Option<String> {
            Some(self.name.clone())
        }
        fn aux_key(&self) -> Option<()> {
            None
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CollationEntity {
        pub id: u64,
        pub name: String,
        pub charset_id: u64,
    }

    impl Entity for CollationEntity {
        type IdKey = u64;
        type NameKey = String;
        type AuxKey = u64;

        fn id_key(&self) -> Option<u64> {
            Some(self.id)
        }
        fn name_key(&self) -> Option<String> {
            Some(self.name.clone())
        }
        fn aux_key(&self) -> Option<u64> {
            // The charset a collation belongs to is also a valid lookup
            // path (e.g. "the default collation for charset X").
            Some(self.charset_id)
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TablespaceEntity {
        pub id: u64,
        pub name: String,
    }

    impl Entity for TablespaceEntity {
        type IdKey = u64;
        type NameKey = String;
        type AuxKey = ();

        fn id_key(&self) -> Option<u64> {
            Some(self.id)
        }
        fn name_key(&self) -> Option<String> {
            Some(self.name.clone())
        }
        fn aux_key(&self) -> Option<()> {
            None
        }
    }
}
