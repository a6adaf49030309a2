//! Generic id-keyed entity storage.
//!
//! Every entity kind (building, army, villager group, resource point,
//! commander) lives in its own [`Registry`] keyed by a newtype id.
//! Entities reference each other by id only, never by owning pointer;
//! every dereference goes back through the registry and handles the
//! "not found" case explicitly.
//!
//! Registries use a `HashMap` for O(1) lookup. Iteration for
//! simulation purposes always goes through [`Registry::sorted_ids`]
//! so processing order is deterministic.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Trait for registry id newtypes.
pub trait RegistryId: Copy + Eq + Ord + Hash {
    /// Construct from a raw id value.
    fn from_raw(raw: u32) -> Self;
    /// The raw id value.
    fn raw(self) -> u32;
}

/// Define a registry id newtype with serde, ordering and display.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            /// Create an id from a raw value.
            #[must_use]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl $crate::registry::RegistryId for $name {
            fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

pub(crate) use define_id;

/// Storage for one entity kind, with monotonic id allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry<I: RegistryId, T> {
    /// Map of id to entity data.
    #[serde(bound(
        serialize = "I: Serialize, T: Serialize",
        deserialize = "I: Deserialize<'de>, T: Deserialize<'de>"
    ))]
    entries: HashMap<I, T>,
    /// Next raw id to assign.
    next_raw: u32,
}

impl<I: RegistryId, T> Registry<I, T> {
    /// Create empty storage. Ids start at 1; 0 is never assigned.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_raw: 1,
        }
    }

    /// Insert a new entity and return its freshly allocated id.
    pub fn insert(&mut self, value: T) -> I {
        let id = I::from_raw(self.next_raw);
        self.next_raw += 1;
        self.entries.insert(id, value);
        id
    }

    /// Insert an entity under a known id (snapshot restore).
    ///
    /// Keeps the allocator ahead of every restored id so replayed
    /// inserts never collide with future allocations.
    pub fn insert_with_id(&mut self, id: I, value: T) -> Option<T> {
        if id.raw() >= self.next_raw {
            self.next_raw = id.raw() + 1;
        }
        self.entries.insert(id, value)
    }

    /// Remove an entity by id.
    pub fn remove(&mut self, id: I) -> Option<T> {
        self.entries.remove(&id)
    }

    /// Get an entity by id.
    #[must_use]
    pub fn get(&self, id: I) -> Option<&T> {
        self.entries.get(&id)
    }

    /// Get a mutable reference to an entity by id.
    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: I) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted ids for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<I> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate over entries (not in deterministic order).
    pub fn iter(&self) -> impl Iterator<Item = (&I, &T)> {
        self.entries.iter()
    }

    /// Iterate mutably over entries (not in deterministic order).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&I, &mut T)> {
        self.entries.iter_mut()
    }
}

impl<I: RegistryId, T> Default for Registry<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    define_id!(TestId);

    #[test]
    fn test_insert_allocates_sequential_ids() {
        let mut reg: Registry<TestId, &str> = Registry::new();
        assert_eq!(reg.insert("a"), TestId(1));
        assert_eq!(reg.insert("b"), TestId(2));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(TestId(1)), Some(&"a"));
    }

    #[test]
    fn test_remove() {
        let mut reg: Registry<TestId, i32> = Registry::new();
        let id = reg.insert(7);
        assert_eq!(reg.remove(id), Some(7));
        assert_eq!(reg.remove(id), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_insert_with_id_advances_allocator() {
        let mut reg: Registry<TestId, i32> = Registry::new();
        reg.insert_with_id(TestId(10), 1);
        let next = reg.insert(2);
        assert_eq!(next, TestId(11));
    }

    #[test]
    fn test_sorted_ids() {
        let mut reg: Registry<TestId, i32> = Registry::new();
        reg.insert_with_id(TestId(5), 0);
        reg.insert_with_id(TestId(2), 0);
        reg.insert_with_id(TestId(9), 0);
        assert_eq!(reg.sorted_ids(), vec![TestId(2), TestId(5), TestId(9)]);
    }
}
