//! Arena storage for bigraph entities.
//!
//! Every structure (a bigraph or a builder) owns one arena per entity kind.
//! Entities are addressed by small typed identifiers (`NodeId`, `EdgeId`, ...)
//! that are only meaningful relative to the arena that issued them.
//!
//! # Determinism
//! - Identifier ordering is by the inner `u32`.
//! - Iteration order over slots is by index (0..capacity).
//! - Slots are never reused: a removed identifier stays dead, so a stale id
//!   held by a caller can never alias a newer entity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Common interface of the typed entity identifiers.
pub trait EntityId: Copy + Eq + Ord + Hash + fmt::Debug {
    /// Short human readable kind, used in error messages.
    const KIND: &'static str;

    /// Creates an identifier from a raw slot index.
    fn from_index(raw: u32) -> Self;

    /// Returns the raw slot index.
    fn index(self) -> u32;
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $prefix:literal) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates a new identifier from a raw `u32`.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Returns the raw `u32` index.
            #[inline]
            pub const fn as_u32(&self) -> u32 {
                self.0
            }
        }

        impl EntityId for $name {
            const KIND: &'static str = $kind;

            #[inline]
            fn from_index(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            fn index(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a root (a region of the outer face).
    RootId,
    "root",
    "r"
);
entity_id!(
    /// Identifier of a site (a hole of the inner face).
    SiteId,
    "site",
    "s"
);
entity_id!(
    /// Identifier of a node.
    NodeId,
    "node",
    "v"
);
entity_id!(
    /// Identifier of an edge (an internal, anonymous handle).
    EdgeId,
    "edge",
    "e"
);
entity_id!(
    /// Identifier of an outer name.
    OuterNameId,
    "outer name",
    "o"
);
entity_id!(
    /// Identifier of an inner name.
    InnerNameId,
    "inner name",
    "i"
);

/// Contiguous storage for entity records of type `T`, addressed by `I`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena<I, T> {
    slots: Vec<Option<T>>,
    /// Number of live entries (slots holding data).
    live_count: usize,
    _id: PhantomData<fn() -> I>,
}

impl<I: EntityId, T> Arena<I, T> {
    /// Creates a new empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live_count: 0,
            _id: PhantomData,
        }
    }

    /// Stores `data` in a fresh slot and returns its identifier.
    pub fn insert(&mut self, data: T) -> I {
        let idx = self.slots.len() as u32;
        self.slots.push(Some(data));
        self.live_count += 1;
        I::from_index(idx)
    }

    /// Removes the entry identified by `id`, returning its data.
    ///
    /// The slot stays dead afterwards.
    pub fn remove(&mut self, id: I) -> Option<T> {
        let taken = self
            .slots
            .get_mut(id.index() as usize)
            .and_then(|slot| slot.take());
        if taken.is_some() {
            self.live_count -= 1;
        }
        taken
    }

    /// Returns a reference to the data stored at `id`, if present.
    #[inline]
    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.index() as usize).and_then(|slot| slot.as_ref())
    }

    /// Returns a mutable reference to the data stored at `id`, if present.
    #[inline]
    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots
            .get_mut(id.index() as usize)
            .and_then(|slot| slot.as_mut())
    }

    #[inline]
    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.live_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Returns the total capacity (number of slots, dead ones included).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterates over all live entries in deterministic order (by index).
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|data| (I::from_index(idx as u32), data)))
    }

    /// Iterates over all live entries mutably in deterministic order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_mut().map(|data| (I::from_index(idx as u32), data)))
    }

    /// Iterates over the identifiers of all live entries.
    pub fn ids(&self) -> impl Iterator<Item = I> + '_ {
        self.iter().map(|(id, _)| id)
    }
}

impl<I: EntityId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Indexing panics on dead or foreign identifiers, like slice indexing does
/// out of bounds. Public entry points validate ids before indexing.
impl<I: EntityId, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        match self.get(id) {
            Some(data) => data,
            None => panic!("dead {} id {:?}", I::KIND, id),
        }
    }
}

impl<I: EntityId, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        match self.get_mut(id) {
            Some(data) => data,
            None => panic!("dead {} id {:?}", I::KIND, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_basic() {
        let mut arena: Arena<NodeId, &'static str> = Arena::new();
        assert!(arena.is_empty());

        let id1 = arena.insert("hello");
        assert_eq!(id1.as_u32(), 0);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(id1), Some(&"hello"));

        let id2 = arena.insert("world");
        assert_eq!(id2.as_u32(), 1);
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.remove(id1), Some("hello"));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(id1), None);
        assert_eq!(arena.remove(id1), None);
    }

    #[test]
    fn removed_slots_are_not_reused() {
        let mut arena: Arena<EdgeId, i32> = Arena::new();
        let ids: Vec<_> = (0..5).map(|i| arena.insert(i)).collect();
        arena.remove(ids[1]);
        arena.remove(ids[3]);
        let fresh = arena.insert(100);
        assert_eq!(fresh.as_u32(), 5);
        assert!(!arena.contains(ids[1]));

        let collected: Vec<_> = arena.iter().map(|(id, &val)| (id.as_u32(), val)).collect();
        assert_eq!(collected, vec![(0, 0), (2, 2), (4, 4), (5, 100)]);
        assert_eq!(arena.capacity(), 6);
    }

    #[test]
    #[should_panic(expected = "dead node id")]
    fn indexing_a_removed_slot_panics() {
        let mut arena: Arena<NodeId, ()> = Arena::new();
        let id = arena.insert(());
        arena.remove(id);
        let _ = &arena[id];
    }

    #[test]
    fn ids_display_with_kind_prefix() {
        assert_eq!(NodeId::new(3).to_string(), "v3");
        assert_eq!(EdgeId::new(0).to_string(), "e0");
        assert_eq!(RootId::KIND, "root");
    }
}
