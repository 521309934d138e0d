//! # Storage Policies
//!
//! Two strategies can hold a tag for a shared location:
//!
//! | Strategy | Layout | Cost | Used for |
//! |----------|--------|------|----------|
//! | [`SideTable`](StorageStrategy::SideTable) | concurrent map keyed by identity | one lookup per access | objects, buffers, descriptors (always); arrays, fields (optional) |
//! | [`ParallelSlot`](StorageStrategy::ParallelSlot) | tag stored next to the primary data | one extra word per container/field | arrays, fields (default) |
//!
//! The strategy for arrays and fields is chosen once, when the
//! [`ShadowStore`](crate::ShadowStore) is built, through a
//! [`StoragePolicy`]. Heap object identities, buffers and descriptors have
//! no primary storage of their own to extend, so they always use a side
//! table.

use crate::heap::Heap;
use crate::location::ShadowKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use taintflow_tag::Tag;

/// Where a location kind keeps its tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageStrategy {
    /// Out-of-band map keyed by identity.
    SideTable,
    /// Tag co-located with the primary storage.
    ParallelSlot,
}

impl fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SideTable => f.write_str("side_table"),
            Self::ParallelSlot => f.write_str("parallel_slot"),
        }
    }
}

/// Strategy selection for the location kinds that support both layouts.
///
/// # Example
///
/// ```rust
/// use taintflow_store::{StoragePolicy, StorageStrategy};
///
/// let policy = StoragePolicy::new().with_arrays(StorageStrategy::SideTable);
/// assert_eq!(policy.arrays, StorageStrategy::SideTable);
/// assert_eq!(policy.fields, StorageStrategy::ParallelSlot);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoragePolicy {
    /// Strategy for whole-array tags.
    pub arrays: StorageStrategy,
    /// Strategy for instance field tags.
    pub fields: StorageStrategy,
}

impl StoragePolicy {
    /// Creates the default policy: parallel slots for arrays and fields.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            arrays: StorageStrategy::ParallelSlot,
            fields: StorageStrategy::ParallelSlot,
        }
    }

    /// Creates a policy that keeps every tag in side tables.
    #[must_use]
    pub const fn side_tables_only() -> Self {
        Self {
            arrays: StorageStrategy::SideTable,
            fields: StorageStrategy::SideTable,
        }
    }

    /// Sets the array strategy.
    #[must_use]
    pub const fn with_arrays(mut self, strategy: StorageStrategy) -> Self {
        self.arrays = strategy;
        self
    }

    /// Sets the field strategy.
    #[must_use]
    pub const fn with_fields(mut self, strategy: StorageStrategy) -> Self {
        self.fields = strategy;
        self
    }
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag storage for shared locations.
///
/// Implementations never fail: a key that does not resolve reads as
/// [`Tag::CLEAR`] and ignores writes, reporting `false`.
///
/// # Thread Safety
///
/// All methods take `&self` and must be safe to call from any mutator
/// thread and from the reclamation path at the same time. Each tag is read
/// and written as a whole value.
pub trait TagStorage: Send + Sync + fmt::Debug {
    /// Returns the layout this storage uses.
    fn strategy(&self) -> StorageStrategy;

    /// Initializes the tag for a newly allocated location to `CLEAR`.
    fn on_allocate(&self, key: ShadowKey);

    /// Releases the tag of a reclaimed location.
    fn on_reclaim(&self, key: ShadowKey);

    /// Returns the stored tag, or `CLEAR` if the key does not resolve.
    fn get(&self, key: ShadowKey) -> Tag;

    /// Overwrites the stored tag. Returns `false` if the key does not resolve.
    fn set(&self, key: ShadowKey, tag: Tag) -> bool;

    /// Atomically ORs `tag` into the stored tag. Returns `false` if the key
    /// does not resolve.
    fn merge(&self, key: ShadowKey, tag: Tag) -> bool;
}

/// Parallel-slot storage: reads and writes the tag words that live inside
/// heap records.
///
/// Allocation and reclamation hooks are no-ops here: the slot is created
/// with the record (tag `CLEAR`) and dropped with it.
#[derive(Debug, Clone)]
pub struct ParallelSlots {
    heap: Arc<Heap>,
}

impl ParallelSlots {
    /// Creates parallel-slot storage over `heap`.
    #[must_use]
    pub fn new(heap: Arc<Heap>) -> Self {
        Self { heap }
    }
}

impl TagStorage for ParallelSlots {
    fn strategy(&self) -> StorageStrategy {
        StorageStrategy::ParallelSlot
    }

    fn on_allocate(&self, _key: ShadowKey) {}

    fn on_reclaim(&self, _key: ShadowKey) {}

    fn get(&self, key: ShadowKey) -> Tag {
        match key {
            ShadowKey::Array(id) => self.heap.array_tag(id).unwrap_or(Tag::CLEAR),
            ShadowKey::Field(id, field) => self.heap.field_tag(id, field).unwrap_or(Tag::CLEAR),
            _ => Tag::CLEAR,
        }
    }

    fn set(&self, key: ShadowKey, tag: Tag) -> bool {
        match key {
            ShadowKey::Array(id) => self.heap.update_array_tag(id, |_| tag),
            ShadowKey::Field(id, field) => self.heap.update_field_tag(id, field, |_| tag),
            _ => false,
        }
    }

    fn merge(&self, key: ShadowKey, tag: Tag) -> bool {
        match key {
            ShadowKey::Array(id) => self.heap.update_array_tag(id, |old| old.combine(tag)),
            ShadowKey::Field(id, field) => {
                self.heap.update_field_tag(id, field, |old| old.combine(tag))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FieldIndex, HeapId};
    use crate::value::ElementKind;

    #[test]
    fn test_default_policy_is_parallel() {
        let policy = StoragePolicy::default();
        assert_eq!(policy.arrays, StorageStrategy::ParallelSlot);
        assert_eq!(policy.fields, StorageStrategy::ParallelSlot);
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: StoragePolicy = serde_json::from_str(r#"{"arrays":"side_table"}"#).unwrap();
        assert_eq!(policy.arrays, StorageStrategy::SideTable);
        assert_eq!(policy.fields, StorageStrategy::ParallelSlot);
    }

    #[test]
    fn test_parallel_slots_follow_heap_records() {
        let heap = Arc::new(Heap::new());
        let slots = ParallelSlots::new(Arc::clone(&heap));
        let array = heap.alloc_array(ElementKind::BYTES, 4);
        let key = ShadowKey::Array(array);

        assert_eq!(slots.get(key), Tag::CLEAR);
        assert!(slots.merge(key, Tag::SMS));
        assert!(slots.merge(key, Tag::MIC));
        assert_eq!(slots.get(key), Tag::SMS | Tag::MIC);
        assert!(slots.set(key, Tag::CAMERA));
        assert_eq!(slots.get(key), Tag::CAMERA);

        heap.free(array);
        assert_eq!(slots.get(key), Tag::CLEAR);
        assert!(!slots.merge(key, Tag::SMS));
    }

    #[test]
    fn test_parallel_slots_ignore_side_table_kinds() {
        let heap = Arc::new(Heap::new());
        let slots = ParallelSlots::new(heap);
        let key = ShadowKey::Object(HeapId(1));
        assert!(!slots.set(key, Tag::SMS));
        assert_eq!(slots.get(key), Tag::CLEAR);
    }

    #[test]
    fn test_parallel_field_slots() {
        let heap = Arc::new(Heap::new());
        let slots = ParallelSlots::new(Arc::clone(&heap));
        let obj = heap.alloc_instance("Point", 2);
        let key = ShadowKey::Field(obj, FieldIndex(1));

        assert!(slots.merge(key, Tag::LOCATION));
        assert_eq!(slots.get(key), Tag::LOCATION);
        assert_eq!(slots.get(ShadowKey::Field(obj, FieldIndex(0))), Tag::CLEAR);
        assert!(!slots.merge(ShadowKey::Field(obj, FieldIndex(2)), Tag::LOCATION));
    }
}
