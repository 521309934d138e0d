//! # Managed Heap
//!
//! Primary storage for arrays, instances and strings, with the
//! parallel-slot tag words embedded in each record:
//!
//! ```text
//! Array record     ┌──────┬──────────────────────────────┐
//!                  │ tag  │ e0 │ e1 │ e2 │ ... │ eN-1  │
//!                  └──────┴──────────────────────────────┘
//! Instance record  ┌────────────┬────────────┬─────┐
//!                  │ f0 │ tag0  │ f1 │ tag1  │ ... │
//!                  └────────────┴────────────┴─────┘
//! ```
//!
//! Records live in a sharded concurrent map. A primary write and the tag
//! write that accompanies it happen under the same shard lock, so the tag
//! becomes visible exactly when the data does.
//!
//! Identities are recycled after [`Heap::free`], modelling address reuse by
//! a collector.

use crate::error::{Result, StoreError};
use crate::ids::IdAllocator;
use crate::location::{FieldIndex, HeapId};
use crate::value::{ElementKind, Slot, Value};
use dashmap::DashMap;
use taintflow_tag::Tag;
use tracing::trace;

/// What kind of object a heap identity currently names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// An array with the given element kind.
    Array(ElementKind),
    /// A class instance.
    Instance,
    /// An immutable string.
    String,
}

#[derive(Debug)]
struct ArrayData {
    kind: ElementKind,
    tag: Tag,
    elements: Vec<Value>,
}

#[derive(Debug)]
struct InstanceData {
    class: String,
    fields: Vec<Slot>,
}

#[derive(Debug)]
enum HeapObject {
    Array(ArrayData),
    Instance(InstanceData),
    Str(String),
}

impl HeapObject {
    fn kind(&self) -> ObjectKind {
        match self {
            HeapObject::Array(a) => ObjectKind::Array(a.kind),
            HeapObject::Instance(_) => ObjectKind::Instance,
            HeapObject::Str(_) => ObjectKind::String,
        }
    }
}

/// The managed heap.
///
/// # Thread Safety
///
/// `Heap` is `Send + Sync`. Distinct objects can be mutated concurrently;
/// accesses to the same object serialize on its shard lock.
#[derive(Debug)]
pub struct Heap {
    records: DashMap<HeapId, HeapObject>,
    ids: IdAllocator,
}

impl Heap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            ids: IdAllocator::starting_at(1),
        }
    }

    fn insert(&self, object: HeapObject) -> HeapId {
        let id = HeapId(self.ids.acquire());
        trace!("heap alloc {} as {:?}", id, object.kind());
        self.records.insert(id, object);
        id
    }

    /// Allocates a zero-filled array with an untainted tag slot.
    pub fn alloc_array(&self, kind: ElementKind, len: usize) -> HeapId {
        self.insert(HeapObject::Array(ArrayData {
            kind,
            tag: Tag::CLEAR,
            elements: vec![kind.zero(); len],
        }))
    }

    /// Allocates an array holding `elements`, untainted.
    ///
    /// # Errors
    ///
    /// Returns `ElementTypeMismatch` if any element does not fit `kind`.
    pub fn alloc_array_from(&self, kind: ElementKind, elements: Vec<Value>) -> Result<HeapId> {
        if let Some(bad) = elements.iter().find(|v| !kind.accepts(v)) {
            return Err(StoreError::ElementTypeMismatch {
                expected: kind,
                found: format!("{bad:?}"),
            });
        }
        Ok(self.insert(HeapObject::Array(ArrayData {
            kind,
            tag: Tag::CLEAR,
            elements,
        })))
    }

    /// Allocates an instance with `field_count` zeroed, untainted fields.
    pub fn alloc_instance(&self, class: impl Into<String>, field_count: u16) -> HeapId {
        self.insert(HeapObject::Instance(InstanceData {
            class: class.into(),
            fields: vec![Slot::default(); usize::from(field_count)],
        }))
    }

    /// Allocates a string.
    pub fn alloc_string(&self, text: impl Into<String>) -> HeapId {
        self.insert(HeapObject::Str(text.into()))
    }

    /// Releases an object and recycles its identity.
    ///
    /// Returns the kind of the released object, or `None` if nothing was
    /// live under that identity.
    pub fn free(&self, id: HeapId) -> Option<ObjectKind> {
        let (_, object) = self.records.remove(&id)?;
        self.ids.release(id.0);
        trace!("heap free {}", id);
        Some(object.kind())
    }

    /// Returns the kind of a live object.
    #[must_use]
    pub fn kind_of(&self, id: HeapId) -> Option<ObjectKind> {
        self.records.get(&id).map(|r| r.kind())
    }

    /// Returns `true` if `id` names a live object.
    #[must_use]
    pub fn contains(&self, id: HeapId) -> bool {
        self.records.contains_key(&id)
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when no objects are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ------------------------------------------------------------------
    // Arrays
    // ------------------------------------------------------------------

    fn with_array<R>(&self, id: HeapId, f: impl FnOnce(&ArrayData) -> Result<R>) -> Result<R> {
        let record = self.records.get(&id).ok_or(StoreError::UnknownObject(id))?;
        match &*record {
            HeapObject::Array(array) => f(array),
            _ => Err(StoreError::NotAnArray(id)),
        }
    }

    fn with_array_mut<R>(
        &self,
        id: HeapId,
        f: impl FnOnce(&mut ArrayData) -> Result<R>,
    ) -> Result<R> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or(StoreError::UnknownObject(id))?;
        match &mut *record {
            HeapObject::Array(array) => f(array),
            _ => Err(StoreError::NotAnArray(id)),
        }
    }

    /// Returns the element kind and length of an array.
    ///
    /// # Errors
    ///
    /// `UnknownObject` or `NotAnArray`.
    pub fn array_info(&self, id: HeapId) -> Result<(ElementKind, usize)> {
        self.with_array(id, |a| Ok((a.kind, a.elements.len())))
    }

    /// Reads one element together with the array's parallel tag.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnArray` or `IndexOutOfBounds`.
    pub fn array_load(&self, id: HeapId, index: usize) -> Result<Slot> {
        self.with_array(id, |a| {
            let value = a.elements.get(index).copied().ok_or(StoreError::IndexOutOfBounds {
                index,
                len: a.elements.len(),
            })?;
            Ok(Slot::new(value, a.tag))
        })
    }

    /// Writes one element, optionally merging `merge` into the parallel tag
    /// under the same lock.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnArray`, `IndexOutOfBounds` or
    /// `ElementTypeMismatch`.
    pub fn array_store(&self, id: HeapId, index: usize, value: Value, merge: Option<Tag>) -> Result<()> {
        self.with_array_mut(id, |a| {
            if !a.kind.accepts(&value) {
                return Err(StoreError::ElementTypeMismatch {
                    expected: a.kind,
                    found: format!("{value:?}"),
                });
            }
            let len = a.elements.len();
            let slot = a
                .elements
                .get_mut(index)
                .ok_or(StoreError::IndexOutOfBounds { index, len })?;
            *slot = value;
            if let Some(tag) = merge {
                a.tag = a.tag.combine(tag);
            }
            Ok(())
        })
    }

    /// Copies `len` elements starting at `start` out of an array, together
    /// with the array's parallel tag.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnArray` or `IndexOutOfBounds`.
    pub fn array_read_range(&self, id: HeapId, start: usize, len: usize) -> Result<(Vec<Value>, Tag)> {
        self.with_array(id, |a| {
            let end = checked_end(start, len, a.elements.len())?;
            Ok((a.elements[start..end].to_vec(), a.tag))
        })
    }

    /// Overwrites elements starting at `start`, optionally merging `merge`
    /// into the parallel tag under the same lock.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnArray`, `IndexOutOfBounds` or
    /// `ElementTypeMismatch`. Nothing is written on error.
    pub fn array_write_range(
        &self,
        id: HeapId,
        start: usize,
        values: &[Value],
        merge: Option<Tag>,
    ) -> Result<()> {
        self.with_array_mut(id, |a| {
            let end = checked_end(start, values.len(), a.elements.len())?;
            if let Some(bad) = values.iter().find(|v| !a.kind.accepts(v)) {
                return Err(StoreError::ElementTypeMismatch {
                    expected: a.kind,
                    found: format!("{bad:?}"),
                });
            }
            a.elements[start..end].copy_from_slice(values);
            if let Some(tag) = merge {
                a.tag = a.tag.combine(tag);
            }
            Ok(())
        })
    }

    /// Returns the parallel tag of an array, or `None` if `id` is not a
    /// live array.
    #[must_use]
    pub fn array_tag(&self, id: HeapId) -> Option<Tag> {
        self.with_array(id, |a| Ok(a.tag)).ok()
    }

    /// Applies `f` to the parallel tag of an array. Returns `false` if `id`
    /// is not a live array.
    pub fn update_array_tag(&self, id: HeapId, f: impl FnOnce(Tag) -> Tag) -> bool {
        self.with_array_mut(id, |a| {
            a.tag = f(a.tag);
            Ok(())
        })
        .is_ok()
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    fn with_instance<R>(&self, id: HeapId, f: impl FnOnce(&InstanceData) -> Result<R>) -> Result<R> {
        let record = self.records.get(&id).ok_or(StoreError::UnknownObject(id))?;
        match &*record {
            HeapObject::Instance(instance) => f(instance),
            _ => Err(StoreError::NotAnInstance(id)),
        }
    }

    fn with_instance_mut<R>(
        &self,
        id: HeapId,
        f: impl FnOnce(&mut InstanceData) -> Result<R>,
    ) -> Result<R> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or(StoreError::UnknownObject(id))?;
        match &mut *record {
            HeapObject::Instance(instance) => f(instance),
            _ => Err(StoreError::NotAnInstance(id)),
        }
    }

    /// Returns the class name and field count of an instance.
    ///
    /// # Errors
    ///
    /// `UnknownObject` or `NotAnInstance`.
    pub fn instance_info(&self, id: HeapId) -> Result<(String, u16)> {
        self.with_instance(id, |i| {
            let count = u16::try_from(i.fields.len()).unwrap_or(u16::MAX);
            Ok((i.class.clone(), count))
        })
    }

    /// Reads a field and its parallel tag.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnInstance` or `IndexOutOfBounds`.
    pub fn field_load(&self, id: HeapId, field: FieldIndex) -> Result<Slot> {
        self.with_instance(id, |i| {
            let index = usize::from(field.0);
            i.fields.get(index).copied().ok_or(StoreError::IndexOutOfBounds {
                index,
                len: i.fields.len(),
            })
        })
    }

    /// Writes a field value, optionally merging `merge` into its parallel
    /// tag under the same lock.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnInstance` or `IndexOutOfBounds`.
    pub fn field_store(&self, id: HeapId, field: FieldIndex, value: Value, merge: Option<Tag>) -> Result<()> {
        self.with_instance_mut(id, |i| {
            let index = usize::from(field.0);
            let len = i.fields.len();
            let slot = i
                .fields
                .get_mut(index)
                .ok_or(StoreError::IndexOutOfBounds { index, len })?;
            slot.value = value;
            if let Some(tag) = merge {
                slot.tag = slot.tag.combine(tag);
            }
            Ok(())
        })
    }

    /// Returns the parallel tag of a field, or `None` if it does not resolve.
    #[must_use]
    pub fn field_tag(&self, id: HeapId, field: FieldIndex) -> Option<Tag> {
        self.field_load(id, field).ok().map(|slot| slot.tag)
    }

    /// Applies `f` to the parallel tag of a field. Returns `false` if the
    /// field does not resolve.
    pub fn update_field_tag(&self, id: HeapId, field: FieldIndex, f: impl FnOnce(Tag) -> Tag) -> bool {
        self.with_instance_mut(id, |i| {
            let index = usize::from(field.0);
            let len = i.fields.len();
            let slot = i
                .fields
                .get_mut(index)
                .ok_or(StoreError::IndexOutOfBounds { index, len })?;
            slot.tag = f(slot.tag);
            Ok(())
        })
        .is_ok()
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    /// Returns a copy of a string's text.
    ///
    /// # Errors
    ///
    /// `UnknownObject` or `NotAString`.
    pub fn string(&self, id: HeapId) -> Result<String> {
        let record = self.records.get(&id).ok_or(StoreError::UnknownObject(id))?;
        match &*record {
            HeapObject::Str(text) => Ok(text.clone()),
            _ => Err(StoreError::NotAString(id)),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

fn checked_end(start: usize, len: usize, capacity: usize) -> Result<usize> {
    match start.checked_add(len) {
        Some(end) if end <= capacity => Ok(end),
        _ => Err(StoreError::IndexOutOfBounds {
            index: start.saturating_add(len),
            len: capacity,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PrimitiveKind;

    const INTS: ElementKind = ElementKind::Primitive(PrimitiveKind::Int);

    #[test]
    fn test_new_array_is_zeroed_and_clean() {
        let heap = Heap::new();
        let id = heap.alloc_array(INTS, 3);
        assert_eq!(heap.array_info(id).unwrap(), (INTS, 3));
        let slot = heap.array_load(id, 2).unwrap();
        assert_eq!(slot.value, Value::Int(0));
        assert_eq!(slot.tag, Tag::CLEAR);
    }

    #[test]
    fn test_array_store_merges_tag_with_write() {
        let heap = Heap::new();
        let id = heap.alloc_array(INTS, 2);
        heap.array_store(id, 0, Value::Int(5), Some(Tag::SMS)).unwrap();
        heap.array_store(id, 1, Value::Int(6), Some(Tag::MIC)).unwrap();
        assert_eq!(heap.array_tag(id), Some(Tag::SMS | Tag::MIC));
        assert_eq!(heap.array_load(id, 0).unwrap().value, Value::Int(5));
    }

    #[test]
    fn test_array_store_rejects_wrong_kind() {
        let heap = Heap::new();
        let id = heap.alloc_array(INTS, 1);
        let err = heap.array_store(id, 0, Value::Long(1), None).unwrap_err();
        assert!(matches!(err, StoreError::ElementTypeMismatch { .. }));
    }

    #[test]
    fn test_array_bounds() {
        let heap = Heap::new();
        let id = heap.alloc_array(INTS, 2);
        assert_eq!(
            heap.array_load(id, 2).unwrap_err(),
            StoreError::IndexOutOfBounds { index: 2, len: 2 }
        );
        assert!(heap.array_read_range(id, 1, 2).is_err());
        assert!(heap.array_read_range(id, usize::MAX, 2).is_err());
    }

    #[test]
    fn test_array_range_roundtrip() {
        let heap = Heap::new();
        let id = heap.alloc_array(ElementKind::BYTES, 4);
        let bytes = [Value::Byte(1), Value::Byte(2)];
        heap.array_write_range(id, 1, &bytes, Some(Tag::CAMERA)).unwrap();
        let (values, tag) = heap.array_read_range(id, 0, 4).unwrap();
        assert_eq!(values, vec![Value::Byte(0), Value::Byte(1), Value::Byte(2), Value::Byte(0)]);
        assert_eq!(tag, Tag::CAMERA);
    }

    #[test]
    fn test_instance_fields() {
        let heap = Heap::new();
        let id = heap.alloc_instance("Point", 2);
        heap.field_store(id, FieldIndex(1), Value::Int(9), Some(Tag::LOCATION))
            .unwrap();
        let slot = heap.field_load(id, FieldIndex(1)).unwrap();
        assert_eq!(slot, Slot::new(Value::Int(9), Tag::LOCATION));
        assert_eq!(heap.field_tag(id, FieldIndex(0)), Some(Tag::CLEAR));
        assert_eq!(heap.instance_info(id).unwrap(), ("Point".to_string(), 2));
    }

    #[test]
    fn test_wrong_object_kind() {
        let heap = Heap::new();
        let s = heap.alloc_string("hi");
        assert_eq!(heap.array_load(s, 0).unwrap_err(), StoreError::NotAnArray(s));
        assert_eq!(
            heap.field_load(s, FieldIndex(0)).unwrap_err(),
            StoreError::NotAnInstance(s)
        );
        assert_eq!(heap.string(s).unwrap(), "hi");
    }

    #[test]
    fn test_free_recycles_identity_with_clean_record() {
        let heap = Heap::new();
        let id = heap.alloc_array(INTS, 1);
        heap.update_array_tag(id, |t| t | Tag::IMEI);
        assert_eq!(heap.free(id), Some(ObjectKind::Array(INTS)));
        assert_eq!(heap.array_tag(id), None);

        let reused = heap.alloc_array(INTS, 1);
        assert_eq!(reused, id);
        assert_eq!(heap.array_tag(reused), Some(Tag::CLEAR));
    }

    #[test]
    fn test_free_unknown_is_none() {
        let heap = Heap::new();
        assert_eq!(heap.free(HeapId(42)), None);
    }
}
