//! # Shadow Tag Store
//!
//! [`ShadowStore`] owns the host's shared primary storage (heap, direct
//! buffers, open-file table) together with the shadow storage for every
//! shared location kind, and keeps the two in lockstep:
//!
//! - every allocation runs the matching `on_allocate` hook, so a location is
//!   never observed before its tag exists;
//! - every reclamation runs `on_reclaim` *before* the identity is released
//!   for reuse, so shadow state never outlives its location and a recycled
//!   identity always starts `CLEAR`.
//!
//! ## Routing
//!
//! | Key | Storage |
//! |-----|---------|
//! | `Array` | policy-selected (`ParallelSlot` by default) |
//! | `Field` | policy-selected (`ParallelSlot` by default) |
//! | `Object` | side table (instances and strings) |
//! | `Buffer` | side table |
//! | `Descriptor` | side table |
//!
//! Arrays are tracked by their container tag only; an array identity has no
//! separate `Object` entry.

use crate::buffer::BufferPool;
use crate::descriptor::{DescriptorTable, FileTarget, DEFAULT_DESCRIPTOR_LIMIT};
use crate::error::Result;
use crate::heap::{Heap, ObjectKind};
use crate::location::{BufferId, Fd, FieldIndex, HeapId, LocationKind, ShadowKey};
use crate::policy::{ParallelSlots, StoragePolicy, StorageStrategy, TagStorage};
use crate::table::SideTable;
use crate::value::{ElementKind, Slot, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taintflow_tag::Tag;
use tracing::debug;

/// Point-in-time counters for the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Live heap objects (arrays, instances, strings).
    pub live_objects: usize,
    /// Live direct buffers.
    pub live_buffers: usize,
    /// Open descriptors, standard streams included.
    pub open_descriptors: usize,
    /// Tainted object identities.
    pub tainted_objects: usize,
    /// Tainted direct buffers.
    pub tainted_buffers: usize,
    /// Tainted descriptors.
    pub tainted_descriptors: usize,
}

/// Shared primary storage plus its shadow tags.
///
/// # Thread Safety
///
/// `ShadowStore` is `Send + Sync` and is meant to be shared behind an
/// [`Arc`] by every mutator thread. No method blocks beyond a short map
/// shard lock.
///
/// # Example
///
/// ```rust
/// use taintflow_store::{ElementKind, ShadowKey, ShadowStore, StoragePolicy};
/// use taintflow_tag::Tag;
///
/// let store = ShadowStore::new(StoragePolicy::default());
/// let bytes = store.alloc_array(ElementKind::BYTES, 16);
///
/// assert_eq!(store.get_tag(ShadowKey::Array(bytes)), Tag::CLEAR);
/// store.merge_tag(ShadowKey::Array(bytes), Tag::CAMERA);
/// assert_eq!(store.get_tag(ShadowKey::Array(bytes)), Tag::CAMERA);
///
/// store.reclaim_object(bytes);
/// assert_eq!(store.get_tag(ShadowKey::Array(bytes)), Tag::CLEAR);
/// ```
#[derive(Debug)]
pub struct ShadowStore {
    policy: StoragePolicy,
    heap: Arc<Heap>,
    buffers: BufferPool,
    descriptors: DescriptorTable,
    arrays: Arc<dyn TagStorage>,
    fields: Arc<dyn TagStorage>,
    objects: SideTable,
    buffer_tags: SideTable,
    descriptor_tags: SideTable,
}

impl ShadowStore {
    /// Creates a store using `policy` for arrays and fields.
    #[must_use]
    pub fn new(policy: StoragePolicy) -> Self {
        Self::with_descriptor_limit(policy, DEFAULT_DESCRIPTOR_LIMIT)
    }

    /// Creates a store with a custom open-descriptor limit.
    #[must_use]
    pub fn with_descriptor_limit(policy: StoragePolicy, descriptor_limit: usize) -> Self {
        let heap = Arc::new(Heap::new());
        let descriptors = DescriptorTable::with_limit(descriptor_limit);
        let descriptor_tags = SideTable::new();
        for fd in 0..3 {
            descriptor_tags.on_allocate(ShadowKey::Descriptor(Fd(fd)));
        }

        let store = Self {
            policy,
            arrays: select_storage(policy.arrays, &heap),
            fields: select_storage(policy.fields, &heap),
            heap,
            buffers: BufferPool::new(),
            descriptors,
            objects: SideTable::new(),
            buffer_tags: SideTable::new(),
            descriptor_tags,
        };
        debug!(
            "shadow store ready: arrays={}, fields={}",
            policy.arrays, policy.fields
        );
        store
    }

    /// Returns the policy this store was built with.
    #[must_use]
    pub const fn policy(&self) -> StoragePolicy {
        self.policy
    }

    /// Returns the managed heap.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Returns the direct buffer pool.
    #[must_use]
    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Returns the open-file table.
    #[must_use]
    pub fn descriptors(&self) -> &DescriptorTable {
        &self.descriptors
    }

    /// Returns the storage responsible for a location kind, or `None` for
    /// thread-local slots.
    #[must_use]
    pub fn storage_for(&self, kind: LocationKind) -> Option<&dyn TagStorage> {
        match kind {
            LocationKind::Slot => None,
            LocationKind::Array => Some(self.arrays.as_ref()),
            LocationKind::Field => Some(self.fields.as_ref()),
            LocationKind::Object => Some(&self.objects),
            LocationKind::Buffer => Some(&self.buffer_tags),
            LocationKind::Descriptor => Some(&self.descriptor_tags),
        }
    }

    fn storage(&self, key: ShadowKey) -> &dyn TagStorage {
        match key {
            ShadowKey::Array(_) => self.arrays.as_ref(),
            ShadowKey::Field(..) => self.fields.as_ref(),
            ShadowKey::Object(_) => &self.objects,
            ShadowKey::Buffer(_) => &self.buffer_tags,
            ShadowKey::Descriptor(_) => &self.descriptor_tags,
        }
    }

    fn arrays_parallel(&self) -> bool {
        self.arrays.strategy() == StorageStrategy::ParallelSlot
    }

    fn fields_parallel(&self) -> bool {
        self.fields.strategy() == StorageStrategy::ParallelSlot
    }

    // ------------------------------------------------------------------
    // Tag contract
    // ------------------------------------------------------------------

    /// Returns the tag stored for `key`, or `CLEAR` if it never existed or
    /// has been reclaimed.
    #[must_use]
    pub fn get_tag(&self, key: ShadowKey) -> Tag {
        self.storage(key).get(key)
    }

    /// Overwrites the tag for `key`. Returns `false` if `key` does not
    /// resolve; the write is then dropped.
    pub fn set_tag(&self, key: ShadowKey, tag: Tag) -> bool {
        self.storage(key).set(key, tag)
    }

    /// ORs `tag` into the tag for `key`. Returns `false` if `key` does not
    /// resolve; the write is then dropped.
    pub fn merge_tag(&self, key: ShadowKey, tag: Tag) -> bool {
        if tag.is_clear() {
            return self.resolves(key);
        }
        self.storage(key).merge(key, tag)
    }

    /// Resets the tag for `key` to `CLEAR`.
    ///
    /// This is the declassification write; nothing else lowers a tag.
    pub fn clear_tag(&self, key: ShadowKey) -> bool {
        self.storage(key).set(key, Tag::CLEAR)
    }

    /// Returns `true` if `key` names a live location.
    #[must_use]
    pub fn resolves(&self, key: ShadowKey) -> bool {
        match key {
            ShadowKey::Array(id) => matches!(self.heap.kind_of(id), Some(ObjectKind::Array(_))),
            ShadowKey::Field(id, field) => self.heap.field_load(id, field).is_ok(),
            ShadowKey::Object(_) => self.objects.contains(key),
            ShadowKey::Buffer(_) => self.buffer_tags.contains(key),
            ShadowKey::Descriptor(_) => self.descriptor_tags.contains(key),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Allocates a zero-filled array. Its tag starts `CLEAR`.
    pub fn alloc_array(&self, kind: ElementKind, len: usize) -> HeapId {
        let id = self.heap.alloc_array(kind, len);
        self.arrays.on_allocate(ShadowKey::Array(id));
        id
    }

    /// Allocates an array holding `elements`. Its tag starts `CLEAR`.
    ///
    /// # Errors
    ///
    /// `ElementTypeMismatch` if an element does not fit `kind`.
    pub fn alloc_array_from(&self, kind: ElementKind, elements: Vec<Value>) -> Result<HeapId> {
        let id = self.heap.alloc_array_from(kind, elements)?;
        self.arrays.on_allocate(ShadowKey::Array(id));
        Ok(id)
    }

    /// Allocates an instance. Its identity tag and every field tag start
    /// `CLEAR`.
    pub fn alloc_instance(&self, class: impl Into<String>, field_count: u16) -> HeapId {
        let id = self.heap.alloc_instance(class, field_count);
        self.objects.on_allocate(ShadowKey::Object(id));
        for field in 0..field_count {
            self.fields.on_allocate(ShadowKey::Field(id, FieldIndex(field)));
        }
        id
    }

    /// Allocates a string. Its identity tag starts `CLEAR`.
    pub fn alloc_string(&self, text: impl Into<String>) -> HeapId {
        let id = self.heap.alloc_string(text);
        self.objects.on_allocate(ShadowKey::Object(id));
        id
    }

    /// Reclaims a heap object, releasing its shadow state before its
    /// identity becomes reusable. Returns `false` if nothing was live.
    pub fn reclaim_object(&self, id: HeapId) -> bool {
        let Some(kind) = self.heap.kind_of(id) else {
            return false;
        };
        match kind {
            ObjectKind::Array(_) => {
                let key = ShadowKey::Array(id);
                log_reclaim(key, self.arrays.get(key));
                self.arrays.on_reclaim(key);
            }
            ObjectKind::Instance => {
                let count = self.heap.instance_info(id).map_or(0, |(_, n)| n);
                for field in 0..count {
                    self.fields.on_reclaim(ShadowKey::Field(id, FieldIndex(field)));
                }
                let key = ShadowKey::Object(id);
                log_reclaim(key, self.objects.get(key));
                self.objects.on_reclaim(key);
            }
            ObjectKind::String => {
                let key = ShadowKey::Object(id);
                log_reclaim(key, self.objects.get(key));
                self.objects.on_reclaim(key);
            }
        }
        self.heap.free(id).is_some()
    }

    /// Allocates a direct buffer. Its tag starts `CLEAR`.
    pub fn alloc_direct_buffer(&self, capacity: usize) -> BufferId {
        let id = self.buffers.alloc(capacity);
        self.buffer_tags.on_allocate(ShadowKey::Buffer(id));
        id
    }

    /// Frees a direct buffer. Returns `false` if it was not live.
    pub fn free_buffer(&self, id: BufferId) -> bool {
        if !self.buffers.contains(id) {
            return false;
        }
        let key = ShadowKey::Buffer(id);
        log_reclaim(key, self.buffer_tags.get(key));
        self.buffer_tags.on_reclaim(key);
        self.buffers.free(id)
    }

    /// Opens a descriptor. Its tag starts `CLEAR`, even when the number is
    /// a reused one.
    ///
    /// # Errors
    ///
    /// `DescriptorsExhausted` when the table is full.
    pub fn open(&self, target: FileTarget) -> Result<Fd> {
        let fd = self.descriptors.open(target)?;
        self.descriptor_tags.on_allocate(ShadowKey::Descriptor(fd));
        Ok(fd)
    }

    /// Closes a descriptor and drops its tag.
    ///
    /// # Errors
    ///
    /// `BadDescriptor` if `fd` is not open.
    pub fn close(&self, fd: Fd) -> Result<FileTarget> {
        let key = ShadowKey::Descriptor(fd);
        if self.descriptors.is_open(fd) {
            log_reclaim(key, self.descriptor_tags.get(key));
            self.descriptor_tags.on_reclaim(key);
        }
        self.descriptors.close(fd)
    }

    // ------------------------------------------------------------------
    // Primary data with co-located tags
    // ------------------------------------------------------------------

    /// Returns the element kind and length of an array.
    ///
    /// # Errors
    ///
    /// `UnknownObject` or `NotAnArray`.
    pub fn array_info(&self, id: HeapId) -> Result<(ElementKind, usize)> {
        self.heap.array_info(id)
    }

    /// Reads an element together with the array tag.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnArray` or `IndexOutOfBounds`.
    pub fn array_load(&self, id: HeapId, index: usize) -> Result<Slot> {
        let slot = self.heap.array_load(id, index)?;
        if self.arrays_parallel() {
            Ok(slot)
        } else {
            Ok(Slot::new(slot.value, self.arrays.get(ShadowKey::Array(id))))
        }
    }

    /// Writes an element and merges `tag` into the array tag.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnArray`, `IndexOutOfBounds` or
    /// `ElementTypeMismatch`.
    pub fn array_store(&self, id: HeapId, index: usize, value: Value, tag: Tag) -> Result<()> {
        if self.arrays_parallel() {
            self.heap.array_store(id, index, value, Some(tag))
        } else {
            self.heap.array_store(id, index, value, None)?;
            self.arrays.merge(ShadowKey::Array(id), tag);
            Ok(())
        }
    }

    /// Reads a range of elements together with the array tag.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnArray` or `IndexOutOfBounds`.
    pub fn array_read_range(&self, id: HeapId, start: usize, len: usize) -> Result<(Vec<Value>, Tag)> {
        let (values, tag) = self.heap.array_read_range(id, start, len)?;
        if self.arrays_parallel() {
            Ok((values, tag))
        } else {
            Ok((values, self.arrays.get(ShadowKey::Array(id))))
        }
    }

    /// Writes a range of elements and merges `tag` into the array tag.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnArray`, `IndexOutOfBounds` or
    /// `ElementTypeMismatch`.
    pub fn array_write_range(&self, id: HeapId, start: usize, values: &[Value], tag: Tag) -> Result<()> {
        if self.arrays_parallel() {
            self.heap.array_write_range(id, start, values, Some(tag))
        } else {
            self.heap.array_write_range(id, start, values, None)?;
            self.arrays.merge(ShadowKey::Array(id), tag);
            Ok(())
        }
    }

    /// Returns the class name and field count of an instance.
    ///
    /// # Errors
    ///
    /// `UnknownObject` or `NotAnInstance`.
    pub fn instance_info(&self, id: HeapId) -> Result<(String, u16)> {
        self.heap.instance_info(id)
    }

    /// Reads a field together with its tag.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnInstance` or `IndexOutOfBounds`.
    pub fn field_load(&self, id: HeapId, field: FieldIndex) -> Result<Slot> {
        let slot = self.heap.field_load(id, field)?;
        if self.fields_parallel() {
            Ok(slot)
        } else {
            Ok(Slot::new(slot.value, self.fields.get(ShadowKey::Field(id, field))))
        }
    }

    /// Writes a field and merges `tag` into its tag.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `NotAnInstance` or `IndexOutOfBounds`.
    pub fn field_store(&self, id: HeapId, field: FieldIndex, value: Value, tag: Tag) -> Result<()> {
        if self.fields_parallel() {
            self.heap.field_store(id, field, value, Some(tag))
        } else {
            self.heap.field_store(id, field, value, None)?;
            self.fields.merge(ShadowKey::Field(id, field), tag);
            Ok(())
        }
    }

    /// Returns the text of a string.
    ///
    /// # Errors
    ///
    /// `UnknownObject` or `NotAString`.
    pub fn string(&self, id: HeapId) -> Result<String> {
        self.heap.string(id)
    }

    /// Reads bytes out of a direct buffer together with the buffer tag.
    ///
    /// # Errors
    ///
    /// `UnknownBuffer` or `BufferOverflow`.
    pub fn buffer_read(&self, id: BufferId, offset: usize, len: usize) -> Result<(Vec<u8>, Tag)> {
        let bytes = self.buffers.read(id, offset, len)?;
        Ok((bytes, self.buffer_tags.get(ShadowKey::Buffer(id))))
    }

    /// Writes bytes into a direct buffer and merges `tag` into its tag.
    ///
    /// # Errors
    ///
    /// `UnknownBuffer` or `BufferOverflow`.
    pub fn buffer_write(&self, id: BufferId, offset: usize, bytes: &[u8], tag: Tag) -> Result<()> {
        self.buffers.write(id, offset, bytes)?;
        self.merge_tag(ShadowKey::Buffer(id), tag);
        Ok(())
    }

    /// Returns what an open descriptor points at.
    #[must_use]
    pub fn descriptor_target(&self, fd: Fd) -> Option<FileTarget> {
        self.descriptors.target(fd)
    }

    /// Returns point-in-time counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            live_objects: self.heap.len(),
            live_buffers: self.buffers.len(),
            open_descriptors: self.descriptors.len(),
            tainted_objects: self.objects.tainted_count(),
            tainted_buffers: self.buffer_tags.tainted_count(),
            tainted_descriptors: self.descriptor_tags.tainted_count(),
        }
    }
}

impl Default for ShadowStore {
    fn default() -> Self {
        Self::new(StoragePolicy::default())
    }
}

fn select_storage(strategy: StorageStrategy, heap: &Arc<Heap>) -> Arc<dyn TagStorage> {
    match strategy {
        StorageStrategy::SideTable => Arc::new(SideTable::new()),
        StorageStrategy::ParallelSlot => Arc::new(ParallelSlots::new(Arc::clone(heap))),
    }
}

fn log_reclaim(key: ShadowKey, tag: Tag) {
    if tag.is_tainted() {
        debug!("reclaiming {:?} with {:?}", key, tag);
    }
}
