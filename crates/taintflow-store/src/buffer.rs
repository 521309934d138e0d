//! Off-heap (direct) buffer allocations.
//!
//! Direct buffers live outside the managed heap and are released
//! explicitly, not by the collector. Their tags are whole-buffer: there is
//! no per-byte taint inside unmanaged memory.

use crate::error::{Result, StoreError};
use crate::ids::IdAllocator;
use crate::location::{BufferId, HeapId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A byte buffer as seen by instrumented code.
///
/// Only `Direct` buffers carry their own tag. A `Heap` buffer is a view over
/// a managed `byte[]` whose taint is the array's taint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteBuffer {
    /// Native allocation.
    Direct(BufferId),
    /// View over a managed byte array.
    Heap(HeapId),
}

impl ByteBuffer {
    /// Returns `true` for native allocations.
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        matches!(self, ByteBuffer::Direct(_))
    }

    /// Returns the direct buffer identity, if any.
    #[must_use]
    pub const fn direct_id(&self) -> Option<BufferId> {
        match self {
            ByteBuffer::Direct(id) => Some(*id),
            ByteBuffer::Heap(_) => None,
        }
    }
}

/// Pool of live direct buffers.
#[derive(Debug)]
pub struct BufferPool {
    buffers: DashMap<BufferId, Vec<u8>>,
    ids: IdAllocator,
}

impl BufferPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffers: DashMap::new(),
            ids: IdAllocator::starting_at(1),
        }
    }

    /// Allocates a zero-filled buffer of `capacity` bytes.
    pub fn alloc(&self, capacity: usize) -> BufferId {
        let id = BufferId(self.ids.acquire());
        self.buffers.insert(id, vec![0; capacity]);
        trace!("direct alloc {} ({} bytes)", id, capacity);
        id
    }

    /// Frees a buffer. Returns `false` if it was not live.
    pub fn free(&self, id: BufferId) -> bool {
        if self.buffers.remove(&id).is_some() {
            self.ids.release(id.0);
            trace!("direct free {}", id);
            true
        } else {
            false
        }
    }

    /// Returns `true` if `id` is live.
    #[must_use]
    pub fn contains(&self, id: BufferId) -> bool {
        self.buffers.contains_key(&id)
    }

    /// Returns the capacity of a live buffer.
    ///
    /// # Errors
    ///
    /// `UnknownBuffer` if the buffer is not live.
    pub fn capacity(&self, id: BufferId) -> Result<usize> {
        self.buffers
            .get(&id)
            .map(|b| b.len())
            .ok_or(StoreError::UnknownBuffer(id))
    }

    /// Copies `len` bytes starting at `offset` out of a buffer.
    ///
    /// # Errors
    ///
    /// `UnknownBuffer` or `BufferOverflow`.
    pub fn read(&self, id: BufferId, offset: usize, len: usize) -> Result<Vec<u8>> {
        let buffer = self.buffers.get(&id).ok_or(StoreError::UnknownBuffer(id))?;
        let end = bounded(offset, len, buffer.len())?;
        Ok(buffer[offset..end].to_vec())
    }

    /// Copies `bytes` into a buffer starting at `offset`.
    ///
    /// # Errors
    ///
    /// `UnknownBuffer` or `BufferOverflow`. Nothing is written on error.
    pub fn write(&self, id: BufferId, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut buffer = self
            .buffers
            .get_mut(&id)
            .ok_or(StoreError::UnknownBuffer(id))?;
        let end = bounded(offset, bytes.len(), buffer.len())?;
        buffer[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Number of live buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns `true` when no buffers are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

fn bounded(offset: usize, len: usize, capacity: usize) -> Result<usize> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(end),
        _ => Err(StoreError::BufferOverflow {
            offset,
            end: offset.saturating_add(len),
            capacity,
        }),
    }
}
