//! Identity allocation with address-style reuse.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Hands out numeric identities, recycling released ones most-recent-first.
///
/// Reuse is what makes stale-tag leakage observable: a reclaimed identity
/// comes straight back on the next allocation, so any shadow entry that
/// survived reclamation would be visible immediately.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: AtomicU64,
    free: Mutex<Vec<u64>>,
}

impl IdAllocator {
    /// Creates an allocator whose fresh identities start at `first`.
    pub(crate) const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
            free: Mutex::new(Vec::new()),
        }
    }

    /// Returns a recycled identity if one is available, else a fresh one.
    pub(crate) fn acquire(&self) -> u64 {
        let recycled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        recycled.unwrap_or_else(|| self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns an identity to the free list.
    pub(crate) fn release(&self, id: u64) {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
    }
}
