//! # Identity Side Table
//!
//! A concurrent map from [`ShadowKey`] to [`Tag`] for locations that have
//! an identity but no room for a tag next to their data.
//!
//! ## Entry Lifecycle
//!
//! | Event | Effect |
//! |-------|--------|
//! | `on_allocate` | entry inserted as `CLEAR` (overwrites anything stale) |
//! | `set` / `merge` | entry updated in place; absent entry is left absent |
//! | `on_reclaim` | entry removed |
//!
//! ## Security Notes
//!
//! - Writes never create entries. A merge that races with reclamation finds
//!   nothing and is dropped, so a reclaimed identity cannot be resurrected
//!   with its old taint.
//! - Keys are plain identities; the table holds no reference to the object
//!   and never extends its lifetime.
//! - Reads of a missing key return `CLEAR` (accepted soundness gap in
//!   exchange for never failing the host).

use crate::location::ShadowKey;
use crate::policy::{StorageStrategy, TagStorage};
use dashmap::DashMap;
use taintflow_tag::Tag;
use tracing::trace;

/// Identity-keyed tag storage.
///
/// # Example
///
/// ```rust
/// use taintflow_store::{Fd, ShadowKey, SideTable, TagStorage};
/// use taintflow_tag::Tag;
///
/// let table = SideTable::new();
/// let key = ShadowKey::Descriptor(Fd(7));
///
/// assert!(!table.merge(key, Tag::SMS)); // not allocated yet
/// table.on_allocate(key);
/// assert!(table.merge(key, Tag::SMS));
/// assert_eq!(table.get(key), Tag::SMS);
///
/// table.on_reclaim(key);
/// assert_eq!(table.get(key), Tag::CLEAR);
/// ```
#[derive(Debug, Default)]
pub struct SideTable {
    entries: DashMap<ShadowKey, Tag>,
}

impl SideTable {
    /// Creates an empty side table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no entries are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of live entries carrying a non-zero tag.
    #[must_use]
    pub fn tainted_count(&self) -> usize {
        self.entries.iter().filter(|e| e.value().is_tainted()).count()
    }

    /// Returns `true` if `key` has a live entry.
    #[must_use]
    pub fn contains(&self, key: ShadowKey) -> bool {
        self.entries.contains_key(&key)
    }
}

impl TagStorage for SideTable {
    fn strategy(&self) -> StorageStrategy {
        StorageStrategy::SideTable
    }

    fn on_allocate(&self, key: ShadowKey) {
        self.entries.insert(key, Tag::CLEAR);
    }

    fn on_reclaim(&self, key: ShadowKey) {
        self.entries.remove(&key);
    }

    fn get(&self, key: ShadowKey) -> Tag {
        self.entries.get(&key).map_or(Tag::CLEAR, |e| *e)
    }

    fn set(&self, key: ShadowKey, tag: Tag) -> bool {
        match self.entries.get_mut(&key) {
            Some(mut entry) => {
                *entry = tag;
                true
            }
            None => {
                trace!("side-table set on unresolved {:?} dropped", key);
                false
            }
        }
    }

    fn merge(&self, key: ShadowKey, tag: Tag) -> bool {
        match self.entries.get_mut(&key) {
            Some(mut entry) => {
                *entry = entry.combine(tag);
                true
            }
            None => {
                trace!("side-table merge on unresolved {:?} dropped", key);
                false
            }
        }
    }
}
