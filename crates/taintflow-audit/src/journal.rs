//! # Sink Event Journal
//!
//! Persists [`SinkEvent`]s in a Sled database so a leak observed during a
//! run can be inspected after the process exits.
//!
//! ## Storage Structure
//!
//! | Tree | Key | Value | Purpose |
//! |------|-----|-------|---------|
//! | `events` | 8-byte big-endian id | JSON `SinkEvent` | Event log |
//!
//! Identifiers come from `Db::generate_id`, so they are unique and increase
//! across restarts. Big-endian keys make Sled's byte ordering match
//! insertion order, which is what [`AuditJournal::recent`] walks backwards.
//!
//! ## Security Notes
//!
//! - Previews contain the leading bytes of sensitive payloads; store the
//!   database with the same care as the data it describes
//! - Only the digest of the full payload is kept

use crate::models::{AuditError, Result, SinkEvent};
use std::path::Path;
use tracing::debug;

/// Tree name for stored events.
const EVENT_TREE: &str = "events";

/// Append-only store of sink events.
///
/// Cloning is cheap and clones share the same database.
///
/// # Example
///
/// ```rust
/// use taintflow_audit::{AuditJournal, SinkEvent};
/// use taintflow_tag::Tag;
///
/// let journal = AuditJournal::temporary().unwrap();
/// let id = journal
///     .record(SinkEvent::new("network", Tag::IMEI, b"356938035643809", None, 100))
///     .unwrap();
///
/// let event = journal.get(id).unwrap().unwrap();
/// assert_eq!(event.tag, Tag::IMEI);
/// assert_eq!(journal.len(), 1);
/// ```
#[derive(Clone)]
pub struct AuditJournal {
    db: sled::Db,
    events: sled::Tree,
}

impl AuditJournal {
    /// Opens or creates a journal at `path`.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Database` if the path is unusable or the
    /// database is corrupted.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let events = db.open_tree(EVENT_TREE)?;
        Ok(AuditJournal { db, events })
    }

    /// Creates an in-memory journal that vanishes when dropped.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Database` if Sled cannot create the backing store.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let events = db.open_tree(EVENT_TREE)?;
        Ok(AuditJournal { db, events })
    }

    /// Assigns an id to `event`, stores it and returns the id.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Serialization` or `AuditError::Database` if the
    /// event cannot be written.
    pub fn record(&self, mut event: SinkEvent) -> Result<u64> {
        let id = self.db.generate_id()?;
        event.id = id;
        let bytes = serde_json::to_vec(&event)?;
        self.events.insert(id.to_be_bytes(), bytes)?;
        debug!(id, sink = %event.sink, tag = %event.tag, "Recorded sink event");
        Ok(id)
    }

    /// Loads one event by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read or deserialization fails.
    pub fn get(&self, id: u64) -> Result<Option<SinkEvent>> {
        match self.events.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns up to `limit` events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if iteration or deserialization fails.
    pub fn recent(&self, limit: usize) -> Result<Vec<SinkEvent>> {
        self.events
            .iter()
            .rev()
            .take(limit)
            .map(|entry| decode(entry?))
            .collect()
    }

    /// Returns every event recorded for `sink`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if iteration or deserialization fails.
    pub fn by_sink(&self, sink: &str) -> Result<Vec<SinkEvent>> {
        let mut out = Vec::new();
        for entry in self.events.iter() {
            let event = decode(entry?)?;
            if event.sink == sink {
                out.push(event);
            }
        }
        Ok(out)
    }

    /// Number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no events are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Removes every event.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Database` if the tree cannot be cleared.
    pub fn clear(&self) -> Result<()> {
        self.events.clear()?;
        Ok(())
    }

    /// Flushes pending writes to disk and returns the bytes written.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Database` if the flush fails.
    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }
}

fn decode((key, value): (sled::IVec, sled::IVec)) -> Result<SinkEvent> {
    if key.len() != 8 {
        return Err(AuditError::CorruptKey(key.len()));
    }
    Ok(serde_json::from_slice(&value)?)
}

impl std::fmt::Debug for AuditJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditJournal")
            .field("events", &self.events.len())
            .finish()
    }
}
