//! # Taintflow Audit
//!
//! Durable record of tainted data reaching sinks.
//!
//! When the taint facade reports a sink hit, it hands the payload to an
//! [`AuditJournal`]. The journal stores a [`SinkEvent`] carrying the tag, the
//! sink name, a short preview and a SHA-256 digest of the payload.
//!
//! ## Example
//!
//! ```rust
//! use taintflow_audit::{AuditJournal, SinkEvent};
//! use taintflow_tag::Tag;
//!
//! let journal = AuditJournal::temporary().unwrap();
//! journal
//!     .record(SinkEvent::new("file", Tag::CONTACTS, b"ada@example.com", Some("/sdcard/out".into()), 100))
//!     .unwrap();
//!
//! let latest = &journal.recent(1).unwrap()[0];
//! assert_eq!(latest.destination.as_deref(), Some("/sdcard/out"));
//! ```

pub mod journal;
pub mod models;

pub use journal::AuditJournal;
pub use models::{
    digest, to_hex, AuditConfig, AuditError, Digest, Result, SinkEvent, DEFAULT_PREVIEW_BYTES,
    DIGEST_SIZE,
};
