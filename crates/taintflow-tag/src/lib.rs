//! # Taint Tag Algebra
//!
//! The value domain of taintflow: a 32-bit mask where each bit names one
//! sensitive data source, combined by bitwise OR.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Tag`] | Immutable bitmask with the combine/has/clear algebra |
//! | [`TaintSource`] | Known sources with their bit and display name |
//! | [`describe`] | Total rendering of any tag, unknown bits included |
//!
//! ## Quick Start
//!
//! ```rust
//! use taintflow_tag::{Tag, TaintSource};
//!
//! let fix = Tag::from(TaintSource::LocationGps);
//! let contact = Tag::CONTACTS;
//! let derived = fix.combine(contact);
//!
//! assert!(derived.has(TaintSource::LocationGps));
//! assert_eq!(derived.describe(), "Contacts, Location (GPS)");
//! assert!(derived.clear().is_clear());
//! ```

mod describe;
mod source;
mod tag;

pub use describe::{describe, exact_name, CLEAR_LABEL};
pub use source::{TaintSource, UnknownSource};
pub use tag::Tag;

#[cfg(test)]
mod proptest_algebra;
