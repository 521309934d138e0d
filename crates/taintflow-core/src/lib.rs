//! # Taintflow Core
//!
//! Source/sink instrumentation facade for dynamic taint tracking.
//! Ties together the shadow store, the propagation engine and the sink
//! audit journal behind one [`Taint`] value.
//!
//! ## Leak Coverage
//!
//! | Boundary | Call | Effect |
//! |----------|------|--------|
//! | Source | [`Taint::tag_source`] | Merges declared bits into a location |
//! | Movement | [`Taint::engine`] | Propagation rules on every copy and computation |
//! | Sink | [`Taint::query_sink`] / [`Taint::check_sink`] | Reads the tag and compares it to the sink's refused sources |
//! | Audit | [`Taint::report_sink`] | `warn` event plus a journal record |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       TAINTFLOW CORE                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │                    ┌─────────────────┐                          │
//! │                    │      Taint      │  ← Instrumentation API   │
//! │                    └────────┬────────┘                          │
//! │                             │                                   │
//! │         ┌───────────────────┼───────────────────┐               │
//! │         ▼                   ▼                   ▼               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │ Propagation │───▶│   Shadow    │    │    Audit    │          │
//! │  │   Engine    │    │    Store    │    │   Journal   │          │
//! │  └─────────────┘    └─────────────┘    └─────────────┘          │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use taintflow_core::{Taint, TaintConfig};
//! use taintflow_engine::ThreadContext;
//! use taintflow_store::{FileTarget, Location, Register};
//! use taintflow_tag::Tag;
//!
//! let taint = Taint::new(TaintConfig::default())?;
//! let mut ctx = ThreadContext::new();
//! taint.engine().invoke(&mut ctx, "upload", 2, &[])?;
//!
//! let fd = taint.store().open(FileTarget::Path("/data/contacts.db".into()))?;
//! taint.add_taint_file(fd, Tag::CONTACTS);
//!
//! taint.engine().new_array(&mut ctx, Register(0), taintflow_store::ElementKind::BYTES, 3)?;
//! taint.engine().file_read(&mut ctx, fd, b"ada", Register(0), 0)?;
//!
//! let array = ctx.value(Register(0)).and_then(|v| v.as_ref_id()).unwrap();
//! let tag = taint.query_sink(&ctx, Location::Array(array));
//! assert_eq!(tag, Tag::CONTACTS);
//!
//! let network = taint.sink("network").unwrap();
//! if let Err(violation) = taint.check_sink(tag, network) {
//!     taint.report_sink(tag, network, b"ada", Some("203.0.113.9:443"))?;
//!     assert_eq!(violation.offending, Tag::CONTACTS);
//! }
//! # Ok::<(), taintflow_core::TaintError>(())
//! ```
//!
//! ## Security Notes
//!
//! - Tracking misses fail open: an unresolvable location reads as clear
//! - Only [`Taint::declassify`] lowers a tag
//! - Sink checks report; the caller decides whether to block
//! - Audit records keep a preview and a digest, never the full payload

mod config;
mod error;
mod sink;
mod taint;

pub use config::{StoreConfig, TaintConfig};
pub use error::TaintError;
pub use sink::{Sink, SinkViolation};
pub use taint::Taint;

// Re-export component types for convenience
pub use taintflow_audit::{AuditConfig, AuditJournal, SinkEvent};
pub use taintflow_engine::{EngineConfig, PropagationEngine, ThreadContext};
pub use taintflow_store::{Location, ShadowStore, StoragePolicy, StorageStrategy};
pub use taintflow_tag::{TaintSource, Tag};

/// Core result type for facade operations.
pub type Result<T> = std::result::Result<T, TaintError>;

#[cfg(test)]
mod tests;
