//! Sink descriptors and the check applied before data leaves the process.
//!
//! A [`Sink`] names an exit point (network, file, log, IPC) and the sources
//! it refuses. Checking never blocks anything on its own: it returns a
//! [`SinkViolation`] and leaves the decision (log, block, redact) to the
//! caller.

use serde::{Deserialize, Serialize};
use taintflow_tag::{TaintSource, Tag};
use thiserror::Error;

/// Device and subscriber identifiers.
const IDENTIFIERS: Tag = Tag::IMEI
    .combine(Tag::IMSI)
    .combine(Tag::ICCID)
    .combine(Tag::DEVICE_SN)
    .combine(Tag::PHONE_NUMBER);

/// Credentials.
const SECRETS: Tag = Tag::PASSWORD.combine(Tag::ACCOUNT);

/// An exit point and the sources that must not reach it.
///
/// # Example
///
/// ```rust
/// use taintflow_core::Sink;
/// use taintflow_tag::Tag;
///
/// let sink = Sink::log();
/// assert!(sink.check(Tag::LOCATION).is_ok());
///
/// let violation = sink.check(Tag::LOCATION | Tag::PASSWORD).unwrap_err();
/// assert_eq!(violation.offending, Tag::PASSWORD);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sink {
    /// Sink name used in logs and audit records.
    pub name: String,
    /// Sources refused by this sink.
    pub blocked: Tag,
}

impl Sink {
    /// Creates a sink refusing `blocked`.
    #[must_use]
    pub fn new(name: impl Into<String>, blocked: impl Into<Tag>) -> Self {
        Self {
            name: name.into(),
            blocked: blocked.into(),
        }
    }

    /// Network writes: refuses every known source.
    #[must_use]
    pub fn network() -> Self {
        Self::new("network", TaintSource::KNOWN_MASK)
    }

    /// File writes: refuses credentials.
    #[must_use]
    pub fn file() -> Self {
        Self::new("file", SECRETS)
    }

    /// Log output: refuses credentials and identifiers.
    #[must_use]
    pub fn log() -> Self {
        Self::new("log", SECRETS | IDENTIFIERS)
    }

    /// Inter-process messages: refuses credentials, identifiers and history.
    #[must_use]
    pub fn ipc() -> Self {
        Self::new("ipc", SECRETS | IDENTIFIERS | Tag::HISTORY)
    }

    /// The four preset sinks.
    #[must_use]
    pub fn presets() -> Vec<Sink> {
        vec![Self::network(), Self::file(), Self::log(), Self::ipc()]
    }

    /// Returns the refused bits present in `tag`.
    #[must_use]
    pub const fn offending(&self, tag: Tag) -> Tag {
        tag.intersection(self.blocked)
    }

    /// Checks `tag` against this sink.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkViolation`] if any refused bit is set.
    pub fn check(&self, tag: Tag) -> Result<(), SinkViolation> {
        let offending = self.offending(tag);
        if offending.is_clear() {
            Ok(())
        } else {
            Err(SinkViolation {
                sink: self.name.clone(),
                tag,
                offending,
            })
        }
    }
}

/// Tainted data carrying refused sources reached a sink.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{offending} must not reach sink '{sink}'")]
pub struct SinkViolation {
    /// Sink that was reached.
    pub sink: String,
    /// Full tag of the data.
    pub tag: Tag,
    /// Refused bits present in the tag.
    pub offending: Tag,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_passes_every_preset() {
        for sink in Sink::presets() {
            assert!(sink.check(Tag::CLEAR).is_ok(), "{}", sink.name);
        }
    }

    #[test]
    fn test_network_refuses_every_known_source() {
        let sink = Sink::network();
        for source in TaintSource::ALL {
            assert!(sink.check(source.tag()).is_err(), "{source}");
        }
    }

    #[test]
    fn test_unknown_bits_are_not_refused_by_presets() {
        assert!(Sink::network().check(Tag::from_bits(0x8000_0000)).is_ok());
    }

    #[test]
    fn test_file_allows_location_refuses_password() {
        let sink = Sink::file();
        assert!(sink.check(Tag::LOCATION_GPS).is_ok());
        let violation = sink.check(Tag::LOCATION_GPS | Tag::PASSWORD).unwrap_err();
        assert_eq!(violation.sink, "file");
        assert_eq!(violation.tag, Tag::LOCATION_GPS | Tag::PASSWORD);
        assert_eq!(violation.offending, Tag::PASSWORD);
    }

    #[test]
    fn test_ipc_refuses_history() {
        assert!(Sink::ipc().check(Tag::HISTORY).is_err());
        assert!(Sink::log().check(Tag::HISTORY).is_ok());
    }

    #[test]
    fn test_violation_message() {
        let violation = Sink::log().check(Tag::IMEI).unwrap_err();
        assert_eq!(violation.to_string(), "IMEI must not reach sink 'log'");
    }
}
