//! # Audit Data Models
//!
//! A [`SinkEvent`] records one observation of tainted data reaching a sink.
//! The payload itself is never stored: the journal keeps a short preview
//! for triage and a SHA-256 digest so the full payload can be matched later
//! without retaining it.
//!
//! ## References
//!
//! - NIST FIPS 180-4 (SHA-256, 32-byte digest)

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use taintflow_tag::Tag;
use thiserror::Error;

/// SHA-256 digest size in bytes.
pub const DIGEST_SIZE: usize = 32;

/// Default number of payload bytes kept in a preview.
pub const DEFAULT_PREVIEW_BYTES: usize = 100;

/// A 32-byte SHA-256 digest.
pub type Digest = [u8; DIGEST_SIZE];

/// Computes the SHA-256 digest of `payload`.
#[must_use]
pub fn digest(payload: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().into()
}

/// Renders a digest as lowercase hex.
#[must_use]
pub fn to_hex(digest: &Digest) -> String {
    let mut out = String::with_capacity(DIGEST_SIZE * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// One tainted value observed at a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkEvent {
    /// Journal-assigned identifier; `0` until recorded.
    pub id: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Sink name (for example `network`).
    pub sink: String,
    /// Tag observed on the data.
    pub tag: Tag,
    /// Rendered tag, as shown to people.
    pub sources: String,
    /// Where the data was headed, if known (path, peer address).
    pub destination: Option<String>,
    /// Leading payload bytes, lossily decoded as UTF-8.
    pub preview: String,
    /// Whether the preview was cut short.
    pub truncated: bool,
    /// Total payload length in bytes.
    pub payload_len: usize,
    /// SHA-256 of the full payload.
    pub digest: Digest,
}

impl SinkEvent {
    /// Builds an event from a payload, keeping at most `preview_bytes` of it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use taintflow_audit::SinkEvent;
    /// use taintflow_tag::Tag;
    ///
    /// let event = SinkEvent::new("log", Tag::SMS, b"hello world", None, 5);
    /// assert_eq!(event.preview, "hello");
    /// assert!(event.truncated);
    /// assert_eq!(event.payload_len, 11);
    /// ```
    #[must_use]
    pub fn new(
        sink: impl Into<String>,
        tag: Tag,
        payload: &[u8],
        destination: Option<String>,
        preview_bytes: usize,
    ) -> Self {
        let keep = payload.len().min(preview_bytes);
        Self {
            id: 0,
            timestamp_ms: now_ms(),
            sink: sink.into(),
            tag,
            sources: tag.describe(),
            destination,
            preview: String::from_utf8_lossy(&payload[..keep]).into_owned(),
            truncated: keep < payload.len(),
            payload_len: payload.len(),
            digest: digest(payload),
        }
    }

    /// Returns the digest as hex.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        to_hex(&self.digest)
    }

    /// Returns `true` if `payload` is the payload this event was built from.
    #[must_use]
    pub fn matches(&self, payload: &[u8]) -> bool {
        payload.len() == self.payload_len && digest(payload) == self.digest
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Audit journal settings.
///
/// # Example
///
/// ```rust
/// use taintflow_audit::AuditConfig;
///
/// let config = AuditConfig::new().with_path("/var/lib/taintflow/audit").with_preview_bytes(64);
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Record sink events at all.
    pub enabled: bool,
    /// Database directory. `None` keeps the journal in memory.
    pub path: Option<PathBuf>,
    /// Payload bytes kept per event.
    pub preview_bytes: usize,
}

impl AuditConfig {
    /// Creates a disabled, in-memory config with a 100-byte preview.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: false,
            path: None,
            preview_bytes: DEFAULT_PREVIEW_BYTES,
        }
    }

    /// Enables the journal at `path`.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.enabled = true;
        self.path = Some(path.into());
        self
    }

    /// Enables or disables the journal.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the preview length.
    #[must_use]
    pub const fn with_preview_bytes(mut self, bytes: usize) -> Self {
        self.preview_bytes = bytes;
        self
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised by the audit journal.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open, read or write the database.
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Failed to serialize or deserialize an event.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored key was not an 8-byte identifier.
    #[error("Corrupt journal key ({0} bytes)")]
    CorruptKey(usize),
}

/// Result type for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_of_empty_payload() {
        assert_eq!(
            to_hex(&digest(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_short_payload_not_truncated() {
        let event = SinkEvent::new("file", Tag::CONTACTS, b"ada", Some("/tmp/x".into()), 100);
        assert_eq!(event.preview, "ada");
        assert!(!event.truncated);
        assert_eq!(event.sources, "Contacts");
        assert!(event.matches(b"ada"));
        assert!(!event.matches(b"bob"));
    }

    #[test]
    fn test_preview_cuts_at_limit() {
        let payload = vec![b'x'; 250];
        let event = SinkEvent::new("network", Tag::IMEI, &payload, None, DEFAULT_PREVIEW_BYTES);
        assert_eq!(event.preview.len(), 100);
        assert!(event.truncated);
        assert_eq!(event.payload_len, 250);
    }

    #[test]
    fn test_preview_lossy_on_split_codepoint() {
        // "é" is two bytes; keeping one yields a replacement character.
        let event = SinkEvent::new("log", Tag::SMS, "é".as_bytes(), None, 1);
        assert_eq!(event.preview, "\u{fffd}");
    }

    #[test]
    fn test_config_defaults_and_partial_deserialize() {
        let config = AuditConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.preview_bytes, 100);

        let parsed: AuditConfig = serde_json::from_str(r#"{"enabled":true}"#).unwrap();
        assert!(parsed.enabled);
        assert_eq!(parsed.path, None);
        assert_eq!(parsed.preview_bytes, 100);
    }
}
