//! Human-readable rendering of tags.

use crate::source::TaintSource;
use crate::tag::Tag;

/// Label rendered for the untainted tag.
pub const CLEAR_LABEL: &str = "Clear";

/// Renders every set bit of `tag` as its source name.
///
/// Known sources are listed in bit order and joined by `", "`. Bits no
/// source claims are gathered into one `Unrecognized(0x........)` marker so
/// newer tag producers never break older renderers.
///
/// # Example
///
/// ```rust
/// use taintflow_tag::{describe, Tag};
///
/// assert_eq!(describe(Tag::CLEAR), "Clear");
/// assert_eq!(describe(Tag::MIC | Tag::SMS), "Microphone, SMS");
/// assert_eq!(
///     describe(Tag::from_bits(0x0040_0001)),
///     "Location, Unrecognized(0x00400000)"
/// );
/// ```
#[must_use]
pub fn describe(tag: Tag) -> String {
    if tag.is_clear() {
        return CLEAR_LABEL.to_string();
    }

    let mut parts: Vec<String> = tag.sources().map(|s| s.name().to_string()).collect();
    let unknown = tag.unrecognized();
    if unknown.is_tainted() {
        parts.push(format!("Unrecognized({:#010x})", unknown.bits()));
    }
    parts.join(", ")
}

/// Returns the name of a tag that is exactly one known source, or `Clear`.
///
/// Multi-bit tags return `None`; use [`describe`] for those.
#[must_use]
pub fn exact_name(tag: Tag) -> Option<&'static str> {
    if tag.is_clear() {
        return Some(CLEAR_LABEL);
    }
    TaintSource::from_bit(tag.bits()).map(TaintSource::name)
}
