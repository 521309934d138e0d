//! # Tag Values
//!
//! A [`Tag`] is a fixed-width bitmask where each bit names one sensitive
//! data source. Tags form a join-semilattice under bitwise OR:
//!
//! | Law | Statement |
//! |-----|-----------|
//! | Commutative | `a | b == b | a` |
//! | Associative | `a | (b | c) == (a | b) | c` |
//! | Idempotent | `a | a == a` |
//! | Identity | `a | CLEAR == a` |
//!
//! Tags are plain `Copy` values. Combining never mutates an existing tag;
//! it yields a new one.
//!
//! ## Security Notes
//!
//! - Taint only accumulates through [`Tag::combine`]
//! - [`Tag::clear`] is reserved for explicit declassification points

use crate::source::TaintSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// An integrity label recording which sources influenced a value.
///
/// The all-zero tag means "untainted".
///
/// # Example
///
/// ```rust
/// use taintflow_tag::Tag;
///
/// let tag = Tag::LOCATION.combine(Tag::CONTACTS);
/// assert!(tag.has(Tag::LOCATION));
/// assert!(tag.has(Tag::CONTACTS));
/// assert!(!tag.has(Tag::MIC));
/// assert_eq!(tag.bits(), 0x3);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(u32);

impl Tag {
    /// The untainted tag.
    pub const CLEAR: Tag = Tag(0);
    /// Location data.
    pub const LOCATION: Tag = Tag(0x0000_0001);
    /// Address book contents.
    pub const CONTACTS: Tag = Tag(0x0000_0002);
    /// Microphone input.
    pub const MIC: Tag = Tag(0x0000_0004);
    /// The device phone number.
    pub const PHONE_NUMBER: Tag = Tag(0x0000_0008);
    /// GPS location fix.
    pub const LOCATION_GPS: Tag = Tag(0x0000_0010);
    /// Network-derived location.
    pub const LOCATION_NET: Tag = Tag(0x0000_0020);
    /// Last known location.
    pub const LOCATION_LAST: Tag = Tag(0x0000_0040);
    /// Camera frames.
    pub const CAMERA: Tag = Tag(0x0000_0080);
    /// Accelerometer readings.
    pub const ACCELEROMETER: Tag = Tag(0x0000_0100);
    /// SMS message content.
    pub const SMS: Tag = Tag(0x0000_0200);
    /// Device IMEI.
    pub const IMEI: Tag = Tag(0x0000_0400);
    /// Subscriber IMSI.
    pub const IMSI: Tag = Tag(0x0000_0800);
    /// SIM card ICCID.
    pub const ICCID: Tag = Tag(0x0000_1000);
    /// Device serial number.
    pub const DEVICE_SN: Tag = Tag(0x0000_2000);
    /// Account data.
    pub const ACCOUNT: Tag = Tag(0x0000_4000);
    /// Browsing history.
    pub const HISTORY: Tag = Tag(0x0000_8000);
    /// User-entered passwords.
    pub const PASSWORD: Tag = Tag(0x0001_0000);

    /// Creates a tag from raw bits. Unknown bits are preserved.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bitmask.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns the union of `self` and `other`.
    #[inline]
    #[must_use]
    pub const fn combine(self, other: Tag) -> Tag {
        Tag(self.0 | other.0)
    }

    /// Returns `true` when every bit of `bit` is set in `self`.
    ///
    /// A `CLEAR` query is never "present": asking whether a value carries
    /// no source at all is answered by [`is_clear`](Self::is_clear).
    #[inline]
    #[must_use]
    pub fn has(self, bit: impl Into<Tag>) -> bool {
        let bit = bit.into().0;
        bit != 0 && self.0 & bit == bit
    }

    /// Returns `true` when `self` and `other` share at least one bit.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Tag) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the bits of `self` that are also in `other`.
    #[inline]
    #[must_use]
    pub const fn intersection(self, other: Tag) -> Tag {
        Tag(self.0 & other.0)
    }

    /// Returns the untainted tag.
    ///
    /// Only declassification points call this.
    #[inline]
    #[must_use]
    pub const fn clear(self) -> Tag {
        Tag::CLEAR
    }

    /// Returns `true` when no source bit is set.
    #[inline]
    #[must_use]
    pub const fn is_clear(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` when at least one source bit is set.
    #[inline]
    #[must_use]
    pub const fn is_tainted(self) -> bool {
        self.0 != 0
    }

    /// Returns the bits that do not correspond to a known source.
    #[inline]
    #[must_use]
    pub const fn unrecognized(self) -> Tag {
        Tag(self.0 & !TaintSource::KNOWN_MASK)
    }

    /// Iterates over each set bit as a single-bit tag, lowest first.
    pub fn iter_bits(self) -> impl Iterator<Item = Tag> {
        (0..u32::BITS)
            .map(|shift| 1u32 << shift)
            .filter(move |bit| self.0 & bit != 0)
            .map(Tag)
    }

    /// Iterates over the known sources present in this tag.
    pub fn sources(self) -> impl Iterator<Item = TaintSource> {
        TaintSource::ALL
            .iter()
            .copied()
            .filter(move |source| self.has(source.tag()))
    }

    /// Renders the tag as human-readable source names.
    ///
    /// See [`describe`](crate::describe).
    #[must_use]
    pub fn describe(self) -> String {
        crate::describe::describe(self)
    }
}

impl From<u32> for Tag {
    fn from(bits: u32) -> Self {
        Tag(bits)
    }
}

impl From<Tag> for u32 {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

impl From<TaintSource> for Tag {
    fn from(source: TaintSource) -> Self {
        source.tag()
    }
}

impl BitOr for Tag {
    type Output = Tag;

    fn bitor(self, rhs: Tag) -> Tag {
        self.combine(rhs)
    }
}

impl BitOr<TaintSource> for Tag {
    type Output = Tag;

    fn bitor(self, rhs: TaintSource) -> Tag {
        self.combine(rhs.tag())
    }
}

impl BitOrAssign for Tag {
    fn bitor_assign(&mut self, rhs: Tag) {
        *self = self.combine(rhs);
    }
}

impl FromIterator<Tag> for Tag {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        iter.into_iter().fold(Tag::CLEAR, Tag::combine)
    }
}

impl<'a> FromIterator<&'a Tag> for Tag {
    fn from_iter<I: IntoIterator<Item = &'a Tag>>(iter: I) -> Self {
        iter.into_iter().copied().collect()
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:#010x})", self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::LowerHex for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_is_default() {
        assert_eq!(Tag::default(), Tag::CLEAR);
        assert!(Tag::CLEAR.is_clear());
        assert!(!Tag::CLEAR.is_tainted());
    }

    #[test]
    fn test_combine_is_bitwise_or() {
        let tag = Tag::MIC.combine(Tag::SMS);
        assert_eq!(tag.bits(), 0x204);
        assert_eq!(Tag::MIC | Tag::SMS, tag);
    }

    #[test]
    fn test_combine_does_not_mutate_operands() {
        let a = Tag::LOCATION;
        let b = Tag::CONTACTS;
        let _ = a.combine(b);
        assert_eq!(a, Tag::LOCATION);
        assert_eq!(b, Tag::CONTACTS);
    }

    #[test]
    fn test_has_requires_all_bits() {
        let tag = Tag::LOCATION | Tag::CAMERA;
        assert!(tag.has(Tag::LOCATION));
        assert!(tag.has(Tag::LOCATION | Tag::CAMERA));
        assert!(!tag.has(Tag::LOCATION | Tag::MIC));
        assert!(!tag.has(Tag::CLEAR));
    }

    #[test]
    fn test_has_accepts_sources() {
        let tag = Tag::IMEI;
        assert!(tag.has(TaintSource::Imei));
        assert!(!tag.has(TaintSource::Imsi));
    }

    #[test]
    fn test_clear_returns_zero() {
        let tag = Tag::PASSWORD | Tag::ACCOUNT;
        assert_eq!(tag.clear(), Tag::CLEAR);
    }

    #[test]
    fn test_bitor_assign_accumulates() {
        let mut tag = Tag::CLEAR;
        tag |= Tag::HISTORY;
        tag |= Tag::ACCOUNT;
        assert_eq!(tag, Tag::HISTORY | Tag::ACCOUNT);
    }

    #[test]
    fn test_collect_folds_with_combine() {
        let tags = [Tag::MIC, Tag::SMS, Tag::MIC];
        let tag: Tag = tags.iter().collect();
        assert_eq!(tag, Tag::MIC | Tag::SMS);

        let empty: Tag = std::iter::empty::<Tag>().collect();
        assert_eq!(empty, Tag::CLEAR);
    }

    #[test]
    fn test_iter_bits_lowest_first() {
        let tag = Tag::from_bits(0x8000_0201);
        let bits: Vec<u32> = tag.iter_bits().map(Tag::bits).collect();
        assert_eq!(bits, vec![0x1, 0x200, 0x8000_0000]);
    }

    #[test]
    fn test_unrecognized_bits() {
        let tag = Tag::from_bits(0x0010_0001);
        assert_eq!(tag.unrecognized().bits(), 0x0010_0000);
        assert!(Tag::PASSWORD.unrecognized().is_clear());
    }

    #[test]
    fn test_sources_iterates_known_only() {
        let tag = Tag::from_bits(0x0100_0000) | Tag::CAMERA | Tag::LOCATION;
        let sources: Vec<TaintSource> = tag.sources().collect();
        assert_eq!(sources, vec![TaintSource::Location, TaintSource::Camera]);
    }

    #[test]
    fn test_debug_format_is_hex() {
        assert_eq!(format!("{:?}", Tag::SMS), "Tag(0x00000200)");
        assert_eq!(format!("{:x}", Tag::PASSWORD), "10000");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&(Tag::MIC | Tag::SMS)).unwrap();
        assert_eq!(json, "516");
        let parsed: Tag = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, Tag::LOCATION | Tag::CONTACTS);
    }
}
