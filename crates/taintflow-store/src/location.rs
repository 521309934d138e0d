//! # Trackable Locations
//!
//! Every place a tag can live is named by a [`Location`], a tagged union
//! over the six location kinds:
//!
//! | Kind | Variant | Storage | Lifetime owner |
//! |------|---------|---------|----------------|
//! | Scalar slot | `Slot`, `Return` | parallel slot in the frame | frame / thread |
//! | Array | `Array` | parallel slot in the heap record (default) | array |
//! | Field | `Field` | parallel slot next to the field (default) | instance |
//! | Heap object | `Object` | side table | object |
//! | Direct buffer | `Buffer` | side table | buffer allocation |
//! | File descriptor | `Descriptor` | side table | open-file entry |
//!
//! Slots are thread-local and resolved against the caller's frame stack.
//! The remaining kinds are shared between threads and are addressed by a
//! [`ShadowKey`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a managed heap object (array, instance or string).
///
/// Identities are recycled after reclamation, the same way addresses are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeapId(pub u64);

/// Identity of an off-heap (direct) buffer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferId(pub u64);

/// An open file descriptor number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fd(pub i32);

/// A register index within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Register(pub u16);

/// A field index within an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldIndex(pub u16);

impl fmt::Display for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd{}", self.0)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The six kinds of trackable location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// Frame register or return slot.
    Slot,
    /// Whole array.
    Array,
    /// Instance field.
    Field,
    /// Heap object identity.
    Object,
    /// Direct buffer.
    Buffer,
    /// File descriptor.
    Descriptor,
}

/// Any storage unit eligible to carry a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    /// A register of the current frame.
    Slot(Register),
    /// The thread's return-value slot.
    Return,
    /// An array, covering all of its elements.
    Array(HeapId),
    /// One field of an instance.
    Field {
        /// Containing instance.
        object: HeapId,
        /// Field index.
        field: FieldIndex,
    },
    /// The identity of a heap object.
    Object(HeapId),
    /// A direct buffer allocation.
    Buffer(BufferId),
    /// An open file descriptor.
    Descriptor(Fd),
}

impl Location {
    /// Shorthand for a register slot.
    #[must_use]
    pub const fn reg(index: u16) -> Self {
        Location::Slot(Register(index))
    }

    /// Shorthand for an instance field.
    #[must_use]
    pub const fn field(object: HeapId, field: u16) -> Self {
        Location::Field {
            object,
            field: FieldIndex(field),
        }
    }

    /// Returns the kind of this location.
    #[must_use]
    pub const fn kind(&self) -> LocationKind {
        match self {
            Location::Slot(_) | Location::Return => LocationKind::Slot,
            Location::Array(_) => LocationKind::Array,
            Location::Field { .. } => LocationKind::Field,
            Location::Object(_) => LocationKind::Object,
            Location::Buffer(_) => LocationKind::Buffer,
            Location::Descriptor(_) => LocationKind::Descriptor,
        }
    }

    /// Returns the shared-store key, or `None` for thread-local slots.
    #[must_use]
    pub const fn shadow_key(&self) -> Option<ShadowKey> {
        match *self {
            Location::Slot(_) | Location::Return => None,
            Location::Array(id) => Some(ShadowKey::Array(id)),
            Location::Field { object, field } => Some(ShadowKey::Field(object, field)),
            Location::Object(id) => Some(ShadowKey::Object(id)),
            Location::Buffer(id) => Some(ShadowKey::Buffer(id)),
            Location::Descriptor(fd) => Some(ShadowKey::Descriptor(fd)),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Slot(reg) => write!(f, "{reg}"),
            Location::Return => write!(f, "retval"),
            Location::Array(id) => write!(f, "array {id}"),
            Location::Field { object, field } => write!(f, "{object}.f{}", field.0),
            Location::Object(id) => write!(f, "object {id}"),
            Location::Buffer(id) => write!(f, "{id}"),
            Location::Descriptor(fd) => write!(f, "{fd}"),
        }
    }
}

impl From<Register> for Location {
    fn from(reg: Register) -> Self {
        Location::Slot(reg)
    }
}

impl From<Fd> for Location {
    fn from(fd: Fd) -> Self {
        Location::Descriptor(fd)
    }
}

impl From<BufferId> for Location {
    fn from(id: BufferId) -> Self {
        Location::Buffer(id)
    }
}

impl From<ShadowKey> for Location {
    fn from(key: ShadowKey) -> Self {
        match key {
            ShadowKey::Array(id) => Location::Array(id),
            ShadowKey::Field(object, field) => Location::Field { object, field },
            ShadowKey::Object(id) => Location::Object(id),
            ShadowKey::Buffer(id) => Location::Buffer(id),
            ShadowKey::Descriptor(fd) => Location::Descriptor(fd),
        }
    }
}

/// Address of a tag held in shared (cross-thread) shadow storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadowKey {
    /// Array tag.
    Array(HeapId),
    /// Instance field tag.
    Field(HeapId, FieldIndex),
    /// Object identity tag.
    Object(HeapId),
    /// Direct buffer tag.
    Buffer(BufferId),
    /// Descriptor tag.
    Descriptor(Fd),
}

impl ShadowKey {
    /// Returns the location kind this key addresses.
    #[must_use]
    pub const fn kind(&self) -> LocationKind {
        match self {
            ShadowKey::Array(_) => LocationKind::Array,
            ShadowKey::Field(..) => LocationKind::Field,
            ShadowKey::Object(_) => LocationKind::Object,
            ShadowKey::Buffer(_) => LocationKind::Buffer,
            ShadowKey::Descriptor(_) => LocationKind::Descriptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_locations_have_no_shadow_key() {
        assert_eq!(Location::reg(3).shadow_key(), None);
        assert_eq!(Location::Return.shadow_key(), None);
        assert_eq!(Location::Return.kind(), LocationKind::Slot);
    }

    #[test]
    fn test_shadow_key_roundtrip() {
        let locations = [
            Location::Array(HeapId(1)),
            Location::field(HeapId(2), 4),
            Location::Object(HeapId(3)),
            Location::Buffer(BufferId(9)),
            Location::Descriptor(Fd(5)),
        ];
        for location in locations {
            let key = location.shadow_key().unwrap();
            assert_eq!(key.kind(), location.kind());
            assert_eq!(Location::from(key), location);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Location::reg(2).to_string(), "v2");
        assert_eq!(Location::field(HeapId(7), 1).to_string(), "@7.f1");
        assert_eq!(Location::Descriptor(Fd(4)).to_string(), "fd4");
    }
}
