//! Error types for primary-storage access.
//!
//! Tag reads and writes never fail: an unresolvable location reads as
//! untainted. These errors cover misuse of the host's *data* (bad index,
//! wrong element type, dangling reference on a load or store).

use crate::location::{BufferId, Fd, HeapId};
use crate::value::ElementKind;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the host primary storage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// No live heap object has this identity.
    #[error("no live heap object {0}")]
    UnknownObject(HeapId),

    /// The object exists but is not an array.
    #[error("heap object {0} is not an array")]
    NotAnArray(HeapId),

    /// The object exists but is not an instance.
    #[error("heap object {0} is not an instance")]
    NotAnInstance(HeapId),

    /// The object exists but is not a string.
    #[error("heap object {0} is not a string")]
    NotAString(HeapId),

    /// Array or field index outside the container.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Container length.
        len: usize,
    },

    /// A value of the wrong type was stored into an array.
    #[error("cannot store {found} into {expected}")]
    ElementTypeMismatch {
        /// Element kind of the array.
        expected: ElementKind,
        /// Description of the offending value.
        found: String,
    },

    /// No live direct buffer has this identity.
    #[error("no live direct buffer {0}")]
    UnknownBuffer(BufferId),

    /// A buffer access ran past the buffer's capacity.
    #[error("buffer access [{offset}..{end}) exceeds capacity {capacity}")]
    BufferOverflow {
        /// Start of the access.
        offset: usize,
        /// End of the access (exclusive).
        end: usize,
        /// Buffer capacity.
        capacity: usize,
    },

    /// The descriptor is not open.
    #[error("descriptor {0} is not open")]
    BadDescriptor(Fd),

    /// The descriptor table has no free numbers left.
    #[error("descriptor table exhausted ({limit} entries)")]
    DescriptorsExhausted {
        /// Maximum number of open descriptors.
        limit: usize,
    },
}
