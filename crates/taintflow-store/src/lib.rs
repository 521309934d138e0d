//! # Shadow Tag Storage
//!
//! Where tags live. This crate models the host's primary storage (frames,
//! heap, direct buffers, open files) and attaches a shadow tag to every
//! trackable location.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ShadowStore                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Primary storage          │  Shadow storage                  │
//! │  ─────────────────        │  ──────────────                  │
//! │  Heap (arrays,            │  arrays/fields: TagStorage       │
//! │        instances,         │    ├── ParallelSlots (in record) │
//! │        strings)           │    └── SideTable                 │
//! │  BufferPool               │  objects:     SideTable          │
//! │  DescriptorTable          │  buffers:     SideTable          │
//! │                           │  descriptors: SideTable          │
//! └──────────────────────────────────────────────────────────────┘
//!            FrameStack (per thread, (value, tag) slots)
//! ```
//!
//! ## Security Notes
//!
//! - Tag storage never raises: a location that does not resolve reads as
//!   untainted and ignores writes. This is a known soundness gap.
//! - A recycled identity (object, buffer or descriptor) always starts
//!   untainted.
//! - Concurrent merges into one location never lose bits.

mod buffer;
mod descriptor;
mod error;
mod frame;
mod heap;
mod ids;
mod location;
mod policy;
mod store;
mod table;
mod value;

pub use buffer::{BufferPool, ByteBuffer};
pub use descriptor::{DescriptorTable, FileTarget, DEFAULT_DESCRIPTOR_LIMIT};
pub use error::{Result, StoreError};
pub use frame::{Frame, FrameStack};
pub use heap::{Heap, ObjectKind};
pub use location::{
    BufferId, Fd, FieldIndex, HeapId, Location, LocationKind, Register, ShadowKey,
};
pub use policy::{ParallelSlots, StoragePolicy, StorageStrategy, TagStorage};
pub use store::{ShadowStore, StoreStats};
pub use table::SideTable;
pub use value::{ElementKind, PrimitiveKind, Slot, Value};
