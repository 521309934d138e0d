//! # Propagation Engine
//!
//! Executes host operations and applies the taint rule for each one to the
//! affected locations.
//!
//! ## Rules
//!
//! | Class | Operations | Destination tag |
//! |-------|------------|-----------------|
//! | Copy | `move_value`, `move_result`, `array_load`, `array_store`, `field_get`, `field_put`, `invoke` arguments, `copy_tag` | `dest ∪ src` |
//! | Computation | `compute`, `binary_op`, `unary_op`, `convert`, `concat` | `dest ∪ operand₁ ∪ … ∪ operandₙ` |
//! | Aggregate | `array_copy`, `clone_object` | `dest ∪ src` container tag |
//! | Off-heap | `buffer_get`, `buffer_get_byte`, `buffer_put`, `buffer_put_byte` | Copy, with the buffer as source or destination |
//! | File I/O | `file_read`, `file_read_buffer` | `dest ∪ descriptor` |
//! | File I/O | `file_write`, `file_write_buffer` | returns the data tag; `descriptor ∪ data` when enabled |
//! | Declassification | `declassify` | `CLEAR` |
//!
//! Fresh storage starts untainted, so a copy into it reproduces the source
//! tag exactly. The return slot is fresh for every return.
//!
//! ## Security Notes
//!
//! - No rule other than `declassify` lowers a tag.
//! - Computation merges every operand, whether or not the result actually
//!   depends on it.
//! - Tag reads and writes on unresolvable locations are fail-open: they
//!   read `CLEAR` and drop the write. Data accesses on such locations
//!   return an error instead, exactly as the host would.
//! - The engine holds identities only. It never keeps an object, buffer or
//!   descriptor alive.

use crate::config::EngineConfig;
use crate::context::ThreadContext;
use crate::error::{EngineError, Result};
use crate::ops::{apply_binary, apply_unary, convert_value, BinaryOp, UnaryOp};
use std::sync::Arc;
use taintflow_store::{
    BufferId, ByteBuffer, ElementKind, Fd, FieldIndex, Frame, HeapId, Location, ObjectKind,
    PrimitiveKind, Register, ShadowKey, ShadowStore, Slot, StoreError, Value,
};
use taintflow_tag::Tag;
use tracing::{info, trace, warn};

#[derive(Debug, Clone, Copy)]
enum TagWrite {
    Set,
    Merge,
}

/// Applies propagation rules against a shared [`ShadowStore`].
///
/// Cloning is cheap; all clones share the same store.
///
/// # Thread Safety
///
/// `PropagationEngine` is `Send + Sync`. Each thread drives it with its own
/// [`ThreadContext`]; shared locations are synchronized inside the store.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use taintflow_engine::{PropagationEngine, ThreadContext};
/// use taintflow_store::{Location, Register, ShadowStore, Value};
/// use taintflow_tag::Tag;
///
/// let engine = PropagationEngine::new(Arc::new(ShadowStore::default()));
/// let mut ctx = ThreadContext::new();
/// engine.invoke(&mut ctx, "main", 2, &[])?;
///
/// engine.const_value(&mut ctx, Register(0), Value::Double(51.5))?;
/// engine.merge_tag(&mut ctx, Location::reg(0), Tag::LOCATION_GPS);
/// engine.move_value(&mut ctx, Register(1), Register(0))?;
///
/// assert_eq!(engine.get_tag(&ctx, Location::reg(1)), Tag::LOCATION_GPS);
/// # Ok::<(), taintflow_engine::EngineError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PropagationEngine {
    store: Arc<ShadowStore>,
    config: EngineConfig,
}

impl PropagationEngine {
    /// Creates an engine with the default configuration.
    #[must_use]
    pub fn new(store: Arc<ShadowStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    /// Creates an engine with a custom configuration.
    #[must_use]
    pub fn with_config(store: Arc<ShadowStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Returns the shared store.
    #[must_use]
    pub fn store(&self) -> &ShadowStore {
        &self.store
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Location-polymorphic tag access
    // ------------------------------------------------------------------

    /// Returns the tag of any location, `CLEAR` if it does not resolve.
    #[must_use]
    pub fn get_tag(&self, ctx: &ThreadContext, location: Location) -> Tag {
        match location {
            Location::Slot(reg) => ctx.reg_tag(reg),
            Location::Return => ctx.retval_tag(),
            other => other
                .shadow_key()
                .map_or(Tag::CLEAR, |key| self.store.get_tag(key)),
        }
    }

    /// Overwrites the tag of any location. Returns `false` if the location
    /// does not resolve.
    pub fn set_tag(&self, ctx: &mut ThreadContext, location: Location, tag: Tag) -> bool {
        self.update_tag(ctx, location, tag, TagWrite::Set)
    }

    /// Merges `tag` into any location. Returns `false` if the location does
    /// not resolve.
    pub fn merge_tag(&self, ctx: &mut ThreadContext, location: Location, tag: Tag) -> bool {
        self.update_tag(ctx, location, tag, TagWrite::Merge)
    }

    /// Copy rule between two arbitrary locations: `merge(dst, get(src))`.
    pub fn copy_tag(&self, ctx: &mut ThreadContext, src: Location, dst: Location) -> bool {
        let tag = self.get_tag(ctx, src);
        self.merge_tag(ctx, dst, tag)
    }

    /// Clears the tag of a location.
    ///
    /// This is the only operation that lowers a tag. Callers use it once
    /// the data is no longer sensitive (anonymized, hashed, user-approved).
    pub fn declassify(&self, ctx: &mut ThreadContext, location: Location) -> bool {
        let before = self.get_tag(ctx, location);
        let cleared = self.set_tag(ctx, location, Tag::CLEAR);
        if cleared && before.is_tainted() {
            info!("declassified {} (was {})", location, before);
        }
        cleared
    }

    fn update_tag(&self, ctx: &mut ThreadContext, location: Location, tag: Tag, mode: TagWrite) -> bool {
        let apply = |old: Tag| match mode {
            TagWrite::Set => tag,
            TagWrite::Merge => old.combine(tag),
        };
        match location {
            Location::Slot(reg) => match ctx.slot_tag_mut(reg) {
                Some(slot) => {
                    *slot = apply(*slot);
                    true
                }
                None => {
                    trace!("tag write to unresolved {} dropped", reg);
                    false
                }
            },
            Location::Return => {
                let slot = &mut ctx.retval_mut().tag;
                *slot = apply(*slot);
                true
            }
            other => other.shadow_key().is_some_and(|key| match mode {
                TagWrite::Set => self.store.set_tag(key, tag),
                TagWrite::Merge => self.store.merge_tag(key, tag),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Frames and register moves
    // ------------------------------------------------------------------

    /// Pushes a frame of `frame_size` registers for `method` and copies the
    /// argument registers of the caller into its highest registers.
    ///
    /// # Errors
    ///
    /// `StackOverflow` past the configured depth, `TooManyArguments`, or a
    /// register error for an argument outside the caller's frame.
    pub fn invoke(
        &self,
        ctx: &mut ThreadContext,
        method: &str,
        frame_size: u16,
        args: &[Register],
    ) -> Result<()> {
        let depth = ctx.depth() + 1;
        let limit = self.config.max_frame_depth;
        if depth > limit {
            warn!("stack overflow invoking {}: depth {} exceeds {}", method, depth, limit);
            return Err(EngineError::StackOverflow { depth, limit });
        }
        let size = usize::from(frame_size);
        let first = u16::try_from(args.len())
            .ok()
            .and_then(|n| frame_size.checked_sub(n))
            .ok_or(EngineError::TooManyArguments {
                args: args.len(),
                size,
            })?;

        let values = args
            .iter()
            .map(|&reg| ctx.read(reg))
            .collect::<Result<Vec<Slot>>>()?;

        let mut frame = Frame::new(method, frame_size);
        for (reg, arg) in (first..frame_size).map(Register).zip(values) {
            if let Some(slot) = frame.slot_mut(reg) {
                slot.value = arg.value;
                slot.tag = slot.tag.combine(arg.tag);
            }
        }
        trace!("invoke {} at depth {}", method, depth);
        ctx.push(frame);
        Ok(())
    }

    /// Pops the current frame and sets the return slot to `src`.
    ///
    /// # Errors
    ///
    /// `NoActiveFrame` or `InvalidRegister`.
    pub fn return_value(&self, ctx: &mut ThreadContext, src: Register) -> Result<()> {
        let slot = ctx.read(src)?;
        let frame = ctx.pop()?;
        trace!("return from {} with {:?}", frame.method(), slot.tag);
        *ctx.retval_mut() = slot;
        Ok(())
    }

    /// Pops the current frame and resets the return slot.
    ///
    /// # Errors
    ///
    /// `NoActiveFrame`.
    pub fn return_void(&self, ctx: &mut ThreadContext) -> Result<()> {
        ctx.pop()?;
        *ctx.retval_mut() = Slot::default();
        Ok(())
    }

    /// Copies the return slot into `dst`.
    ///
    /// # Errors
    ///
    /// `NoActiveFrame` or `InvalidRegister`.
    pub fn move_result(&self, ctx: &mut ThreadContext, dst: Register) -> Result<()> {
        let slot = ctx.retval();
        ctx.write(dst, slot.value, slot.tag)?;
        Ok(())
    }

    /// Copies register `src` into `dst`.
    ///
    /// # Errors
    ///
    /// `NoActiveFrame` or `InvalidRegister`.
    pub fn move_value(&self, ctx: &mut ThreadContext, dst: Register, src: Register) -> Result<()> {
        let slot = ctx.read(src)?;
        ctx.write(dst, slot.value, slot.tag)?;
        Ok(())
    }

    /// Loads a constant into `dst`. Constants carry no taint of their own.
    ///
    /// # Errors
    ///
    /// `NoActiveFrame` or `InvalidRegister`.
    pub fn const_value(&self, ctx: &mut ThreadContext, dst: Register, value: Value) -> Result<()> {
        ctx.write(dst, value, Tag::CLEAR)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Computation
    // ------------------------------------------------------------------

    /// Stores a host-computed `value` into `dst`, merging the tags of every
    /// operand register. Returns the resulting tag of `dst`.
    ///
    /// # Errors
    ///
    /// `NoActiveFrame` or `InvalidRegister`.
    pub fn compute(
        &self,
        ctx: &mut ThreadContext,
        dst: Register,
        operands: &[Register],
        value: Value,
    ) -> Result<Tag> {
        let tag = operands
            .iter()
            .map(|&reg| ctx.read(reg).map(|slot| slot.tag))
            .collect::<Result<Tag>>()?;
        ctx.write(dst, value, tag)
    }

    /// `dst = lhs op rhs`.
    ///
    /// # Errors
    ///
    /// Register errors, `TypeMismatch` or `Arithmetic`.
    pub fn binary_op(
        &self,
        ctx: &mut ThreadContext,
        op: BinaryOp,
        dst: Register,
        lhs: Register,
        rhs: Register,
    ) -> Result<()> {
        let a = ctx.read(lhs)?;
        let b = ctx.read(rhs)?;
        let value = apply_binary(op, a.value, b.value)?;
        ctx.write(dst, value, a.tag | b.tag)?;
        Ok(())
    }

    /// `dst = lhs op literal`. The literal is untainted.
    ///
    /// # Errors
    ///
    /// Register errors, `TypeMismatch` or `Arithmetic`.
    pub fn binary_op_literal(
        &self,
        ctx: &mut ThreadContext,
        op: BinaryOp,
        dst: Register,
        lhs: Register,
        literal: Value,
    ) -> Result<()> {
        let a = ctx.read(lhs)?;
        let value = apply_binary(op, a.value, literal)?;
        ctx.write(dst, value, a.tag)?;
        Ok(())
    }

    /// `dst = op src`.
    ///
    /// # Errors
    ///
    /// Register errors or `TypeMismatch`.
    pub fn unary_op(
        &self,
        ctx: &mut ThreadContext,
        op: UnaryOp,
        dst: Register,
        src: Register,
    ) -> Result<()> {
        let a = ctx.read(src)?;
        ctx.write(dst, apply_unary(op, a.value)?, a.tag)?;
        Ok(())
    }

    /// `dst = (to) src`.
    ///
    /// # Errors
    ///
    /// Register errors or `TypeMismatch`.
    pub fn convert(
        &self,
        ctx: &mut ThreadContext,
        dst: Register,
        src: Register,
        to: PrimitiveKind,
    ) -> Result<()> {
        let a = ctx.read(src)?;
        ctx.write(dst, convert_value(a.value, to)?, a.tag)?;
        Ok(())
    }

    /// String concatenation: allocates `lhs + rhs` and stores its reference
    /// in `dst`.
    ///
    /// Operands may be string references, null (rendered `null`) or
    /// primitives. The new string's identity tag and `dst` both receive the
    /// union of the operand register tags and the operand strings' identity
    /// tags.
    ///
    /// # Errors
    ///
    /// Register errors, or `NotAString` for a non-string reference.
    pub fn concat(
        &self,
        ctx: &mut ThreadContext,
        dst: Register,
        lhs: Register,
        rhs: Register,
    ) -> Result<HeapId> {
        ctx.read(dst)?;
        let (left, left_tag) = self.string_operand(ctx, lhs)?;
        let (right, right_tag) = self.string_operand(ctx, rhs)?;
        let tag = left_tag | right_tag;

        let id = self.store.alloc_string(left + &right);
        self.store.merge_tag(ShadowKey::Object(id), tag);
        ctx.write(dst, Value::Ref(Some(id)), tag)?;
        Ok(id)
    }

    fn string_operand(&self, ctx: &ThreadContext, reg: Register) -> Result<(String, Tag)> {
        let slot = ctx.read(reg)?;
        match slot.value {
            Value::Ref(None) => Ok(("null".to_string(), slot.tag)),
            Value::Ref(Some(id)) => {
                let text = self.store.string(id)?;
                Ok((text, slot.tag | self.store.get_tag(ShadowKey::Object(id))))
            }
            primitive => Ok((primitive.to_string(), slot.tag)),
        }
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// Allocates a zero-filled array and stores its reference in `dst`.
    ///
    /// # Errors
    ///
    /// Register errors. Nothing is allocated on error.
    pub fn new_array(
        &self,
        ctx: &mut ThreadContext,
        dst: Register,
        kind: ElementKind,
        len: usize,
    ) -> Result<HeapId> {
        ctx.read(dst)?;
        let id = self.store.alloc_array(kind, len);
        ctx.write(dst, Value::Ref(Some(id)), Tag::CLEAR)?;
        Ok(id)
    }

    /// Allocates an instance and stores its reference in `dst`.
    ///
    /// # Errors
    ///
    /// Register errors. Nothing is allocated on error.
    pub fn new_instance(
        &self,
        ctx: &mut ThreadContext,
        dst: Register,
        class: &str,
        field_count: u16,
    ) -> Result<HeapId> {
        ctx.read(dst)?;
        let id = self.store.alloc_instance(class, field_count);
        ctx.write(dst, Value::Ref(Some(id)), Tag::CLEAR)?;
        Ok(id)
    }

    /// Allocates a string literal and stores its reference in `dst`.
    ///
    /// # Errors
    ///
    /// Register errors. Nothing is allocated on error.
    pub fn new_string(&self, ctx: &mut ThreadContext, dst: Register, text: &str) -> Result<HeapId> {
        ctx.read(dst)?;
        let id = self.store.alloc_string(text);
        ctx.write(dst, Value::Ref(Some(id)), Tag::CLEAR)?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Arrays and fields
    // ------------------------------------------------------------------

    /// `dst = array[index]`. The result carries the array tag and, unless
    /// disabled, the index register's tag.
    ///
    /// # Errors
    ///
    /// Register errors, `NullReference`, `NegativeIndex` or a store error.
    pub fn array_load(
        &self,
        ctx: &mut ThreadContext,
        dst: Register,
        array: Register,
        index: Register,
    ) -> Result<()> {
        let (id, _) = ctx.read_ref(array, "array load")?;
        let (index, index_tag) = ctx.read_index(index, "array load")?;
        let slot = self.store.array_load(id, index)?;
        let tag = if self.config.index_taints_loads {
            slot.tag | index_tag
        } else {
            slot.tag
        };
        ctx.write(dst, slot.value, tag)?;
        Ok(())
    }

    /// `array[index] = src`. The array tag absorbs the value's tag.
    ///
    /// # Errors
    ///
    /// Register errors, `NullReference`, `NegativeIndex` or a store error.
    pub fn array_store(
        &self,
        ctx: &mut ThreadContext,
        src: Register,
        array: Register,
        index: Register,
    ) -> Result<()> {
        let value = ctx.read(src)?;
        let (id, _) = ctx.read_ref(array, "array store")?;
        let (index, _) = ctx.read_index(index, "array store")?;
        self.store.array_store(id, index, value.value, value.tag)?;
        Ok(())
    }

    /// `dst = object.field`.
    ///
    /// # Errors
    ///
    /// Register errors, `NullReference` or a store error.
    pub fn field_get(
        &self,
        ctx: &mut ThreadContext,
        dst: Register,
        object: Register,
        field: FieldIndex,
    ) -> Result<()> {
        let (id, _) = ctx.read_ref(object, "field get")?;
        let slot = self.store.field_load(id, field)?;
        ctx.write(dst, slot.value, slot.tag)?;
        Ok(())
    }

    /// `object.field = src`.
    ///
    /// # Errors
    ///
    /// Register errors, `NullReference` or a store error.
    pub fn field_put(
        &self,
        ctx: &mut ThreadContext,
        src: Register,
        object: Register,
        field: FieldIndex,
    ) -> Result<()> {
        let value = ctx.read(src)?;
        let (id, _) = ctx.read_ref(object, "field put")?;
        self.store.field_store(id, field, value.value, value.tag)?;
        Ok(())
    }

    /// Bulk element copy between arrays. The destination array tag absorbs
    /// the source array tag. Overlapping ranges in one array are allowed.
    ///
    /// # Errors
    ///
    /// Register errors, `NullReference` or a store error. Nothing is
    /// written on error.
    pub fn array_copy(
        &self,
        ctx: &mut ThreadContext,
        src: Register,
        src_pos: usize,
        dst: Register,
        dst_pos: usize,
        len: usize,
    ) -> Result<()> {
        let (from, _) = ctx.read_ref(src, "array copy")?;
        let (to, _) = ctx.read_ref(dst, "array copy")?;
        let (values, tag) = self.store.array_read_range(from, src_pos, len)?;
        self.store.array_write_range(to, dst_pos, &values, tag)?;
        Ok(())
    }

    /// Shallow-copies the object referenced by `src` and stores the copy's
    /// reference in `dst`.
    ///
    /// Arrays copy their container tag, instances copy every field tag and
    /// their identity tag, strings copy their identity tag.
    ///
    /// # Errors
    ///
    /// Register errors, `NullReference` or a store error.
    pub fn clone_object(&self, ctx: &mut ThreadContext, dst: Register, src: Register) -> Result<HeapId> {
        let (id, reg_tag) = ctx.read_ref(src, "clone")?;
        ctx.read(dst)?;
        let kind = self
            .store
            .heap()
            .kind_of(id)
            .ok_or(StoreError::UnknownObject(id))?;

        let copy = match kind {
            ObjectKind::Array(element) => {
                let (_, len) = self.store.array_info(id)?;
                let (values, tag) = self.store.array_read_range(id, 0, len)?;
                let copy = self.store.alloc_array_from(element, values)?;
                self.store.merge_tag(ShadowKey::Array(copy), tag);
                copy
            }
            ObjectKind::Instance => {
                let (class, count) = self.store.instance_info(id)?;
                let copy = self.store.alloc_instance(class, count);
                let copied = (0..count).map(FieldIndex).try_for_each(|field| {
                    let slot = self.store.field_load(id, field)?;
                    self.store.field_store(copy, field, slot.value, slot.tag)
                });
                if let Err(e) = copied {
                    self.store.reclaim_object(copy);
                    return Err(e.into());
                }
                copy
            }
            ObjectKind::String => self.store.alloc_string(self.store.string(id)?),
        };

        self.store.merge_tag(
            ShadowKey::Object(copy),
            self.store.get_tag(ShadowKey::Object(id)),
        );
        ctx.write(dst, Value::Ref(Some(copy)), reg_tag)?;
        Ok(copy)
    }

    // ------------------------------------------------------------------
    // Off-heap buffers
    // ------------------------------------------------------------------

    /// Copies `len` bytes from a buffer into a managed byte array.
    ///
    /// A direct buffer's tag flows into the array tag. A heap-backed buffer
    /// is an ordinary array copy.
    ///
    /// # Errors
    ///
    /// Register errors, `NullReference` or a store error.
    pub fn buffer_get(
        &self,
        ctx: &mut ThreadContext,
        buffer: ByteBuffer,
        offset: usize,
        array: Register,
        array_pos: usize,
        len: usize,
    ) -> Result<()> {
        let (to, _) = ctx.read_ref(array, "buffer get")?;
        let (values, tag) = match buffer {
            ByteBuffer::Direct(id) => {
                let (bytes, tag) = self.store.buffer_read(id, offset, len)?;
                (bytes_to_values(&bytes), tag)
            }
            ByteBuffer::Heap(backing) => self.store.array_read_range(backing, offset, len)?,
        };
        self.store.array_write_range(to, array_pos, &values, tag)?;
        Ok(())
    }

    /// Reads one byte from a buffer into `dst`.
    ///
    /// # Errors
    ///
    /// Register errors or a store error.
    pub fn buffer_get_byte(
        &self,
        ctx: &mut ThreadContext,
        dst: Register,
        buffer: ByteBuffer,
        offset: usize,
    ) -> Result<()> {
        let slot = match buffer {
            ByteBuffer::Direct(id) => {
                let (bytes, tag) = self.store.buffer_read(id, offset, 1)?;
                let byte = bytes.first().copied().unwrap_or_default();
                Slot::new(Value::Byte(byte as i8), tag)
            }
            ByteBuffer::Heap(backing) => self.store.array_load(backing, offset)?,
        };
        ctx.write(dst, slot.value, slot.tag)?;
        Ok(())
    }

    /// Copies `len` bytes from a managed byte array into a buffer.
    ///
    /// # Errors
    ///
    /// Register errors, `NullReference`, `TypeMismatch` for a non-byte
    /// array, or a store error.
    pub fn buffer_put(
        &self,
        ctx: &mut ThreadContext,
        buffer: ByteBuffer,
        offset: usize,
        array: Register,
        array_pos: usize,
        len: usize,
    ) -> Result<()> {
        let (from, _) = ctx.read_ref(array, "buffer put")?;
        let (values, tag) = self.store.array_read_range(from, array_pos, len)?;
        match buffer {
            ByteBuffer::Direct(id) => {
                let bytes = values_to_bytes(&values, "buffer put")?;
                self.store.buffer_write(id, offset, &bytes, tag)?;
            }
            ByteBuffer::Heap(backing) => self.store.array_write_range(backing, offset, &values, tag)?,
        }
        Ok(())
    }

    /// Writes the byte in `src` into a buffer.
    ///
    /// # Errors
    ///
    /// Register errors, `TypeMismatch` for a non-byte value, or a store
    /// error.
    pub fn buffer_put_byte(
        &self,
        ctx: &mut ThreadContext,
        src: Register,
        buffer: ByteBuffer,
        offset: usize,
    ) -> Result<()> {
        let slot = ctx.read(src)?;
        match buffer {
            ByteBuffer::Direct(id) => {
                let bytes = values_to_bytes(&[slot.value], "buffer put")?;
                self.store.buffer_write(id, offset, &bytes, slot.tag)?;
            }
            ByteBuffer::Heap(backing) => {
                self.store.array_store(backing, offset, slot.value, slot.tag)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // File I/O
    // ------------------------------------------------------------------

    fn require_open(&self, fd: Fd) -> Result<()> {
        if self.store.descriptors().is_open(fd) {
            Ok(())
        } else {
            Err(StoreError::BadDescriptor(fd).into())
        }
    }

    /// Delivers `data` read from `fd` into a managed byte array. The array
    /// tag absorbs the descriptor tag. Returns the number of bytes stored.
    ///
    /// # Errors
    ///
    /// `BadDescriptor`, register errors, `NullReference` or a store error.
    pub fn file_read(
        &self,
        ctx: &mut ThreadContext,
        fd: Fd,
        data: &[u8],
        array: Register,
        array_pos: usize,
    ) -> Result<usize> {
        self.require_open(fd)?;
        let (to, _) = ctx.read_ref(array, "file read")?;
        let tag = self.store.get_tag(ShadowKey::Descriptor(fd));
        self.store
            .array_write_range(to, array_pos, &bytes_to_values(data), tag)?;
        Ok(data.len())
    }

    /// Delivers `data` read from `fd` into a direct buffer. The buffer tag
    /// absorbs the descriptor tag.
    ///
    /// # Errors
    ///
    /// `BadDescriptor` or a store error.
    pub fn file_read_buffer(&self, fd: Fd, data: &[u8], buffer: BufferId, offset: usize) -> Result<usize> {
        self.require_open(fd)?;
        let tag = self.store.get_tag(ShadowKey::Descriptor(fd));
        self.store.buffer_write(buffer, offset, data, tag)?;
        Ok(data.len())
    }

    /// Writes `len` bytes of a managed byte array to `fd` and returns the
    /// tag of the written data, for the caller's sink decision.
    ///
    /// With `propagate_file_writes` enabled the descriptor tag absorbs the
    /// data tag, so later reads through the same descriptor are tainted.
    ///
    /// # Errors
    ///
    /// `BadDescriptor`, register errors, `NullReference` or a store error.
    pub fn file_write(
        &self,
        ctx: &mut ThreadContext,
        fd: Fd,
        array: Register,
        array_pos: usize,
        len: usize,
    ) -> Result<Tag> {
        self.require_open(fd)?;
        let (from, _) = ctx.read_ref(array, "file write")?;
        let (_, tag) = self.store.array_read_range(from, array_pos, len)?;
        self.tag_descriptor_on_write(fd, tag);
        Ok(tag)
    }

    /// Writes `len` bytes of a direct buffer to `fd` and returns the tag of
    /// the written data.
    ///
    /// # Errors
    ///
    /// `BadDescriptor` or a store error.
    pub fn file_write_buffer(&self, fd: Fd, buffer: BufferId, offset: usize, len: usize) -> Result<Tag> {
        self.require_open(fd)?;
        let (_, tag) = self.store.buffer_read(buffer, offset, len)?;
        self.tag_descriptor_on_write(fd, tag);
        Ok(tag)
    }

    fn tag_descriptor_on_write(&self, fd: Fd, tag: Tag) {
        if self.config.propagate_file_writes && tag.is_tainted() {
            self.store.merge_tag(ShadowKey::Descriptor(fd), tag);
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
fn bytes_to_values(bytes: &[u8]) -> Vec<Value> {
    bytes.iter().map(|&b| Value::Byte(b as i8)).collect()
}

#[allow(clippy::cast_sign_loss)]
fn values_to_bytes(values: &[Value], operation: &'static str) -> Result<Vec<u8>> {
    values
        .iter()
        .map(|value| match value {
            Value::Byte(b) => Ok(*b as u8),
            other => Err(EngineError::TypeMismatch {
                operation,
                expected: "byte",
                found: other.to_string(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taintflow_store::StoragePolicy;

    fn engine() -> (PropagationEngine, ThreadContext) {
        let engine = PropagationEngine::new(Arc::new(ShadowStore::new(StoragePolicy::default())));
        let mut ctx = ThreadContext::new();
        engine.invoke(&mut ctx, "test", 8, &[]).unwrap();
        (engine, ctx)
    }

    #[test]
    fn test_set_overwrites_merge_accumulates_on_slots() {
        let (engine, mut ctx) = engine();
        let loc = Location::reg(0);
        assert!(engine.merge_tag(&mut ctx, loc, Tag::SMS));
        assert!(engine.merge_tag(&mut ctx, loc, Tag::MIC));
        assert_eq!(engine.get_tag(&ctx, loc), Tag::SMS | Tag::MIC);
        assert!(engine.set_tag(&mut ctx, loc, Tag::CAMERA));
        assert_eq!(engine.get_tag(&ctx, loc), Tag::CAMERA);
    }

    #[test]
    fn test_set_on_shared_location_overwrites() {
        let (engine, mut ctx) = engine();
        let id = engine.store().alloc_string("x");
        let loc = Location::Object(id);
        engine.merge_tag(&mut ctx, loc, Tag::SMS | Tag::MIC);
        engine.set_tag(&mut ctx, loc, Tag::IMEI);
        assert_eq!(engine.get_tag(&ctx, loc), Tag::IMEI);
    }

    #[test]
    fn test_unresolved_register_is_fail_open() {
        let (engine, mut ctx) = engine();
        assert!(!engine.merge_tag(&mut ctx, Location::reg(99), Tag::SMS));
        assert_eq!(engine.get_tag(&ctx, Location::reg(99)), Tag::CLEAR);
    }

    #[test]
    fn test_invoke_places_arguments_last() {
        let (engine, mut ctx) = engine();
        engine.const_value(&mut ctx, Register(0), Value::Int(7)).unwrap();
        engine.merge_tag(&mut ctx, Location::reg(0), Tag::ACCOUNT);

        engine.invoke(&mut ctx, "callee", 4, &[Register(0)]).unwrap();
        assert_eq!(ctx.value(Register(3)), Some(Value::Int(7)));
        assert_eq!(ctx.reg_tag(Register(3)), Tag::ACCOUNT);
        assert_eq!(ctx.reg_tag(Register(0)), Tag::CLEAR);
    }

    #[test]
    fn test_invoke_rejects_oversized_argument_list() {
        let (engine, mut ctx) = engine();
        let err = engine
            .invoke(&mut ctx, "callee", 1, &[Register(0), Register(1)])
            .unwrap_err();
        assert_eq!(err, EngineError::TooManyArguments { args: 2, size: 1 });
    }

    #[test]
    fn test_stack_overflow() {
        let store = Arc::new(ShadowStore::default());
        let engine = PropagationEngine::with_config(store, EngineConfig::new().with_max_frame_depth(2));
        let mut ctx = ThreadContext::new();
        engine.invoke(&mut ctx, "a", 1, &[]).unwrap();
        engine.invoke(&mut ctx, "b", 1, &[]).unwrap();
        assert_eq!(
            engine.invoke(&mut ctx, "c", 1, &[]).unwrap_err(),
            EngineError::StackOverflow { depth: 3, limit: 2 }
        );
    }

    #[test]
    fn test_values_to_bytes_rejects_non_bytes() {
        assert!(values_to_bytes(&[Value::Int(1)], "t").is_err());
        assert_eq!(values_to_bytes(&[Value::Byte(-1)], "t").unwrap(), vec![0xff]);
    }
}
