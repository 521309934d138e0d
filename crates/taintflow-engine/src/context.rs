//! Per-thread execution state.

use crate::error::{EngineError, Result};
use taintflow_store::{Frame, FrameStack, HeapId, Register, Slot, Value};
use taintflow_tag::Tag;

/// The frame stack and return slot of one mutator thread.
///
/// Slot tags are thread-local: a context is owned by exactly one thread and
/// is handed to engine operations by `&mut`. It is `Send`, so it can be
/// created on one thread and moved to the one that runs the code.
#[derive(Debug, Default)]
pub struct ThreadContext {
    stack: FrameStack,
}

impl ThreadContext {
    /// Creates a context with an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: FrameStack::new(),
        }
    }

    /// Returns the frame stack.
    #[must_use]
    pub fn stack(&self) -> &FrameStack {
        &self.stack
    }

    /// Current frame depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// Name of the method executing in the current frame.
    #[must_use]
    pub fn current_method(&self) -> Option<&str> {
        self.stack.current().map(Frame::method)
    }

    pub(crate) fn push(&mut self, frame: Frame) {
        self.stack.push(frame);
    }

    pub(crate) fn pop(&mut self) -> Result<Frame> {
        self.stack.pop().ok_or(EngineError::NoActiveFrame)
    }

    /// Tag of a register, `CLEAR` if it does not resolve.
    #[must_use]
    pub fn reg_tag(&self, reg: Register) -> Tag {
        self.stack.tag(reg)
    }

    /// Tag of the return slot.
    #[must_use]
    pub fn retval_tag(&self) -> Tag {
        self.stack.retval().tag
    }

    /// Value of a register, `None` if it does not resolve.
    #[must_use]
    pub fn value(&self, reg: Register) -> Option<Value> {
        self.stack.value(reg)
    }

    /// Value and tag of the return slot.
    #[must_use]
    pub fn retval(&self) -> Slot {
        *self.stack.retval()
    }

    pub(crate) fn retval_mut(&mut self) -> &mut Slot {
        self.stack.retval_mut()
    }

    pub(crate) fn slot_tag_mut(&mut self, reg: Register) -> Option<&mut Tag> {
        self.stack.slot_mut(reg).map(|s| &mut s.tag)
    }

    /// Reads a register for a data access.
    pub(crate) fn read(&self, reg: Register) -> Result<Slot> {
        let frame = self.stack.current().ok_or(EngineError::NoActiveFrame)?;
        frame.slot(reg).copied().ok_or(EngineError::InvalidRegister {
            register: reg,
            size: frame.size(),
        })
    }

    /// Writes a register value and merges `tag` into its tag.
    pub(crate) fn write(&mut self, reg: Register, value: Value, tag: Tag) -> Result<Tag> {
        let frame = self.stack.current_mut().ok_or(EngineError::NoActiveFrame)?;
        let size = frame.size();
        let slot = frame
            .slot_mut(reg)
            .ok_or(EngineError::InvalidRegister { register: reg, size })?;
        slot.value = value;
        slot.tag = slot.tag.combine(tag);
        Ok(slot.tag)
    }

    /// Reads a register that must hold a non-null reference.
    pub(crate) fn read_ref(&self, reg: Register, operation: &'static str) -> Result<(HeapId, Tag)> {
        let slot = self.read(reg)?;
        match slot.value {
            Value::Ref(Some(id)) => Ok((id, slot.tag)),
            Value::Ref(None) => Err(EngineError::NullReference { operation }),
            other => Err(EngineError::TypeMismatch {
                operation,
                expected: "reference",
                found: other.to_string(),
            }),
        }
    }

    /// Reads a register that must hold a non-negative `int` index.
    pub(crate) fn read_index(&self, reg: Register, operation: &'static str) -> Result<(usize, Tag)> {
        let slot = self.read(reg)?;
        let index = slot.value.as_int().ok_or_else(|| EngineError::TypeMismatch {
            operation,
            expected: "int",
            found: slot.value.to_string(),
        })?;
        let index = usize::try_from(index).map_err(|_| EngineError::NegativeIndex(index))?;
        Ok((index, slot.tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_fails_data_access() {
        let ctx = ThreadContext::new();
        assert_eq!(ctx.read(Register(0)).unwrap_err(), EngineError::NoActiveFrame);
        assert_eq!(ctx.reg_tag(Register(0)), Tag::CLEAR);
    }

    #[test]
    fn test_write_merges_tag() {
        let mut ctx = ThreadContext::new();
        ctx.push(Frame::new("main", 2));
        ctx.write(Register(0), Value::Int(1), Tag::SMS).unwrap();
        let tag = ctx.write(Register(0), Value::Int(2), Tag::MIC).unwrap();
        assert_eq!(tag, Tag::SMS | Tag::MIC);
        assert_eq!(ctx.value(Register(0)), Some(Value::Int(2)));
    }

    #[test]
    fn test_out_of_range_register() {
        let mut ctx = ThreadContext::new();
        ctx.push(Frame::new("main", 2));
        assert_eq!(
            ctx.read(Register(2)).unwrap_err(),
            EngineError::InvalidRegister {
                register: Register(2),
                size: 2
            }
        );
    }

    #[test]
    fn test_read_ref_rejects_null_and_primitives() {
        let mut ctx = ThreadContext::new();
        ctx.push(Frame::new("main", 2));
        ctx.write(Register(0), Value::NULL, Tag::CLEAR).unwrap();
        assert_eq!(
            ctx.read_ref(Register(0), "test").unwrap_err(),
            EngineError::NullReference { operation: "test" }
        );
        assert!(matches!(
            ctx.read_ref(Register(1), "test").unwrap_err(),
            EngineError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_read_index_rejects_negative() {
        let mut ctx = ThreadContext::new();
        ctx.push(Frame::new("main", 1));
        ctx.write(Register(0), Value::Int(-3), Tag::CLEAR).unwrap();
        assert_eq!(
            ctx.read_index(Register(0), "aget").unwrap_err(),
            EngineError::NegativeIndex(-3)
        );
    }
}
