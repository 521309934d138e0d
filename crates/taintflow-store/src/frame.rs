//! # Register Frames
//!
//! Scalar slots use the parallel-slot layout: every register is a
//! `(value, tag)` pair, so a register write and its tag write are one
//! store to one cell. Frames are owned by a single thread; nothing here is
//! shared or synchronized.
//!
//! Arguments arrive in the highest-numbered registers of a new frame. The
//! return slot belongs to the thread and survives frame pops so the caller
//! can move the result out.

use crate::location::Register;
use crate::value::{Slot, Value};
use taintflow_tag::Tag;

/// A single method activation.
#[derive(Debug, Clone)]
pub struct Frame {
    method: String,
    slots: Vec<Slot>,
}

impl Frame {
    /// Creates a frame with `size` zeroed, untainted registers.
    #[must_use]
    pub fn new(method: impl Into<String>, size: u16) -> Self {
        Self {
            method: method.into(),
            slots: vec![Slot::default(); usize::from(size)],
        }
    }

    /// Returns the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Number of registers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Returns a register slot.
    #[must_use]
    pub fn slot(&self, reg: Register) -> Option<&Slot> {
        self.slots.get(usize::from(reg.0))
    }

    /// Returns a mutable register slot.
    pub fn slot_mut(&mut self, reg: Register) -> Option<&mut Slot> {
        self.slots.get_mut(usize::from(reg.0))
    }
}

/// A thread's stack of frames plus its return-value slot.
#[derive(Debug, Clone)]
pub struct FrameStack {
    frames: Vec<Frame>,
    retval: Slot,
}

impl FrameStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            retval: Slot::default(),
        }
    }

    /// Pushes a frame.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Pops the current frame, releasing its slots and their tags.
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Current stack depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns the current frame.
    #[must_use]
    pub fn current(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Returns the current frame mutably.
    pub fn current_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Returns a register of the current frame.
    #[must_use]
    pub fn slot(&self, reg: Register) -> Option<&Slot> {
        self.current()?.slot(reg)
    }

    /// Returns a register of the current frame mutably.
    pub fn slot_mut(&mut self, reg: Register) -> Option<&mut Slot> {
        self.current_mut()?.slot_mut(reg)
    }

    /// Returns the tag of a register, `CLEAR` if it does not resolve.
    #[must_use]
    pub fn tag(&self, reg: Register) -> Tag {
        self.slot(reg).map_or(Tag::CLEAR, |s| s.tag)
    }

    /// Returns the value of a register.
    #[must_use]
    pub fn value(&self, reg: Register) -> Option<Value> {
        self.slot(reg).map(|s| s.value)
    }

    /// Returns the return-value slot.
    #[must_use]
    pub fn retval(&self) -> &Slot {
        &self.retval
    }

    /// Returns the return-value slot mutably.
    pub fn retval_mut(&mut self) -> &mut Slot {
        &mut self.retval
    }
}

impl Default for FrameStack {
    fn default() -> Self {
        Self::new()
    }
}
