//! Error types for the propagation engine.
//!
//! Taint bookkeeping itself never fails. Every variant here reports misuse
//! of the host's primary data by the instrumented program, the same
//! conditions the managed runtime would raise as exceptions.

use taintflow_store::{Register, StoreError};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while executing host operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Primary storage rejected the access.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A reference operand was null.
    #[error("null reference in {operation}")]
    NullReference {
        /// Operation that dereferenced null.
        operation: &'static str,
    },

    /// Integer division or remainder by zero.
    #[error("arithmetic exception: {0}")]
    Arithmetic(String),

    /// Invoking would exceed the configured frame depth.
    #[error("stack overflow: depth {depth} exceeds limit of {limit}")]
    StackOverflow {
        /// Depth the push would have reached.
        depth: usize,
        /// Configured maximum depth.
        limit: usize,
    },

    /// A register operation ran with no frame on the stack.
    #[error("no active frame")]
    NoActiveFrame,

    /// A register index outside the current frame on a data access.
    #[error("register {register} out of range for frame of size {size}")]
    InvalidRegister {
        /// Requested register.
        register: Register,
        /// Size of the current frame.
        size: usize,
    },

    /// An array index or length register held a negative value.
    #[error("negative index {0}")]
    NegativeIndex(i32),

    /// More arguments than the callee frame has registers.
    #[error("{args} arguments do not fit a frame of {size} registers")]
    TooManyArguments {
        /// Number of arguments supplied.
        args: usize,
        /// Size of the callee frame.
        size: usize,
    },

    /// An operand had the wrong type for the operation.
    #[error("type mismatch in {operation}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Operation being executed.
        operation: &'static str,
        /// What the operation accepts.
        expected: &'static str,
        /// What it received.
        found: String,
    },
}
