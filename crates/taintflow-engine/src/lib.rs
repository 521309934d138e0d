//! # Taint Propagation Engine
//!
//! Applies the propagation rules to every host operation that moves or
//! derives data: register moves, arithmetic, array and field access, bulk
//! copies, off-heap buffer crossings and file I/O.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`PropagationEngine`] | Shared, cloneable rule executor over a [`ShadowStore`](taintflow_store::ShadowStore) |
//! | [`ThreadContext`] | Per-thread frame stack and return slot |
//! | [`EngineConfig`] | Frame depth limit and optional propagation rules |
//! | [`apply_binary`] / [`apply_unary`] / [`convert_value`] | Primitive value semantics |
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use taintflow_engine::{BinaryOp, PropagationEngine, ThreadContext};
//! use taintflow_store::{Location, Register, ShadowStore, Value};
//! use taintflow_tag::Tag;
//!
//! let engine = PropagationEngine::new(Arc::new(ShadowStore::default()));
//! let mut ctx = ThreadContext::new();
//! engine.invoke(&mut ctx, "record", 3, &[])?;
//!
//! engine.const_value(&mut ctx, Register(0), Value::Int(440))?;
//! engine.merge_tag(&mut ctx, Location::reg(0), Tag::MIC);
//! engine.const_value(&mut ctx, Register(1), Value::Int(2))?;
//! engine.merge_tag(&mut ctx, Location::reg(1), Tag::SMS);
//!
//! engine.binary_op(&mut ctx, BinaryOp::Mul, Register(2), Register(0), Register(1))?;
//! assert_eq!(ctx.value(Register(2)), Some(Value::Int(880)));
//! assert_eq!(engine.get_tag(&ctx, Location::reg(2)), Tag::MIC | Tag::SMS);
//! # Ok::<(), taintflow_engine::EngineError>(())
//! ```

mod config;
mod context;
mod engine;
mod error;
mod ops;

pub use config::{EngineConfig, DEFAULT_MAX_FRAME_DEPTH};
pub use context::ThreadContext;
pub use engine::PropagationEngine;
pub use error::{EngineError, Result};
pub use ops::{apply_binary, apply_unary, convert_value, BinaryOp, UnaryOp};
