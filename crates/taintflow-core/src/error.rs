//! Error types for taintflow core.

use thiserror::Error;

/// Core error type for facade operations.
#[derive(Debug, Error)]
pub enum TaintError {
    /// Configuration is well-formed but unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML for [`TaintConfig`](crate::TaintConfig).
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Shadow store error passthrough.
    #[error("Store error: {0}")]
    Store(#[from] taintflow_store::StoreError),

    /// Engine error passthrough.
    #[error("Engine error: {0}")]
    Engine(#[from] taintflow_engine::EngineError),

    /// Audit journal error passthrough.
    #[error("Audit error: {0}")]
    Audit(#[from] taintflow_audit::AuditError),
}
