//! Configuration types for taintflow.
//!
//! Every section and every field is optional in TOML; omitted values take
//! their defaults.
//!
//! ```toml
//! [store]
//! arrays = "side_table"
//! descriptor_limit = 4096
//!
//! [engine]
//! propagate_file_writes = true
//!
//! [audit]
//! path = "/var/lib/taintflow/audit"
//! preview_bytes = 64
//!
//! [[sinks]]
//! name = "telemetry"
//! blocked = 0x10000
//! ```

use crate::error::TaintError;
use crate::sink::Sink;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use taintflow_audit::AuditConfig;
use taintflow_engine::EngineConfig;
use taintflow_store::{StoragePolicy, StorageStrategy, DEFAULT_DESCRIPTOR_LIMIT};

/// Descriptors 0 to 2 are always open, so a table needs room for more.
const MIN_DESCRIPTOR_LIMIT: usize = 4;

/// Configuration for the [`Taint`](crate::Taint) facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaintConfig {
    /// Shadow store layout.
    pub store: StoreConfig,

    /// Propagation rules.
    pub engine: EngineConfig,

    /// Sink audit journal.
    pub audit: AuditConfig,

    /// Named sinks and the sources they refuse.
    pub sinks: Vec<Sink>,
}

impl Default for TaintConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            audit: AuditConfig::default(),
            sinks: Sink::presets(),
        }
    }
}

impl TaintConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// `TaintError::Toml` for malformed input, `TaintError::Config` if the
    /// parsed values fail [`validate`](Self::validate).
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TaintConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// `TaintError::Io` if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks values serde cannot reject on its own.
    ///
    /// # Errors
    ///
    /// `TaintError::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_frame_depth == 0 {
            return Err(TaintError::Config(
                "engine.max_frame_depth must be at least 1".to_string(),
            ));
        }
        if self.store.descriptor_limit < MIN_DESCRIPTOR_LIMIT {
            return Err(TaintError::Config(format!(
                "store.descriptor_limit must be at least {MIN_DESCRIPTOR_LIMIT}"
            )));
        }
        for (i, sink) in self.sinks.iter().enumerate() {
            if sink.name.trim().is_empty() {
                return Err(TaintError::Config(format!("sinks[{i}] has an empty name")));
            }
            if self.sinks[..i].iter().any(|s| s.name == sink.name) {
                return Err(TaintError::Config(format!(
                    "sink '{}' is defined twice",
                    sink.name
                )));
            }
        }
        Ok(())
    }

    /// Looks up a configured sink by name.
    #[must_use]
    pub fn sink(&self, name: &str) -> Option<&Sink> {
        self.sinks.iter().find(|s| s.name == name)
    }
}

/// Shadow store configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Where array tags live.
    pub arrays: StorageStrategy,

    /// Where field tags live.
    pub fields: StorageStrategy,

    /// Maximum number of simultaneously open descriptors.
    pub descriptor_limit: usize,
}

impl StoreConfig {
    /// Returns the storage policy these settings describe.
    #[must_use]
    pub const fn policy(&self) -> StoragePolicy {
        StoragePolicy::new()
            .with_arrays(self.arrays)
            .with_fields(self.fields)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let policy = StoragePolicy::new();
        Self {
            arrays: policy.arrays,
            fields: policy.fields,
            descriptor_limit: DEFAULT_DESCRIPTOR_LIMIT,
        }
    }
}
