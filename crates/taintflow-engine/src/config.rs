//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default maximum number of nested frames per thread.
pub const DEFAULT_MAX_FRAME_DEPTH: usize = 1024;

/// Configuration for [`PropagationEngine`](crate::PropagationEngine).
///
/// # Example
///
/// ```rust
/// use taintflow_engine::EngineConfig;
///
/// let config = EngineConfig::new()
///     .with_max_frame_depth(64)
///     .with_propagate_file_writes(true);
/// assert!(config.index_taints_loads);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum frame depth before `invoke` reports a stack overflow.
    pub max_frame_depth: usize,
    /// Merge written data tags into the destination descriptor.
    pub propagate_file_writes: bool,
    /// Merge the index register's tag into array load results.
    pub index_taints_loads: bool,
}

impl EngineConfig {
    /// Creates a config with default values.
    ///
    /// Defaults:
    /// - Max frame depth: 1024
    /// - Propagate file writes: disabled
    /// - Index taints loads: enabled
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_depth: DEFAULT_MAX_FRAME_DEPTH,
            propagate_file_writes: false,
            index_taints_loads: true,
        }
    }

    /// Sets the maximum frame depth.
    #[must_use]
    pub const fn with_max_frame_depth(mut self, depth: usize) -> Self {
        self.max_frame_depth = depth;
        self
    }

    /// Enables or disables descriptor tagging on writes.
    #[must_use]
    pub const fn with_propagate_file_writes(mut self, enabled: bool) -> Self {
        self.propagate_file_writes = enabled;
        self
    }

    /// Enables or disables index-register taint on array loads.
    #[must_use]
    pub const fn with_index_taints_loads(mut self, enabled: bool) -> Self {
        self.index_taints_loads = enabled;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_frame_depth, DEFAULT_MAX_FRAME_DEPTH);
        assert!(!config.propagate_file_writes);
        assert!(config.index_taints_loads);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"propagate_file_writes":true}"#).unwrap();
        assert!(config.propagate_file_writes);
        assert_eq!(config.max_frame_depth, DEFAULT_MAX_FRAME_DEPTH);
    }
}
