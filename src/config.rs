//! Per-instance configuration for builders and error bridges.
//!
//! Nothing in this crate reads global flags. Every builder and bridge carries its own
//! configuration, fixed at construction.

use serde::{Deserialize, Serialize};

use crate::table::buffer::MAX_BUFFER_SIZE;

/// Default initial buffer capacity for a new builder (1 KiB).
pub const DEFAULT_INITIAL_CAPACITY: usize = 1024;

/// Configuration for a [`TableBuilder`](crate::TableBuilder).
///
/// # Example
///
/// ```rust
/// use flatentity::{BuilderConfig, TableBuilder};
///
/// let builder = TableBuilder::with_config(
///     BuilderConfig::default().initial_capacity(4096),
/// );
/// assert!(!builder.did_start());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Write a vtable slot for every collected scalar, even if it equals the type default.
    ///
    /// Default: `true`. Turning this off makes a zero value indistinguishable from a
    /// property that was never collected.
    pub force_defaults: bool,

    /// Bytes allocated when the first value is written.
    ///
    /// Default: 1 KiB
    pub initial_capacity: usize,

    /// Upper bound for the finished buffer. Growth past it fails with an allocation error.
    ///
    /// Default and maximum: `i32::MAX`
    pub max_buffer_size: usize,
}

impl BuilderConfig {
    /// Sets whether default values still produce vtable slots.
    #[must_use]
    pub fn force_defaults(mut self, force: bool) -> Self {
        self.force_defaults = force;
        self
    }

    /// Sets the initial buffer capacity.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Caps the buffer size. Values above `i32::MAX` are clamped.
    #[must_use]
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size.min(MAX_BUFFER_SIZE);
        self
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            force_defaults: true,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_buffer_size: MAX_BUFFER_SIZE,
        }
    }
}

/// What a fatal escalation does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatalMode {
    /// Unwind with a [`FatalError`](crate::FatalError) payload.
    ///
    /// Only [`ErrorBridge::capture_faults`](crate::ErrorBridge::capture_faults) converts
    /// the unwind back into a value; everything else lets it terminate the caller.
    #[default]
    Panic,
    /// Print the fault and abort the process.
    Abort,
}

/// Configuration for an [`ErrorBridge`](crate::ErrorBridge).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// How unrecoverable faults terminate.
    ///
    /// Default: [`FatalMode::Panic`]
    pub fatal_mode: FatalMode,
}

impl BridgeConfig {
    /// Sets the fatal mode.
    #[must_use]
    pub fn fatal_mode(mut self, mode: FatalMode) -> Self {
        self.fatal_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_force_slots() {
        let config = BuilderConfig::default();
        assert!(config.force_defaults);
        assert_eq!(config.initial_capacity, DEFAULT_INITIAL_CAPACITY);
        assert_eq!(config.max_buffer_size, i32::MAX as usize);
    }

    #[test]
    fn test_max_buffer_size_is_clamped() {
        let config = BuilderConfig::default().max_buffer_size(usize::MAX);
        assert_eq!(config.max_buffer_size, i32::MAX as usize);

        let config = BuilderConfig::default().max_buffer_size(64);
        assert_eq!(config.max_buffer_size, 64);
    }

    #[test]
    fn test_bridge_default_panics() {
        assert_eq!(BridgeConfig::default().fatal_mode, FatalMode::Panic);
        assert_eq!(
            BridgeConfig::default().fatal_mode(FatalMode::Abort).fatal_mode,
            FatalMode::Abort
        );
    }
}
