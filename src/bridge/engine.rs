//! The storage engine's side of the error bridge.
//!
//! The engine reports failures out of band: a call returns a bare status, and the details
//! are kept in a per-engine "last error" slot. [`EngineErrorSource`] is how the bridge
//! reads and clears that slot.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};

/// Whether the engine can keep going after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// The operation failed; the engine is still consistent.
    Recoverable,
    /// The engine cannot continue safely.
    Fatal,
}

/// An error reported by the storage engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    /// The engine's own error code, passed through unchanged.
    pub code: i32,
    pub message: String,
    /// Decided by the engine; the bridge never reclassifies.
    pub severity: Severity,
}

impl EngineError {
    pub fn recoverable(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: Severity::Recoverable,
        }
    }

    pub fn fatal(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for EngineError {}

/// Access to the engine's pending error.
pub trait EngineErrorSource: Send + Sync {
    /// The most recent error, if one is pending. Does not clear it.
    fn last_error(&self) -> Option<EngineError>;

    /// Discards the pending error.
    fn clear_last_error(&self);
}

/// Lock-free last-error slot for engine adapters.
///
/// Publishing replaces whatever was pending. Readers on other threads observe either the
/// old or the new error, never a torn value.
#[derive(Debug, Default)]
pub struct LastErrorCell {
    slot: ArcSwapOption<EngineError>,
}

impl LastErrorCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `error` as the pending error.
    pub fn publish(&self, error: EngineError) {
        self.slot.store(Some(Arc::new(error)));
    }

    /// Removes and returns the pending error.
    pub fn take(&self) -> Option<EngineError> {
        self.slot.swap(None).map(|error| (*error).clone())
    }
}

impl EngineErrorSource for LastErrorCell {
    fn last_error(&self) -> Option<EngineError> {
        self.slot.load_full().map(|error| (*error).clone())
    }

    fn clear_last_error(&self) {
        self.slot.store(None);
    }
}
