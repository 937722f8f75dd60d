//! Error policies for calls into native code.
//!
//! Native calls fail in three ways: the codec reports an allocation failure or protocol
//! violation, the engine leaves an error in its last-error slot, or the native code
//! panics. Inside this crate all three are a [`Fault`] in a `Result`; the [`ErrorBridge`]
//! decides per call site what a fault turns into:
//!
//! | Policy | Recoverable fault | Unrecoverable fault |
//! |---|---|---|
//! | [`run_always_fatal`](ErrorBridge::run_always_fatal) | fatal | fatal |
//! | [`run_fatal_only_if_unrecoverable`](ErrorBridge::run_fatal_only_if_unrecoverable) | swallowed | fatal |
//! | [`run_with_output`](ErrorBridge::run_with_output) | written to the slot, or fatal without one | fatal |
//! | [`try_run`](ErrorBridge::try_run) | `Err(BridgeError)` | fatal |
//!
//! What "fatal" means is set by [`FatalMode`]: unwind with a [`FatalError`] payload, or
//! abort the process.
//!
//! Panics are converted to faults in exactly one place, so a panic never leaves a policy
//! call as anything other than the policy's own outcome.

pub mod engine;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::Arc;

use self::engine::{EngineError, EngineErrorSource};
use crate::config::{BridgeConfig, FatalMode};
use crate::error::{BridgeError, FatalError, Fault};

/// Applies error policies to native calls.
///
/// The bridge is cheap to clone and can be shared between threads.
#[derive(Clone)]
pub struct ErrorBridge {
    engine: Arc<dyn EngineErrorSource>,
    config: BridgeConfig,
}

impl ErrorBridge {
    /// Creates a bridge that consults `engine` for out-of-band errors.
    pub fn new(engine: Arc<dyn EngineErrorSource>, config: BridgeConfig) -> Self {
        Self { engine, config }
    }

    /// Creates a bridge for code that never talks to an engine, such as the codec alone.
    pub fn without_engine(config: BridgeConfig) -> Self {
        Self::new(Arc::new(NoEngine), config)
    }

    /// Returns this bridge's configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Runs `block`; any fault is fatal.
    pub fn run_always_fatal<T>(&self, block: impl FnOnce() -> Result<T, Fault>) -> T {
        match guard(block) {
            Ok(value) => value,
            Err(fault) => self.escalate(fault),
        }
    }

    /// Runs `block`; recoverable faults are discarded and yield `None`.
    pub fn run_fatal_only_if_unrecoverable<T>(
        &self,
        block: impl FnOnce() -> Result<T, Fault>,
    ) -> Option<T> {
        match guard(block) {
            Ok(value) => Some(value),
            Err(fault) if fault.is_recoverable() => {
                #[cfg(feature = "logging")]
                log::debug!("ignoring recoverable fault: {fault}");
                None
            }
            Err(fault) => self.escalate(fault),
        }
    }

    /// Runs `block` and reports a recoverable fault through `out`.
    ///
    /// Returns `true` if the block succeeded. Returns `false` after writing the error into
    /// `out`, which is otherwise left untouched. Without a slot, and for every
    /// unrecoverable fault, the fault is fatal instead.
    pub fn run_with_output(
        &self,
        out: Option<&mut Option<BridgeError>>,
        block: impl FnOnce() -> Result<(), Fault>,
    ) -> bool {
        match guard(block) {
            Ok(()) => true,
            Err(fault) => match out {
                Some(slot) if fault.is_recoverable() => {
                    *slot = Some(BridgeError::from(fault));
                    false
                }
                _ => self.escalate(fault),
            },
        }
    }

    /// Runs `block` and returns a recoverable fault as an error.
    ///
    /// Unrecoverable faults are fatal.
    pub fn try_run<T>(&self, block: impl FnOnce() -> Result<T, Fault>) -> Result<T, BridgeError> {
        match guard(block) {
            Ok(value) => Ok(value),
            Err(fault) if fault.is_recoverable() => Err(BridgeError::from(fault)),
            Err(fault) => self.escalate(fault),
        }
    }

    /// Runs `block` and hands back any fault instead of raising it.
    ///
    /// This includes fatal errors raised by nested bridge calls in [`FatalMode::Panic`].
    /// Use it where cleanup has to run on every exit path, then [`raise`](CapturedFault::raise)
    /// the captured fault once the cleanup is done:
    ///
    /// ```rust
    /// use flatentity::{BridgeConfig, ErrorBridge, ErrorKind, Fault, ProtocolViolation};
    ///
    /// let bridge = ErrorBridge::without_engine(BridgeConfig::default());
    ///
    /// let captured = bridge.capture_faults(|| Err(Fault::Protocol(ProtocolViolation::NotStarted)));
    /// // release handles here, faulted or not
    /// if let Some(fault) = captured {
    ///     let err = fault.raise();
    ///     assert_eq!(err.kind, ErrorKind::ProtocolViolation);
    /// }
    /// ```
    pub fn capture_faults(&self, block: impl FnOnce() -> Result<(), Fault>) -> Option<CapturedFault> {
        let fault = guard(block).err()?;
        if fault.is_recoverable() {
            Some(CapturedFault::Error(BridgeError::from(fault)))
        } else {
            Some(CapturedFault::Fatal(FatalError::from(fault)))
        }
    }

    /// Raises the engine's pending error if it is fatal.
    ///
    /// The fatal error is cleared before it is raised. A recoverable error is left pending.
    pub fn check_and_raise_if_fatal(&self) {
        if let Some(error) = self.engine.last_error().filter(EngineError::is_fatal) {
            self.engine.clear_last_error();
            self.escalate(Fault::Engine(error));
        }
    }

    /// Takes the engine's pending error and returns it.
    ///
    /// A fatal error is raised instead.
    pub fn check_last_error(&self) -> Result<(), BridgeError> {
        self.engine_fault().or_else(|fault| {
            if fault.is_recoverable() {
                Err(BridgeError::from(fault))
            } else {
                self.escalate(fault)
            }
        })
    }

    /// Takes the engine's pending error as a fault, for use inside policy blocks.
    pub fn engine_fault(&self) -> Result<(), Fault> {
        match self.engine.last_error() {
            Some(error) => {
                self.engine.clear_last_error();
                Err(Fault::Engine(error))
            }
            None => Ok(()),
        }
    }

    fn escalate(&self, fault: Fault) -> ! {
        let fatal = FatalError::from(fault);

        #[cfg(feature = "logging")]
        log::error!("escalating to fatal: {fatal}");

        match self.config.fatal_mode {
            FatalMode::Panic => panic::panic_any(fatal),
            FatalMode::Abort => {
                eprintln!("flatentity: {fatal}");
                process::abort()
            }
        }
    }
}

impl fmt::Debug for ErrorBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBridge")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A fault held back by [`ErrorBridge::capture_faults`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedFault {
    /// A recoverable fault, ready to hand to the caller.
    Error(BridgeError),
    /// An unrecoverable fault whose unwind was interrupted.
    Fatal(FatalError),
}

impl CapturedFault {
    /// Surfaces the captured fault.
    ///
    /// A recoverable fault is returned as an error. A fatal one resumes unwinding with its
    /// [`FatalError`] payload and does not return.
    pub fn raise(self) -> BridgeError {
        match self {
            CapturedFault::Error(error) => error,
            CapturedFault::Fatal(fatal) => panic::resume_unwind(Box::new(fatal)),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CapturedFault::Fatal(_))
    }
}

struct NoEngine;

impl EngineErrorSource for NoEngine {
    fn last_error(&self) -> Option<EngineError> {
        None
    }

    fn clear_last_error(&self) {}
}

/// Runs `block`, turning a panic into a fault.
fn guard<T>(block: impl FnOnce() -> Result<T, Fault>) -> Result<T, Fault> {
    panic::catch_unwind(AssertUnwindSafe(block)).unwrap_or_else(|payload| Err(panic_fault(payload)))
}

fn panic_fault(payload: Box<dyn Any + Send>) -> Fault {
    match payload.downcast::<FatalError>() {
        Ok(fatal) => Fault::Fatal(*fatal),
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                String::from("panic with a non-string payload")
            };
            Fault::Panic(message)
        }
    }
}
