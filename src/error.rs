use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bridge::engine::EngineError;

/// Code reported for allocation failures surfaced through the bridge.
pub const CODE_ALLOCATION: i32 = 10003;
/// Code reported for builder protocol violations surfaced through the bridge.
pub const CODE_PROTOCOL: i32 = 10001;
/// Code reported for objects too large for the table format.
pub const CODE_TABLE_TOO_LARGE: i32 = 10002;
/// Code reported for panics caught at the native boundary.
pub const CODE_NATIVE: i32 = 10699;

/// The builder was driven in an order the table format cannot represent.
///
/// These are development-time contract checks. They are only reported when
/// [`CHECKED`](crate::CHECKED) is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A collect or prepare call happened outside a collection window.
    NotCollecting,
    /// A string or byte vector was prepared after the table header was opened.
    PayloadAfterTableStart,
    /// `finish` was called before the table header was opened.
    NotStarted,
    /// The table was already finished; `clear` it before collecting again.
    AlreadyFinished,
    /// Field offsets are vtable byte offsets: even, at least 4 and at most 65532.
    InvalidFieldOffset(u16),
    /// The same field offset was collected twice in one table.
    DuplicateField(u16),
    /// The data offset was not returned by a `prepare_*` call since the last `clear`.
    ///
    /// A handle from before the `clear` that happens to equal a new handle passes.
    StaleDataOffset(u32),
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolViolation::NotCollecting => {
                write!(f, "builder used outside of a collection window")
            }
            ProtocolViolation::PayloadAfterTableStart => {
                write!(f, "strings and byte vectors must be prepared before the table is started")
            }
            ProtocolViolation::NotStarted => write!(f, "finish called before the table was started"),
            ProtocolViolation::AlreadyFinished => {
                write!(f, "table already finished; clear the builder first")
            }
            ProtocolViolation::InvalidFieldOffset(field) => {
                write!(f, "invalid field offset {field}: must be even and between 4 and 65532")
            }
            ProtocolViolation::DuplicateField(field) => {
                write!(f, "field offset {field} collected twice")
            }
            ProtocolViolation::StaleDataOffset(offset) => {
                write!(f, "data offset {offset} does not refer to a prepared payload")
            }
        }
    }
}

impl std::error::Error for ProtocolViolation {}

/// Growing the builder buffer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationError {
    /// Total buffer size that was requested.
    pub requested: usize,
    /// Configured upper bound at the time of the request.
    pub limit: usize,
}

impl AllocationError {
    pub(crate) fn new(requested: usize, limit: usize) -> Self {
        Self { requested, limit }
    }
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requested > self.limit {
            write!(
                f,
                "buffer of {} bytes exceeds the limit of {} bytes",
                self.requested, self.limit
            )
        } else {
            write!(f, "failed to allocate a buffer of {} bytes", self.requested)
        }
    }
}

impl std::error::Error for AllocationError {}

/// Errors returned by [`TableBuilder`](crate::TableBuilder) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The caller broke the builder protocol.
    Protocol(ProtocolViolation),
    /// The buffer could not grow.
    Allocation(AllocationError),
    /// The inline part of the table, or its vtable, exceeds what a `u16` can address.
    TableTooLarge(usize),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Protocol(e) => write!(f, "protocol violation: {e}"),
            CodecError::Allocation(e) => write!(f, "allocation failure: {e}"),
            CodecError::TableTooLarge(size) => {
                write!(f, "table of {size} bytes exceeds the vtable limit of 65535 bytes")
            }
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Protocol(e) => Some(e),
            CodecError::Allocation(e) => Some(e),
            CodecError::TableTooLarge(_) => None,
        }
    }
}

impl From<ProtocolViolation> for CodecError {
    fn from(err: ProtocolViolation) -> Self {
        CodecError::Protocol(err)
    }
}

impl From<AllocationError> for CodecError {
    fn from(err: AllocationError) -> Self {
        CodecError::Allocation(err)
    }
}

/// An unrecoverable fault that must not be allowed to continue silently.
///
/// In [`FatalMode::Panic`](crate::FatalMode::Panic) this is the panic payload used to
/// unwind out of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    /// Error code, when the fault carried one.
    pub code: Option<i32>,
    /// Human-readable description.
    pub message: String,
}

impl FatalError {
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "fatal error: {} ({code})", self.message),
            None => write!(f, "fatal error: {}", self.message),
        }
    }
}

impl std::error::Error for FatalError {}

/// A failure inside a native call, before the bridge applies a policy to it.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// The builder could not grow its buffer.
    Allocation(AllocationError),
    /// The builder protocol was broken.
    Protocol(ProtocolViolation),
    /// The storage engine reported an error.
    Engine(EngineError),
    /// The object does not fit the table format; carries the size in bytes.
    TableTooLarge(usize),
    /// A panic was caught at the native boundary.
    Panic(String),
    /// A fatal error raised by a nested bridge call.
    Fatal(FatalError),
}

impl Fault {
    /// Whether the fault can be handed to the caller as a [`BridgeError`].
    ///
    /// The engine decides for its own errors. Panics and already raised fatal
    /// errors are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Fault::Allocation(_) | Fault::Protocol(_) => true,
            Fault::Engine(e) => !e.is_fatal(),
            Fault::TableTooLarge(_) | Fault::Panic(_) | Fault::Fatal(_) => false,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Allocation(e) => write!(f, "allocation failure: {e}"),
            Fault::Protocol(e) => write!(f, "protocol violation: {e}"),
            Fault::Engine(e) => write!(f, "engine error: {e}"),
            Fault::TableTooLarge(size) => write!(
                f,
                "encoding limit: table of {size} bytes exceeds the vtable limit of 65535 bytes"
            ),
            Fault::Panic(msg) => write!(f, "native panic: {msg}"),
            Fault::Fatal(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Fault::Allocation(e) => Some(e),
            Fault::Protocol(e) => Some(e),
            Fault::Engine(e) => Some(e),
            Fault::Fatal(e) => Some(e),
            Fault::TableTooLarge(_) | Fault::Panic(_) => None,
        }
    }
}

impl From<AllocationError> for Fault {
    fn from(err: AllocationError) -> Self {
        Fault::Allocation(err)
    }
}

impl From<ProtocolViolation> for Fault {
    fn from(err: ProtocolViolation) -> Self {
        Fault::Protocol(err)
    }
}

impl From<EngineError> for Fault {
    fn from(err: EngineError) -> Self {
        Fault::Engine(err)
    }
}

impl From<FatalError> for Fault {
    fn from(err: FatalError) -> Self {
        Fault::Fatal(err)
    }
}

impl From<CodecError> for Fault {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Protocol(e) => Fault::Protocol(e),
            CodecError::Allocation(e) => Fault::Allocation(e),
            CodecError::TableTooLarge(size) => Fault::TableTooLarge(size),
        }
    }
}

impl From<Fault> for FatalError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Fatal(e) => e,
            Fault::Engine(e) => FatalError::new(Some(e.code), e.message),
            Fault::Allocation(e) => FatalError::new(Some(CODE_ALLOCATION), e.to_string()),
            Fault::Protocol(e) => FatalError::new(Some(CODE_PROTOCOL), e.to_string()),
            fault @ Fault::TableTooLarge(_) => {
                FatalError::new(Some(CODE_TABLE_TOO_LARGE), fault.to_string())
            }
            Fault::Panic(msg) => FatalError::new(Some(CODE_NATIVE), msg),
        }
    }
}

/// Category of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Allocation,
    ProtocolViolation,
    Encoding,
    Engine,
    Native,
}

/// Structured, recoverable error handed to the managed caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeError {
    /// Numeric code; engine errors keep the engine's own code.
    pub code: i32,
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for BridgeError {}

impl From<Fault> for BridgeError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Allocation(e) => BridgeError {
                code: CODE_ALLOCATION,
                kind: ErrorKind::Allocation,
                message: e.to_string(),
            },
            Fault::Protocol(e) => BridgeError {
                code: CODE_PROTOCOL,
                kind: ErrorKind::ProtocolViolation,
                message: e.to_string(),
            },
            fault @ Fault::TableTooLarge(_) => BridgeError {
                code: CODE_TABLE_TOO_LARGE,
                kind: ErrorKind::Encoding,
                message: fault.to_string(),
            },
            Fault::Engine(e) => BridgeError {
                code: e.code,
                kind: ErrorKind::Engine,
                message: e.message,
            },
            Fault::Panic(message) => BridgeError {
                code: CODE_NATIVE,
                kind: ErrorKind::Native,
                message,
            },
            Fault::Fatal(e) => BridgeError {
                code: e.code.unwrap_or(CODE_NATIVE),
                kind: ErrorKind::Native,
                message: e.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::engine::Severity;

    #[test]
    fn test_recoverability() {
        assert!(Fault::Allocation(AllocationError::new(64, 32)).is_recoverable());
        assert!(Fault::Protocol(ProtocolViolation::NotStarted).is_recoverable());
        assert!(Fault::Engine(EngineError::recoverable(404, "not found")).is_recoverable());
        assert!(!Fault::Engine(EngineError::fatal(10101, "store must shut down")).is_recoverable());
        assert!(!Fault::TableTooLarge(70_000).is_recoverable());
        assert!(!Fault::Panic(String::from("boom")).is_recoverable());
        assert!(!Fault::Fatal(FatalError::new(None, "boom")).is_recoverable());
    }

    #[test]
    fn test_engine_error_keeps_code() {
        let err: BridgeError = Fault::Engine(EngineError {
            code: 10201,
            message: String::from("unique constraint violated"),
            severity: Severity::Recoverable,
        })
        .into();
        assert_eq!(err.code, 10201);
        assert_eq!(err.kind, ErrorKind::Engine);
        assert_eq!(err.to_string(), "unique constraint violated (10201)");
    }

    #[test]
    fn test_allocation_display() {
        let over_limit = AllocationError::new(128, 64);
        assert!(over_limit.to_string().contains("exceeds the limit of 64"));

        let oom = AllocationError::new(128, 1024);
        assert!(oom.to_string().contains("failed to allocate"));
    }

    #[test]
    fn test_codec_error_source() {
        use std::error::Error;

        let err = CodecError::from(ProtocolViolation::DuplicateField(6));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("field offset 6 collected twice"));
        assert!(CodecError::TableTooLarge(70_000).source().is_none());
    }

    #[test]
    fn test_table_too_large_is_an_encoding_fault() {
        let fault = Fault::from(CodecError::TableTooLarge(70_000));
        assert_eq!(fault, Fault::TableTooLarge(70_000));
        assert!(fault.to_string().starts_with("encoding limit"));

        let fatal = FatalError::from(fault.clone());
        assert_eq!(fatal.code, Some(CODE_TABLE_TOO_LARGE));
        assert!(fatal.message.contains("70000 bytes"));

        let err = BridgeError::from(fault);
        assert_eq!(err.kind, ErrorKind::Encoding);
        assert_eq!(err.code, CODE_TABLE_TOO_LARGE);
    }

    #[test]
    fn test_fault_to_fatal() {
        let fatal = FatalError::from(Fault::Panic(String::from("index out of bounds")));
        assert_eq!(fatal.code, Some(CODE_NATIVE));
        assert_eq!(fatal.message, "index out of bounds");

        let fatal = FatalError::from(Fault::Engine(EngineError::fatal(7, "disk gone")));
        assert_eq!(fatal.to_string(), "fatal error: disk gone (7)");
    }
}
