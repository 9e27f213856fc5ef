use thiserror::Error;

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

/// Failure of a single device binding call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// No graphics context could be obtained.
    #[error("graphics device unavailable: {0}")]
    Unavailable(String),

    /// The handle was never created by this device or was already released.
    #[error("invalid {kind} handle #{id}")]
    InvalidHandle { kind: &'static str, id: u32 },

    /// The call needs an object bound to a binding point that is empty.
    #[error("no {0} bound")]
    NothingBound(&'static str),

    /// A device enum value this binding does not implement.
    #[error("unsupported {what} ({value:#x})")]
    Unsupported { what: &'static str, value: u32 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device handle space exhausted")]
    HandlesExhausted,

    /// Presentation surface failed irrecoverably.
    #[error("surface failure: {0}")]
    Surface(String),

    /// Generic backend failure for the named call.
    #[error("{call} failed: {message}")]
    CallFailed { call: &'static str, message: String },
}
