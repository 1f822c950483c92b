//! Error types
//!
//! Each pipeline stage has its own error enum; `Error` wraps them for callers
//! that only need a single type.

use std::fmt;
use std::time::Duration;

/// Result alias using the crate-level [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Camera device error
    Capture(CaptureError),
    /// Frame compression error
    Encode(EncodeError),
    /// Pipeline lifecycle error
    Pipeline(PipelineError),
    /// I/O error (listener, sockets)
    Io(std::io::Error),
    /// Viewer transport failure (handshake, send, timeout)
    Transport(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Capture(e) => write!(f, "capture error: {}", e),
            Error::Encode(e) => write!(f, "encode error: {}", e),
            Error::Pipeline(e) => write!(f, "pipeline error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Capture(e) => Some(e),
            Error::Encode(e) => Some(e),
            Error::Pipeline(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Transport(_) => None,
        }
    }
}

impl From<CaptureError> for Error {
    fn from(e: CaptureError) -> Self {
        Error::Capture(e)
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        Error::Encode(e)
    }
}

impl From<PipelineError> for Error {
    fn from(e: PipelineError) -> Self {
        Error::Pipeline(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Errors raised by a capture source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Requested resolution, rate or buffer depth was rejected
    InvalidConfig(String),
    /// Device could not be opened
    DeviceUnavailable(String),
    /// Device reported a hard failure or vanished
    DeviceDisconnected(String),
    /// No frame arrived within the bounded wait
    CaptureTimeout(Duration),
}

impl CaptureError {
    /// Whether the error ends the running pipeline without retry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::InvalidConfig(_) | CaptureError::DeviceUnavailable(_)
        )
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::InvalidConfig(msg) => write!(f, "invalid capture config: {}", msg),
            CaptureError::DeviceUnavailable(msg) => write!(f, "device unavailable: {}", msg),
            CaptureError::DeviceDisconnected(msg) => write!(f, "device disconnected: {}", msg),
            CaptureError::CaptureTimeout(wait) => {
                write!(f, "no frame within {} ms", wait.as_millis())
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// Errors raised while compressing a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Frame has zero width, height or data
    EmptyFrame,
    /// Pixel buffer length does not match dimensions
    BufferMismatch { expected: usize, actual: usize },
    /// Codec rejected the input
    Codec(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::EmptyFrame => write!(f, "frame is empty"),
            EncodeError::BufferMismatch { expected, actual } => write!(
                f,
                "pixel buffer length mismatch: expected {}, got {}",
                expected, actual
            ),
            EncodeError::Codec(msg) => write!(f, "codec failure: {}", msg),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Reasons a single delivery to a subscriber failed
///
/// Never fatal to the pipeline; the hub recovers by dropping the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Subscriber still holds the previous frame
    Full,
    /// Subscriber has gone away
    Closed,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Full => write!(f, "subscriber unreachable: sink full"),
            DeliveryError::Closed => write!(f, "subscriber unreachable: sink closed"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Errors returned by the pipeline controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Start/stop called in a state that does not allow it
    Conflict(&'static str),
    /// Opening the device failed, or the running pipeline failed
    Capture(CaptureError),
    /// Capture loop could not be spawned
    Spawn(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Conflict(msg) => write!(f, "pipeline conflict: {}", msg),
            PipelineError::Capture(e) => write!(f, "{}", e),
            PipelineError::Spawn(msg) => write!(f, "failed to spawn capture loop: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Capture(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CaptureError> for PipelineError {
    fn from(e: CaptureError) -> Self {
        PipelineError::Capture(e)
    }
}
