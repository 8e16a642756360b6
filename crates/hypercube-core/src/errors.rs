//! Error types for the HyperCube client
//!
//! Every fallible path in the client maps onto one of the specific error enums
//! below. `HyperCubeError` unifies them for the public API. Transport failures
//! are normally absorbed by the runtime tasks and only surface as session state
//! changes; the types still exist so those tasks can log them precisely.

use std::io;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors raised while reconstructing or emitting frames
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Declared payload too large: {len} bytes (max: {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Read overran frame boundary: offered {offered} bytes, wanted {wanted}")]
    Overrun { offered: usize, wanted: usize },

    #[error("Frame writer busy: current frame has {remaining} bytes left to send")]
    WriterBusy { remaining: usize },

    #[error("Socket I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors converting between `Msg` and `Packet`
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Payload too large: {len} bytes (max: {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Unknown subsystem id {0}")]
    UnknownSubsystem(u16),

    #[error("Unknown command {command} for subsystem {subsystem}")]
    UnknownCommand { subsystem: u16, command: u16 },

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Errors interpreting signalling frames
#[derive(Debug, thiserror::Error)]
pub enum SignallingError {
    #[error("Malformed signalling frame ({command}): {reason}")]
    Malformed { command: String, reason: String },

    #[error("Unknown signalling command: {0}")]
    UnknownCommand(String),
}

/// Errors raised by the raw socket and connection lifecycle
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {address} failed: {source}")]
    ConnectionFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection to {address} timed out after {duration_ms}ms")]
    ConnectTimeout { address: String, duration_ms: u64 },

    #[error("Socket is not connected")]
    NotConnected,

    #[error("Read failed: {0}")]
    Read(#[source] FrameError),

    #[error("Write failed: {0}")]
    Write(#[source] io::Error),
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for the HyperCube client
#[derive(Debug, thiserror::Error)]
pub enum HyperCubeError {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Signalling error: {0}")]
    Signalling(#[from] SignallingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Client already initialised")]
    AlreadyRunning,

    #[error("Client not initialised")]
    NotRunning,
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl HyperCubeError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        HyperCubeError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a malformed signalling frame error
    pub fn malformed_signalling<C: Into<String>, R: Into<String>>(command: C, reason: R) -> Self {
        HyperCubeError::Signalling(SignallingError::Malformed {
            command: command.into(),
            reason: reason.into(),
        })
    }

    /// Whether the error is a transient transport condition the session retries
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HyperCubeError::Transport(_)
                | HyperCubeError::Frame(FrameError::Io(_))
                | HyperCubeError::Signalling(_)
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, HyperCubeError>;
pub type HyperCubeResult<T> = Result<T>;
