//! Driver errors.

use outport_core::FrameError;
use outport_ws::SendError;
use thiserror::Error;

/// Errors raised by the driver façade and dispatcher.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The envelope carries a tag outside the known operations.
    #[error("unknown operation tag {0}")]
    UnknownOperation(u32),
    /// An operation name did not match any known operation.
    #[error("unknown operation name {0:?}")]
    UnknownOperationName(String),
    /// Marshaling an argument failed.
    #[error("marshal {operation}: {message}")]
    Marshal {
        /// Operation being marshaled.
        operation: &'static str,
        /// Marshaler error text.
        message: String,
    },
    /// Unmarshaling a payload failed.
    #[error("unmarshal: {0}")]
    Unmarshal(String),
    /// The payload envelope could not be decoded.
    #[error("envelope: {0}")]
    Envelope(#[from] FrameError),
    /// The transport refused the payload.
    #[error("send: {0}")]
    Send(#[from] SendError),
}
