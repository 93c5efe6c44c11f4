//! Error types for framing and configuration.

use thiserror::Error;

/// Errors produced while decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame is shorter than its fixed header.
    #[error("frame too short: {actual} bytes, need at least {min}")]
    TooShort {
        /// Bytes received.
        actual: usize,
        /// Minimum header length.
        min: usize,
    },
    /// The leading flag byte is neither of the two sentinels.
    #[error("invalid acknowledgment flag {0:#04x}")]
    InvalidFlag(u8),
    /// An acknowledgment reply did not carry exactly one counter.
    #[error("invalid acknowledgment length {0}, expected 8")]
    InvalidAckLength(usize),
    /// A payload envelope declared a length that does not match its data.
    #[error("payload length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch {
        /// Length written in the envelope header.
        declared: usize,
        /// Bytes actually following the header.
        actual: usize,
    },
    /// Envelope data exceeds what the 32-bit length field can describe.
    #[error("payload of {0} bytes exceeds the envelope length limit")]
    PayloadTooLarge(usize),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No endpoint address was configured.
    #[error("empty url")]
    EmptyUrl,
    /// The retry interval must be non-zero.
    #[error("retry duration must be greater than zero")]
    ZeroRetryDuration,
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse the configuration JSON.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
}
