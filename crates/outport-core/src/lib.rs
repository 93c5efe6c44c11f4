//! # outport-core
//!
//! Foundation pieces shared by the outport transport crates:
//!
//! - **Cancellation**: [`CancellationSignal`], a resettable broadcast "stop" primitive
//! - **Framing**: [`frame`] encodes/decodes wire frames, acknowledgments and payload envelopes
//! - **Configuration**: [`WebSocketConfig`] with layered loading (defaults, JSON file, env)
//! - **Errors**: [`FrameError`] and [`ConfigError`] via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod frame;
pub mod logging;
pub mod signal;

pub use config::{ConnectionMode, WebSocketConfig};
pub use errors::{ConfigError, FrameError};
pub use frame::{Frame, PayloadEnvelope};
pub use signal::CancellationSignal;
