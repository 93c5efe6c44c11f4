//! # outport-ws
//!
//! WebSocket transport for outport payloads.
//!
//! - [`connection`]: the [`Connection`] trait and its WebSocket implementation
//! - [`registry`]: the set of live connections a [`Sender`] fans out to
//! - [`sender`] / [`receiver`]: framed delivery with optional acknowledgment
//! - [`client`] / [`server`]: the two roles, with reconnect and per-connection receivers

#![deny(unsafe_code)]

pub mod client;
pub mod connection;
pub mod errors;
pub mod holder;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod server;

#[cfg(test)]
mod testutil;

pub use client::WsClient;
pub use connection::{Connection, WS_ROUTE, WsConnection};
pub use errors::{ConnectionError, RegistryError, SendError, ServerError};
pub use holder::ReceiversHolder;
pub use receiver::{NoopPayloadHandler, PayloadHandler, Receiver, ReceiverState};
pub use registry::ConnectionRegistry;
pub use sender::Sender;
pub use server::WsServer;
