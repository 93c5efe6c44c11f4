//! Transport, registry, and delivery errors.

use std::io::ErrorKind;

use outport_core::ConfigError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised by a [`Connection`](crate::connection::Connection).
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `open` was called on a connection that is already open.
    #[error("connection already open")]
    AlreadyOpen,
    /// The connection was never opened or has been closed.
    #[error("connection not open")]
    NotOpen,
    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ClosedByPeer,
    /// Accepted connections cannot be dialed again.
    #[error("accepted connection cannot be re-opened")]
    CannotRedial,
    /// Dialing the endpoint failed.
    #[error("dial {address}: {source}")]
    Dial {
        /// Address that was dialed.
        address: String,
        /// Underlying handshake error.
        #[source]
        source: Box<tungstenite::Error>,
    },
    /// Socket-level I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Any other transport failure.
    #[error("transport: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Whether the connection is unusable and has to be re-established.
    pub fn is_closed(&self) -> bool {
        match self {
            Self::NotOpen | Self::ClosedByPeer => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::UnexpectedEof
            ),
            Self::Transport(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("closed") || msg.contains("broken pipe") || msg.contains("reset")
            }
            Self::AlreadyOpen | Self::CannotRedial | Self::Dial { .. } => false,
        }
    }
}

impl From<tungstenite::Error> for ConnectionError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(
                tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
            ) => Self::ClosedByPeer,
            tungstenite::Error::Io(e) => Self::Io(e),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<axum::Error> for ConnectionError {
    fn from(err: axum::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Errors raised by the [`ConnectionRegistry`](crate::registry::ConnectionRegistry).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No connection is registered under the id.
    #[error("connection {0} not found")]
    NotFound(String),
    /// The connection was removed but closing it failed.
    #[error("close connection: {0}")]
    Close(#[from] ConnectionError),
}

/// Errors returned from a send.
#[derive(Debug, Error)]
pub enum SendError {
    /// The registry holds no connection.
    #[error("no connections")]
    NoConnections,
    /// Refusing to send an empty payload.
    #[error("empty payload")]
    EmptyPayload,
    /// Every attempted write failed.
    #[error("all {} connection writes failed: {}", .0.len(), summarize(.0))]
    AllWritesFailed(Vec<(String, ConnectionError)>),
    /// The component was closed before the payload could be delivered.
    #[error("sender closed")]
    Closed,
}

impl SendError {
    /// Whether the failure means the connection has to be re-established.
    pub fn is_connection_closed(&self) -> bool {
        match self {
            Self::NoConnections => true,
            Self::AllWritesFailed(failures) => failures.iter().all(|(_, e)| e.is_closed()),
            Self::EmptyPayload | Self::Closed => false,
        }
    }
}

fn summarize(failures: &[(String, ConnectionError)]) -> String {
    failures
        .iter()
        .map(|(id, e)| format!("{id}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by the server role.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Binding or serving failed.
    #[error("server io: {0}")]
    Io(#[from] std::io::Error),
}
