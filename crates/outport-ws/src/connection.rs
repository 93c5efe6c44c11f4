//! WebSocket connection abstraction.
//!
//! [`Connection`] is the capability the sender and receiver work against.
//! [`WsConnection`] implements it for both sides of the link:
//! [`WsConnection::dial`] for connections this process initiates and
//! [`WsConnection::accepted`] for sockets upgraded by the server.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::ConnectionError;

/// HTTP path of the upgrade endpoint.
pub const WS_ROUTE: &str = "/outport";

/// One transport link.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable id, unique per instance.
    fn id(&self) -> &str;

    /// Whether the link is currently usable.
    fn is_open(&self) -> bool;

    /// Dial `address`.
    async fn open(&self, address: &str) -> Result<(), ConnectionError>;

    /// Next data message.
    async fn read(&self) -> Result<Vec<u8>, ConnectionError>;

    /// Send one binary message.
    async fn write(&self, data: &[u8]) -> Result<(), ConnectionError>;

    /// Close handshake and release the socket.
    async fn close(&self) -> Result<(), ConnectionError>;
}

/// Generate a fresh connection id.
pub fn new_connection_id() -> String {
    format!("conn_{}", Uuid::now_v7())
}

/// Build the URL dialed for `address`.
///
/// Bare `host:port` addresses get the `ws://` scheme and [`WS_ROUTE`].
pub fn endpoint_url(address: &str) -> String {
    if address.starts_with("ws://") || address.starts_with("wss://") {
        address.to_string()
    } else {
        format!("ws://{address}{WS_ROUTE}")
    }
}

enum Inbound {
    Data(Vec<u8>),
    Control,
    Close,
}

enum Outbound {
    Data(Vec<u8>),
    Close,
}

type InboundStream = Pin<Box<dyn Stream<Item = Result<Inbound, ConnectionError>> + Send>>;
type OutboundSink = Pin<Box<dyn Sink<Outbound, Error = ConnectionError> + Send>>;

/// Split halves of one open socket.
struct Link {
    reader: Mutex<InboundStream>,
    writer: Mutex<OutboundSink>,
    /// Cancelled on local close to release pending reads.
    shutdown: CancellationToken,
}

impl Link {
    fn new(reader: InboundStream, writer: OutboundSink) -> Arc<Self> {
        Arc::new(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            shutdown: CancellationToken::new(),
        })
    }

    fn from_tungstenite<S>(ws: S) -> Arc<Self>
    where
        S: Stream<Item = Result<TungsteniteMessage, tokio_tungstenite::tungstenite::Error>>
            + Sink<TungsteniteMessage, Error = tokio_tungstenite::tungstenite::Error>
            + Send
            + 'static,
    {
        let (sink, stream) = ws.split();
        let reader = stream.map(|res| {
            res.map_err(ConnectionError::from).map(|msg| match msg {
                TungsteniteMessage::Binary(b) => Inbound::Data(b.to_vec()),
                TungsteniteMessage::Text(t) => Inbound::Data(t.as_str().as_bytes().to_vec()),
                TungsteniteMessage::Close(_) => Inbound::Close,
                TungsteniteMessage::Ping(_)
                | TungsteniteMessage::Pong(_)
                | TungsteniteMessage::Frame(_) => Inbound::Control,
            })
        });
        let writer = sink.with(|out: Outbound| {
            future::ready(Ok::<_, ConnectionError>(match out {
                Outbound::Data(data) => TungsteniteMessage::Binary(Bytes::from(data)),
                Outbound::Close => TungsteniteMessage::Close(None),
            }))
        });
        Self::new(Box::pin(reader), Box::pin(writer))
    }

    fn from_axum(socket: WebSocket) -> Arc<Self> {
        let (sink, stream) = socket.split();
        let reader = stream.map(|res| {
            res.map_err(ConnectionError::from).map(|msg| match msg {
                AxumMessage::Binary(b) => Inbound::Data(b.to_vec()),
                AxumMessage::Text(t) => Inbound::Data(t.as_str().as_bytes().to_vec()),
                AxumMessage::Close(_) => Inbound::Close,
                AxumMessage::Ping(_) | AxumMessage::Pong(_) => Inbound::Control,
            })
        });
        let writer = sink.with(|out: Outbound| {
            future::ready(Ok::<_, ConnectionError>(match out {
                Outbound::Data(data) => AxumMessage::Binary(Bytes::from(data)),
                Outbound::Close => AxumMessage::Close(None),
            }))
        });
        Self::new(Box::pin(reader), Box::pin(writer))
    }
}

/// WebSocket-backed [`Connection`].
pub struct WsConnection {
    id: String,
    dialable: bool,
    link: RwLock<Option<Arc<Link>>>,
}

impl WsConnection {
    /// Unopened client-side connection; call [`Connection::open`] to dial.
    pub fn dial() -> Self {
        Self {
            id: new_connection_id(),
            dialable: true,
            link: RwLock::new(None),
        }
    }

    /// Wrap a socket accepted by the server under a fresh id.
    pub fn accepted(socket: WebSocket) -> Self {
        Self::accepted_with_id(new_connection_id(), socket)
    }

    /// Wrap a socket accepted by the server under `id`.
    pub fn accepted_with_id(id: String, socket: WebSocket) -> Self {
        Self {
            id,
            dialable: false,
            link: RwLock::new(Some(Link::from_axum(socket))),
        }
    }

    fn current(&self) -> Result<Arc<Link>, ConnectionError> {
        self.link.read().clone().ok_or(ConnectionError::NotOpen)
    }

    /// Drop `link` if it is still the active one.
    fn detach(&self, link: &Arc<Link>) {
        let mut slot = self.link.write();
        if slot.as_ref().is_some_and(|l| Arc::ptr_eq(l, link)) {
            *slot = None;
        }
        link.shutdown.cancel();
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for WsConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_open(&self) -> bool {
        self.link.read().is_some()
    }

    #[instrument(skip(self), fields(conn_id = %self.id))]
    async fn open(&self, address: &str) -> Result<(), ConnectionError> {
        if self.is_open() {
            return Err(ConnectionError::AlreadyOpen);
        }
        if !self.dialable {
            return Err(ConnectionError::CannotRedial);
        }

        let url = endpoint_url(address);
        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ConnectionError::Dial {
                address: url.clone(),
                source: Box::new(e),
            })?;

        let mut slot = self.link.write();
        if slot.is_some() {
            // Lost a race with a concurrent open; the fresh socket is dropped.
            return Err(ConnectionError::AlreadyOpen);
        }
        *slot = Some(Link::from_tungstenite(ws));
        debug!(url, "connection opened");
        Ok(())
    }

    async fn read(&self) -> Result<Vec<u8>, ConnectionError> {
        let link = self.current()?;
        let mut reader = tokio::select! {
            guard = link.reader.lock() => guard,
            () = link.shutdown.cancelled() => return Err(ConnectionError::NotOpen),
        };

        loop {
            let next = tokio::select! {
                next = reader.next() => next,
                () = link.shutdown.cancelled() => return Err(ConnectionError::NotOpen),
            };
            match next {
                Some(Ok(Inbound::Data(bytes))) => return Ok(bytes),
                Some(Ok(Inbound::Control)) => {}
                Some(Ok(Inbound::Close)) | None => {
                    debug!(conn_id = %self.id, "peer closed connection");
                    self.detach(&link);
                    return Err(ConnectionError::ClosedByPeer);
                }
                Some(Err(e)) => {
                    if e.is_closed() {
                        self.detach(&link);
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn write(&self, data: &[u8]) -> Result<(), ConnectionError> {
        let link = self.current()?;
        let mut writer = link.writer.lock().await;
        if link.shutdown.is_cancelled() {
            return Err(ConnectionError::NotOpen);
        }
        match writer.send(Outbound::Data(data.to_vec())).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_closed() {
                    drop(writer);
                    self.detach(&link);
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(conn_id = %self.id))]
    async fn close(&self) -> Result<(), ConnectionError> {
        let link = self.link.write().take().ok_or(ConnectionError::NotOpen)?;
        link.shutdown.cancel();

        let mut writer = link.writer.lock().await;
        let sent = writer.send(Outbound::Close).await;
        let _ = writer.close().await;
        debug!("connection closed");

        match sent {
            Ok(()) => Ok(()),
            // Peer already went away; the link is closed either way
            Err(e) if e.is_closed() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
