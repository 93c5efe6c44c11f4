//! Server role: accepts WebSocket connections on [`WS_ROUTE`].

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use outport_core::{CancellationSignal, WebSocketConfig};
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};

use crate::connection::{Connection, WS_ROUTE, WsConnection, new_connection_id};
use crate::errors::{SendError, ServerError};
use crate::holder::ReceiversHolder;
use crate::receiver::{PayloadHandler, Receiver};
use crate::sender::Sender;

/// State shared between the server handle and its connection tasks.
struct ServerState {
    url: String,
    max_message_size: usize,
    blocking_ack_on_error: bool,
    retry_duration: Duration,
    sender: Sender,
    receivers: ReceiversHolder,
    handler: RwLock<Option<Arc<dyn PayloadHandler>>>,
    cancel: CancellationSignal,
}

/// WebSocket server.
///
/// Without a registered payload handler, accepted connections join the
/// broadcast set used by [`send`](Self::send). With one, every accepted
/// connection gets its own [`Receiver`] feeding the handler.
#[derive(Clone)]
pub struct WsServer {
    state: Arc<ServerState>,
}

impl WsServer {
    /// Create a server for `config`.
    pub fn new(config: &WebSocketConfig) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(ServerState {
                url: config.url.clone(),
                max_message_size: config.max_message_size,
                blocking_ack_on_error: config.blocking_ack_on_error,
                retry_duration: config.retry_duration(),
                sender: Sender::new(config.with_acknowledge),
                receivers: ReceiversHolder::new(),
                handler: RwLock::new(None),
                cancel: CancellationSignal::new(),
            }),
        })
    }

    /// Route inbound payloads of connections accepted from now on to `handler`.
    pub fn register_payload_handler(&self, handler: Arc<dyn PayloadHandler>) {
        *self.state.handler.write() = Some(handler);
    }

    /// Build the Axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route(WS_ROUTE, get(ws_handler))
            .with_state(self.state.clone())
    }

    /// Bind the configured url and serve until [`close`](Self::close).
    pub async fn listen(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.state.url.as_str()).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until [`close`](Self::close).
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        info!(%addr, route = WS_ROUTE, "websocket server listening");

        let shutdown = self.state.cancel.wait();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!(%addr, "websocket server stopped");
        Ok(())
    }

    /// Broadcast `payload` to every connection in the broadcast set.
    ///
    /// Connections whose peer has gone away are dropped from the set before
    /// and after the broadcast.
    pub async fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        if self.state.cancel.is_closed() {
            return Err(SendError::Closed);
        }
        self.prune_closed();
        let result = self.state.sender.send(payload).await;
        self.prune_closed();
        result
    }

    fn prune_closed(&self) {
        let dropped = self.state.sender.registry().remove_closed();
        if dropped > 0 {
            debug!(dropped, "removed departed connections from broadcast set");
        }
    }

    /// Number of connections in the broadcast set.
    pub fn connection_count(&self) -> usize {
        self.state.sender.connection_count()
    }

    /// Receivers of currently listening connections.
    pub fn receivers(&self) -> &ReceiversHolder {
        &self.state.receivers
    }

    /// Stop serving, close every connection and receiver. Idempotent.
    #[instrument(skip_all, fields(url = %self.state.url))]
    pub async fn close(&self) {
        if self.state.cancel.is_closed() {
            debug!("server already closed");
            return;
        }
        self.state.cancel.close();
        self.state.sender.close().await;
        self.state.receivers.close_all();

        let handler = self.state.handler.read().clone();
        if let Some(handler) = handler {
            if let Err(e) = handler.close().await {
                warn!(error = %e, "payload handler close failed");
            }
        }
        info!("server closed");
    }
}

/// GET /outport: upgrade and hand the socket to a connection task.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let id = new_connection_id();
    debug!(conn_id = %id, "upgrading connection");
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| handle_socket(state, id, socket))
}

async fn handle_socket(state: Arc<ServerState>, id: String, socket: WebSocket) {
    let connection = Arc::new(WsConnection::accepted_with_id(id, socket));
    if state.cancel.is_closed() {
        let _ = connection.close().await;
        return;
    }

    let handler = state.handler.read().clone();
    let Some(handler) = handler else {
        let conn_id = connection.id().to_string();
        state.sender.add_connection(connection);
        if state.cancel.is_closed() {
            // close() may have drained the broadcast set before the add
            let _ = state.sender.registry().close_and_remove(&conn_id).await;
            return;
        }
        info!(%conn_id, "connection joined broadcast set");
        return;
    };

    let receiver = Arc::new(Receiver::new(
        handler,
        state.blocking_ack_on_error,
        state.retry_duration,
    ));
    state.receivers.add(connection.id(), receiver.clone());
    if state.cancel.is_closed() {
        // Raced with close(); it may have drained the holder already
        receiver.close();
    }

    info!(conn_id = %connection.id(), "receiver started");
    let closed = receiver.listen(connection.as_ref()).await;
    let _ = state.receivers.remove(connection.id());
    if connection.is_open() {
        if let Err(e) = connection.close().await {
            debug!(conn_id = %connection.id(), error = %e, "close after listen");
        }
    }
    info!(conn_id = %connection.id(), closed, "receiver stopped");
}
