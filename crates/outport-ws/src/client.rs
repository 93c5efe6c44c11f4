//! Client role: dials the configured endpoint and reconnects on loss.

use std::sync::Arc;
use std::time::Duration;

use outport_core::{CancellationSignal, ConfigError, WebSocketConfig};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::connection::{Connection, WsConnection};
use crate::errors::{RegistryError, SendError};
use crate::receiver::{NoopPayloadHandler, PayloadHandler, Receiver};
use crate::sender::Sender;

/// Single-connection client.
///
/// [`send`](Self::send) and [`listen`](Self::listen) lazily dial the
/// configured url, retrying every `retry_duration` until the dial succeeds
/// or the client is closed. A connection lost mid-operation is replaced
/// transparently.
pub struct WsClient {
    url: String,
    retry_duration: Duration,
    sender: Sender,
    receiver: Receiver,
    handler: Arc<dyn PayloadHandler>,
    connection: Mutex<Option<Arc<WsConnection>>>,
    cancel: CancellationSignal,
}

impl WsClient {
    /// Client that only sends; inbound payloads are discarded.
    pub fn new(config: &WebSocketConfig) -> Result<Self, ConfigError> {
        Self::with_payload_handler(config, Arc::new(NoopPayloadHandler))
    }

    /// Client whose [`listen`](Self::listen) feeds `handler`.
    pub fn with_payload_handler(
        config: &WebSocketConfig,
        handler: Arc<dyn PayloadHandler>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            url: config.url.clone(),
            retry_duration: config.retry_duration(),
            sender: Sender::new(config.with_acknowledge),
            receiver: Receiver::new(
                handler.clone(),
                config.blocking_ack_on_error,
                config.retry_duration(),
            ),
            handler,
            connection: Mutex::new(None),
            cancel: CancellationSignal::new(),
        })
    }

    /// Endpoint this client dials.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.is_open())
    }

    /// Deliver `payload`, reconnecting as needed.
    ///
    /// Returns `Ok` once the payload was written (and acknowledged, when
    /// acknowledgment is on). A payload already written when
    /// [`close`](Self::close) interrupts the ack wait still counts as sent.
    /// [`SendError::Closed`] means the payload was never written.
    #[instrument(skip_all, fields(url = %self.url, len = payload.len()))]
    pub async fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        if payload.is_empty() {
            return Err(SendError::EmptyPayload);
        }
        let cancel = self.cancel.wait();

        loop {
            if cancel.is_cancelled() {
                return Err(SendError::Closed);
            }
            let connection = self.connection(true).await?;
            match self.sender.send(payload).await {
                Ok(()) => return Ok(()),
                Err(SendError::EmptyPayload) => return Err(SendError::EmptyPayload),
                Err(e) if e.is_connection_closed() => {
                    warn!(error = %e, "connection lost, reconnecting");
                    self.discard(&connection).await;
                }
                Err(e) => {
                    warn!(error = %e, "send failed, retrying");
                    if !pause(self.retry_duration, &cancel).await {
                        return Err(SendError::Closed);
                    }
                }
            }
        }
    }

    /// Read inbound payloads until the client is closed.
    #[instrument(skip_all, fields(url = %self.url))]
    pub async fn listen(&self) {
        loop {
            let Ok(connection) = self.connection(false).await else {
                return;
            };
            let closed = self.receiver.listen(connection.as_ref()).await;
            if !closed || self.cancel.is_closed() {
                debug!("client listen stopped");
                return;
            }
            info!("connection closed, reconnecting");
            self.discard(&connection).await;
        }
    }

    /// Current open connection, dialing a new one when needed.
    async fn connection(&self, register: bool) -> Result<Arc<WsConnection>, SendError> {
        let mut slot = self.connection.lock().await;
        let connection = match slot.as_ref() {
            Some(existing) if existing.is_open() => existing.clone(),
            _ => {
                let fresh = Arc::new(WsConnection::dial());
                self.open_with_retry(fresh.as_ref()).await?;
                *slot = Some(fresh.clone());
                fresh
            }
        };
        if register && !self.sender.registry().contains(connection.id()) {
            self.sender.add_connection(connection.clone());
        }
        Ok(connection)
    }

    async fn open_with_retry(&self, connection: &WsConnection) -> Result<(), SendError> {
        let cancel = self.cancel.wait();
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SendError::Closed);
            }
            attempt += 1;
            match connection.open(&self.url).await {
                Ok(()) => {
                    info!(conn_id = %connection.id(), attempt, "connected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        retry_secs = self.retry_duration.as_secs(),
                        "dial failed, retrying"
                    );
                    if !pause(self.retry_duration, &cancel).await {
                        return Err(SendError::Closed);
                    }
                }
            }
        }
    }

    /// Forget `connection` and close it if it is still open.
    async fn discard(&self, connection: &Arc<WsConnection>) {
        {
            let mut slot = self.connection.lock().await;
            if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, connection)) {
                *slot = None;
            }
        }
        match self.sender.registry().close_and_remove(connection.id()).await {
            Ok(()) => {}
            Err(RegistryError::NotFound(_)) => {
                if connection.is_open() {
                    if let Err(e) = connection.close().await {
                        debug!(
                            conn_id = %connection.id(),
                            error = %e,
                            "close discarded connection"
                        );
                    }
                }
            }
            Err(e) => debug!(conn_id = %connection.id(), error = %e, "close discarded connection"),
        }
    }

    /// Stop every pending operation and close the connection. Idempotent.
    #[instrument(skip_all, fields(url = %self.url))]
    pub async fn close(&self) {
        if self.cancel.is_closed() {
            debug!("client already closed");
            return;
        }
        self.cancel.close();
        self.receiver.close();
        self.sender.close().await;

        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            if connection.is_open() {
                if let Err(e) = connection.close().await {
                    debug!(conn_id = %connection.id(), error = %e, "close connection");
                }
            }
        }
        if let Err(e) = self.handler.close().await {
            warn!(error = %e, "payload handler close failed");
        }
        info!("client closed");
    }
}

/// Sleep for `duration`. `false` if `cancel` fires first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
