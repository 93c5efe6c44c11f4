//! Read loop that decodes frames, hands payloads off, and acknowledges.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use outport_core::CancellationSignal;
use outport_core::frame::{decode_frame, encode_ack};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::connection::Connection;

/// Consumer of decoded payloads.
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    /// Process one payload. `counter` is the sender's frame counter.
    async fn process_payload(&self, payload: &[u8], counter: u64) -> anyhow::Result<()>;

    /// Release handler resources. Called once when the owning role closes.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handler that discards every payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPayloadHandler;

#[async_trait]
impl PayloadHandler for NoopPayloadHandler {
    async fn process_payload(&self, _payload: &[u8], _counter: u64) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Lifecycle of a [`Receiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Not listening yet.
    Idle,
    /// Inside [`Receiver::listen`].
    Listening,
    /// The last listen ended because the connection closed.
    Closed,
    /// The last listen ended because the receiver was cancelled.
    Cancelled,
}

enum Step {
    Continue,
    Closed,
    Cancelled,
}

/// Reads frames from a connection until it closes or the receiver is cancelled.
pub struct Receiver {
    handler: Arc<dyn PayloadHandler>,
    blocking_ack_on_error: bool,
    retry_duration: Duration,
    cancel: CancellationSignal,
    state: Mutex<ReceiverState>,
}

impl Receiver {
    /// Create a receiver.
    ///
    /// With `blocking_ack_on_error`, a handler failure withholds the
    /// acknowledgment so an acknowledging sender keeps waiting.
    pub fn new(
        handler: Arc<dyn PayloadHandler>,
        blocking_ack_on_error: bool,
        retry_duration: Duration,
    ) -> Self {
        Self {
            handler,
            blocking_ack_on_error,
            retry_duration,
            cancel: CancellationSignal::new(),
            state: Mutex::new(ReceiverState::Idle),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReceiverState {
        *self.state.lock()
    }

    /// Read and process frames from `connection`.
    ///
    /// Returns `true` when the connection closed and `false` when the
    /// receiver was cancelled.
    #[instrument(skip_all, fields(conn_id = %connection.id()))]
    pub async fn listen(&self, connection: &dyn Connection) -> bool {
        *self.state.lock() = ReceiverState::Listening;
        let cancel = self.cancel.wait();

        let closed = loop {
            let read = tokio::select! {
                () = cancel.cancelled() => break false,
                read = connection.read() => read,
            };

            let step = match read {
                Ok(bytes) => self.handle_message(connection, &bytes, &cancel).await,
                Err(e) if e.is_closed() => {
                    info!(error = %e, "connection closed");
                    Step::Closed
                }
                Err(e) => {
                    warn!(error = %e, "read failed, retrying");
                    if self.pause(&cancel).await {
                        Step::Continue
                    } else {
                        Step::Cancelled
                    }
                }
            };

            match step {
                Step::Continue => {}
                Step::Closed => break true,
                Step::Cancelled => break false,
            }
        };

        *self.state.lock() = if closed {
            ReceiverState::Closed
        } else {
            debug!("receiver cancelled");
            ReceiverState::Cancelled
        };
        closed
    }

    async fn handle_message(
        &self,
        connection: &dyn Connection,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Step {
        if bytes.is_empty() {
            debug!("empty message, skipping");
            return Step::Continue;
        }

        let frame = match decode_frame(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "dropping malformed frame");
                return Step::Continue;
            }
        };

        let result = self
            .handler
            .process_payload(&frame.payload, frame.counter)
            .await;
        if let Err(e) = &result {
            error!(counter = frame.counter, error = %e, "payload handler failed");
        }

        if !frame.ack_requested {
            return Step::Continue;
        }
        if result.is_err() && self.blocking_ack_on_error {
            warn!(counter = frame.counter, "withholding acknowledgment after handler failure");
            return Step::Continue;
        }
        self.acknowledge(connection, frame.counter, cancel).await
    }

    async fn acknowledge(
        &self,
        connection: &dyn Connection,
        counter: u64,
        cancel: &CancellationToken,
    ) -> Step {
        let ack = encode_ack(counter);
        loop {
            match connection.write(&ack).await {
                Ok(()) => {
                    debug!(counter, "ack sent");
                    return Step::Continue;
                }
                Err(e) if e.is_closed() => {
                    info!(counter, error = %e, "connection closed while acknowledging");
                    return Step::Closed;
                }
                Err(e) => {
                    warn!(counter, error = %e, "ack write failed, retrying");
                    if !self.pause(cancel).await {
                        return Step::Cancelled;
                    }
                }
            }
        }
    }

    /// Sleep one retry interval. `false` if cancelled first.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(self.retry_duration) => true,
        }
    }

    /// Stop the read loop. Idempotent.
    pub fn close(&self) {
        self.cancel.close();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_closed()
    }
}
