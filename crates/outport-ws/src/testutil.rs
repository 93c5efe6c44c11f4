//! In-memory [`Connection`] used by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use outport_core::frame::{decode_frame, encode_ack};
use tokio::sync::{Mutex, mpsc};

use crate::connection::Connection;
use crate::errors::ConnectionError;

/// Channel-backed connection. The test drives the other end via [`MockPeer`].
pub(crate) struct MockConnection {
    id: String,
    open: AtomicBool,
    inbound: Mutex<mpsc::UnboundedReceiver<Result<Vec<u8>, ConnectionError>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pub fail_writes: AtomicBool,
    pub writes: AtomicUsize,
    pub close_calls: AtomicUsize,
}

/// Test side of a [`MockConnection`].
pub(crate) struct MockPeer {
    /// Messages (or errors) the connection will read.
    pub inbound: mpsc::UnboundedSender<Result<Vec<u8>, ConnectionError>>,
    /// Messages the connection wrote.
    pub outbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

pub(crate) fn mock_pair(id: &str) -> (Arc<MockConnection>, MockPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let conn = MockConnection {
        id: id.to_string(),
        open: AtomicBool::new(true),
        inbound: Mutex::new(in_rx),
        outbound: out_tx,
        fail_writes: AtomicBool::new(false),
        writes: AtomicUsize::new(0),
        close_calls: AtomicUsize::new(0),
    };
    (
        Arc::new(conn),
        MockPeer {
            inbound: in_tx,
            outbound: out_rx,
        },
    )
}

impl MockPeer {
    /// Answer every written frame with `reply(counter)` as its acknowledgment.
    pub fn spawn_acker(mut self, reply: fn(u64) -> u64) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(bytes) = self.outbound.recv().await {
                if let Ok(frame) = decode_frame(&bytes) {
                    if self.inbound.send(Ok(encode_ack(reply(frame.counter)))).is_err() {
                        return;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn open(&self, _address: &str) -> Result<(), ConnectionError> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::AlreadyOpen);
        }
        Ok(())
    }

    async fn read(&self) -> Result<Vec<u8>, ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::NotOpen);
        }
        match self.inbound.lock().await.recv().await {
            Some(res) => res,
            None => Err(ConnectionError::ClosedByPeer),
        }
    }

    async fn write(&self, data: &[u8]) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::NotOpen);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport("write refused".into()));
        }
        let _ = self.writes.fetch_add(1, Ordering::SeqCst);
        self.outbound
            .send(data.to_vec())
            .map_err(|_| ConnectionError::ClosedByPeer)
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.open.swap(false, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectionError::NotOpen)
        }
    }
}
