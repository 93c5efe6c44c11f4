//! Framed fan-out with optional acknowledgment.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use outport_core::CancellationSignal;
use outport_core::frame::{decode_ack, encode_frame};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::connection::Connection;
use crate::errors::{ConnectionError, RegistryError, SendError};
use crate::registry::ConnectionRegistry;

/// How a single connection's ack wait ended.
enum AckOutcome {
    Acknowledged,
    Cancelled,
    Failed(ConnectionError),
}

/// Frames payloads and writes them to every registered connection.
///
/// With acknowledgment enabled, [`send`](Self::send) waits per connection
/// until the frame counter is echoed back, the connection fails, or the
/// sender is closed.
pub struct Sender {
    counter: AtomicU64,
    with_acknowledge: bool,
    registry: ConnectionRegistry,
    cancel: CancellationSignal,
    /// Serializes sends so concurrent callers never read each other's acks.
    send_lock: Mutex<()>,
}

impl Sender {
    /// Create a sender with an empty registry.
    pub fn new(with_acknowledge: bool) -> Self {
        Self {
            counter: AtomicU64::new(0),
            with_acknowledge,
            registry: ConnectionRegistry::new(),
            cancel: CancellationSignal::new(),
            send_lock: Mutex::new(()),
        }
    }

    /// Register a connection for fan-out.
    pub fn add_connection(&self, connection: Arc<dyn Connection>) {
        self.registry.add(connection);
    }

    /// The registry backing this sender.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Last counter assigned (0 before the first send).
    pub fn last_counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Whether frames request an acknowledgment.
    pub fn with_acknowledge(&self) -> bool {
        self.with_acknowledge
    }

    /// Send `payload` to every registered connection.
    ///
    /// Succeeds when at least one connection accepted the write and, with
    /// acknowledgment on, either acknowledged it or was still waiting when
    /// the sender closed. Failed writes are logged and left registered. A
    /// connection whose ack read fails is closed, removed, and reported in
    /// [`SendError::AllWritesFailed`] when no other connection delivered.
    #[instrument(skip_all, fields(counter = tracing::field::Empty))]
    pub async fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        if self.registry.is_empty() {
            return Err(SendError::NoConnections);
        }
        if payload.is_empty() {
            return Err(SendError::EmptyPayload);
        }

        let _guard = self.send_lock.lock().await;
        let connections = self.registry.get_all();
        if connections.is_empty() {
            return Err(SendError::NoConnections);
        }

        let counter = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = tracing::Span::current().record("counter", counter);
        let frame = encode_frame(self.with_acknowledge, counter, payload);

        let mut written = Vec::with_capacity(connections.len());
        let mut failures = Vec::new();
        for connection in connections {
            match connection.write(&frame).await {
                Ok(()) => written.push(connection),
                Err(e) => {
                    warn!(conn_id = %connection.id(), error = %e, "failed to write frame");
                    failures.push((connection.id().to_string(), e));
                }
            }
        }

        if written.is_empty() {
            return Err(SendError::AllWritesFailed(failures));
        }
        debug!(
            recipients = written.len(),
            failed = failures.len(),
            bytes = frame.len(),
            "frame written"
        );

        if !self.with_acknowledge {
            return Ok(());
        }

        let waits = written
            .iter()
            .map(|connection| self.wait_for_ack(connection.as_ref(), counter));
        let outcomes = join_all(waits).await;

        let mut delivered = false;
        for (connection, outcome) in written.iter().zip(outcomes) {
            match outcome {
                AckOutcome::Acknowledged | AckOutcome::Cancelled => delivered = true,
                AckOutcome::Failed(e) => failures.push((connection.id().to_string(), e)),
            }
        }
        if delivered {
            Ok(())
        } else {
            Err(SendError::AllWritesFailed(failures))
        }
    }

    async fn wait_for_ack(&self, connection: &dyn Connection, counter: u64) -> AckOutcome {
        let conn_id = connection.id();
        let cancel = self.cancel.wait();
        loop {
            let reply = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(conn_id, counter, "ack wait cancelled");
                    return AckOutcome::Cancelled;
                }
                reply = connection.read() => reply,
            };

            match reply {
                Ok(bytes) => match decode_ack(&bytes) {
                    Ok(received) if received == counter => {
                        debug!(conn_id, counter, "ack received");
                        return AckOutcome::Acknowledged;
                    }
                    Ok(received) => {
                        warn!(
                            conn_id,
                            expected = counter,
                            received,
                            "unexpected ack counter, still waiting"
                        );
                    }
                    Err(e) => warn!(conn_id, error = %e, "invalid ack, still waiting"),
                },
                Err(e) => {
                    warn!(conn_id, error = %e, "ack read failed, dropping connection");
                    match self.registry.close_and_remove(conn_id).await {
                        Ok(()) | Err(RegistryError::NotFound(_)) => {}
                        Err(close) => debug!(conn_id, error = %close, "close after read failure"),
                    }
                    return AckOutcome::Failed(e);
                }
            }
        }
    }

    /// Stop pending ack waits and close every registered connection.
    pub async fn close(&self) {
        self.cancel.close();
        self.registry.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::mock_pair;
    use assert_matches::assert_matches;
    use outport_core::frame::{decode_frame, encode_ack};
    use std::time::Duration;

    #[tokio::test]
    async fn no_connections_is_error() {
        let sender = Sender::new(true);
        assert_matches!(sender.send(b"data").await, Err(SendError::NoConnections));
        assert_eq!(sender.last_counter(), 0);
    }

    #[tokio::test]
    async fn empty_payload_is_error() {
        let sender = Sender::new(false);
        let (conn, _peer) = mock_pair("c1");
        sender.add_connection(conn.clone());
        assert_matches!(sender.send(b"").await, Err(SendError::EmptyPayload));
        assert_eq!(conn.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn counters_start_at_one_and_increase() {
        let sender = Sender::new(false);
        let (conn, mut peer) = mock_pair("c1");
        sender.add_connection(conn);

        sender.send(b"a").await.unwrap();
        sender.send(b"b").await.unwrap();

        let first = decode_frame(&peer.outbound.recv().await.unwrap()).unwrap();
        let second = decode_frame(&peer.outbound.recv().await.unwrap()).unwrap();
        assert!(!first.ack_requested);
        assert_eq!((first.counter, first.payload.as_slice()), (1, &b"a"[..]));
        assert_eq!((second.counter, second.payload.as_slice()), (2, &b"b"[..]));
    }

    #[tokio::test]
    async fn counters_are_per_instance() {
        let s1 = Sender::new(false);
        let s2 = Sender::new(false);
        let (c1, _p1) = mock_pair("c1");
        let (c2, _p2) = mock_pair("c2");
        s1.add_connection(c1);
        s2.add_connection(c2);
        s1.send(b"x").await.unwrap();
        s1.send(b"x").await.unwrap();
        s2.send(b"x").await.unwrap();
        assert_eq!(s1.last_counter(), 2);
        assert_eq!(s2.last_counter(), 1);
    }

    #[tokio::test]
    async fn fan_out_uses_same_counter() {
        let sender = Sender::new(false);
        let (c1, mut p1) = mock_pair("c1");
        let (c2, mut p2) = mock_pair("c2");
        sender.add_connection(c1);
        sender.add_connection(c2);
        sender.send(b"block").await.unwrap();
        let f1 = decode_frame(&p1.outbound.recv().await.unwrap()).unwrap();
        let f2 = decode_frame(&p2.outbound.recv().await.unwrap()).unwrap();
        assert_eq!(f1, f2);
    }

    #[tokio::test]
    async fn ack_send_returns_only_after_reply() {
        let sender = Arc::new(Sender::new(true));
        let (conn, mut peer) = mock_pair("c1");
        sender.add_connection(conn);

        let s = sender.clone();
        let handle = tokio::spawn(async move { s.send(b"payload").await });

        let frame = decode_frame(&peer.outbound.recv().await.unwrap()).unwrap();
        assert!(frame.ack_requested);
        assert_eq!(frame.counter, 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        peer.inbound.send(Ok(encode_ack(frame.counter))).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn mismatched_ack_waits_until_cancelled() {
        let sender = Arc::new(Sender::new(true));
        let (conn, peer) = mock_pair("c1");
        sender.add_connection(conn);
        let _acker = peer.spawn_acker(|c| c + 100);

        let s = sender.clone();
        let handle = tokio::spawn(async move { s.send(b"payload").await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        sender.close().await;
        let res = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn matching_ack_after_mismatch_succeeds() {
        let sender = Arc::new(Sender::new(true));
        let (conn, mut peer) = mock_pair("c1");
        sender.add_connection(conn);

        let s = sender.clone();
        let handle = tokio::spawn(async move { s.send(b"payload").await });
        let frame = decode_frame(&peer.outbound.recv().await.unwrap()).unwrap();

        peer.inbound.send(Ok(encode_ack(frame.counter + 7))).unwrap();
        peer.inbound.send(Ok(vec![1, 2, 3])).unwrap();
        peer.inbound.send(Ok(encode_ack(frame.counter))).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn partial_write_failure_still_succeeds() {
        let sender = Sender::new(false);
        let (good, _pg) = mock_pair("good");
        let (bad, _pb) = mock_pair("bad");
        bad.fail_writes.store(true, Ordering::SeqCst);
        sender.add_connection(good.clone());
        sender.add_connection(bad);

        sender.send(b"x").await.unwrap();
        assert_eq!(good.writes.load(Ordering::SeqCst), 1);
        // Write failures do not unregister
        assert_eq!(sender.connection_count(), 2);
    }

    #[tokio::test]
    async fn all_writes_failed_aggregates() {
        let sender = Sender::new(true);
        let (c1, _p1) = mock_pair("c1");
        let (c2, _p2) = mock_pair("c2");
        c1.fail_writes.store(true, Ordering::SeqCst);
        c2.fail_writes.store(true, Ordering::SeqCst);
        sender.add_connection(c1);
        sender.add_connection(c2);

        let err = sender.send(b"x").await.unwrap_err();
        assert_matches!(&err, SendError::AllWritesFailed(failures) if failures.len() == 2);
        assert!(!err.is_connection_closed());
        assert_eq!(sender.connection_count(), 2);
    }

    #[tokio::test]
    async fn ack_read_failure_removes_connection() {
        let sender = Arc::new(Sender::new(true));
        let (conn, mut peer) = mock_pair("c1");
        sender.add_connection(conn.clone());

        let s = sender.clone();
        let handle = tokio::spawn(async move { s.send(b"x").await });
        let _ = peer.outbound.recv().await.unwrap();
        peer.inbound.send(Err(ConnectionError::ClosedByPeer)).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert_matches!(
            &err,
            SendError::AllWritesFailed(failures)
                if failures.len() == 1 && failures[0].0 == "c1"
        );
        assert!(err.is_connection_closed());
        assert_eq!(sender.connection_count(), 0);
        assert_eq!(conn.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ack_read_failure_on_one_connection_still_delivers() {
        let sender = Arc::new(Sender::new(true));
        let (good, good_peer) = mock_pair("good");
        let (lost, mut lost_peer) = mock_pair("lost");
        sender.add_connection(good);
        sender.add_connection(lost);
        let _acker = good_peer.spawn_acker(|c| c);

        let s = sender.clone();
        let handle = tokio::spawn(async move { s.send(b"x").await });
        let _ = lost_peer.outbound.recv().await.unwrap();
        lost_peer.inbound.send(Err(ConnectionError::ClosedByPeer)).unwrap();

        handle.await.unwrap().unwrap();
        assert_eq!(sender.connection_count(), 1);
        assert!(sender.registry().contains("good"));
    }

    #[tokio::test]
    async fn concurrent_sends_are_serialized() {
        let sender = Arc::new(Sender::new(true));
        let (conn, peer) = mock_pair("c1");
        sender.add_connection(conn);
        let _acker = peer.spawn_acker(|c| c);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let s = sender.clone();
                tokio::spawn(async move { s.send(b"x").await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(sender.last_counter(), 4);
    }

    #[tokio::test]
    async fn close_closes_connections() {
        let sender = Sender::new(false);
        let (conn, _peer) = mock_pair("c1");
        sender.add_connection(conn.clone());
        sender.close().await;
        assert_eq!(sender.connection_count(), 0);
        assert!(!conn.is_open());
        // Idempotent
        sender.close().await;
    }
}
