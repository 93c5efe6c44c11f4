//! Receivers tracked by the server, one per accepted connection.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::receiver::Receiver;

/// Concurrency-safe map of connection id to [`Receiver`].
#[derive(Default)]
pub struct ReceiversHolder {
    receivers: RwLock<HashMap<String, Arc<Receiver>>>,
}

impl ReceiversHolder {
    /// Create an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `receiver` under `id`.
    pub fn add(&self, id: &str, receiver: Arc<Receiver>) {
        let _ = self.receivers.write().insert(id.to_string(), receiver);
        debug!(conn_id = %id, "receiver tracked");
    }

    /// Stop tracking `id`.
    pub fn remove(&self, id: &str) -> Option<Arc<Receiver>> {
        let removed = self.receivers.write().remove(id);
        if removed.is_some() {
            debug!(conn_id = %id, "receiver untracked");
        }
        removed
    }

    /// Receiver tracked under `id`.
    pub fn get(&self, id: &str) -> Option<Arc<Receiver>> {
        self.receivers.read().get(id).cloned()
    }

    /// Ids of tracked receivers.
    pub fn ids(&self) -> Vec<String> {
        self.receivers.read().keys().cloned().collect()
    }

    /// Number of tracked receivers.
    pub fn len(&self) -> usize {
        self.receivers.read().len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.receivers.read().is_empty()
    }

    /// Close every tracked receiver and forget it.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.receivers.write().drain().collect();
        for (id, receiver) in drained {
            receiver.close();
            debug!(conn_id = %id, "receiver closed");
        }
    }
}
