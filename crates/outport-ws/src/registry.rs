//! Live connection registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::errors::RegistryError;

/// Concurrency-safe set of live connections keyed by connection id.
///
/// This is the single source of truth for which connections exist. Removal
/// always goes through [`close_and_remove`](Self::close_and_remove), which
/// unregisters and closes in one step.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any entry with the same id.
    pub fn add(&self, connection: Arc<dyn Connection>) {
        let id = connection.id().to_string();
        let previous = self.connections.write().insert(id.clone(), connection);
        debug!(conn_id = %id, replaced = previous.is_some(), "connection registered");
    }

    /// Snapshot of every registered connection.
    pub fn get_all(&self) -> Vec<Arc<dyn Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Unregister `id` and close its connection.
    pub async fn close_and_remove(&self, id: &str) -> Result<(), RegistryError> {
        let connection = self
            .connections
            .write()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        debug!(conn_id = %id, "connection removed");
        connection.close().await?;
        Ok(())
    }

    /// Unregister connections that are no longer open. Returns how many
    /// were dropped.
    pub fn remove_closed(&self) -> usize {
        let mut connections = self.connections.write();
        let before = connections.len();
        connections.retain(|id, connection| {
            let open = connection.is_open();
            if !open {
                debug!(conn_id = %id, "dropping closed connection");
            }
            open
        });
        before - connections.len()
    }

    /// Close and remove every registered connection. Errors are logged.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.connections.read().keys().cloned().collect();
        for id in ids {
            match self.close_and_remove(&id).await {
                Ok(()) | Err(RegistryError::NotFound(_)) => {}
                Err(e) => warn!(conn_id = %id, error = %e, "failed to close connection"),
            }
        }
    }
}
