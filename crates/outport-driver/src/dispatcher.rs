//! Consumer-side routing of envelopes to per-operation handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use outport_core::PayloadEnvelope;
use outport_ws::PayloadHandler;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::errors::DriverError;
use crate::operation::OperationType;

/// Handles the data of one or more operations.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Process `data`, the marshaled argument of `operation`.
    async fn handle(&self, operation: OperationType, data: &[u8]) -> anyhow::Result<()>;
}

/// [`PayloadHandler`] that decodes the envelope and dispatches by tag.
///
/// Unknown tags are errors. Known operations without a registered handler
/// are skipped.
#[derive(Default)]
pub struct OperationDispatcher {
    handlers: RwLock<HashMap<OperationType, Arc<dyn OperationHandler>>>,
}

impl OperationDispatcher {
    /// Dispatcher with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `operation` to `handler`, replacing any previous one.
    pub fn register(&self, operation: OperationType, handler: Arc<dyn OperationHandler>) {
        let _ = self.handlers.write().insert(operation, handler);
    }

    /// Route every operation to `handler`.
    pub fn register_all(&self, handler: &Arc<dyn OperationHandler>) {
        let mut handlers = self.handlers.write();
        for operation in OperationType::ALL {
            let _ = handlers.insert(operation, handler.clone());
        }
    }

    /// Whether `operation` has a handler.
    pub fn handles(&self, operation: OperationType) -> bool {
        self.handlers.read().contains_key(&operation)
    }
}

#[async_trait]
impl PayloadHandler for OperationDispatcher {
    #[instrument(skip(self, payload))]
    async fn process_payload(&self, payload: &[u8], counter: u64) -> anyhow::Result<()> {
        let envelope = PayloadEnvelope::decode(payload).map_err(DriverError::from)?;
        let operation = OperationType::try_from(envelope.operation)?;

        let handler = self.handlers.read().get(&operation).cloned();
        let Some(handler) = handler else {
            debug!(%operation, "no handler registered, skipping");
            return Ok(());
        };
        handler.handle(operation, &envelope.data).await
    }
}
