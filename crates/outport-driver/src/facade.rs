//! Producer-side façade: typed operations sent as payload envelopes.

use async_trait::async_trait;
use outport_core::PayloadEnvelope;
use outport_ws::{SendError, WsClient, WsServer};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::errors::DriverError;
use crate::marshal::{JsonMarshaler, PayloadMarshaler};
use crate::operation::OperationType;
use crate::types::{
    Accounts, BlockData, FinalizedBlock, OutportBlock, OutportConfig, RoundsInfo,
    ValidatorsPubKeys, ValidatorsRating,
};

/// Transport a façade sends through.
#[async_trait]
pub trait PayloadSender: Send + Sync {
    /// Deliver one payload.
    async fn send(&self, payload: &[u8]) -> Result<(), SendError>;
    /// Shut the transport down. Idempotent.
    async fn close(&self);
}

#[async_trait]
impl PayloadSender for WsClient {
    async fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        WsClient::send(self, payload).await
    }

    async fn close(&self) {
        WsClient::close(self).await;
    }
}

#[async_trait]
impl PayloadSender for WsServer {
    async fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        WsServer::send(self, payload).await
    }

    async fn close(&self) {
        WsServer::close(self).await;
    }
}

/// Maps each operation to an envelope and hands it to the transport.
pub struct DriverFacade<S, M = JsonMarshaler> {
    sender: S,
    marshaler: M,
}

impl<S: PayloadSender> DriverFacade<S> {
    /// Façade using JSON marshaling.
    pub fn new(sender: S) -> Self {
        Self::with_marshaler(sender, JsonMarshaler)
    }
}

impl<S: PayloadSender, M: PayloadMarshaler> DriverFacade<S, M> {
    /// Façade using `marshaler`.
    pub fn with_marshaler(sender: S, marshaler: M) -> Self {
        Self { sender, marshaler }
    }

    /// Underlying transport.
    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Marshal `value` and send it tagged with `operation`.
    #[instrument(skip_all, fields(operation = %operation))]
    pub async fn send_operation<T: Serialize + ?Sized>(
        &self,
        operation: OperationType,
        value: &T,
    ) -> Result<(), DriverError> {
        let data = self
            .marshaler
            .marshal(value)
            .map_err(|message| DriverError::Marshal {
                operation: operation.name(),
                message,
            })?;
        self.send_raw(operation, data).await
    }

    /// Send already-marshaled `data` tagged with `operation`.
    pub async fn send_raw(
        &self,
        operation: OperationType,
        data: Vec<u8>,
    ) -> Result<(), DriverError> {
        let payload = PayloadEnvelope::new(operation.tag(), data).encode()?;
        debug!(%operation, bytes = payload.len(), "sending operation");
        self.sender.send(&payload).await?;
        Ok(())
    }

    /// Index a committed block.
    pub async fn save_block(&self, block: &OutportBlock) -> Result<(), DriverError> {
        self.send_operation(OperationType::SaveBlock, block).await
    }

    /// Undo a previously indexed block.
    pub async fn revert_indexed_block(&self, block: &BlockData) -> Result<(), DriverError> {
        self.send_operation(OperationType::RevertIndexedBlock, block).await
    }

    /// Record consensus round outcomes.
    pub async fn save_rounds_info(&self, rounds: &RoundsInfo) -> Result<(), DriverError> {
        self.send_operation(OperationType::SaveRoundsInfo, rounds).await
    }

    /// Publish the validator key set for an epoch.
    pub async fn save_validators_pub_keys(
        &self,
        keys: &ValidatorsPubKeys,
    ) -> Result<(), DriverError> {
        self.send_operation(OperationType::SaveValidatorsPubKeys, keys).await
    }

    /// Publish validator ratings.
    pub async fn save_validators_rating(
        &self,
        rating: &ValidatorsRating,
    ) -> Result<(), DriverError> {
        self.send_operation(OperationType::SaveValidatorsRating, rating).await
    }

    /// Record altered account state.
    pub async fn save_accounts(&self, accounts: &Accounts) -> Result<(), DriverError> {
        self.send_operation(OperationType::SaveAccounts, accounts).await
    }

    /// Mark a block as final.
    pub async fn finalized_block(&self, block: &FinalizedBlock) -> Result<(), DriverError> {
        self.send_operation(OperationType::FinalizedBlock, block).await
    }

    /// Announce producer settings.
    pub async fn settings(&self, config: &OutportConfig) -> Result<(), DriverError> {
        self.send_operation(OperationType::Settings, config).await
    }

    /// Settings describing this façade's marshaler.
    pub fn current_settings(&self, hashing_type: &str) -> OutportConfig {
        OutportConfig {
            hashing_type: hashing_type.to_string(),
            marshaller_type: self.marshaler.name().to_string(),
        }
    }

    /// Close the transport.
    pub async fn close(&self) {
        self.sender.close().await;
    }
}
