//! Payload marshaling seam.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::DriverError;

/// Turns operation arguments into payload bytes and back.
pub trait PayloadMarshaler: Send + Sync {
    /// Name announced to consumers in [`OutportConfig`](crate::types::OutportConfig).
    fn name(&self) -> &'static str;

    /// Encode `value`.
    fn marshal<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, String>;

    /// Decode `bytes`.
    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DriverError>;
}

/// `serde_json` marshaler.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMarshaler;

impl PayloadMarshaler for JsonMarshaler {
    fn name(&self) -> &'static str {
        "json"
    }

    fn marshal<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, String> {
        serde_json::to_vec(value).map_err(|e| e.to_string())
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DriverError> {
        serde_json::from_slice(bytes).map_err(|e| DriverError::Unmarshal(e.to_string()))
    }
}
