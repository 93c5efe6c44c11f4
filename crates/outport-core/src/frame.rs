//! Wire framing.
//!
//! ```text
//! frame:    [flag u8][counter u64 BE][payload ...]
//! ack:      [counter u64 BE]
//! envelope: [operation u32 BE][length u32 BE][data ...]
//! ```
//!
//! The frame payload is usually an envelope, which lets one connection carry
//! several logical message kinds.

use bytes::{Buf, BufMut};

use crate::errors::FrameError;

/// Flag byte for frames that do not expect an acknowledgment.
pub const FLAG_NO_ACK: u8 = 0x00;
/// Flag byte for frames that expect an acknowledgment.
pub const FLAG_ACK: u8 = 0x01;
/// Flag byte plus counter.
pub const FRAME_HEADER_LEN: usize = 1 + 8;
/// Acknowledgment replies are exactly one counter.
pub const ACK_LEN: usize = 8;
/// Operation tag plus data length.
pub const ENVELOPE_HEADER_LEN: usize = 4 + 4;

/// One decoded unit exchanged on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Whether the sender waits for the counter to be echoed back.
    pub ack_requested: bool,
    /// Sender-assigned sequence number.
    pub counter: u64,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

/// Encode a frame.
pub fn encode_frame(ack_requested: bool, counter: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u8(if ack_requested { FLAG_ACK } else { FLAG_NO_ACK });
    buf.put_u64(counter);
    buf.put_slice(payload);
    buf
}

/// Decode a frame produced by [`encode_frame`].
pub fn decode_frame(mut bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(FrameError::TooShort {
            actual: bytes.len(),
            min: FRAME_HEADER_LEN,
        });
    }
    let ack_requested = match bytes.get_u8() {
        FLAG_ACK => true,
        FLAG_NO_ACK => false,
        other => return Err(FrameError::InvalidFlag(other)),
    };
    let counter = bytes.get_u64();
    Ok(Frame {
        ack_requested,
        counter,
        payload: bytes.to_vec(),
    })
}

/// Encode an acknowledgment reply for `counter`.
pub fn encode_ack(counter: u64) -> Vec<u8> {
    counter.to_be_bytes().to_vec()
}

/// Decode an acknowledgment reply.
pub fn decode_ack(mut bytes: &[u8]) -> Result<u64, FrameError> {
    if bytes.len() != ACK_LEN {
        return Err(FrameError::InvalidAckLength(bytes.len()));
    }
    Ok(bytes.get_u64())
}

/// Application payload tagged with the logical operation it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEnvelope {
    /// Operation tag.
    pub operation: u32,
    /// Marshaled data.
    pub data: Vec<u8>,
}

impl PayloadEnvelope {
    /// Create an envelope.
    pub fn new(operation: u32, data: Vec<u8>) -> Self {
        Self { operation, data }
    }

    /// Serialize as `operation | length | data`.
    ///
    /// Fails when the data does not fit the 32-bit length field.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let len = envelope_len(self.data.len())?;
        let mut buf = Vec::with_capacity(ENVELOPE_HEADER_LEN + self.data.len());
        buf.put_u32(self.operation);
        buf.put_u32(len);
        buf.put_slice(&self.data);
        Ok(buf)
    }

    /// Parse `operation | length | data`.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < ENVELOPE_HEADER_LEN {
            return Err(FrameError::TooShort {
                actual: bytes.len(),
                min: ENVELOPE_HEADER_LEN,
            });
        }
        let operation = bytes.get_u32();
        let declared = bytes.get_u32() as usize;
        if declared != bytes.len() {
            return Err(FrameError::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            operation,
            data: bytes.to_vec(),
        })
    }
}

fn envelope_len(len: usize) -> Result<u32, FrameError> {
    u32::try_from(len).map_err(|_| FrameError::PayloadTooLarge(len))
}
