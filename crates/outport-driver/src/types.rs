//! Argument types carried by each operation.
//!
//! These are value carriers: the driver marshals them without inspecting
//! their contents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A block and the data produced while executing it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutportBlock {
    /// Shard that produced the block.
    pub shard_id: u32,
    /// Block nonce.
    pub nonce: u64,
    /// Consensus round.
    pub round: u64,
    /// Hex-encoded header hash.
    pub hash: String,
    /// Hex-encoded hashes of included transactions.
    pub transactions: Vec<String>,
    /// Hex-encoded block header, as produced by the node.
    pub header: String,
}

/// Identity of a block that is being reverted or finalized.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockData {
    /// Shard of the block.
    pub shard_id: u32,
    /// Block nonce.
    pub nonce: u64,
    /// Hex-encoded header hash.
    pub hash: String,
}

/// One consensus round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundInfo {
    /// Round number.
    pub round: u64,
    /// Consensus group indexes of the validators that signed.
    pub signers_indexes: Vec<u64>,
    /// Whether a block was proposed in this round.
    pub block_was_proposed: bool,
    /// Shard of the round.
    pub shard_id: u32,
    /// Epoch containing the round.
    pub epoch: u32,
    /// Round start, in seconds since the Unix epoch.
    pub timestamp: u64,
}

/// Batch of rounds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundsInfo {
    /// Shard reporting the rounds.
    pub shard_id: u32,
    /// Rounds in ascending order.
    pub rounds: Vec<RoundInfo>,
}

/// Validator public keys grouped by shard for one epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorsPubKeys {
    /// Reporting shard.
    pub shard_id: u32,
    /// Epoch the keys apply to.
    pub epoch: u32,
    /// Shard id to hex-encoded public keys.
    pub shard_validators_pub_keys: BTreeMap<u32, Vec<String>>,
}

/// Rating of a single validator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorRatingInfo {
    /// Hex-encoded validator public key.
    pub public_key: String,
    /// Current rating.
    pub rating: f32,
}

/// Validator ratings for one index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorsRating {
    /// Reporting shard.
    pub shard_id: u32,
    /// Index key, usually `<shard>_<epoch>`.
    pub index_id: String,
    /// One entry per validator.
    pub infos: Vec<ValidatorRatingInfo>,
}

/// Account state after a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlteredAccount {
    /// Bech32 account address.
    pub address: String,
    /// Decimal balance; kept as a string to avoid precision loss.
    pub balance: String,
    /// Account nonce.
    pub nonce: u64,
}

/// Accounts altered by a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Accounts {
    /// Reporting shard.
    pub shard_id: u32,
    /// Timestamp of the block that altered the accounts.
    pub block_timestamp: u64,
    /// Address to account.
    pub altered_accounts: BTreeMap<String, AlteredAccount>,
}

/// Block finalization notice.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizedBlock {
    /// Reporting shard.
    pub shard_id: u32,
    /// Hex-encoded header hash of the final block.
    pub header_hash: String,
}

/// Producer settings sent to consumers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutportConfig {
    /// Hashing algorithm used for `hash` fields.
    pub hashing_type: String,
    /// Marshaler used for payload data.
    pub marshaller_type: String,
}
