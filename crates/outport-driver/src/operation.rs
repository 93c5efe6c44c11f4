//! Operation tags carried in the payload envelope.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DriverError;

/// Logical kind of an outport payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum OperationType {
    /// A new block with its transactions.
    SaveBlock = 0,
    /// Roll back a previously indexed block.
    RevertIndexedBlock = 1,
    /// Consensus round information.
    SaveRoundsInfo = 2,
    /// Validator public keys per shard for an epoch.
    SaveValidatorsPubKeys = 3,
    /// Validator ratings.
    SaveValidatorsRating = 4,
    /// Accounts altered by a block.
    SaveAccounts = 5,
    /// A block became final.
    FinalizedBlock = 6,
    /// Producer settings announced on connect.
    Settings = 7,
}

impl OperationType {
    /// Every operation, in tag order.
    pub const ALL: [Self; 8] = [
        Self::SaveBlock,
        Self::RevertIndexedBlock,
        Self::SaveRoundsInfo,
        Self::SaveValidatorsPubKeys,
        Self::SaveValidatorsRating,
        Self::SaveAccounts,
        Self::FinalizedBlock,
        Self::Settings,
    ];

    /// Wire tag.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Snake-case name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Self::SaveBlock => "save_block",
            Self::RevertIndexedBlock => "revert_indexed_block",
            Self::SaveRoundsInfo => "save_rounds_info",
            Self::SaveValidatorsPubKeys => "save_validators_pub_keys",
            Self::SaveValidatorsRating => "save_validators_rating",
            Self::SaveAccounts => "save_accounts",
            Self::FinalizedBlock => "finalized_block",
            Self::Settings => "settings",
        }
    }
}

impl TryFrom<u32> for OperationType {
    type Error = DriverError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|op| op.tag() == tag)
            .ok_or(DriverError::UnknownOperation(tag))
    }
}

impl FromStr for OperationType {
    type Err = DriverError;

    /// Accepts either the snake-case name or the numeric tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(tag) = s.parse::<u32>() {
            return Self::try_from(tag);
        }
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.name() == lower)
            .ok_or_else(|| DriverError::UnknownOperationName(s.to_string()))
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
