// chain-core/src/block.rs

use crate::types::{BlockNumber, Timestamp};
use chain_crypto::{Address, Hash};
use serde::{Deserialize, Serialize};

/// The view of a block the consensus core operates on.
///
/// Contents, state roots and transactions live in the execution layer; the
/// core only agrees on this reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block hash as computed by the execution layer
    pub hash: Hash,
    /// Block height
    pub height: BlockNumber,
    /// Validator that proposed the block
    pub proposer: Address,
    /// Block timestamp (unix seconds)
    pub timestamp: Timestamp,
}

impl BlockRef {
    pub fn new(hash: Hash, height: BlockNumber, proposer: Address, timestamp: Timestamp) -> Self {
        Self {
            hash,
            height,
            proposer,
            timestamp,
        }
    }

    /// Byte form fed to the proposer's signer
    pub fn signing_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap()
    }
}
