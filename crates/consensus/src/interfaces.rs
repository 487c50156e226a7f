// consensus/src/interfaces.rs

use async_trait::async_trait;
use chain_core::{Amount, BlockNumber, BlockRef, Timestamp};
use chain_crypto::Address;

use crate::votes::ConsensusVote;

/// Token-supply side effects the core triggers on finalization.
///
/// Mint and distribution failures bubble up unchanged; the engine converts
/// them into `MintFailure` and aborts the height.
#[async_trait]
pub trait TokenSupply: Send + Sync {
    async fn mint(&self, recipient: &Address, amount: &Amount) -> anyhow::Result<()>;

    /// Commission-based distribution extension; only invoked when enabled
    async fn distribute(
        &self,
        proposer_cut: (Address, Amount),
        delegator_cuts: &[(Address, Amount)],
    ) -> anyhow::Result<()> {
        let _ = (proposer_cut, delegator_cuts);
        Ok(())
    }
}

/// The execution engine, seen from consensus
#[async_trait]
pub trait ExecutionLayer: Send + Sync {
    /// Assemble the block for a height and return its reference; contents
    /// stay on the execution side
    async fn build_block(
        &self,
        height: BlockNumber,
        proposer: &Address,
    ) -> anyhow::Result<BlockRef>;

    /// Attach the proposer's signature to a built block before it is
    /// gossiped with the block body
    async fn seal_block(
        &self,
        block: &BlockRef,
        signature: &chain_crypto::Signature,
    ) -> anyhow::Result<()>;

    /// Validate a proposed block; an error means the proposal is invalid
    async fn validate_block(&self, block: &BlockRef) -> anyhow::Result<()>;

    /// Transaction fees collected in a block (already in circulation)
    async fn block_fees(&self, block: &BlockRef) -> anyhow::Result<Amount>;

    /// Height of the execution layer's chain head
    async fn current_height(&self) -> anyhow::Result<BlockNumber>;
}

/// Outbound vote gossip; inbound votes arrive on the engine's channel
#[async_trait]
pub trait VoteTransport: Send + Sync {
    async fn broadcast_vote(&self, vote: &ConsensusVote) -> anyhow::Result<()>;
}

/// Time source: monotonic instants for deadlines, wall clock for vote
/// timestamps and jail windows
pub trait Clock: Send + Sync {
    fn now(&self) -> std::time::Instant;

    fn unix_time(&self) -> Timestamp;
}

/// Clock backed by the operating system
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn unix_time(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as Timestamp)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock() {
        let clock = SystemClock;
        let ts = clock.unix_time();
        // Not in 1970
        assert!(ts > 1_000_000_000);
    }
}
