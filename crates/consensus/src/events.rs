// consensus/src/events.rs

use crate::slashing::SlashReason;
use crate::votes::ConsensusVote;
use chain_core::{Amount, BlockNumber, Timestamp};
use chain_crypto::{Address, Hash};

/// Observer interface for consensus state changes.
///
/// Registered once at engine construction and invoked after the registry
/// lock is released, so implementations may call back into read APIs.
/// Callbacks are fire-and-forget: nothing an observer does rolls back
/// consensus state.
pub trait ConsensusEvents: Send + Sync {
    fn on_slash(&self, _validator: &Address, _reason: SlashReason, _amount: &Amount) {}

    fn on_jail(&self, _validator: &Address, _jailed_until: Timestamp) {}

    fn on_unbond(&self, _delegator: &Address, _validator: &Address, _amount: &Amount) {}

    fn on_proposal_created(&self, _height: BlockNumber, _block_hash: &Hash, _proposer: &Address) {}

    fn on_vote_cast(&self, _vote: &ConsensusVote) {}

    fn on_block_finalized(&self, _height: BlockNumber, _block_hash: &Hash, _proposer: &Address) {}
}

/// Default observer that ignores everything
pub struct NoopEvents;

impl ConsensusEvents for NoopEvents {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        slashes: AtomicUsize,
    }

    impl ConsensusEvents for Counter {
        fn on_slash(&self, _validator: &Address, _reason: SlashReason, _amount: &Amount) {
            self.slashes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_default_methods_are_noops() {
        let counter = Counter {
            slashes: AtomicUsize::new(0),
        };
        counter.on_jail(&Address::zero(), 0);
        counter.on_block_finalized(1, &Hash::zero(), &Address::zero());
        counter.on_slash(&Address::zero(), SlashReason::Downtime, &Amount::zero());
        assert_eq!(counter.slashes.load(Ordering::SeqCst), 1);
    }
}
