// consensus/src/params.rs

use crate::{ConsensusError, ConsensusResult};
use chain_core::{Amount, Timestamp};
use serde::{Deserialize, Serialize};

/// Configuration for the consensus core.
///
/// Everything tunable lives here; governance updates arrive through
/// `ParameterUpdate` diffs and take effect at epoch boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Chain identifier folded into the proposer-selection seed
    pub chain_id: u64,
    /// Block time target in seconds
    pub block_time_secs: u64,
    /// Time without quorum before the proposer is marked missing and the
    /// height is re-elected (4 × block time)
    pub proposal_timeout_secs: u64,
    /// Minimum self-stake required to be a validator
    pub min_stake: Amount,
    /// Minimum active validators for block production
    pub min_validators: usize,
    /// Maximum active validators; the active set is truncated to this size
    pub max_validators: usize,
    /// Consecutive missed blocks before jailing
    pub max_missed_blocks: u64,
    /// Slash penalty in basis points of total stake
    pub slashing_bps: u32,
    /// Jail duration in seconds
    pub jail_duration_secs: Timestamp,
    /// Unbonding period in seconds (21 days)
    pub unbonding_period_secs: Timestamp,
    /// Blocks per epoch; set composition changes apply at these boundaries
    pub epoch_blocks: u64,
    /// How far in the past a vote timestamp may lie
    pub vote_past_tolerance_secs: Timestamp,
    /// How far in the future a vote timestamp may lie
    pub vote_future_tolerance_secs: Timestamp,
    /// Heights of votes retained past finalization as equivocation evidence
    pub evidence_window: u64,
    /// Block reward minted to the proposer on finalization
    pub block_reward: Amount,
    /// Enable the commission-based delegator distribution extension
    pub distribute_to_delegators: bool,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            chain_id: 8888,
            block_time_secs: 2,
            proposal_timeout_secs: 8,                   // 4 × block time
            min_stake: Amount::from_tokens(100_000),
            min_validators: 3,
            max_validators: 21,
            max_missed_blocks: 50,
            slashing_bps: 500,                          // 5%
            jail_duration_secs: 24 * 3600,              // 24 hours
            unbonding_period_secs: 21 * 24 * 3600,      // 21 days
            epoch_blocks: 7200,                         // ~4 hours at 2s blocks
            vote_past_tolerance_secs: 600,              // 10 minutes
            vote_future_tolerance_secs: 60,             // 1 minute
            evidence_window: 1000,
            block_reward: Amount::from_tokens(2),
            distribute_to_delegators: false,
        }
    }
}

impl ConsensusParams {
    /// Validate internal consistency; governance rejects updates that fail
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.min_validators == 0 {
            return Err(ConsensusError::InvalidParameter {
                name: "min_validators",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_validators < self.min_validators {
            return Err(ConsensusError::InvalidParameter {
                name: "max_validators",
                reason: format!("must be >= min_validators ({})", self.min_validators),
            });
        }
        if self.slashing_bps > 10_000 {
            return Err(ConsensusError::InvalidParameter {
                name: "slashing_bps",
                reason: "must not exceed 10000".into(),
            });
        }
        if self.block_time_secs == 0 || self.proposal_timeout_secs == 0 {
            return Err(ConsensusError::InvalidParameter {
                name: "block_time_secs",
                reason: "timing parameters must be positive".into(),
            });
        }
        if self.epoch_blocks == 0 {
            return Err(ConsensusError::InvalidParameter {
                name: "epoch_blocks",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Interval between quorum re-checks while collecting votes
    pub fn quorum_poll_secs(&self) -> u64 {
        (self.proposal_timeout_secs / 4).max(1)
    }
}
