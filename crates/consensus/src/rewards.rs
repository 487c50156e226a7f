// consensus/src/rewards.rs

use crate::interfaces::TokenSupply;
use crate::registry::Validator;
use crate::{ConsensusError, ConsensusResult};
use chain_core::Amount;
use chain_crypto::Address;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Commission is a fraction in [0.0, 1.0]; reward math works in basis
/// points so the big-integer arithmetic stays exact
fn commission_bps(commission: f64) -> u32 {
    (commission.clamp(0.0, 1.0) * 10_000.0).round() as u32
}

/// Breakdown of one finalization's reward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub proposer: Address,
    /// Newly minted to the proposer
    pub block_reward: Amount,
    /// Fees collected by the block, already in circulation
    pub fees: Amount,
    pub total_reward: Amount,
    /// Proposer's share after the delegator split (equals `block_reward`
    /// when distribution is disabled)
    pub proposer_cut: Amount,
    pub delegator_cuts: Vec<(Address, Amount)>,
}

/// Mints the block reward on finalization and tracks what was issued.
///
/// Commission-based distribution to delegators is an extension point: when
/// enabled, the delegators' pro-rata share (less the validator's
/// commission) is forwarded to the token supply's `distribute`.
#[derive(Debug, Default)]
pub struct RewardAccountant {
    total_minted: Amount,
    blocks_rewarded: u64,
}

impl RewardAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the split and perform the mint for a finalized block
    pub async fn on_finalize(
        &mut self,
        supply: &dyn TokenSupply,
        proposer: &Validator,
        delegations: &[(Address, Amount)],
        block_reward: &Amount,
        fees: Amount,
        distribute_to_delegators: bool,
    ) -> ConsensusResult<RewardBreakdown> {
        let breakdown = Self::split(proposer, delegations, block_reward, fees, distribute_to_delegators);

        supply
            .mint(&breakdown.proposer, &breakdown.block_reward)
            .await
            .map_err(|e| ConsensusError::MintFailure(e.to_string()))?;

        if distribute_to_delegators && !breakdown.delegator_cuts.is_empty() {
            supply
                .distribute(
                    (breakdown.proposer, breakdown.proposer_cut.clone()),
                    &breakdown.delegator_cuts,
                )
                .await
                .map_err(|e| ConsensusError::MintFailure(e.to_string()))?;
        }

        self.total_minted = self
            .total_minted
            .checked_add(&breakdown.block_reward)
            .unwrap_or_else(|| breakdown.block_reward.clone());
        self.blocks_rewarded += 1;

        Ok(breakdown)
    }

    /// Pure split computation
    fn split(
        proposer: &Validator,
        delegations: &[(Address, Amount)],
        block_reward: &Amount,
        fees: Amount,
        distribute_to_delegators: bool,
    ) -> RewardBreakdown {
        let total_reward = block_reward.checked_add(&fees).unwrap_or_else(|| block_reward.clone());

        if !distribute_to_delegators
            || proposer.delegated_stake.is_zero()
            || proposer.total_stake().is_zero()
        {
            return RewardBreakdown {
                proposer: proposer.address,
                block_reward: block_reward.clone(),
                fees,
                total_reward,
                proposer_cut: block_reward.clone(),
                delegator_cuts: Vec::new(),
            };
        }

        // Delegators share the reward pro rata with the stake they bonded,
        // less the validator's commission on that share
        let total_stake = proposer.total_stake();
        let delegator_pool: BigUint =
            (block_reward.inner() * proposer.delegated_stake.inner()) / total_stake.inner();
        let commission: BigUint = (&delegator_pool * commission_bps(proposer.commission)) / 10_000u32;
        let distributable = &delegator_pool - &commission;

        let mut delegator_cuts = Vec::new();
        let mut distributed = BigUint::zero();
        if !proposer.delegated_stake.is_zero() {
            for (delegator, delegated) in delegations {
                let cut = (&distributable * delegated.inner()) / proposer.delegated_stake.inner();
                if !cut.is_zero() {
                    distributed += &cut;
                    delegator_cuts.push((*delegator, Amount::new(cut)));
                }
            }
        }

        // Rounding dust stays with the proposer
        let proposer_cut = Amount::new(block_reward.inner() - distributed);

        RewardBreakdown {
            proposer: proposer.address,
            block_reward: block_reward.clone(),
            fees,
            total_reward,
            proposer_cut,
            delegator_cuts,
        }
    }

    pub fn total_minted(&self) -> &Amount {
        &self.total_minted
    }

    pub fn blocks_rewarded(&self) -> u64 {
        self.blocks_rewarded
    }
}
