// consensus/src/governance.rs

use crate::params::ConsensusParams;
use crate::registry::ValidatorRegistry;
use crate::{ConsensusError, ConsensusResult};
use chain_core::{Amount, Timestamp};
use chain_crypto::{Address, PublicKey};
use serde::{Deserialize, Serialize};

/// A validator to add through governance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSpec {
    pub address: Address,
    pub public_key: PublicKey,
    pub self_stake: Amount,
    pub commission: f64,
}

/// Parameter changes carried by a governance diff; `None` leaves a value
/// untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterUpdate {
    pub min_stake: Option<Amount>,
    pub slashing_bps: Option<u32>,
    pub jail_duration_secs: Option<Timestamp>,
    pub unbonding_period_secs: Option<Timestamp>,
    pub proposal_timeout_secs: Option<u64>,
    pub max_missed_blocks: Option<u64>,
}

impl ParameterUpdate {
    pub fn is_empty(&self) -> bool {
        self.min_stake.is_none()
            && self.slashing_bps.is_none()
            && self.jail_duration_secs.is_none()
            && self.unbonding_period_secs.is_none()
            && self.proposal_timeout_secs.is_none()
            && self.max_missed_blocks.is_none()
    }

    fn applied_to(&self, params: &ConsensusParams) -> ConsensusParams {
        let mut next = params.clone();
        if let Some(min_stake) = &self.min_stake {
            next.min_stake = min_stake.clone();
        }
        if let Some(bps) = self.slashing_bps {
            next.slashing_bps = bps;
        }
        if let Some(secs) = self.jail_duration_secs {
            next.jail_duration_secs = secs;
        }
        if let Some(secs) = self.unbonding_period_secs {
            next.unbonding_period_secs = secs;
        }
        if let Some(secs) = self.proposal_timeout_secs {
            next.proposal_timeout_secs = secs;
        }
        if let Some(count) = self.max_missed_blocks {
            next.max_missed_blocks = count;
        }
        next
    }
}

/// Atomic validator-set and parameter diff
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceDiff {
    pub add: Vec<ValidatorSpec>,
    pub remove: Vec<Address>,
    pub update_parameters: ParameterUpdate,
}

/// Queue of accepted diffs, applied at the next epoch boundary.
///
/// Diffs are validated on enqueue so an unacceptable change is rejected at
/// submission time, and re-checked on apply against the state that exists
/// when the boundary is reached.
#[derive(Debug, Default)]
pub struct GovernanceQueue {
    pending: Vec<GovernanceDiff>,
}

impl GovernanceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Validate a diff against current state and queue it
    pub fn enqueue(
        &mut self,
        diff: GovernanceDiff,
        registry: &ValidatorRegistry,
    ) -> ConsensusResult<()> {
        Self::check(&diff, registry)?;
        self.pending.push(diff);
        Ok(())
    }

    fn check(diff: &GovernanceDiff, registry: &ValidatorRegistry) -> ConsensusResult<()> {
        let params = registry.params();
        let next_params = diff.update_parameters.applied_to(params);
        next_params.validate()?;

        for spec in &diff.add {
            if registry.contains(&spec.address) {
                return Err(ConsensusError::AlreadyExists(spec.address));
            }
            if spec.address != spec.public_key.to_address() {
                return Err(ConsensusError::KeyMismatch(spec.address));
            }
            if !(0.0..=1.0).contains(&spec.commission) {
                return Err(ConsensusError::InvalidCommission(spec.commission));
            }
            if spec.self_stake < next_params.min_stake {
                return Err(ConsensusError::InsufficientStake {
                    required: next_params.min_stake.clone(),
                    provided: spec.self_stake.clone(),
                });
            }
        }

        for address in &diff.remove {
            if !registry.contains(address) {
                return Err(ConsensusError::NotFound(*address));
            }
        }

        // The surviving active set plus additions must keep the chain live
        let active = registry.snapshot_active();
        let surviving = active
            .addresses()
            .iter()
            .filter(|a| !diff.remove.contains(a))
            .count();
        let eligible_adds = diff
            .add
            .iter()
            .filter(|s| s.self_stake >= next_params.min_stake)
            .count();
        if surviving + eligible_adds < next_params.min_validators {
            return Err(ConsensusError::WouldBreakLiveness);
        }

        Ok(())
    }

    /// Apply all queued diffs; invoked by the engine at epoch boundaries.
    ///
    /// A diff invalidated by intervening state changes is dropped with a
    /// warning rather than poisoning the rest of the queue. Exit notices
    /// for removed validators are returned so the caller can fire unbond
    /// callbacks outside the lock.
    pub fn apply_pending(
        &mut self,
        registry: &mut ValidatorRegistry,
        now: Timestamp,
    ) -> Vec<crate::registry::UnbondNotice> {
        let mut notices = Vec::new();

        for diff in self.pending.drain(..) {
            if let Err(e) = Self::check(&diff, registry) {
                tracing::warn!("dropping stale governance diff: {}", e);
                continue;
            }

            let next_params = diff.update_parameters.applied_to(registry.params());
            registry.set_params(next_params, now);

            for spec in &diff.add {
                // Validated above; a failure here means a race within the
                // same batch, which check() rules out for distinct addresses
                if let Err(e) = registry.register(
                    spec.address,
                    spec.public_key.clone(),
                    spec.self_stake.clone(),
                    spec.commission,
                    now,
                ) {
                    tracing::warn!("governance add failed for {}: {}", spec.address.to_hex(), e);
                }
            }

            for address in &diff.remove {
                match registry.begin_exit(*address, now) {
                    Ok(notice) => notices.push(notice),
                    Err(e) => {
                        tracing::warn!(
                            "governance remove failed for {}: {}",
                            address.to_hex(),
                            e
                        );
                    }
                }
            }

            tracing::info!(
                "governance diff applied: +{} -{} params_changed={}",
                diff.add.len(),
                diff.remove.len(),
                !diff.update_parameters.is_empty()
            );
        }

        notices
    }
}
