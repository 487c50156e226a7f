// consensus/src/slashing.rs

use crate::registry::ValidatorRegistry;
use crate::ConsensusResult;
use chain_core::{Amount, Timestamp};
use chain_crypto::{Address, Hash};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reasons a validator can be slashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlashReason {
    /// Two conflicting well-formed votes at the same height
    Equivocation,
    /// Proposed a block the execution layer rejected
    InvalidProposal,
    /// Missed-block counter crossed the jail threshold
    Downtime,
}

impl SlashReason {
    /// Structured reason code passed to the `on_slash` callback
    pub fn as_str(&self) -> &'static str {
        match self {
            SlashReason::Equivocation => "equivocation",
            SlashReason::InvalidProposal => "invalid_proposal",
            SlashReason::Downtime => "downtime",
        }
    }
}

/// A recorded slashing event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashEvent {
    pub validator: Address,
    pub reason: SlashReason,
    pub amount: Amount,
    pub timestamp: Timestamp,
    /// 1 for the first offense, counting up
    pub offense_number: u32,
    /// Hash of the evidence that triggered the slash, when applicable
    pub evidence_hash: Option<Hash>,
}

/// Slashing bookkeeping: executes the registry transition and keeps the
/// event history and per-validator offense counts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlashLedger {
    history: Vec<SlashEvent>,
    offense_count: HashMap<Address, u32>,
    total_slashed: Amount,
}

impl SlashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slash a validator: `floor(total_stake · slashing_bps / 10000)` is
    /// removed from stake and voting power, the validator is suspended
    /// until `now + jail_duration`, and the event is recorded.
    ///
    /// The registry mutation is atomic; on error no state changes.
    pub fn slash(
        &mut self,
        registry: &mut ValidatorRegistry,
        validator: &Address,
        reason: SlashReason,
        evidence_hash: Option<Hash>,
        now: Timestamp,
    ) -> ConsensusResult<SlashEvent> {
        let amount = registry.apply_slash(validator, now)?;

        let offense_number = {
            let count = self.offense_count.entry(*validator).or_insert(0);
            *count += 1;
            *count
        };

        let event = SlashEvent {
            validator: *validator,
            reason,
            amount: amount.clone(),
            timestamp: now,
            offense_number,
            evidence_hash,
        };

        self.total_slashed = self
            .total_slashed
            .checked_add(&amount)
            .unwrap_or_else(|| amount.clone());
        self.history.push(event.clone());

        tracing::warn!(
            "validator {} slashed {} for {}",
            validator.to_hex(),
            amount,
            reason.as_str()
        );

        Ok(event)
    }

    /// Offense count for a validator
    pub fn offense_count(&self, validator: &Address) -> u32 {
        self.offense_count.get(validator).copied().unwrap_or(0)
    }

    /// Slash history for a validator
    pub fn history_for(&self, validator: &Address) -> Vec<&SlashEvent> {
        self.history
            .iter()
            .filter(|e| e.validator == *validator)
            .collect()
    }

    /// All recorded slash events
    pub fn history(&self) -> &[SlashEvent] {
        &self.history
    }

    /// Cumulative slashed amount
    pub fn total_slashed(&self) -> &Amount {
        &self.total_slashed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ConsensusParams;
    use crate::registry::ValidatorStatus;
    use chain_crypto::{KeyPair, SignatureAlgorithm};

    fn setup(stake: u64) -> (ValidatorRegistry, Address) {
        let params = ConsensusParams {
            min_stake: Amount::from_u64(1000),
            ..Default::default()
        };
        let mut registry = ValidatorRegistry::new(params);
        let keypair = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
        let address = keypair.public_key().to_address();
        registry
            .register(address, keypair.public_key().clone(), Amount::from_u64(stake), 0.0, 0)
            .unwrap();
        (registry, address)
    }

    #[test]
    fn test_slash_amount_and_state() {
        let (mut registry, address) = setup(200_000);
        let mut ledger = SlashLedger::new();

        let event = ledger
            .slash(&mut registry, &address, SlashReason::Equivocation, None, 500)
            .unwrap();

        // 5% of 200k
        assert_eq!(event.amount, Amount::from_u64(10_000));
        assert_eq!(event.offense_number, 1);
        assert_eq!(event.reason.as_str(), "equivocation");

        let record = registry.get(&address).unwrap();
        assert_eq!(record.status, ValidatorStatus::Slashed);
        assert_eq!(record.voting_power, Amount::from_u64(190_000));
        assert_eq!(record.jailed_until, 500 + registry.params().jail_duration_secs);
    }

    #[test]
    fn test_repeat_offense_counts() {
        let (mut registry, address) = setup(200_000);
        let mut ledger = SlashLedger::new();

        ledger
            .slash(&mut registry, &address, SlashReason::Equivocation, None, 500)
            .unwrap();
        let second = ledger
            .slash(&mut registry, &address, SlashReason::InvalidProposal, None, 600)
            .unwrap();

        assert_eq!(second.offense_number, 2);
        assert_eq!(ledger.offense_count(&address), 2);
        assert_eq!(ledger.history_for(&address).len(), 2);
        // 5% of 200k, then 5% of the remaining 190k
        assert_eq!(
            ledger.total_slashed(),
            &Amount::from_u64(10_000 + 9_500)
        );
    }

    #[test]
    fn test_unknown_validator_leaves_no_trace() {
        let (mut registry, _) = setup(200_000);
        let mut ledger = SlashLedger::new();
        let ghost = Address::new([9u8; 20]);

        assert!(ledger
            .slash(&mut registry, &ghost, SlashReason::Downtime, None, 500)
            .is_err());
        assert!(ledger.history().is_empty());
        assert_eq!(ledger.offense_count(&ghost), 0);
    }
}
