// consensus/src/registry.rs

use crate::params::ConsensusParams;
use crate::{ConsensusError, ConsensusResult};
use chain_core::{Amount, Timestamp};
use chain_crypto::{Address, PublicKey, SignatureAlgorithm};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weight of the newest observation in the uptime moving average
const UPTIME_ALPHA: f64 = 0.1;

/// Validator status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorStatus {
    /// Active and participating in consensus
    Active,
    /// Temporarily suspended until `jailed_until`
    Jailed,
    /// Unbonding period after exit
    Unbonding,
    /// Unbonding period elapsed, stake released
    Unbonded,
    /// Slashed due to provable misbehavior
    Slashed,
}

impl ValidatorStatus {
    /// Wire encoding shared with the execution layer
    pub fn as_u8(self) -> u8 {
        match self {
            ValidatorStatus::Active => 0,
            ValidatorStatus::Jailed => 1,
            ValidatorStatus::Unbonding => 2,
            ValidatorStatus::Unbonded => 3,
            ValidatorStatus::Slashed => 4,
        }
    }
}

/// Per-validator performance counters and scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub blocks_proposed: u64,
    pub blocks_proposed_ok: u64,
    pub blocks_missed: u64,
    pub attestations_missed: u64,
    pub slash_count: u32,
    /// Moving average of observed participation, in [0.0, 1.0]
    pub uptime_score: f64,
    /// Reserved for transport-layer measurements, in [0.0, 1.0]
    pub latency_score: f64,
    /// blocks_proposed_ok / blocks_proposed, 1.0 before the first proposal
    pub reliability_score: f64,
    pub last_slash: Option<Timestamp>,
    /// Misses since the last successful proposal; drives jailing
    consecutive_misses: u64,
}

impl Default for PerformanceStats {
    fn default() -> Self {
        Self {
            blocks_proposed: 0,
            blocks_proposed_ok: 0,
            blocks_missed: 0,
            attestations_missed: 0,
            slash_count: 0,
            uptime_score: 1.0,
            latency_score: 1.0,
            reliability_score: 1.0,
            last_slash: None,
            consecutive_misses: 0,
        }
    }
}

impl PerformanceStats {
    fn record_proposed(&mut self, ok: bool) {
        self.blocks_proposed += 1;
        if ok {
            self.blocks_proposed_ok += 1;
        }
        self.consecutive_misses = 0;
        self.reliability_score = self.blocks_proposed_ok as f64 / self.blocks_proposed as f64;
    }

    fn record_missed(&mut self) -> u64 {
        self.blocks_missed += 1;
        self.consecutive_misses += 1;
        self.uptime_score *= 1.0 - UPTIME_ALPHA;
        self.consecutive_misses
    }

    fn record_participation(&mut self) {
        self.uptime_score = self.uptime_score * (1.0 - UPTIME_ALPHA) + UPTIME_ALPHA;
    }

    fn record_missed_attestation(&mut self) {
        self.attestations_missed += 1;
        self.uptime_score *= 1.0 - UPTIME_ALPHA;
    }
}

/// Complete validator record.
///
/// Owned exclusively by the registry; everything handed out is a copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validator {
    /// Address derived from the public key (immutable)
    pub address: Address,
    /// Registered public key (immutable; re-register to rotate)
    pub public_key: PublicKey,
    /// Signature algorithm the key was generated under (immutable)
    pub algorithm: SignatureAlgorithm,
    /// Stake bonded by the validator itself
    pub self_stake: Amount,
    /// Sum of all delegations to this validator
    pub delegated_stake: Amount,
    /// Effective quorum weight: total stake less cumulative slashes
    pub voting_power: Amount,
    /// Commission on delegator rewards, a fraction in [0.0, 1.0]
    pub commission: f64,
    /// Current status
    pub status: ValidatorStatus,
    /// Instant at which a jail or slash suspension ends
    pub jailed_until: Timestamp,
    /// Deadline after which Unbonding becomes Unbonded
    pub unbonding_until: Option<Timestamp>,
    /// Performance counters and scores
    pub performance: PerformanceStats,
    /// Last observed participation
    pub last_active: Timestamp,
}

impl Validator {
    fn new(
        address: Address,
        public_key: PublicKey,
        self_stake: Amount,
        commission: f64,
        now: Timestamp,
    ) -> Self {
        let algorithm = public_key.algorithm();
        Self {
            address,
            public_key,
            algorithm,
            voting_power: self_stake.clone(),
            self_stake,
            delegated_stake: Amount::zero(),
            commission,
            status: ValidatorStatus::Active,
            jailed_until: 0,
            unbonding_until: None,
            performance: PerformanceStats::default(),
            last_active: now,
        }
    }

    /// Total bonded stake: self stake plus delegations
    pub fn total_stake(&self) -> Amount {
        self.self_stake
            .checked_add(&self.delegated_stake)
            .unwrap_or_else(Amount::zero)
    }

    /// Eligibility for the active set at `now`
    pub fn is_eligible(&self, min_stake: &Amount, now: Timestamp) -> bool {
        self.status == ValidatorStatus::Active
            && self.total_stake() >= *min_stake
            && now >= self.jailed_until
    }
}

/// One entry of an active-set snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSetEntry {
    pub address: Address,
    pub public_key: PublicKey,
    pub algorithm: SignatureAlgorithm,
    pub total_stake: Amount,
    pub voting_power: Amount,
    pub reliability_score_millis: u64,
}

impl ActiveSetEntry {
    /// Reliability as the truncated thousandths used for election weights
    pub fn reliability_millis(&self) -> u64 {
        self.reliability_score_millis
    }
}

/// Immutable snapshot of the validators eligible to propose and vote.
///
/// Ordered by total stake descending, ties broken by ascending address, and
/// truncated to `max_validators`; identical on every node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSet {
    entries: Vec<ActiveSetEntry>,
}

impl ActiveSet {
    /// Build a snapshot directly from entries; callers are responsible for
    /// the canonical ordering
    pub fn from_entries(entries: Vec<ActiveSetEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ActiveSetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<&ActiveSetEntry> {
        self.entries.iter().find(|e| e.address == *address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.entries.iter().map(|e| e.address).collect()
    }

    /// Sum of voting power over the whole set
    pub fn total_voting_power(&self) -> Amount {
        self.entries
            .iter()
            .fold(Amount::zero(), |acc, e| {
                acc.checked_add(&e.voting_power).unwrap_or(acc)
            })
    }
}

/// Jail transition notice returned to the caller, which fires the
/// corresponding observer callback outside the registry lock
#[derive(Debug, Clone)]
pub struct JailNotice {
    pub validator: Address,
    pub jailed_until: Timestamp,
}

/// Unbonding notice; the caller enforces the funds lock until `release_at`
#[derive(Debug, Clone)]
pub struct UnbondNotice {
    pub delegator: Address,
    pub validator: Address,
    pub amount: Amount,
    pub release_at: Timestamp,
}

/// Manages the validator set, stakes and delegations.
///
/// Plain data guarded by the engine's single write lock; every read path
/// receives value snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorRegistry {
    validators: HashMap<Address, Validator>,
    /// Keyed by (delegator, validator)
    delegations: HashMap<(Address, Address), Amount>,
    params: ConsensusParams,
    /// Eagerly recomputed on every stake or status mutation
    active: ActiveSet,
}

impl ValidatorRegistry {
    pub fn new(params: ConsensusParams) -> Self {
        Self {
            validators: HashMap::new(),
            delegations: HashMap::new(),
            params,
            active: ActiveSet::default(),
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Replace parameters (governance path) and refresh the active set
    pub fn set_params(&mut self, params: ConsensusParams, now: Timestamp) {
        self.params = params;
        self.recompute_active(now);
    }

    /// Get a validator by address (copy)
    pub fn get(&self, address: &Address) -> Option<Validator> {
        self.validators.get(address).cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.validators.contains_key(address)
    }

    pub fn count(&self) -> usize {
        self.validators.len()
    }

    /// Current active-set snapshot (copy)
    pub fn snapshot_active(&self) -> ActiveSet {
        self.active.clone()
    }

    /// Delegations to a validator, in delegator-address order
    pub fn delegations_of(&self, validator: &Address) -> Vec<(Address, Amount)> {
        let mut entries: Vec<(Address, Amount)> = self
            .delegations
            .iter()
            .filter(|((_, v), _)| v == validator)
            .map(|((d, _), amount)| (*d, amount.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Register a new validator
    pub fn register(
        &mut self,
        address: Address,
        public_key: PublicKey,
        self_stake: Amount,
        commission: f64,
        now: Timestamp,
    ) -> ConsensusResult<()> {
        if self.validators.contains_key(&address) {
            return Err(ConsensusError::AlreadyExists(address));
        }
        if address != public_key.to_address() {
            return Err(ConsensusError::KeyMismatch(address));
        }
        if !(0.0..=1.0).contains(&commission) {
            return Err(ConsensusError::InvalidCommission(commission));
        }
        if self_stake < self.params.min_stake {
            return Err(ConsensusError::InsufficientStake {
                required: self.params.min_stake.clone(),
                provided: self_stake,
            });
        }
        if self.active.len() >= self.params.max_validators {
            return Err(ConsensusError::SetFull {
                max: self.params.max_validators,
            });
        }

        let validator = Validator::new(address, public_key, self_stake, commission, now);
        self.validators.insert(address, validator);
        self.recompute_active(now);

        tracing::info!("validator {} registered", address.to_hex());
        Ok(())
    }

    /// Delegate stake to an active validator
    pub fn delegate(
        &mut self,
        delegator: Address,
        validator: Address,
        amount: Amount,
        now: Timestamp,
    ) -> ConsensusResult<()> {
        if amount.is_zero() {
            return Err(ConsensusError::NonPositiveAmount);
        }

        let record = self
            .validators
            .get_mut(&validator)
            .ok_or(ConsensusError::NotFound(validator))?;
        if record.status != ValidatorStatus::Active {
            return Err(ConsensusError::NotActive(validator));
        }

        record.delegated_stake = record.delegated_stake.clone() + amount.clone();
        record.voting_power = record.voting_power.clone() + amount.clone();

        let entry = self
            .delegations
            .entry((delegator, validator))
            .or_insert_with(Amount::zero);
        *entry = entry.clone() + amount;

        self.recompute_active(now);
        Ok(())
    }

    /// Withdraw delegated stake; the returned notice carries the unbonding
    /// deadline the caller must enforce before releasing funds
    pub fn undelegate(
        &mut self,
        delegator: Address,
        validator: Address,
        amount: Amount,
        now: Timestamp,
    ) -> ConsensusResult<UnbondNotice> {
        if amount.is_zero() {
            return Err(ConsensusError::NonPositiveAmount);
        }

        let key = (delegator, validator);
        let delegated = self
            .delegations
            .get(&key)
            .cloned()
            .ok_or(ConsensusError::NoDelegation {
                delegator,
                validator,
            })?;
        if delegated < amount {
            return Err(ConsensusError::InsufficientDelegation {
                delegated,
                requested: amount,
            });
        }

        let record = self
            .validators
            .get_mut(&validator)
            .ok_or(ConsensusError::NotFound(validator))?;

        record.delegated_stake = record.delegated_stake.saturating_sub(&amount);
        record.voting_power = record.voting_power.saturating_sub(&amount);

        let remaining = delegated.saturating_sub(&amount);
        if remaining.is_zero() {
            self.delegations.remove(&key);
        } else {
            self.delegations.insert(key, remaining);
        }

        self.recompute_active(now);

        Ok(UnbondNotice {
            delegator,
            validator,
            amount,
            release_at: now + self.params.unbonding_period_secs,
        })
    }

    /// Begin a validator's exit; stake stays bonded until the period elapses
    pub fn begin_exit(&mut self, validator: Address, now: Timestamp) -> ConsensusResult<UnbondNotice> {
        let record = self
            .validators
            .get_mut(&validator)
            .ok_or(ConsensusError::NotFound(validator))?;

        let release_at = now + self.params.unbonding_period_secs;
        record.status = ValidatorStatus::Unbonding;
        record.unbonding_until = Some(release_at);
        let amount = record.total_stake();

        self.recompute_active(now);

        tracing::info!("validator {} unbonding", validator.to_hex());
        Ok(UnbondNotice {
            delegator: validator,
            validator,
            amount,
            release_at,
        })
    }

    /// Complete unbonding for validators whose deadline has passed
    pub fn process_unbonding(&mut self, now: Timestamp) -> Vec<Address> {
        let mut completed = Vec::new();

        for (address, validator) in &mut self.validators {
            if validator.status == ValidatorStatus::Unbonding {
                if let Some(deadline) = validator.unbonding_until {
                    if now >= deadline {
                        validator.status = ValidatorStatus::Unbonded;
                        completed.push(*address);
                    }
                }
            }
        }

        if !completed.is_empty() {
            self.recompute_active(now);
        }
        completed
    }

    /// Record a finalized block: proposer counters, participant uptime
    pub fn update_performance_on_finalize(
        &mut self,
        proposer: &Address,
        participants: &[Address],
        now: Timestamp,
    ) {
        if let Some(validator) = self.validators.get_mut(proposer) {
            validator.performance.record_proposed(true);
            validator.last_active = now;
        }

        for address in participants {
            if address == proposer {
                continue;
            }
            if let Some(validator) = self.validators.get_mut(address) {
                validator.performance.record_participation();
                validator.last_active = now;
            }
        }

        // Active validators that did not vote lose uptime
        let voted: std::collections::HashSet<&Address> = participants.iter().collect();
        let absent: Vec<Address> = self
            .active
            .addresses()
            .into_iter()
            .filter(|a| !voted.contains(a) && a != proposer)
            .collect();
        for address in absent {
            if let Some(validator) = self.validators.get_mut(&address) {
                validator.performance.record_missed_attestation();
            }
        }
    }

    /// Record a missed block for the scheduled proposer; jails once the
    /// consecutive-miss counter reaches the configured maximum
    pub fn record_missed(
        &mut self,
        validator: &Address,
        now: Timestamp,
    ) -> ConsensusResult<Option<JailNotice>> {
        let max_missed = self.params.max_missed_blocks;
        let jail_duration = self.params.jail_duration_secs;

        let record = self
            .validators
            .get_mut(validator)
            .ok_or(ConsensusError::NotFound(*validator))?;

        let misses = record.performance.record_missed();
        record.performance.blocks_proposed += 1;
        record.performance.reliability_score =
            record.performance.blocks_proposed_ok as f64 / record.performance.blocks_proposed as f64;

        if misses >= max_missed && record.status == ValidatorStatus::Active {
            record.status = ValidatorStatus::Jailed;
            record.jailed_until = now + jail_duration;
            let notice = JailNotice {
                validator: *validator,
                jailed_until: record.jailed_until,
            };
            self.recompute_active(now);
            tracing::warn!(
                "validator {} jailed until {} after {} consecutive misses",
                validator.to_hex(),
                notice.jailed_until,
                misses
            );
            return Ok(Some(notice));
        }

        self.recompute_active(now);
        Ok(None)
    }

    /// Apply a slash: drain stake, suspend, and return the slashed amount.
    ///
    /// The penalty is taken from self stake first; any remainder drains the
    /// delegation entries in delegator-address order so the stake-sum
    /// invariant holds exactly.
    pub fn apply_slash(
        &mut self,
        validator: &Address,
        now: Timestamp,
    ) -> ConsensusResult<Amount> {
        let bps = self.params.slashing_bps;
        let jail_duration = self.params.jail_duration_secs;

        let record = self
            .validators
            .get_mut(validator)
            .ok_or(ConsensusError::NotFound(*validator))?;

        let slash_amount = record.total_stake().scale_bps(bps);

        let from_self = if record.self_stake >= slash_amount {
            slash_amount.clone()
        } else {
            record.self_stake.clone()
        };
        let mut remainder = slash_amount.saturating_sub(&from_self);
        record.self_stake = record.self_stake.saturating_sub(&from_self);
        record.delegated_stake = record.delegated_stake.saturating_sub(&remainder);
        record.voting_power = record.voting_power.saturating_sub(&slash_amount);

        record.performance.slash_count += 1;
        record.performance.last_slash = Some(now);
        record.status = ValidatorStatus::Slashed;
        record.jailed_until = now + jail_duration;

        if !remainder.is_zero() {
            let mut delegators: Vec<(Address, Address)> = self
                .delegations
                .keys()
                .filter(|(_, v)| v == validator)
                .cloned()
                .collect();
            delegators.sort_by(|a, b| a.0.cmp(&b.0));

            for key in delegators {
                if remainder.is_zero() {
                    break;
                }
                let delegated = self.delegations.get(&key).cloned().unwrap_or_default();
                let taken = if delegated >= remainder {
                    remainder.clone()
                } else {
                    delegated.clone()
                };
                let left = delegated.saturating_sub(&taken);
                if left.is_zero() {
                    self.delegations.remove(&key);
                } else {
                    self.delegations.insert(key, left);
                }
                remainder = remainder.saturating_sub(&taken);
            }
        }

        self.recompute_active(now);
        Ok(slash_amount)
    }

    /// Restore a jailed or slashed validator once its suspension has lapsed
    /// and its stake still clears the floor. Returns whether the transition
    /// happened; conditions not yet met are not an error.
    pub fn request_unjail(&mut self, validator: &Address, now: Timestamp) -> ConsensusResult<bool> {
        let min_stake = self.params.min_stake.clone();
        let record = self
            .validators
            .get_mut(validator)
            .ok_or(ConsensusError::NotFound(*validator))?;

        if !matches!(record.status, ValidatorStatus::Jailed | ValidatorStatus::Slashed) {
            return Ok(false);
        }
        if now < record.jailed_until || record.total_stake() < min_stake {
            return Ok(false);
        }

        record.status = ValidatorStatus::Active;
        record.performance.consecutive_misses = 0;
        self.recompute_active(now);

        tracing::info!("validator {} unjailed", validator.to_hex());
        Ok(true)
    }

    /// Recompute the active set: eligible validators sorted by total stake
    /// descending, ties broken by address, truncated to `max_validators`
    pub fn recompute_active(&mut self, now: Timestamp) {
        let mut eligible: Vec<&Validator> = self
            .validators
            .values()
            .filter(|v| v.is_eligible(&self.params.min_stake, now))
            .collect();

        eligible.sort_by(|a, b| {
            b.total_stake()
                .cmp(&a.total_stake())
                .then_with(|| a.address.cmp(&b.address))
        });
        eligible.truncate(self.params.max_validators);

        self.active = ActiveSet {
            entries: eligible
                .into_iter()
                .map(|v| ActiveSetEntry {
                    address: v.address,
                    public_key: v.public_key.clone(),
                    algorithm: v.algorithm,
                    total_stake: v.total_stake(),
                    voting_power: v.voting_power.clone(),
                    reliability_score_millis: (v.performance.reliability_score.clamp(0.0, 1.0)
                        * 1000.0)
                        .floor() as u64,
                })
                .collect(),
        };
    }
}
