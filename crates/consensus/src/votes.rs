// consensus/src/votes.rs

use crate::params::ConsensusParams;
use crate::registry::ActiveSet;
use crate::{ConsensusError, ConsensusResult};
use chain_core::{Amount, BlockNumber, Timestamp};
use chain_crypto::{Address, Hash, Hashable, KeyPair, PublicKey, Signature, SignatureAlgorithm};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Consensus vote phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteType {
    Proposal,
    PreCommit,
    Commit,
    Finalize,
}

impl VoteType {
    /// Wire encoding used in the canonical vote string
    pub fn as_u8(self) -> u8 {
        match self {
            VoteType::Proposal => 0,
            VoteType::PreCommit => 1,
            VoteType::Commit => 2,
            VoteType::Finalize => 3,
        }
    }
}

/// A signed vote for a block at a height.
///
/// The signature covers the canonical encoding
/// `"<block_hash_hex>:<height>:<vote_type>:<timestamp>"`. The byte string
/// goes straight to the signature scheme, which supplies its own hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusVote {
    pub validator: Address,
    pub block_hash: Hash,
    pub block_height: BlockNumber,
    pub vote_type: VoteType,
    pub timestamp: Timestamp,
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl ConsensusVote {
    /// Canonical byte string signed by the validator
    pub fn signing_bytes(
        block_hash: &Hash,
        height: BlockNumber,
        vote_type: VoteType,
        timestamp: Timestamp,
    ) -> Vec<u8> {
        format!(
            "0x{}:{}:{}:{}",
            block_hash.to_hex(),
            height,
            vote_type.as_u8(),
            timestamp
        )
        .into_bytes()
    }

    /// Canonical bytes of this vote
    pub fn canonical_bytes(&self) -> Vec<u8> {
        Self::signing_bytes(
            &self.block_hash,
            self.block_height,
            self.vote_type,
            self.timestamp,
        )
    }

    /// Build and sign a vote with a local key pair
    pub fn signed(
        keypair: &KeyPair,
        block_hash: Hash,
        block_height: BlockNumber,
        vote_type: VoteType,
        timestamp: Timestamp,
    ) -> chain_crypto::CryptoResult<Self> {
        let bytes = Self::signing_bytes(&block_hash, block_height, vote_type, timestamp);
        let signature = keypair.sign(&bytes)?;
        Ok(Self {
            validator: keypair.public_key().to_address(),
            block_hash,
            block_height,
            vote_type,
            timestamp,
            signature,
            public_key: keypair.public_key().clone(),
        })
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.signature.algorithm()
    }

    /// Byte-identity used for idempotent resubmission
    fn same_bytes(&self, other: &ConsensusVote) -> bool {
        self.block_hash == other.block_hash
            && self.vote_type == other.vote_type
            && self.timestamp == other.timestamp
            && self.signature == other.signature
    }
}

/// The canonical quorum predicate: at least 67% of voting power, in exact
/// integer arithmetic. An empty set has no quorum.
pub fn meets_threshold(voted: &Amount, total: &Amount) -> bool {
    !total.is_zero() && voted.inner() * 100u32 >= total.inner() * 67u32
}

/// Two conflicting well-formed votes from one validator at one height
#[derive(Debug, Clone)]
pub struct EquivocationEvidence {
    pub validator: Address,
    pub height: BlockNumber,
    pub first: ConsensusVote,
    pub second: ConsensusVote,
}

/// Result of submitting a vote
#[derive(Debug, Clone)]
pub enum VoteOutcome {
    /// Recorded as the validator's vote at this height
    Accepted,
    /// Byte-identical resubmission, silently ignored
    AlreadyRecorded,
    /// Conflicting vote; the first vote stands, evidence is retained
    Equivocation(EquivocationEvidence),
}

/// Per-height vote storage and the quorum evaluator.
///
/// Lattice-signature verification dominates vote handling, so results are
/// memoized by (validator, height, signature-bytes hash); re-polling quorum
/// does not re-verify unchanged votes.
#[derive(Debug, Default)]
pub struct VoteLedger {
    votes: HashMap<BlockNumber, HashMap<Address, ConsensusVote>>,
    verified: HashMap<(Address, BlockNumber), Hash>,
    failure_counts: HashMap<Address, u64>,
    evidence: Vec<EquivocationEvidence>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record a vote.
    ///
    /// Freshness uses the local wall clock: a vote may lag by the past
    /// tolerance or lead by the future tolerance, nothing more.
    pub fn submit(
        &mut self,
        vote: ConsensusVote,
        active: &ActiveSet,
        params: &ConsensusParams,
        now: Timestamp,
    ) -> ConsensusResult<VoteOutcome> {
        let entry = active
            .get(&vote.validator)
            .ok_or(ConsensusError::NotActive(vote.validator))?;

        if entry.public_key != vote.public_key {
            return Err(ConsensusError::KeyMismatch(vote.validator));
        }

        let skew = now - vote.timestamp;
        if skew > params.vote_past_tolerance_secs || -skew > params.vote_future_tolerance_secs {
            return Err(ConsensusError::StaleTimestamp { skew_secs: skew });
        }

        let sig_hash = vote.signature.as_bytes().hash();
        let cache_key = (vote.validator, vote.block_height);
        let already_verified = self.verified.get(&cache_key) == Some(&sig_hash);
        if !already_verified {
            let valid = vote
                .signature
                .verify(&vote.canonical_bytes(), &vote.public_key)?;
            if !valid {
                *self.failure_counts.entry(vote.validator).or_insert(0) += 1;
                return Err(ConsensusError::InvalidSignature(vote.validator));
            }
        }

        if let Some(existing) = self
            .votes
            .get(&vote.block_height)
            .and_then(|m| m.get(&vote.validator))
        {
            if existing.same_bytes(&vote) {
                return Ok(VoteOutcome::AlreadyRecorded);
            }
            let evidence = EquivocationEvidence {
                validator: vote.validator,
                height: vote.block_height,
                first: existing.clone(),
                second: vote,
            };
            self.evidence.push(evidence.clone());
            tracing::warn!(
                "equivocation at height {} by {}",
                evidence.height,
                evidence.validator.to_hex()
            );
            return Ok(VoteOutcome::Equivocation(evidence));
        }

        self.verified.insert(cache_key, sig_hash);
        self.votes
            .entry(vote.block_height)
            .or_default()
            .insert(vote.validator, vote);

        Ok(VoteOutcome::Accepted)
    }

    /// Evaluate quorum at a height over the current active snapshot:
    /// `voted_power · 100 ≥ total_power · 67`.
    ///
    /// Well-formedness is re-checked on every call (set membership, key
    /// identity, freshness, signature via the memo cache) so a vote that
    /// was valid when submitted but whose validator has since left the set
    /// no longer counts.
    pub fn has_quorum(
        &mut self,
        height: BlockNumber,
        active: &ActiveSet,
        params: &ConsensusParams,
        now: Timestamp,
    ) -> bool {
        let (voted, total) = self.tally(height, active, params, now);
        meets_threshold(&voted, &total)
    }

    /// Voting power present and total, as used by the quorum predicate
    pub fn tally(
        &mut self,
        height: BlockNumber,
        active: &ActiveSet,
        params: &ConsensusParams,
        now: Timestamp,
    ) -> (Amount, Amount) {
        let total = active.total_voting_power();
        let mut voted = Amount::zero();

        let Some(height_votes) = self.votes.get(&height) else {
            return (voted, total);
        };

        for entry in active.entries() {
            let Some(vote) = height_votes.get(&entry.address) else {
                continue;
            };

            if entry.public_key != vote.public_key {
                continue;
            }
            let skew = now - vote.timestamp;
            if skew > params.vote_past_tolerance_secs
                || -skew > params.vote_future_tolerance_secs
            {
                continue;
            }

            let sig_hash = vote.signature.as_bytes().hash();
            let cache_key = (entry.address, height);
            let verified = if self.verified.get(&cache_key) == Some(&sig_hash) {
                true
            } else {
                match vote.signature.verify(&vote.canonical_bytes(), &vote.public_key) {
                    Ok(true) => {
                        self.verified.insert(cache_key, sig_hash);
                        true
                    }
                    _ => {
                        *self.failure_counts.entry(entry.address).or_insert(0) += 1;
                        false
                    }
                }
            };

            if verified {
                voted = voted.checked_add(&entry.voting_power).unwrap_or(voted);
            }
        }

        (voted, total)
    }

    /// Validators with a recorded vote at a height, restricted to the set
    pub fn participants(&self, height: BlockNumber, active: &ActiveSet) -> Vec<Address> {
        self.votes
            .get(&height)
            .map(|m| {
                m.keys()
                    .filter(|a| active.contains(a))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The recorded vote of one validator at a height, if any
    pub fn vote_of(&self, height: BlockNumber, validator: &Address) -> Option<&ConsensusVote> {
        self.votes.get(&height).and_then(|m| m.get(validator))
    }

    /// Number of votes recorded at a height
    pub fn count_at(&self, height: BlockNumber) -> usize {
        self.votes.get(&height).map(|m| m.len()).unwrap_or(0)
    }

    /// Verification failures attributed to a validator (reputation feed)
    pub fn verification_failures(&self, validator: &Address) -> u64 {
        self.failure_counts.get(validator).copied().unwrap_or(0)
    }

    /// Equivocation evidence retained within the window
    pub fn evidence(&self) -> &[EquivocationEvidence] {
        &self.evidence
    }

    /// Drop votes and evidence older than the evidence window below `height`
    pub fn prune_below(&mut self, height: BlockNumber, params: &ConsensusParams) {
        let floor = height.saturating_sub(params.evidence_window);
        self.votes.retain(|h, _| *h >= floor);
        self.verified.retain(|(_, h), _| *h >= floor);
        self.evidence.retain(|e| e.height >= floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ValidatorRegistry;

    struct Fixture {
        ledger: VoteLedger,
        registry: ValidatorRegistry,
        params: ConsensusParams,
        keys: Vec<KeyPair>,
    }

    fn fixture(stakes: &[u64]) -> Fixture {
        let params = ConsensusParams {
            min_stake: Amount::from_u64(100),
            ..Default::default()
        };
        let mut registry = ValidatorRegistry::new(params.clone());
        let mut keys = Vec::new();
        for stake in stakes {
            let keypair = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
            registry
                .register(
                    keypair.public_key().to_address(),
                    keypair.public_key().clone(),
                    Amount::from_u64(*stake),
                    0.0,
                    0,
                )
                .unwrap();
            keys.push(keypair);
        }
        Fixture {
            ledger: VoteLedger::new(),
            registry,
            params,
            keys,
        }
    }

    #[test]
    fn test_canonical_encoding() {
        let hash = Hash::new([0xab; 32]);
        let bytes = ConsensusVote::signing_bytes(&hash, 42, VoteType::Commit, 1_700_000_000);
        let expected = format!("0x{}:42:2:1700000000", "ab".repeat(32));
        assert_eq!(bytes, expected.into_bytes());
    }

    #[test]
    fn test_empty_set_has_no_quorum() {
        assert!(!meets_threshold(&Amount::zero(), &Amount::zero()));
    }

    #[test]
    fn test_vote_type_encoding() {
        assert_eq!(VoteType::Proposal.as_u8(), 0);
        assert_eq!(VoteType::PreCommit.as_u8(), 1);
        assert_eq!(VoteType::Commit.as_u8(), 2);
        assert_eq!(VoteType::Finalize.as_u8(), 3);
    }

    #[test]
    fn test_submit_and_quorum() {
        let mut fx = fixture(&[300, 200, 100]);
        let active = fx.registry.snapshot_active();
        let hash = Hash::new([0xaa; 32]);

        for key in &fx.keys {
            let vote = ConsensusVote::signed(key, hash, 10, VoteType::Commit, 1000).unwrap();
            let outcome = fx.ledger.submit(vote, &active, &fx.params, 1000).unwrap();
            assert!(matches!(outcome, VoteOutcome::Accepted));
        }

        assert!(fx.ledger.has_quorum(10, &active, &fx.params, 1000));
        let (voted, total) = fx.ledger.tally(10, &active, &fx.params, 1000);
        assert_eq!(voted, Amount::from_u64(600));
        assert_eq!(total, Amount::from_u64(600));
    }

    #[test]
    fn test_minority_is_no_quorum() {
        let mut fx = fixture(&[300, 200, 100]);
        let active = fx.registry.snapshot_active();
        let hash = Hash::new([0xaa; 32]);

        // Only the 100-stake validator votes: 16.7% of power
        let smallest = fx
            .keys
            .iter()
            .find(|k| {
                active
                    .get(&k.public_key().to_address())
                    .map(|e| e.voting_power == Amount::from_u64(100))
                    .unwrap_or(false)
            })
            .unwrap();
        let vote = ConsensusVote::signed(smallest, hash, 11, VoteType::Commit, 1000).unwrap();
        fx.ledger.submit(vote, &active, &fx.params, 1000).unwrap();

        assert!(!fx.ledger.has_quorum(11, &active, &fx.params, 1000));
    }

    #[test]
    fn test_integer_threshold_boundary() {
        // 67/100 passes, 669/1000 fails, 670/1000 passes
        let mut fx = fixture(&[67, 33]);
        let active = fx.registry.snapshot_active();
        let hash = Hash::new([0x01; 32]);

        let big = fx
            .keys
            .iter()
            .find(|k| {
                active
                    .get(&k.public_key().to_address())
                    .map(|e| e.voting_power == Amount::from_u64(67))
                    .unwrap_or(false)
            })
            .unwrap();
        let vote = ConsensusVote::signed(big, hash, 5, VoteType::Commit, 1000).unwrap();
        fx.ledger.submit(vote, &active, &fx.params, 1000).unwrap();
        assert!(fx.ledger.has_quorum(5, &active, &fx.params, 1000));

        let mut fx = fixture(&[669, 331]);
        let active = fx.registry.snapshot_active();
        let big = fx
            .keys
            .iter()
            .find(|k| {
                active
                    .get(&k.public_key().to_address())
                    .map(|e| e.voting_power == Amount::from_u64(669))
                    .unwrap_or(false)
            })
            .unwrap();
        let vote = ConsensusVote::signed(big, hash, 5, VoteType::Commit, 1000).unwrap();
        fx.ledger.submit(vote, &active, &fx.params, 1000).unwrap();
        assert!(!fx.ledger.has_quorum(5, &active, &fx.params, 1000));

        let mut fx = fixture(&[670, 330]);
        let active = fx.registry.snapshot_active();
        let big = fx
            .keys
            .iter()
            .find(|k| {
                active
                    .get(&k.public_key().to_address())
                    .map(|e| e.voting_power == Amount::from_u64(670))
                    .unwrap_or(false)
            })
            .unwrap();
        let vote = ConsensusVote::signed(big, hash, 5, VoteType::Commit, 1000).unwrap();
        fx.ledger.submit(vote, &active, &fx.params, 1000).unwrap();
        assert!(fx.ledger.has_quorum(5, &active, &fx.params, 1000));
    }

    #[test]
    fn test_stale_and_future_votes_rejected() {
        let mut fx = fixture(&[300, 200, 100]);
        let active = fx.registry.snapshot_active();
        let hash = Hash::new([0xaa; 32]);
        let now = 100_000;

        // 11 minutes old
        let stale =
            ConsensusVote::signed(&fx.keys[0], hash, 12, VoteType::Commit, now - 11 * 60).unwrap();
        let result = fx.ledger.submit(stale, &active, &fx.params, now);
        assert!(matches!(result, Err(ConsensusError::StaleTimestamp { .. })));

        // 2 minutes ahead
        let future =
            ConsensusVote::signed(&fx.keys[0], hash, 12, VoteType::Commit, now + 2 * 60).unwrap();
        let result = fx.ledger.submit(future, &active, &fx.params, now);
        assert!(matches!(result, Err(ConsensusError::StaleTimestamp { .. })));

        // Ledger untouched by either rejection
        assert_eq!(fx.ledger.count_at(12), 0);
    }

    #[test]
    fn test_non_member_rejected() {
        let mut fx = fixture(&[300, 200, 100]);
        let active = fx.registry.snapshot_active();
        let outsider = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();

        let vote =
            ConsensusVote::signed(&outsider, Hash::new([0xaa; 32]), 10, VoteType::Commit, 1000)
                .unwrap();
        let result = fx.ledger.submit(vote, &active, &fx.params, 1000);
        assert!(matches!(result, Err(ConsensusError::NotActive(_))));
    }

    #[test]
    fn test_key_mismatch_rejected() {
        let mut fx = fixture(&[300, 200]);
        let active = fx.registry.snapshot_active();

        let mut vote =
            ConsensusVote::signed(&fx.keys[0], Hash::new([0xaa; 32]), 10, VoteType::Commit, 1000)
                .unwrap();
        // Claim the other validator's identity with the wrong key
        vote.validator = fx.keys[1].public_key().to_address();
        let result = fx.ledger.submit(vote, &active, &fx.params, 1000);
        assert!(matches!(result, Err(ConsensusError::KeyMismatch(_))));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let mut fx = fixture(&[300, 200]);
        let active = fx.registry.snapshot_active();

        let mut vote =
            ConsensusVote::signed(&fx.keys[0], Hash::new([0xaa; 32]), 10, VoteType::Commit, 1000)
                .unwrap();
        // Signature over different bytes than the vote claims
        vote.block_hash = Hash::new([0xbb; 32]);
        let validator = vote.validator;
        let result = fx.ledger.submit(vote, &active, &fx.params, 1000);
        assert!(matches!(result, Err(ConsensusError::InvalidSignature(_))));
        assert_eq!(fx.ledger.verification_failures(&validator), 1);
    }

    #[test]
    fn test_idempotent_resubmission() {
        let mut fx = fixture(&[300, 200]);
        let active = fx.registry.snapshot_active();

        let vote =
            ConsensusVote::signed(&fx.keys[0], Hash::new([0xaa; 32]), 10, VoteType::Commit, 1000)
                .unwrap();
        fx.ledger
            .submit(vote.clone(), &active, &fx.params, 1000)
            .unwrap();
        let outcome = fx.ledger.submit(vote, &active, &fx.params, 1000).unwrap();
        assert!(matches!(outcome, VoteOutcome::AlreadyRecorded));
        assert_eq!(fx.ledger.count_at(10), 1);
    }

    #[test]
    fn test_equivocation_detected() {
        let mut fx = fixture(&[300, 200]);
        let active = fx.registry.snapshot_active();

        let first =
            ConsensusVote::signed(&fx.keys[0], Hash::new([0xbb; 32]), 10, VoteType::Commit, 1000)
                .unwrap();
        let second =
            ConsensusVote::signed(&fx.keys[0], Hash::new([0xcc; 32]), 10, VoteType::Commit, 1000)
                .unwrap();

        fx.ledger
            .submit(first.clone(), &active, &fx.params, 1000)
            .unwrap();
        let outcome = fx.ledger.submit(second, &active, &fx.params, 1000).unwrap();

        match outcome {
            VoteOutcome::Equivocation(evidence) => {
                assert_eq!(evidence.validator, first.validator);
                assert_eq!(evidence.height, 10);
                assert_eq!(evidence.first.block_hash, Hash::new([0xbb; 32]));
                assert_eq!(evidence.second.block_hash, Hash::new([0xcc; 32]));
            }
            other => panic!("expected equivocation, got {:?}", other),
        }

        // The first vote stands
        assert_eq!(
            fx.ledger
                .vote_of(10, &first.validator)
                .unwrap()
                .block_hash,
            Hash::new([0xbb; 32])
        );
        assert_eq!(fx.ledger.evidence().len(), 1);
    }

    #[test]
    fn test_quorum_ignores_departed_validators() {
        let mut fx = fixture(&[300, 200, 100]);
        let active = fx.registry.snapshot_active();
        let hash = Hash::new([0xaa; 32]);

        for key in &fx.keys {
            let vote = ConsensusVote::signed(key, hash, 10, VoteType::Commit, 1000).unwrap();
            fx.ledger.submit(vote, &active, &fx.params, 1000).unwrap();
        }
        assert!(fx.ledger.has_quorum(10, &active, &fx.params, 1000));

        // The 300-stake validator leaves; its vote stops counting and the
        // remaining 300 of 300 still clears quorum over the smaller set
        let departing = active.entries()[0].address;
        fx.registry.begin_exit(departing, 1000).unwrap();
        let shrunk = fx.registry.snapshot_active();
        assert!(fx.ledger.has_quorum(10, &shrunk, &fx.params, 1000));
        let (voted, total) = fx.ledger.tally(10, &shrunk, &fx.params, 1000);
        assert_eq!(voted, Amount::from_u64(300));
        assert_eq!(total, Amount::from_u64(300));
    }

    #[test]
    fn test_prune_below() {
        let mut fx = fixture(&[300, 200]);
        let params = ConsensusParams {
            evidence_window: 10,
            ..fx.params.clone()
        };
        let active = fx.registry.snapshot_active();

        for height in [1u64, 5, 15] {
            let vote =
                ConsensusVote::signed(&fx.keys[0], Hash::new([0xaa; 32]), height, VoteType::Commit, 1000)
                    .unwrap();
            fx.ledger.submit(vote, &active, &params, 1000).unwrap();
        }

        fx.ledger.prune_below(20, &params);
        assert_eq!(fx.ledger.count_at(1), 0);
        assert_eq!(fx.ledger.count_at(5), 0);
        assert_eq!(fx.ledger.count_at(15), 1);
    }
}
