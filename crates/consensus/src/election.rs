// consensus/src/election.rs

use crate::registry::ActiveSet;
use crate::{ConsensusError, ConsensusResult};
use chain_core::{BlockNumber, EpochNumber};
use chain_crypto::{Address, Hash};
use num_bigint::BigUint;
use num_traits::Zero;
use sha2::{Digest, Sha256};

/// Deterministic stake-and-performance-weighted proposer election.
///
/// Every node derives the same seed from public chain state, so the walk
/// over the sorted active set picks the same proposer everywhere. Folding
/// in the previous block hash and the validator-set commitment keeps the
/// seed grinding-resistant.
pub struct ProposerElector {
    chain_id: u64,
}

impl ProposerElector {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    /// Commitment over the active set: SHA-256 of the address-sorted
    /// `address_hex:voting_power:` concatenation, first 8 bytes as
    /// lowercase hex
    pub fn set_commitment(active: &ActiveSet) -> String {
        let mut entries: Vec<_> = active.entries().iter().collect();
        entries.sort_by(|a, b| a.address.cmp(&b.address));

        let mut preimage = String::new();
        for entry in entries {
            preimage.push_str(&entry.address.to_hex());
            preimage.push(':');
            preimage.push_str(&entry.voting_power.to_string());
            preimage.push(':');
        }

        let digest = Sha256::digest(preimage.as_bytes());
        hex::encode(&digest[..8])
    }

    /// Build the selection seed for one (height, round) slot
    fn seed(
        &self,
        height: BlockNumber,
        epoch: EpochNumber,
        active: &ActiveSet,
        previous_block_hash: Option<&Hash>,
        round: u64,
    ) -> BigUint {
        let mut data = format!(
            "proposer_selection:{}:{}:{}",
            self.chain_id, height, epoch
        )
        .into_bytes();

        if height > 1 {
            if let Some(hash) = previous_block_hash {
                data.extend_from_slice(format!(":prev_block:{}", hash.to_hex()).as_bytes());
            }
        }

        data.extend_from_slice(format!(":{}", Self::set_commitment(active)).as_bytes());

        if round > 0 {
            data.extend_from_slice(format!(":round:{}", round).as_bytes());
        }

        // One initial application plus three iterations
        let mut digest = Sha256::digest(&data);
        for _ in 0..3 {
            digest = Sha256::digest(&digest);
        }

        let seed = BigUint::from_bytes_be(&digest);
        if seed.is_zero() {
            BigUint::from(height + 1)
        } else {
            seed
        }
    }

    /// Select the proposer for `height` within `epoch`.
    ///
    /// Weight of each validator is `voting_power × floor(reliability ×
    /// 1000) / 1000`; the reliability factor is truncated to thousandths
    /// before the big-integer arithmetic so floating-point rounding cannot
    /// diverge across platforms.
    pub fn next_proposer(
        &self,
        height: BlockNumber,
        epoch: EpochNumber,
        active: &ActiveSet,
        previous_block_hash: Option<&Hash>,
        round: u64,
    ) -> ConsensusResult<Address> {
        if active.is_empty() {
            return Err(ConsensusError::NoActiveValidators);
        }

        let weights: Vec<(Address, BigUint)> = active
            .entries()
            .iter()
            .map(|entry| {
                let weight =
                    (entry.voting_power.inner() * entry.reliability_millis()) / 1000u32;
                (entry.address, weight)
            })
            .collect();

        let total: BigUint = weights.iter().map(|(_, w)| w.clone()).sum();
        if total.is_zero() {
            return Ok(active.entries()[0].address);
        }

        let seed = self.seed(height, epoch, active, previous_block_hash, round);
        let target = seed % &total;

        let mut accumulated = BigUint::zero();
        for (address, weight) in &weights {
            accumulated += weight;
            if accumulated > target {
                return Ok(*address);
            }
        }

        // Unreachable: the running sum ends at `total` > `target`
        Ok(weights[weights.len() - 1].0)
    }
}

/// Stake-distribution metrics over an active set
pub struct StakeDistribution;

impl StakeDistribution {
    /// Minimum number of validators controlling a third of the voting power
    pub fn nakamoto_coefficient(active: &ActiveSet) -> usize {
        let mut powers: Vec<BigUint> = active
            .entries()
            .iter()
            .map(|e| e.voting_power.inner().clone())
            .collect();
        powers.sort_by(|a, b| b.cmp(a));

        let total: BigUint = powers.iter().sum();
        let threshold = &total / 3u32;

        let mut accumulated = BigUint::zero();
        let mut count = 0;
        for power in powers {
            accumulated += power;
            count += 1;
            if accumulated >= threshold {
                break;
            }
        }

        count
    }

    /// Gini coefficient of the voting-power distribution, in [0.0, 1.0]
    pub fn gini_coefficient(active: &ActiveSet) -> f64 {
        if active.is_empty() {
            return 0.0;
        }

        let mut powers: Vec<f64> = active
            .entries()
            .iter()
            .map(|e| e.voting_power.to_u64_lossy() as f64)
            .collect();
        powers.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let n = powers.len() as f64;
        let sum: f64 = powers.iter().sum();
        if sum == 0.0 {
            return 0.0;
        }

        let mut numerator = 0.0;
        for (i, power) in powers.iter().enumerate() {
            numerator += (2.0 * (i as f64 + 1.0) - n - 1.0) * power;
        }

        numerator / (n * sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ConsensusParams;
    use crate::registry::ValidatorRegistry;
    use chain_core::Amount;
    use chain_crypto::{KeyPair, SignatureAlgorithm};

    fn build_set(stakes: &[u64]) -> ActiveSet {
        let params = ConsensusParams {
            min_stake: Amount::from_u64(100),
            ..Default::default()
        };
        let mut registry = ValidatorRegistry::new(params);
        for stake in stakes {
            let keypair = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
            let address = keypair.public_key().to_address();
            registry
                .register(address, keypair.public_key().clone(), Amount::from_u64(*stake), 0.0, 0)
                .unwrap();
        }
        registry.snapshot_active()
    }

    #[test]
    fn test_empty_set_rejected() {
        let elector = ProposerElector::new(8888);
        let result = elector.next_proposer(1, 0, &ActiveSet::default(), None, 0);
        assert!(matches!(result, Err(ConsensusError::NoActiveValidators)));
    }

    #[test]
    fn test_election_is_deterministic() {
        let elector = ProposerElector::new(8888);
        let active = build_set(&[300_000, 200_000, 100_000]);

        let first = elector.next_proposer(1, 0, &active, None, 0).unwrap();
        let second = elector.next_proposer(1, 0, &active, None, 0).unwrap();
        assert_eq!(first, second);
        assert!(active.contains(&first));
    }

    #[test]
    fn test_round_bump_changes_seed() {
        let elector = ProposerElector::new(8888);
        let active = build_set(&[300_000, 200_000, 100_000, 150_000, 250_000]);

        // Different rounds at the same height may elect different proposers;
        // what matters is that each round is itself deterministic
        let round0 = elector.next_proposer(5, 0, &active, None, 0).unwrap();
        let round0_again = elector.next_proposer(5, 0, &active, None, 0).unwrap();
        assert_eq!(round0, round0_again);

        let round1 = elector.next_proposer(5, 0, &active, None, 1).unwrap();
        let round1_again = elector.next_proposer(5, 0, &active, None, 1).unwrap();
        assert_eq!(round1, round1_again);
    }

    #[test]
    fn test_previous_hash_feeds_seed() {
        let elector = ProposerElector::new(8888);
        let active = build_set(&[300_000, 200_000, 100_000]);

        let with_hash = elector
            .next_proposer(2, 0, &active, Some(&Hash::new([0xaa; 32])), 0)
            .unwrap();
        let with_hash_again = elector
            .next_proposer(2, 0, &active, Some(&Hash::new([0xaa; 32])), 0)
            .unwrap();
        assert_eq!(with_hash, with_hash_again);
    }

    #[test]
    fn test_commitment_vector() {
        // Commitment over [(0x0101…01, 100), (0x0202…02, 200)] must equal
        // the first 8 bytes of SHA-256("0x0101…01:100:0x0202…02:200:")
        let addr1 = Address::new([0x01; 20]);
        let addr2 = Address::new([0x02; 20]);

        let preimage = format!("{}:100:{}:200:", addr1.to_hex(), addr2.to_hex());
        let digest = Sha256::digest(preimage.as_bytes());
        let expected = hex::encode(&digest[..8]);

        // Entries deliberately out of address order: the commitment sorts
        use crate::registry::ActiveSetEntry;
        use chain_crypto::PublicKey;
        let make = |addr: Address, power: u64| ActiveSetEntry {
            address: addr,
            public_key: PublicKey::new(SignatureAlgorithm::Dilithium, vec![0u8; 1312]),
            algorithm: SignatureAlgorithm::Dilithium,
            total_stake: Amount::from_u64(power),
            voting_power: Amount::from_u64(power),
            reliability_score_millis: 1000,
        };
        let active = ActiveSet::from_entries(vec![make(addr2, 200), make(addr1, 100)]);

        assert_eq!(ProposerElector::set_commitment(&active), expected);
    }

    #[test]
    fn test_single_validator_always_selected() {
        let elector = ProposerElector::new(8888);
        let active = build_set(&[300_000]);
        let proposer = elector.next_proposer(1, 0, &active, None, 0).unwrap();
        assert_eq!(proposer, active.entries()[0].address);
    }

    #[test]
    fn test_nakamoto_coefficient() {
        let active = build_set(&[50_000, 20_000, 15_000, 10_000, 5_000]);
        let nakamoto = StakeDistribution::nakamoto_coefficient(&active);
        assert!(nakamoto > 0);
        assert!(nakamoto <= active.len());
    }

    #[test]
    fn test_gini_coefficient() {
        let active = build_set(&[10_000, 11_000, 12_000, 13_000]);
        let gini = StakeDistribution::gini_coefficient(&active);
        assert!((0.0..=1.0).contains(&gini));
    }
}
