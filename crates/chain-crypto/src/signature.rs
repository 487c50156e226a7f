// chain-crypto/src/signature.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dilithium-II sizes (NIST parameter set, as exposed by the backend)
pub const DILITHIUM_PUBLIC_KEY_SIZE: usize = 1312;
pub const DILITHIUM_SECRET_KEY_SIZE: usize = 2528;
pub const DILITHIUM_SIGNATURE_SIZE: usize = 2420;

/// ed25519 sizes (classical half of the Falcon hybrid)
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;
pub const ED25519_SECRET_KEY_SIZE: usize = 32;
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// The Falcon hybrid keeps the legacy Falcon-512 wire slots: the classical
/// key occupies the first 32 bytes of an 897-byte slot and the classical
/// signature the first 64 bytes of a 2420-byte slot, each zero-padded, with
/// the Dilithium-II half appended.
pub const FALCON_CLASSICAL_KEY_SLOT: usize = 897;
pub const FALCON_CLASSICAL_SIG_SLOT: usize = 2420;

pub const FALCON_PUBLIC_KEY_SIZE: usize = FALCON_CLASSICAL_KEY_SLOT + DILITHIUM_PUBLIC_KEY_SIZE;
pub const FALCON_SECRET_KEY_SIZE: usize = ED25519_SECRET_KEY_SIZE + DILITHIUM_SECRET_KEY_SIZE;
pub const FALCON_SIGNATURE_SIZE: usize = FALCON_CLASSICAL_SIG_SLOT + DILITHIUM_SIGNATURE_SIZE;

/// Supported signature algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Dilithium-II (deterministic lattice signatures)
    Dilithium,
    /// Falcon hybrid: ed25519 + Dilithium-II in fixed-width slots
    Falcon,
}

impl SignatureAlgorithm {
    pub fn public_key_size(&self) -> usize {
        match self {
            SignatureAlgorithm::Dilithium => DILITHIUM_PUBLIC_KEY_SIZE,
            SignatureAlgorithm::Falcon => FALCON_PUBLIC_KEY_SIZE,
        }
    }

    pub fn secret_key_size(&self) -> usize {
        match self {
            SignatureAlgorithm::Dilithium => DILITHIUM_SECRET_KEY_SIZE,
            SignatureAlgorithm::Falcon => FALCON_SECRET_KEY_SIZE,
        }
    }

    pub fn signature_size(&self) -> usize {
        match self {
            SignatureAlgorithm::Dilithium => DILITHIUM_SIGNATURE_SIZE,
            SignatureAlgorithm::Falcon => FALCON_SIGNATURE_SIZE,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureAlgorithm::Dilithium => write!(f, "dilithium"),
            SignatureAlgorithm::Falcon => write!(f, "falcon"),
        }
    }
}

/// Digital signature wrapper carrying its algorithm tag
#[derive(Clone, Serialize, Deserialize)]
pub struct Signature {
    algorithm: SignatureAlgorithm,
    bytes: Vec<u8>,
}

impl Signature {
    /// Create a new signature
    pub fn new(algorithm: SignatureAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    /// Get the signature algorithm
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Get the signature bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get owned bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Parse from hex string
    pub fn from_hex(algorithm: SignatureAlgorithm, s: &str) -> Result<Self, crate::CryptoError> {
        let bytes = hex::decode(s)
            .map_err(|e| crate::CryptoError::DeserializationError(e.to_string()))?;
        Ok(Self::new(algorithm, bytes))
    }

    /// Verify this signature is valid for the given message and public key.
    ///
    /// Length mismatches, algorithm mismatches and invalid signatures all
    /// yield `Ok(false)`; attacker-supplied input never panics or errors.
    pub fn verify(
        &self,
        message: &[u8],
        public_key: &crate::PublicKey,
    ) -> Result<bool, crate::CryptoError> {
        if self.algorithm != public_key.algorithm() {
            return Ok(false);
        }
        if self.bytes.len() != self.algorithm.signature_size()
            || public_key.as_bytes().len() != self.algorithm.public_key_size()
        {
            return Ok(false);
        }

        match self.algorithm {
            SignatureAlgorithm::Dilithium => {
                Ok(verify_dilithium(message, &self.bytes, public_key.as_bytes()))
            }
            SignatureAlgorithm::Falcon => {
                Ok(verify_falcon(message, &self.bytes, public_key.as_bytes()))
            }
        }
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Signature({:?}, {}...)",
            self.algorithm,
            hex::encode(&self.bytes[..8.min(self.bytes.len())])
        )
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.bytes == other.bytes
    }
}

impl Eq for Signature {}

fn verify_dilithium(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    use pqcrypto_dilithium::dilithium2;
    use pqcrypto_traits::sign::{DetachedSignature, PublicKey};

    let pk = match dilithium2::PublicKey::from_bytes(public_key) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let sig = match dilithium2::DetachedSignature::from_bytes(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    dilithium2::verify_detached_signature(&sig, message, &pk).is_ok()
}

fn verify_falcon(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    use ed25519_dalek::{Verifier, VerifyingKey};

    // Trailing bytes of the classical slots must be zero; anything else is a
    // malleable encoding and is refused outright.
    if signature[ED25519_SIGNATURE_SIZE..FALCON_CLASSICAL_SIG_SLOT]
        .iter()
        .any(|b| *b != 0)
    {
        return false;
    }

    let ed_pk_bytes: [u8; ED25519_PUBLIC_KEY_SIZE] =
        match public_key[..ED25519_PUBLIC_KEY_SIZE].try_into() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
    let ed_pk = match VerifyingKey::from_bytes(&ed_pk_bytes) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let ed_sig_bytes: [u8; ED25519_SIGNATURE_SIZE] =
        match signature[..ED25519_SIGNATURE_SIZE].try_into() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
    let ed_sig = ed25519_dalek::Signature::from_bytes(&ed_sig_bytes);

    if ed_pk.verify(message, &ed_sig).is_err() {
        return false;
    }

    verify_dilithium(
        message,
        &signature[FALCON_CLASSICAL_SIG_SLOT..],
        &public_key[FALCON_CLASSICAL_KEY_SLOT..],
    )
}
