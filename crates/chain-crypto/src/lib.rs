// chain-crypto/src/lib.rs

//! Cryptographic primitives for the post-quantum proof-of-stake chain
//!
//! This crate provides:
//! - SHA-256 hashing behind a fixed 32-byte `Hash` type
//! - Lattice-based digital signatures (Dilithium-II and the Falcon hybrid)
//! - Key pair generation and 20-byte address derivation
//! - The `Signer` abstraction shared by in-memory and HSM-backed keys

pub mod hash;
pub mod signature;
pub mod keypair;
pub mod signer;

pub use hash::{Hash, Hashable, HASH_SIZE};
pub use signature::{Signature, SignatureAlgorithm};
pub use keypair::{Address, KeyPair, PublicKey, SecretKey};
pub use signer::{InMemorySigner, Signer};

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Invalid hash")]
    InvalidHash,

    #[error("Signing backend failure: {0}")]
    SignFailure(String),

    #[error("Verification backend failure: {0}")]
    VerifyFailure(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_basics() {
        // Smoke test
        let keypair = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
        let message = b"Hello, post-quantum chain!";
        let signature = keypair.sign(message).unwrap();
        assert!(keypair.public_key().verify(message, &signature).unwrap());
    }
}
