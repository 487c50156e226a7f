// chain-crypto/src/signer.rs

use crate::{CryptoResult, KeyPair, PublicKey, Signature, SignatureAlgorithm};
use async_trait::async_trait;

/// Signing backend abstraction.
///
/// In-memory keys and HSM-backed keys implement the same interface; the
/// consensus core never sees raw private key material. Callers apply their
/// own timeout around `sign` since HSM round-trips can stall.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Algorithm this signer's key was generated under
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Public key of the backing key pair
    fn public_key(&self) -> &PublicKey;

    /// Sign a message with the backing key
    async fn sign(&self, message: &[u8]) -> CryptoResult<Signature>;
}

/// Signer backed by an in-memory key pair
pub struct InMemorySigner {
    keypair: KeyPair,
}

impl InMemorySigner {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Generate a fresh key pair and wrap it
    pub fn generate(algorithm: SignatureAlgorithm) -> CryptoResult<Self> {
        Ok(Self::new(KeyPair::generate(algorithm)?))
    }

    pub fn address(&self) -> crate::Address {
        self.keypair.public_key().to_address()
    }
}

#[async_trait]
impl Signer for InMemorySigner {
    fn algorithm(&self) -> SignatureAlgorithm {
        self.keypair.algorithm()
    }

    fn public_key(&self) -> &PublicKey {
        self.keypair.public_key()
    }

    async fn sign(&self, message: &[u8]) -> CryptoResult<Signature> {
        self.keypair.sign(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_signer() {
        let signer = InMemorySigner::generate(SignatureAlgorithm::Dilithium).unwrap();
        let message = b"signer message";

        let signature = signer.sign(message).await.unwrap();
        assert!(signer.public_key().verify(message, &signature).unwrap());
        assert_eq!(signer.address(), signer.public_key().to_address());
    }
}
