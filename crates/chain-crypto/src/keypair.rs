// chain-crypto/src/keypair.rs

use crate::signature::{
    DILITHIUM_SECRET_KEY_SIZE, ED25519_SECRET_KEY_SIZE, ED25519_SIGNATURE_SIZE,
    FALCON_CLASSICAL_KEY_SLOT, FALCON_CLASSICAL_SIG_SLOT,
};
use crate::{CryptoError, CryptoResult, Signature, SignatureAlgorithm};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Public key wrapper
#[derive(Clone, Serialize, Deserialize)]
pub struct PublicKey {
    algorithm: SignatureAlgorithm,
    bytes: Vec<u8>,
}

impl PublicKey {
    pub fn new(algorithm: SignatureAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn from_hex(algorithm: SignatureAlgorithm, s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| CryptoError::DeserializationError(e.to_string()))?;
        Ok(Self::new(algorithm, bytes))
    }

    /// Verify a signature
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<bool> {
        signature.verify(message, self)
    }

    /// Derive an address from this public key
    pub fn to_address(&self) -> Address {
        Address::from_public_key(self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PublicKey({:?}, {}...)",
            self.algorithm,
            hex::encode(&self.bytes[..8.min(self.bytes.len())])
        )
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.bytes == other.bytes
    }
}

impl Eq for PublicKey {}

/// Secret/Private key wrapper (kept private)
pub struct SecretKey {
    algorithm: SignatureAlgorithm,
    bytes: Vec<u8>,
}

impl SecretKey {
    pub fn new(algorithm: SignatureAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        // Zero out the key material on drop for security
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey({:?}, [REDACTED])", self.algorithm)
    }
}

/// Key pair containing both public and secret keys
pub struct KeyPair {
    algorithm: SignatureAlgorithm,
    public_key: PublicKey,
    secret_key: SecretKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate(algorithm: SignatureAlgorithm) -> CryptoResult<Self> {
        match algorithm {
            SignatureAlgorithm::Dilithium => Self::generate_dilithium(),
            SignatureAlgorithm::Falcon => Self::generate_falcon(),
        }
    }

    fn generate_dilithium() -> CryptoResult<Self> {
        use pqcrypto_dilithium::dilithium2;
        use pqcrypto_traits::sign::{PublicKey as _, SecretKey as _};

        let (pk, sk) = dilithium2::keypair();

        Ok(Self {
            algorithm: SignatureAlgorithm::Dilithium,
            public_key: PublicKey::new(SignatureAlgorithm::Dilithium, pk.as_bytes().to_vec()),
            secret_key: SecretKey::new(SignatureAlgorithm::Dilithium, sk.as_bytes().to_vec()),
        })
    }

    fn generate_falcon() -> CryptoResult<Self> {
        use ed25519_dalek::SigningKey;
        use pqcrypto_dilithium::dilithium2;
        use pqcrypto_traits::sign::{PublicKey as _, SecretKey as _};
        use rand::rngs::OsRng;

        let mut csprng = OsRng;
        let ed_sk = SigningKey::generate(&mut csprng);
        let ed_pk = ed_sk.verifying_key();
        let (dl_pk, dl_sk) = dilithium2::keypair();

        // Pack the classical key into its legacy fixed-width slot
        let mut pk_bytes = vec![0u8; FALCON_CLASSICAL_KEY_SLOT];
        pk_bytes[..ed_pk.as_bytes().len()].copy_from_slice(ed_pk.as_bytes());
        pk_bytes.extend_from_slice(dl_pk.as_bytes());

        let mut sk_bytes = Vec::with_capacity(ED25519_SECRET_KEY_SIZE + DILITHIUM_SECRET_KEY_SIZE);
        sk_bytes.extend_from_slice(&ed_sk.to_bytes());
        sk_bytes.extend_from_slice(dl_sk.as_bytes());

        Ok(Self {
            algorithm: SignatureAlgorithm::Falcon,
            public_key: PublicKey::new(SignatureAlgorithm::Falcon, pk_bytes),
            secret_key: SecretKey::new(SignatureAlgorithm::Falcon, sk_bytes),
        })
    }

    /// Create keypair from existing keys
    pub fn from_keys(public_key: PublicKey, secret_key: SecretKey) -> CryptoResult<Self> {
        if public_key.algorithm() != secret_key.algorithm() {
            return Err(CryptoError::InvalidSecretKey);
        }

        Ok(Self {
            algorithm: public_key.algorithm(),
            public_key,
            secret_key,
        })
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> CryptoResult<Signature> {
        if self.secret_key.as_bytes().len() != self.algorithm.secret_key_size() {
            return Err(CryptoError::InvalidSecretKey);
        }

        match self.algorithm {
            SignatureAlgorithm::Dilithium => self.sign_dilithium(message),
            SignatureAlgorithm::Falcon => self.sign_falcon(message),
        }
    }

    fn sign_dilithium(&self, message: &[u8]) -> CryptoResult<Signature> {
        use pqcrypto_dilithium::dilithium2;
        use pqcrypto_traits::sign::{DetachedSignature as _, SecretKey as _};

        let sk = dilithium2::SecretKey::from_bytes(self.secret_key.as_bytes())
            .map_err(|_| CryptoError::InvalidSecretKey)?;

        let signature = dilithium2::detached_sign(message, &sk);
        Ok(Signature::new(
            SignatureAlgorithm::Dilithium,
            signature.as_bytes().to_vec(),
        ))
    }

    fn sign_falcon(&self, message: &[u8]) -> CryptoResult<Signature> {
        use ed25519_dalek::{Signer, SigningKey};
        use pqcrypto_dilithium::dilithium2;
        use pqcrypto_traits::sign::{DetachedSignature as _, SecretKey as _};

        let ed_sk_bytes: [u8; ED25519_SECRET_KEY_SIZE] = self.secret_key.as_bytes()
            [..ED25519_SECRET_KEY_SIZE]
            .try_into()
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        let ed_sk = SigningKey::from_bytes(&ed_sk_bytes);
        let ed_sig = ed_sk.sign(message);

        let dl_sk =
            dilithium2::SecretKey::from_bytes(&self.secret_key.as_bytes()[ED25519_SECRET_KEY_SIZE..])
                .map_err(|_| CryptoError::InvalidSecretKey)?;
        let dl_sig = dilithium2::detached_sign(message, &dl_sk);

        let mut bytes = vec![0u8; FALCON_CLASSICAL_SIG_SLOT];
        bytes[..ED25519_SIGNATURE_SIZE].copy_from_slice(&ed_sig.to_bytes());
        bytes.extend_from_slice(dl_sig.as_bytes());

        Ok(Signature::new(SignatureAlgorithm::Falcon, bytes))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm)
            .field("public_key", &self.public_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Validator address derived from a public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub struct Address([u8; 20]);

impl Address {
    /// Create address from bytes
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive address from a public key: the last 20 bytes of the SHA-256
    /// digest over the packed key bytes
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        use crate::hash::Hashable;

        let hash = public_key.as_bytes().hash();
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash.as_bytes()[12..32]);
        Self(address)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| CryptoError::DeserializationError(e.to_string()))?;
        if bytes.len() != 20 {
            return Err(CryptoError::DeserializationError("Invalid address length".into()));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn zero() -> Self {
        Self([0u8; 20])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp1 = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
        let kp2 = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
        assert_ne!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_key_sizes() {
        let dilithium = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
        assert_eq!(dilithium.public_key().as_bytes().len(), 1312);
        assert_eq!(dilithium.secret_key().as_bytes().len(), 2528);

        let falcon = KeyPair::generate(SignatureAlgorithm::Falcon).unwrap();
        assert_eq!(falcon.public_key().as_bytes().len(), 2209);
        assert_eq!(falcon.secret_key().as_bytes().len(), 2560);
    }

    #[test]
    fn test_sign_verify() {
        let keypair = KeyPair::generate(SignatureAlgorithm::Falcon).unwrap();
        let message = b"Hello, post-quantum chain!";

        let signature = keypair.sign(message).unwrap();
        assert!(keypair.public_key().verify(message, &signature).unwrap());
    }

    #[test]
    fn test_address_derivation() {
        let keypair = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
        let address1 = keypair.public_key().to_address();
        let address2 = Address::from_public_key(keypair.public_key());
        assert_eq!(address1, address2);
    }

    #[test]
    fn test_address_matches_key_digest() {
        use crate::hash::Hashable;

        let keypair = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
        let digest = keypair.public_key().as_bytes().hash();
        let address = keypair.public_key().to_address();
        assert_eq!(address.as_bytes(), &digest.as_bytes()[12..32]);
    }

    #[test]
    fn test_address_hex() {
        let address = Address::zero();
        let hex = address.to_hex();
        let parsed = Address::from_hex(&hex).unwrap();
        assert_eq!(address, parsed);
    }

    #[test]
    fn test_mismatched_keys_rejected() {
        let kp = KeyPair::generate(SignatureAlgorithm::Dilithium).unwrap();
        let pk = kp.public_key().clone();
        let sk = SecretKey::new(SignatureAlgorithm::Falcon, vec![0u8; 2560]);
        assert!(KeyPair::from_keys(pk, sk).is_err());
    }
}
