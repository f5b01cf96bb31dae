//! Signing capability used for signed queries.
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use k256::{
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint as _,
};
use rand::rngs::OsRng;
use sha3::{Digest as _, Keccak256};

use crate::types::H160;

/// Offset Ethereum wallets add to the recovery id.
pub const RECOVERY_ID_OFFSET: u8 = 27;

/// An account able to sign typed-data digests.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Ethereum address of the signing account.
    fn address(&self) -> H160;

    /// Sign a 32-byte digest, returning `r || s || v`.
    async fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 65]>;
}

/// A secp256k1 signer holding its key in memory.
pub struct MemorySigner {
    key: SigningKey,
    address: H160,
}

impl MemorySigner {
    /// Create a signer from a raw 32-byte secret key.
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(secret).map_err(|_| anyhow!("malformed secret key"))?;
        Ok(Self::from_key(key))
    }

    /// Create a signer with a fresh random key.
    pub fn random() -> Self {
        Self::from_key(SigningKey::random(&mut OsRng))
    }

    fn from_key(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }
}

#[async_trait]
impl Signer for MemorySigner {
    fn address(&self) -> H160 {
        self.address
    }

    async fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 65]> {
        let (signature, recovery_id) = self.key.sign_prehash_recoverable(digest)?;
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + RECOVERY_ID_OFFSET;
        Ok(out)
    }
}

/// Ethereum address of a secp256k1 public key.
pub fn address_of(key: &VerifyingKey) -> H160 {
    let digest = Keccak256::digest(&key.as_affine().to_encoded_point(false).as_bytes()[1..]);
    H160::from_slice(&digest[12..])
}

/// Recover the address that produced `signature` over `digest`.
///
/// Both raw (0/1) and wallet-style (27/28) recovery ids are accepted.
pub fn recover_address(digest: &[u8; 32], signature: &[u8; 65]) -> Result<H160> {
    let mut v = signature[64];
    if v >= RECOVERY_ID_OFFSET {
        v -= RECOVERY_ID_OFFSET;
    }
    let recovery_id = RecoveryId::from_byte(v).ok_or_else(|| anyhow!("invalid recovery id"))?;
    let signature = Signature::from_slice(&signature[..64])?;
    let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)?;
    Ok(address_of(&key))
}
