//! X25519 key agreement.
use std::fmt;

use hmac::{
    digest::{generic_array::GenericArray, FixedOutput},
    Hmac, Mac,
};
use rand::rngs::OsRng;
use sha2::Sha512_256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::deoxysii::KEY_SIZE;

/// Domain separation label of the key derivation function.
const KDF_CONTEXT: &[u8] = b"MRAE_Box_Deoxys-II-256-128";

/// x25519 key derivation errors.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("malformed public key")]
    MalformedPublicKey,
    #[error("malformed private key")]
    MalformedPrivateKey,
    #[error("non-contributory key exchange")]
    NonContributory,
    #[error("key derivation function failure")]
    KeyDerivationFunctionFailure,
}

/// An ephemeral X25519 key pair.
///
/// The secret is wiped when the key pair is dropped.
pub struct KeyPair {
    public: PublicKey,
    secret: StaticSecret,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Create a key pair from a raw secret scalar.
    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(secret))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        Self {
            public: PublicKey::from(&secret),
            secret,
        }
    }

    /// Public part of the key pair.
    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Derive the symmetric key shared with `peer_public_key`.
    pub fn derive_symmetric(
        &self,
        peer_public_key: &[u8; 32],
    ) -> Result<Zeroizing<[u8; KEY_SIZE]>, Error> {
        derive(&self.secret, &PublicKey::from(*peer_public_key))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Derive a symmetric encryption key from the provided public/private key
/// pair.
pub fn derive_symmetric(
    public_key: &[u8],
    private_key: &[u8],
) -> Result<Zeroizing<[u8; KEY_SIZE]>, Error> {
    let public: [u8; 32] = public_key
        .try_into()
        .map_err(|_| Error::MalformedPublicKey)?;
    let private = StaticSecret::from(
        <[u8; 32]>::try_from(private_key).map_err(|_| Error::MalformedPrivateKey)?,
    );

    derive(&private, &PublicKey::from(public))
}

fn derive(private: &StaticSecret, public: &PublicKey) -> Result<Zeroizing<[u8; KEY_SIZE]>, Error> {
    // Shared secret is zeroized on drop.
    let shared = private.diffie_hellman(public);
    if !shared.was_contributory() {
        return Err(Error::NonContributory);
    }

    let mut kdf = Hmac::<Sha512_256>::new_from_slice(KDF_CONTEXT)
        .map_err(|_| Error::KeyDerivationFunctionFailure)?;
    kdf.update(shared.as_bytes());
    drop(shared);

    // Output is exactly KEY_SIZE bytes and goes straight into the wiped buffer.
    let mut derived_key = Zeroizing::new([0u8; KEY_SIZE]);
    FixedOutput::finalize_into(kdf, GenericArray::from_mut_slice(&mut derived_key[..]));

    Ok(derived_key)
}
