//! Deoxys-II-256-128 sealing helpers.
pub use deoxysii::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

use deoxysii::DeoxysII;
use rand::{rngs::OsRng, RngCore as _};

/// DeoxysII encryption and decryption errors.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("malformed nonce")]
    MalformedNonce,
    #[error("unable to decrypt message or authenticate additional data")]
    DecryptionFailed,
}

/// Draw a fresh nonce from the OS CSPRNG.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt and authenticate a message and authenticate additional data using
/// DeoxysII.
pub fn seal(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    message: &[u8],
    additional_data: &[u8],
) -> Vec<u8> {
    DeoxysII::new(key).seal(nonce, message, additional_data)
}

/// Decrypt and authenticate a message and authenticate additional data using
/// DeoxysII.
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8],
    message: &[u8],
    additional_data: &[u8],
) -> Result<Vec<u8>, Error> {
    let nonce: &[u8; NONCE_SIZE] = nonce.try_into().map_err(|_| Error::MalformedNonce)?;
    let mut message = message.to_vec();
    DeoxysII::new(key)
        .open(nonce, &mut message, additional_data)
        .map_err(|_| Error::DecryptionFailed)
}
