//! Handling of different call formats.
use std::fmt;

use zeroize::Zeroizing;

use crate::{
    crypto::{
        deoxysii::{self, KEY_SIZE},
        x25519::KeyPair,
    },
    keymanager::RuntimePublicKey,
    types::{
        callformat::NONCE_SIZE, Call, CallEnvelopeX25519DeoxysII, CallFormat, CallResult,
        ResultEnvelopeX25519DeoxysII,
    },
    Error,
};

/// Call data cipher.
///
/// A cipher is immutable once constructed and may be shared between concurrent calls. Every
/// encryption draws a fresh nonce from the OS CSPRNG.
pub enum Cipher {
    /// Plain text pass-through.
    Plain,
    /// X25519 key agreement with Deoxys-II sealing.
    X25519DeoxysII(X25519DeoxysII),
}

/// State of the encrypting cipher variant.
pub struct X25519DeoxysII {
    /// Our ephemeral public key, sent along with every envelope.
    public_key: [u8; 32],
    /// Epoch of the runtime key the shared key was derived for.
    epoch: Option<u64>,
    /// Derived shared key.
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cipher::Plain => f.write_str("Cipher::Plain"),
            Cipher::X25519DeoxysII(inner) => f
                .debug_struct("Cipher::X25519DeoxysII")
                .field("public_key", &hex::encode(inner.public_key))
                .field("epoch", &inner.epoch)
                .finish_non_exhaustive(),
        }
    }
}

impl Cipher {
    /// Create an encrypting cipher for the given runtime public key.
    ///
    /// The key pair is consumed; only the derived shared key is kept.
    pub fn new_x25519_deoxysii(
        keypair: KeyPair,
        peer_public_key: &[u8; 32],
        epoch: Option<u64>,
    ) -> Result<Self, Error> {
        let key = keypair.derive_symmetric(peer_public_key)?;
        Ok(Cipher::X25519DeoxysII(X25519DeoxysII {
            public_key: keypair.public_key(),
            epoch,
            key,
        }))
    }

    /// Create an encrypting cipher for a fetched runtime key, using a fresh ephemeral key pair.
    pub fn from_runtime_public_key(pk: &RuntimePublicKey) -> Result<Self, Error> {
        Self::new_x25519_deoxysii(KeyPair::generate(), &pk.key, Some(pk.epoch))
    }

    /// Call format produced by this cipher.
    pub fn format(&self) -> CallFormat {
        match self {
            Cipher::Plain => CallFormat::Plain,
            Cipher::X25519DeoxysII(_) => CallFormat::EncryptedX25519DeoxysII,
        }
    }

    /// Our ephemeral public key, if any.
    pub fn public_key(&self) -> Option<[u8; 32]> {
        match self {
            Cipher::Plain => None,
            Cipher::X25519DeoxysII(inner) => Some(inner.public_key),
        }
    }

    /// Epoch of the runtime key this cipher encrypts to, if any.
    pub fn epoch(&self) -> Option<u64> {
        match self {
            Cipher::Plain => None,
            Cipher::X25519DeoxysII(inner) => inner.epoch,
        }
    }

    /// Encrypt the plaintext, returning the ciphertext and the nonce used.
    pub fn encrypt(&self, plaintext: &[u8]) -> (Vec<u8>, Vec<u8>) {
        match self {
            Cipher::Plain => (plaintext.to_vec(), Vec::new()),
            Cipher::X25519DeoxysII(inner) => {
                let (ciphertext, nonce) = inner.seal(plaintext);
                (ciphertext, nonce.to_vec())
            }
        }
    }

    /// Decrypt the ciphertext sealed under the given nonce.
    pub fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        match self {
            Cipher::Plain => Ok(ciphertext.to_vec()),
            Cipher::X25519DeoxysII(inner) => {
                deoxysii::open(&inner.key, nonce, ciphertext, b"")
                    .map_err(|_| Error::AuthenticationFailure)
            }
        }
    }

    /// Wrap call data into an envelope.
    ///
    /// Returns `None` for empty call data; such transactions are plain value transfers and
    /// carry no envelope.
    pub fn encrypt_envelope(&self, plaintext: &[u8]) -> Option<Call> {
        if plaintext.is_empty() {
            return None;
        }

        match self {
            Cipher::Plain => Some(Call::plain(plaintext.to_vec())),
            Cipher::X25519DeoxysII(inner) => {
                let (data, nonce) = inner.seal(&cbor::to_vec(Call::plain(plaintext.to_vec())));
                Some(Call {
                    format: CallFormat::EncryptedX25519DeoxysII,
                    body: cbor::to_value(CallEnvelopeX25519DeoxysII {
                        pk: inner.public_key,
                        nonce,
                        data,
                        epoch: inner.epoch,
                    }),
                })
            }
        }
    }

    /// Wrap call data into an envelope and serialize it.
    ///
    /// Empty call data stays empty.
    pub fn encrypt_encode(&self, plaintext: &[u8]) -> Vec<u8> {
        self.encrypt_envelope(plaintext)
            .map(cbor::to_vec)
            .unwrap_or_default()
    }

    /// Decode a raw call result, opening the sealed inner result when there is one.
    pub fn decrypt_call_result(&self, raw: &[u8]) -> Result<Vec<u8>, Error> {
        let result: CallResult =
            cbor::from_slice(raw).map_err(|_| Error::ResultDecode(raw.to_vec()))?;

        let envelope = match (self, result) {
            (_, CallResult::Failed(failure)) => return Err(failure.into()),

            // Plain results are never sealed.
            (Cipher::Plain, CallResult::Ok(value)) => return Ok(into_bytes(value)),
            (Cipher::Plain, CallResult::Unknown(value)) => {
                return Ok(match value {
                    cbor::Value::Map(_) => match parse_result_envelope(&value) {
                        Some(envelope) => envelope.data,
                        None => into_bytes(value),
                    },
                    _ => into_bytes(value),
                })
            }

            // Runtimes that do not encrypt the result return it as-is.
            (Cipher::X25519DeoxysII(_), CallResult::Ok(value)) => {
                match parse_result_envelope(&value) {
                    Some(envelope) => envelope,
                    None => return Ok(into_bytes(value)),
                }
            }

            (Cipher::X25519DeoxysII(_), CallResult::Unknown(value)) => {
                parse_result_envelope(&value).ok_or_else(|| Error::ResultDecode(raw.to_vec()))?
            }
        };

        let plaintext = self.decrypt(&envelope.nonce, &envelope.data)?;
        decode_inner_result(plaintext)
    }
}

impl X25519DeoxysII {
    fn seal(&self, plaintext: &[u8]) -> (Vec<u8>, [u8; NONCE_SIZE]) {
        let nonce = deoxysii::generate_nonce();
        let ciphertext = deoxysii::seal(&self.key, &nonce, plaintext, b"");
        (ciphertext, nonce)
    }
}

/// Interpret a result value as a sealed result envelope, either embedded directly or
/// serialized into a byte string.
fn parse_result_envelope(value: &cbor::Value) -> Option<ResultEnvelopeX25519DeoxysII> {
    match value {
        cbor::Value::ByteString(raw) => cbor::from_slice(raw).ok(),
        cbor::Value::Map(_) => cbor::from_value(value.clone()).ok(),
        _ => None,
    }
}

fn decode_inner_result(plaintext: Vec<u8>) -> Result<Vec<u8>, Error> {
    let inner: CallResult = match cbor::from_slice(&plaintext) {
        Ok(inner) => inner,
        Err(_) => return Err(Error::UnexpectedResult(plaintext)),
    };
    match inner {
        CallResult::Ok(value) | CallResult::Unknown(value) => Ok(into_bytes(value)),
        CallResult::Failed(failure) => Err(failure.into()),
    }
}

fn into_bytes(value: cbor::Value) -> Vec<u8> {
    match value {
        cbor::Value::ByteString(data) => data,
        other => cbor::to_vec(other),
    }
}
