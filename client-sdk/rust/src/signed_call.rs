//! Signed queries.
//!
//! A signed query authenticates the caller of a read-only call without a transaction. The
//! caller signs the EIP-712 typed-data hash of the plaintext call and a [`Leash`] bounding
//! how long the signature stays valid.
use ethabi::Token;
use sha3::{Digest as _, Keccak256};

use crate::{
    backend::Header,
    callformat::Cipher,
    signer::{Signer, RECOVERY_ID_OFFSET},
    types::{Call, CallFormat, Leash, SignedCallDataPack, SimulateCallQuery},
    Error,
};

/// EIP-712 domain name of signed queries.
pub const DOMAIN_NAME: &str = "oasis-runtime-sdk/evm: signed query";

/// EIP-712 domain version of signed queries.
pub const DOMAIN_VERSION: &str = "1.0.0";

/// Build a leash anchored to the block preceding `head`.
///
/// A genesis head is its own anchor.
pub fn make_leash(nonce: u64, head: &Header, block_range: u64) -> Leash {
    let (block_number, block_hash) = match head.number.checked_sub(1) {
        Some(number) => (number, head.parent_hash),
        None => (head.number, head.hash),
    };
    Leash {
        nonce,
        block_number,
        block_hash,
        block_range,
    }
}

/// Sign the query and wrap it, together with the leash, into a data pack.
///
/// The pack carries the query data in a plain envelope; see
/// [`SignedCallDataPack::encrypt_data`]. The recovery byte of the signature is always 27 or 28.
pub async fn build_signed_call(
    signer: &dyn Signer,
    chain_id: u64,
    query: &SimulateCallQuery,
    leash: Leash,
) -> Result<SignedCallDataPack, Error> {
    if signer.address() != query.caller {
        return Err(Error::Signing(anyhow::anyhow!("signer is not the caller")));
    }

    let digest = hash_call_toplevel(chain_id, query, &leash);
    let mut signature = signer
        .sign_digest(&digest)
        .await
        .map_err(Error::Signing)?;
    if signature[64] < RECOVERY_ID_OFFSET {
        signature[64] += RECOVERY_ID_OFFSET;
    }

    Ok(SignedCallDataPack {
        data: Call::plain(query.data.clone()),
        leash,
        signature,
    })
}

impl SignedCallDataPack {
    /// Replace the plain data envelope with its encrypted form.
    ///
    /// The signature keeps covering the plaintext.
    pub fn encrypt_data(mut self, cipher: &Cipher) -> Self {
        if self.data.format != CallFormat::Plain {
            return self;
        }
        if let cbor::Value::ByteString(body) = &self.data.body {
            if let Some(envelope) = cipher.encrypt_envelope(body) {
                self.data = envelope;
            }
        }
        self
    }
}

macro_rules! leash_type_str {
    () => {
        concat!(
            "Leash",
            "(",
            "uint64 nonce",
            ",uint64 blockNumber",
            ",bytes32 blockHash",
            ",uint64 blockRange",
            ")",
        )
    };
}

/// Typed-data digest signed by the caller.
pub fn hash_call_toplevel(chain_id: u64, query: &SimulateCallQuery, leash: &Leash) -> [u8; 32] {
    let call_struct_hash = hash_call(query, leash);
    let domain_separator = hash_domain(chain_id);
    let mut encoded_call = [0u8; 66];
    encoded_call[0..2].copy_from_slice(b"\x19\x01");
    encoded_call[2..34].copy_from_slice(&domain_separator);
    encoded_call[34..].copy_from_slice(&call_struct_hash);
    Keccak256::digest(encoded_call).into()
}

fn hash_call(query: &SimulateCallQuery, leash: &Leash) -> [u8; 32] {
    const CALL_TYPE_STR: &str = concat!(
        "Call",
        "(",
        "address from",
        ",address to",
        ",uint64 gasLimit",
        ",uint256 gasPrice",
        ",uint256 value",
        ",bytes data",
        ",Leash leash",
        ")",
        leash_type_str!()
    );
    hash_encoded(&[
        encode_bytes(CALL_TYPE_STR),
        Token::Address(query.caller.0.into()),
        Token::Address(query.address.0.into()),
        Token::Uint(query.gas_limit.into()),
        Token::Uint(ethabi::ethereum_types::U256(query.gas_price.0)),
        Token::Uint(ethabi::ethereum_types::U256(query.value.0)),
        encode_bytes(&query.data),
        Token::Uint(hash_leash(leash).into()),
    ])
}

fn hash_leash(leash: &Leash) -> [u8; 32] {
    hash_encoded(&[
        encode_bytes(leash_type_str!()),
        Token::Uint(leash.nonce.into()),
        Token::Uint(leash.block_number.into()),
        Token::Uint(ethabi::ethereum_types::U256::from_big_endian(&leash.block_hash.0)),
        Token::Uint(leash.block_range.into()),
    ])
}

fn hash_domain(chain_id: u64) -> [u8; 32] {
    const DOMAIN_TYPE_STR: &str = "EIP712Domain(string name,string version,uint256 chainId)";
    hash_encoded(&[
        encode_bytes(DOMAIN_TYPE_STR),
        encode_bytes(DOMAIN_NAME),
        encode_bytes(DOMAIN_VERSION),
        Token::Uint(chain_id.into()),
    ])
}

fn encode_bytes(s: impl AsRef<[u8]>) -> Token {
    Token::FixedBytes(Keccak256::digest(s.as_ref()).to_vec())
}

fn hash_encoded(tokens: &[Token]) -> [u8; 32] {
    Keccak256::digest(ethabi::encode(tokens)).into()
}
