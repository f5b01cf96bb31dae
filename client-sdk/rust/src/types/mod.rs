//! Wire types shared with the confidential runtime.
pub mod callformat;
pub mod eth;

pub use callformat::{
    Call, CallEnvelopeX25519DeoxysII, CallFormat, CallResult, Failure,
    ResultEnvelopeX25519DeoxysII,
};
pub use eth::{H160, H256, U256};

/// The plaintext intent of a signed query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulateCallQuery {
    pub gas_price: U256,
    pub gas_limit: u64,
    pub caller: H160,
    pub address: H160,
    pub value: U256,
    pub data: Vec<u8>,
}

/// Freshness bound of a signed query.
///
/// The runtime accepts the query only while the caller's nonce is not stale and the current
/// block is within `block_range` blocks of `block_number`, whose hash must be `block_hash`.
#[derive(Clone, Debug, Default, PartialEq, Eq, cbor::Encode, cbor::Decode)]
pub struct Leash {
    pub nonce: u64,
    pub block_number: u64,
    pub block_hash: H256,
    pub block_range: u64,
}

/// A signed simulate call data pack.
///
/// The signature is over the typed-data hash of the *plaintext* call and the leash. The `data`
/// envelope may be encrypted after signing.
#[derive(Clone, Debug, PartialEq, Eq, cbor::Encode, cbor::Decode)]
pub struct SignedCallDataPack {
    pub data: Call,
    pub leash: Leash,
    pub signature: [u8; 65],
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Generated using the `@oasisprotocol/sapphire-paratime` JS library.
    pub(crate) const SIGNED_CALL_DATA_PACK: &str =
"a36464617461a164626f64794401020304656c65617368a4656e6f6e63651903e76a626c6f636b5f686173685820c92b675c7013e33aa88feaae520eb0ede155e7cacb3c4587e0923cba9953f8bb6b626c6f636b5f72616e6765036c626c6f636b5f6e756d626572182a697369676e6174757265584148bca100e84d13a80b131c62b9b87caf07e4da6542a9e1ea16d8042ba08cc1e31f10ae924d8c137882204e9217423194014ce04fa2130c14f27b148858733c7b1c";

    #[test]
    fn test_signed_call_data_pack_layout() {
        let raw = hex::decode(SIGNED_CALL_DATA_PACK).unwrap();
        let pack: SignedCallDataPack = cbor::from_slice(&raw).unwrap();

        assert_eq!(pack.data, Call::plain(vec![1, 2, 3, 4]));
        assert_eq!(pack.leash.nonce, 999);
        assert_eq!(pack.leash.block_number, 42);
        assert_eq!(pack.leash.block_range, 3);
        assert_eq!(
            hex::encode(pack.leash.block_hash),
            "c92b675c7013e33aa88feaae520eb0ede155e7cacb3c4587e0923cba9953f8bb"
        );
        assert_eq!(pack.signature[64], 0x1c);

        // Byte-exact re-encoding.
        assert_eq!(cbor::to_vec(pack), raw);
    }
}
