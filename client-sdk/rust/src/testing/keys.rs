//! Module that contains known test keys.

/// Define a secp256k1 test account.
macro_rules! test_key_secp256k1 {
    ($doc:expr, $name:ident, $sk:expr) => {
        #[doc = " Test account "]
        #[doc=$doc]
        #[doc = "."]
        pub mod $name {
            use crate::{signer::MemorySigner, types::H160};

            #[doc = " Test signer "]
            #[doc=$doc]
            #[doc = "."]
            pub fn signer() -> MemorySigner {
                let sk: [u8; 32] = hex::FromHex::from_hex($sk).unwrap();
                MemorySigner::from_bytes(&sk).unwrap()
            }

            #[doc = " Test address "]
            #[doc=$doc]
            #[doc = "."]
            pub fn address() -> H160 {
                use crate::signer::Signer as _;
                signer().address()
            }
        }
    };
}

test_key_secp256k1!(
    "A",
    alice,
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
);
test_key_secp256k1!(
    "B",
    bob,
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
);
