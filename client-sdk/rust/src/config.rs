//! Network configuration.
use std::time::Duration;

/// Client configuration for a Sapphire network.
pub trait Config: Send + Sync + 'static {
    /// The chain ID used for signed queries and transactions.
    const CHAIN_ID: u64;

    /// Gas limit substituted into signed queries that leave it unset.
    const DEFAULT_GAS_LIMIT: u64 = 30_000_000;

    /// Gas price substituted into signed queries that leave it unset.
    const DEFAULT_GAS_PRICE: u64 = 100_000_000_000;

    /// Number of blocks after the leash anchor for which a signed query remains valid.
    const DEFAULT_BLOCK_RANGE: u64 = 15;

    /// Whether contract deployment transactions are encrypted.
    const ENCRYPT_DEPLOYS: bool = false;

    /// How long a fetched runtime public key is reused before asking the gateway again.
    const PUBLIC_KEY_CACHE_EXPIRATION: Duration = Duration::from_secs(5 * 60);
}

/// Static parameters of a known network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkParams {
    pub name: &'static str,
    pub chain_id: u64,
    pub default_gateway: &'static str,
    pub runtime_id: &'static str,
}

macro_rules! networks {
    ($($ty:ident => { name: $name:literal, chain_id: $chain_id:literal, gateway: $gateway:literal, runtime_id: $runtime_id:literal $(,)? }),* $(,)?) => {
        $(
            #[doc = concat!("The Sapphire ", $name, " network.")]
            #[derive(Clone, Copy, Debug, Default)]
            pub struct $ty;

            impl Config for $ty {
                const CHAIN_ID: u64 = $chain_id;
            }
        )*

        /// Parameters of all known networks.
        pub const NETWORKS: &[NetworkParams] = &[
            $(
                NetworkParams {
                    name: $name,
                    chain_id: $chain_id,
                    default_gateway: $gateway,
                    runtime_id: $runtime_id,
                },
            )*
        ];
    };
}

networks! {
    Mainnet => {
        name: "mainnet",
        chain_id: 0x5afe,
        gateway: "https://sapphire.oasis.io/",
        runtime_id: "0x000000000000000000000000000000000000000000000000f80306c9858e7279",
    },
    Testnet => {
        name: "testnet",
        chain_id: 0x5aff,
        gateway: "https://testnet.sapphire.oasis.dev/",
        runtime_id: "0x000000000000000000000000000000000000000000000000a6d1e3ebf60dff6c",
    },
    Localnet => {
        name: "localnet",
        chain_id: 0x5afd,
        gateway: "http://localhost:8545/",
        runtime_id: "0x8000000000000000000000000000000000000000000000000000000000000000",
    },
}

/// Look up a known network by chain ID.
pub fn network(chain_id: u64) -> Option<&'static NetworkParams> {
    NETWORKS.iter().find(|n| n.chain_id == chain_id)
}
