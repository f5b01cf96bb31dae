//! Client for confidential calls to the Sapphire ParaTime.
//!
//! Call data is encrypted end-to-end with the runtime using an ephemeral X25519 key pair and
//! Deoxys-II. Read-only calls from a known account are additionally signed as EIP-712 typed
//! data so the runtime can authenticate the caller without a transaction.
#![deny(rust_2018_idioms, unreachable_pub)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod callformat;
pub mod client;
pub mod config;
pub mod crypto;
mod error;
pub mod keymanager;
pub mod logger;
pub mod signed_call;
pub mod signer;
#[cfg(any(test, feature = "test"))]
pub mod testing;
pub mod types;

#[cfg(test)]
mod test;

pub use callformat::Cipher;
pub use client::Client;
pub use error::Error;
