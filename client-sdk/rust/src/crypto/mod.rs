//! Cryptographic primitives used by the call formats.
pub mod deoxysii;
pub mod x25519;
