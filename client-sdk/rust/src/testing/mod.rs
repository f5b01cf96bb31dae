//! Module which contains utilities useful for testing and development.

pub mod keys;
pub mod mock;
