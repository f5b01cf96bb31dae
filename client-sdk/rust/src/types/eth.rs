//! Ethereum fixed-width types with CBOR encodings.

// This `mod` exists solely to place an `#[allow(warnings)]` around the generated code.
#[allow(warnings)]
mod gen {
    use std::convert::TryFrom;

    /// Error returned when a byte slice does not have the expected width.
    #[derive(thiserror::Error, Debug, PartialEq, Eq)]
    #[error("invalid length: expected {expected}, got {actual}")]
    pub struct InvalidLength {
        pub expected: usize,
        pub actual: usize,
    }

    macro_rules! construct_fixed_hash {
        ($name:ident($num_bytes:literal)) => {
            fixed_hash::construct_fixed_hash! {
                pub struct $name($num_bytes);
            }

            impl cbor::Encode for $name {
                fn into_cbor_value(self) -> cbor::Value {
                    cbor::Value::ByteString(self.as_bytes().to_vec())
                }
            }

            impl cbor::Decode for $name {
                fn try_from_cbor_value(value: cbor::Value) -> Result<Self, cbor::DecodeError> {
                    match value {
                        cbor::Value::ByteString(v) if v.len() == $num_bytes => {
                            Ok(Self::from_slice(&v))
                        }
                        _ => Err(cbor::DecodeError::UnexpectedType),
                    }
                }
            }

            impl TryFrom<&[u8]> for $name {
                type Error = InvalidLength;

                fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                    if bytes.len() != $num_bytes {
                        return Err(InvalidLength {
                            expected: $num_bytes,
                            actual: bytes.len(),
                        });
                    }
                    Ok(Self::from_slice(bytes))
                }
            }
        };
    }

    macro_rules! construct_uint {
        ($name:ident($num_words:tt)) => {
            uint::construct_uint! {
                pub struct $name($num_words);
            }

            impl cbor::Encode for $name {
                fn into_cbor_value(self) -> cbor::Value {
                    let mut out = [0u8; 32];
                    self.to_big_endian(&mut out);
                    cbor::Value::ByteString(out.to_vec())
                }
            }

            impl cbor::Decode for $name {
                fn try_from_cbor_value(value: cbor::Value) -> Result<Self, cbor::DecodeError> {
                    match value {
                        cbor::Value::ByteString(v) if v.len() <= 32 => {
                            Ok(Self::from_big_endian(&v))
                        }
                        _ => Err(cbor::DecodeError::UnexpectedType),
                    }
                }
            }
        };
    }

    construct_fixed_hash!(H160(20));
    construct_fixed_hash!(H256(32));
    construct_uint!(U256(4));

    macro_rules! impl_upstream_conversions {
        ($($ty:ident),* $(,)?) => {
            $(
                impl From<$ty> for primitive_types::$ty {
                    fn from(t: $ty) -> Self {
                        Self(t.0)
                    }
                }

                impl From<primitive_types::$ty> for $ty {
                    fn from(t: primitive_types::$ty) -> Self {
                        Self(t.0)
                    }
                }

                impl From<&primitive_types::$ty> for $ty {
                    fn from(t: &primitive_types::$ty) -> Self {
                        Self(t.0)
                    }
                }
            )*
        };
    }

    impl_upstream_conversions!(H160, H256, U256);
}

pub use gen::{InvalidLength, H160, H256, U256};
