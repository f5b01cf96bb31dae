//! Types related to call formats.

/// Size of the Deoxys-II nonce carried in envelopes.
pub const NONCE_SIZE: usize = deoxysii::NONCE_SIZE;

/// Call data format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, cbor::Encode, cbor::Decode)]
#[cbor(with_default)]
#[repr(u8)]
pub enum CallFormat {
    /// Plain text call data.
    #[default]
    Plain = 0,

    /// Encrypted call data using X25519 for key exchange and Deoxys-II for symmetric encryption.
    EncryptedX25519DeoxysII = 1,
}

/// Envelope carried in the `data` field of calls and transactions.
///
/// For the plain format the body is the call data itself. The same shape (with the plain
/// format) is what gets sealed inside an encrypted envelope.
#[derive(Clone, Debug, Default, PartialEq, cbor::Encode, cbor::Decode)]
pub struct Call {
    #[cbor(optional)]
    pub format: CallFormat,
    pub body: cbor::Value,
}

impl Call {
    /// Wrap raw call data into a plain envelope.
    pub fn plain(data: Vec<u8>) -> Self {
        Self {
            format: CallFormat::Plain,
            body: cbor::Value::ByteString(data),
        }
    }
}

/// A call envelope when using the EncryptedX25519DeoxysII format.
#[derive(Clone, Debug, Default, PartialEq, Eq, cbor::Encode, cbor::Decode)]
pub struct CallEnvelopeX25519DeoxysII {
    /// Caller's ephemeral public key used for X25519.
    pub pk: [u8; 32],
    /// Nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Encrypted call data.
    pub data: Vec<u8>,
    /// Epoch of the runtime key the call was encrypted to.
    #[cbor(optional)]
    pub epoch: Option<u64>,
}

/// A result envelope when using the EncryptedX25519DeoxysII format.
#[derive(Clone, Debug, Default, PartialEq, Eq, cbor::Encode, cbor::Decode)]
pub struct ResultEnvelopeX25519DeoxysII {
    /// Nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Encrypted call result.
    pub data: Vec<u8>,
}

/// Details of a failed call.
#[derive(Clone, Debug, Default, PartialEq, Eq, cbor::Encode, cbor::Decode)]
pub struct Failure {
    #[cbor(optional)]
    pub module: String,
    pub code: u64,
    #[cbor(optional)]
    pub message: String,
}

impl Failure {
    /// Explicit message, or one synthesized from the module and code.
    pub fn message(&self) -> String {
        if self.message.is_empty() {
            format!(
                "call failed in module {} with code {}",
                self.module, self.code
            )
        } else {
            self.message.clone()
        }
    }
}

/// Call result.
///
/// Failures are accepted under both the `fail` and `failure` keys. Exactly one variant must
/// be present.
#[derive(Clone, Debug, PartialEq)]
pub enum CallResult {
    Ok(cbor::Value),
    Failed(Failure),
    Unknown(cbor::Value),
}

impl CallResult {
    /// Check whether the call result indicates a successful operation or not.
    pub fn is_success(&self) -> bool {
        !matches!(self, CallResult::Failed(_))
    }
}

impl cbor::Encode for CallResult {
    fn into_cbor_value(self) -> cbor::Value {
        let (key, value) = match self {
            Self::Ok(value) => ("ok", value),
            Self::Failed(failure) => ("fail", cbor::to_value(failure)),
            Self::Unknown(value) => ("unknown", value),
        };
        cbor::Value::Map(vec![(cbor::Value::TextString(key.to_string()), value)])
    }
}

impl cbor::Decode for CallResult {
    fn try_from_cbor_value(value: cbor::Value) -> Result<Self, cbor::DecodeError> {
        let entries = match value {
            cbor::Value::Map(entries) => entries,
            _ => return Err(cbor::DecodeError::UnexpectedType),
        };

        let mut result = None;
        for (key, value) in entries {
            let variant = match key {
                cbor::Value::TextString(key) => match key.as_str() {
                    "ok" => Self::Ok(value),
                    "fail" | "failure" => Self::Failed(cbor::from_value(value)?),
                    "unknown" => Self::Unknown(value),
                    _ => return Err(cbor::DecodeError::UnexpectedType),
                },
                _ => return Err(cbor::DecodeError::UnexpectedType),
            };
            if result.replace(variant).is_some() {
                // More than one variant present.
                return Err(cbor::DecodeError::UnexpectedType);
            }
        }
        result.ok_or(cbor::DecodeError::MissingField)
    }
}
