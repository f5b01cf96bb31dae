use crate::crypto::x25519;

/// Errors emitted by the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key agreement failed: {0}")]
    KeyAgreement(#[from] x25519::Error),

    #[error("authentication failure: unable to open sealed result")]
    AuthenticationFailure,

    #[error("could not decode call result: {}", hex::encode(.0))]
    ResultDecode(Vec<u8>),

    #[error("{message}")]
    CallFailed {
        module: String,
        code: u64,
        message: String,
    },

    #[error("unexpected inner call result: {}", hex::encode(.0))]
    UnexpectedResult(Vec<u8>),

    #[error("signing failed: {0}")]
    Signing(anyhow::Error),

    #[error("invalid public key length: expected 32 bytes, got {0}")]
    InvalidPublicKeyLength(usize),

    #[error("unable to fetch runtime public key: {0}")]
    KeyFetch(anyhow::Error),

    #[error("malformed envelope in call data")]
    MalformedEnvelope,

    #[error(transparent)]
    Backend(anyhow::Error),
}

impl Error {
    /// Whether the runtime executed the call and it failed, as opposed to the call never
    /// reaching (or never being understood by) the runtime.
    pub fn is_call_failure(&self) -> bool {
        matches!(self, Error::CallFailed { .. })
    }
}

impl From<crate::types::Failure> for Error {
    fn from(failure: crate::types::Failure) -> Self {
        Error::CallFailed {
            message: failure.message(),
            module: failure.module,
            code: failure.code,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Failure;

    #[test]
    fn test_call_failed_display() {
        let err: Error = Failure {
            module: "foo".to_string(),
            code: 7,
            message: String::new(),
        }
        .into();
        assert!(err.is_call_failure());
        assert_eq!(err.to_string(), "call failed in module foo with code 7");

        let err = Error::AuthenticationFailure;
        assert!(!err.is_call_failure());
    }
}
