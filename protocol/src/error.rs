use {crate::envelope::EnvelopeFlavor, thiserror::Error};

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Tag verification failed.
    ///
    /// A wrong key, corrupted bytes and deliberate tampering all end up here
    /// and carry no further detail.
    #[error("authentication failed")]
    Authentication,

    #[error("malformed {flavor} envelope: expected at least {expected_at_least} bytes, got {got}")]
    MalformedEnvelope {
        flavor: EnvelopeFlavor,
        expected_at_least: usize,
        got: usize,
    },

    #[error("envelope is not valid base64")]
    Base64(#[from] base64::DecodeError),

    #[error("decrypted text is not valid UTF-8")]
    InvalidUtf8,

    #[error("encryption failed")]
    Encryption,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("random number generation failed: {0}")]
    Random(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported encryption version {0}")]
    UnsupportedVersion(String),

    #[error("field `{field}` does not hold an encrypted envelope")]
    InvalidField { field: String },
}

impl CryptoError {
    /// Whether the error means "this envelope cannot be opened".
    ///
    /// Callers must treat all of these the same way so that the reason is
    /// never observable from outside.
    #[must_use]
    #[inline]
    pub fn is_unreadable_envelope(&self) -> bool {
        matches!(
            self,
            Self::Authentication
                | Self::MalformedEnvelope { .. }
                | Self::Base64(_)
                | Self::InvalidUtf8
        )
    }
}
