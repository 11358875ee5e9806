//! Packed envelope format shared by stored fields and file artifacts.
//!
//! Master-key envelopes are `IV(16) ‖ TAG(16) ‖ CIPHERTEXT`. Per-user
//! envelopes prepend the KDF salt: 32 bytes (the SHA-256 of the identity)
//! for server-side user fields, 64 random bytes for client-shared fields.
//! Stored fields are the standard base64 of the packed bytes; file artifacts
//! are the raw master-key layout.

use {
    crate::error::CryptoError,
    base64::{Engine, prelude::BASE64_STANDARD},
    derive_more::Display,
    std::fmt::{self, Debug},
};

pub const IV_LENGTH: usize = 16;
pub const TAG_LENGTH: usize = 16;
pub const IDENTITY_SALT_LENGTH: usize = 32;
pub const SHARED_SALT_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EnvelopeFlavor {
    /// Encrypted with the document key, no salt.
    #[display("master-key")]
    Master,
    /// Per-user key derived from the identity alone.
    #[display("per-user")]
    UserIdentity,
    /// Per-user key derived with a fresh random salt.
    #[display("shared per-user")]
    UserShared,
}

impl EnvelopeFlavor {
    #[must_use]
    #[inline]
    pub const fn salt_length(self) -> usize {
        match self {
            Self::Master => 0,
            Self::UserIdentity => IDENTITY_SALT_LENGTH,
            Self::UserShared => SHARED_SALT_LENGTH,
        }
    }

    /// Length of the fixed prefix; anything shorter cannot be an envelope.
    #[must_use]
    #[inline]
    pub const fn min_length(self) -> usize {
        self.salt_length() + IV_LENGTH + TAG_LENGTH
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    pub salt: Option<Vec<u8>>,
    pub iv: [u8; IV_LENGTH],
    pub tag: [u8; TAG_LENGTH],
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    #[must_use]
    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        let salt = self.salt.as_deref().unwrap_or_default();
        let mut bytes =
            Vec::with_capacity(salt.len() + IV_LENGTH + TAG_LENGTH + self.ciphertext.len());
        bytes.extend_from_slice(salt);
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.tag);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    #[must_use]
    #[inline]
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.to_bytes())
    }

    #[inline]
    pub fn unpack(bytes: &[u8], flavor: EnvelopeFlavor) -> Result<Self, CryptoError> {
        let malformed = || CryptoError::MalformedEnvelope {
            flavor,
            expected_at_least: flavor.min_length(),
            got: bytes.len(),
        };
        let (salt, rest) = bytes
            .split_at_checked(flavor.salt_length())
            .ok_or_else(malformed)?;
        let (iv, rest) = rest.split_first_chunk::<IV_LENGTH>().ok_or_else(malformed)?;
        let (tag, ciphertext) = rest
            .split_first_chunk::<TAG_LENGTH>()
            .ok_or_else(malformed)?;
        Ok(Self {
            salt: (!salt.is_empty()).then(|| salt.to_vec()),
            iv: *iv,
            tag: *tag,
            ciphertext: ciphertext.to_vec(),
        })
    }

    #[inline]
    pub fn from_base64(value: &str, flavor: EnvelopeFlavor) -> Result<Self, CryptoError> {
        let bytes = BASE64_STANDARD.decode(value.trim())?;
        Self::unpack(&bytes, flavor)
    }
}

impl Debug for Envelope {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("salt_len", &self.salt.as_ref().map(Vec::len))
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}
