use {
    super::{
        Cipher,
        kdf::{identity_salt, random_salt},
    },
    crate::context::CipherContext,
    casecrypt_protocol::{CryptoError, Envelope, EnvelopeFlavor},
    serde_json::Value,
};

/// Which key an envelope is sealed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyContext<'a> {
    /// The document key from configuration.
    Master,
    /// Per-user key salted with the hash of the user id (server-side fields).
    User(&'a str),
    /// Per-user key with a fresh random salt per envelope (client-shared fields).
    Shared(&'a str),
}

impl KeyContext<'_> {
    #[must_use]
    #[inline]
    pub const fn flavor(self) -> EnvelopeFlavor {
        match self {
            Self::Master => EnvelopeFlavor::Master,
            Self::User(_) => EnvelopeFlavor::UserIdentity,
            Self::Shared(_) => EnvelopeFlavor::UserShared,
        }
    }
}

/// Encrypts single text or JSON values into base64 envelopes.
///
/// Per-user keys are derived again on every call.
#[derive(Debug, Clone, Copy)]
pub struct TextCipher<'a> {
    ctx: &'a CipherContext,
}

impl<'a> TextCipher<'a> {
    #[must_use]
    #[inline]
    pub fn new(ctx: &'a CipherContext) -> Self {
        Self { ctx }
    }

    #[inline]
    pub fn seal(&self, plaintext: &[u8], key: KeyContext<'_>) -> Result<Envelope, CryptoError> {
        match key {
            KeyContext::Master => Ok(Cipher::new(self.ctx.document_key())
                .encrypt(plaintext)?
                .into_envelope(None)),
            KeyContext::User(identity) => {
                let salt = identity_salt(identity);
                let user_key = self.ctx.kdf().derive(self.ctx.master(), identity, &salt);
                Ok(Cipher::new(&user_key)
                    .encrypt(plaintext)?
                    .into_envelope(Some(salt.to_vec())))
            }
            KeyContext::Shared(identity) => {
                let salt = random_salt()?;
                let user_key = self.ctx.kdf().derive(self.ctx.master(), identity, &salt);
                Ok(Cipher::new(&user_key)
                    .encrypt(plaintext)?
                    .into_envelope(Some(salt.to_vec())))
            }
        }
    }

    #[inline]
    pub fn open(&self, envelope: &Envelope, key: KeyContext<'_>) -> Result<Vec<u8>, CryptoError> {
        match key {
            KeyContext::Master => Cipher::new(self.ctx.document_key()).open(envelope),
            KeyContext::User(identity) | KeyContext::Shared(identity) => {
                let salt = envelope.salt.as_deref().unwrap_or_default();
                let user_key = self.ctx.kdf().derive(self.ctx.master(), identity, salt);
                Cipher::new(&user_key).open(envelope)
            }
        }
    }

    #[inline]
    pub fn encrypt_text(&self, text: &str, key: KeyContext<'_>) -> Result<String, CryptoError> {
        Ok(self.seal(text.as_bytes(), key)?.to_base64())
    }

    #[inline]
    pub fn decrypt_text(&self, envelope: &str, key: KeyContext<'_>) -> Result<String, CryptoError> {
        let envelope = Envelope::from_base64(envelope, key.flavor())?;
        String::from_utf8(self.open(&envelope, key)?)
            .map_err(|_not_utf8| CryptoError::InvalidUtf8)
    }

    #[inline]
    pub fn encrypt_for_master(&self, text: &str) -> Result<String, CryptoError> {
        self.encrypt_text(text, KeyContext::Master)
    }

    #[inline]
    pub fn decrypt_for_master(&self, envelope: &str) -> Result<String, CryptoError> {
        self.decrypt_text(envelope, KeyContext::Master)
    }

    #[inline]
    pub fn encrypt_for_user(&self, text: &str, user_id: &str) -> Result<String, CryptoError> {
        self.encrypt_text(text, KeyContext::User(user_id))
    }

    #[inline]
    pub fn decrypt_for_user(&self, envelope: &str, user_id: &str) -> Result<String, CryptoError> {
        self.decrypt_text(envelope, KeyContext::User(user_id))
    }

    /// Non-string values are encrypted as their JSON text. Strings are
    /// encrypted as they are, unless the text would itself parse as JSON
    /// (`"2024"`, `"true"`, `"[1]"`); those are encrypted as a JSON string
    /// literal so that [`Self::decrypt_value`] gives back a string.
    #[inline]
    pub fn encrypt_value(&self, value: &Value, key: KeyContext<'_>) -> Result<String, CryptoError> {
        match value {
            Value::String(text) if serde_json::from_str::<Value>(text).is_err() => {
                self.encrypt_text(text, key)
            }
            other => self.encrypt_text(&serde_json::to_string(other)?, key),
        }
    }

    /// Decrypted text that parses as JSON comes back as that value; anything
    /// else stays a string. Inverse of [`Self::encrypt_value`] for every value.
    #[inline]
    pub fn decrypt_value(&self, envelope: &str, key: KeyContext<'_>) -> Result<Value, CryptoError> {
        let text = self.decrypt_text(envelope, key)?;
        Ok(serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text)))
    }
}
