use {
    crate::{
        context::CipherContext,
        crypto::{KeyContext, TextCipher},
    },
    casecrypt_protocol::{
        CryptoError, Record,
        record::{
            CURRENT_ENCRYPTION_VERSION, DECRYPTION_FAILED, ENCRYPTED_PLACEHOLDER,
            ENCRYPTION_VERSION, IS_ENCRYPTED, encrypted_field_name, is_encrypted, record_id,
        },
    },
    serde_json::Value,
    tracing::error,
};

/// What happens to a plaintext attribute once its envelope is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaintextPolicy {
    /// Delete the attribute.
    #[default]
    Remove,
    /// Replace the value with [`ENCRYPTED_PLACEHOLDER`].
    Placeholder,
}

/// Encrypts and decrypts a named set of attributes of a record in bulk.
#[derive(Debug, Clone, Copy)]
pub struct RecordFieldEncryptor<'a> {
    text: TextCipher<'a>,
    policy: PlaintextPolicy,
}

impl<'a> RecordFieldEncryptor<'a> {
    #[must_use]
    #[inline]
    pub fn new(ctx: &'a CipherContext) -> Self {
        Self {
            text: ctx.text(),
            policy: PlaintextPolicy::default(),
        }
    }

    #[must_use]
    #[inline]
    pub fn with_policy(mut self, policy: PlaintextPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Encrypts every listed field that is present and not null, and marks the
    /// record as encrypted.
    ///
    /// Absent and null fields get no sibling. A field that already holds the
    /// placeholder counts as absent, so encrypting an encrypted record again
    /// leaves its envelopes alone. Any failure fails the whole record.
    #[inline]
    pub fn encrypt_fields(
        &self,
        record: &Record,
        fields: &[&str],
        key: KeyContext<'_>,
    ) -> Result<Record, CryptoError> {
        let mut output = record.clone();
        for &field in fields {
            let envelope = match record.get(field) {
                None | Some(Value::Null) => continue,
                Some(Value::String(text)) if text == ENCRYPTED_PLACEHOLDER => continue,
                Some(value) => self.text.encrypt_value(value, key)?,
            };
            output.insert(encrypted_field_name(field), Value::String(envelope));
            match self.policy {
                PlaintextPolicy::Remove => {
                    output.remove(field);
                }
                PlaintextPolicy::Placeholder => {
                    output.insert(field.into(), ENCRYPTED_PLACEHOLDER.into());
                }
            }
        }
        output.insert(IS_ENCRYPTED.into(), Value::Bool(true));
        output.insert(
            ENCRYPTION_VERSION.into(),
            CURRENT_ENCRYPTION_VERSION.into(),
        );
        Ok(output)
    }

    /// Restores the listed fields from their encrypted siblings.
    ///
    /// Records that are not marked encrypted are returned unchanged. A null
    /// sibling marks a cleared field: it is dropped and the field is left as
    /// stored. A field
    /// whose envelope cannot be opened becomes [`DECRYPTION_FAILED`] and the
    /// rest of the record is still decrypted. Only problems with the record as
    /// a whole (unknown version, a sibling that is not a string) are errors.
    #[inline]
    pub fn decrypt_fields(
        &self,
        record: &Record,
        fields: &[&str],
        key: KeyContext<'_>,
    ) -> Result<Record, CryptoError> {
        if !is_encrypted(record) {
            return Ok(record.clone());
        }
        match record.get(ENCRYPTION_VERSION) {
            None => {}
            Some(Value::String(version)) if version == CURRENT_ENCRYPTION_VERSION => {}
            Some(other) => {
                let version = other.as_str().map_or_else(|| other.to_string(), str::to_owned);
                return Err(CryptoError::UnsupportedVersion(version));
            }
        }

        let mut output = record.clone();
        for &field in fields {
            let envelope = match output.remove(&encrypted_field_name(field)) {
                None | Some(Value::Null) => continue,
                Some(Value::String(envelope)) => envelope,
                Some(_) => {
                    return Err(CryptoError::InvalidField {
                        field: field.into(),
                    });
                }
            };
            let value = match self.text.decrypt_value(&envelope, key) {
                Ok(value) => value,
                Err(err) if err.is_unreadable_envelope() => {
                    error!(
                        id = record_id(record).unwrap_or_default(),
                        %field,
                        error = %err,
                        "failed to decrypt field"
                    );
                    DECRYPTION_FAILED.into()
                }
                Err(err) => return Err(err),
            };
            output.insert(field.into(), value);
        }
        Ok(output)
    }
}
