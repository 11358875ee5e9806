//! Transparent field encryption in front of a plain CRUD API.
//!
//! [`EncryptedResource`] is the only place where resource handling touches
//! encryption. Payloads are encrypted with the caller's per-user key before
//! they reach the base API, and records coming back are decrypted. Records
//! that cannot be decrypted as a whole are returned annotated instead of
//! failing the call.

use {
    crate::{
        context::CipherContext,
        crypto::KeyContext,
        fields::{PlaintextPolicy, RecordFieldEncryptor},
    },
    anyhow::{Result, bail},
    casecrypt_protocol::{
        Record, Resource,
        record::{
            DECRYPTION_ERROR, ENCRYPTED_PLACEHOLDER, ERROR_MESSAGE, IS_CLIENT_ENCRYPTED, OWNER,
            encrypted_field_name, is_encrypted, owner, record_id,
        },
    },
    serde_json::Value,
    tracing::warn,
};

/// Message put on records that could not be decrypted. It is the same for
/// every cause.
pub const DECRYPTION_ERROR_MESSAGE: &str = "This record could not be decrypted";

/// Storage-facing CRUD operations on records of one kind.
pub trait ResourceApi {
    /// Stores a new record and returns it as stored, with its id assigned.
    fn create(&self, resource: Resource, record: Record) -> Result<Record>;

    fn get(&self, resource: Resource, id: &str) -> Result<Option<Record>>;

    /// All records owned by `owner`.
    fn get_many(&self, resource: Resource, owner: &str) -> Result<Vec<Record>>;

    /// Merges `patch` into the stored record and returns the result.
    fn update(&self, resource: Resource, id: &str, patch: Record) -> Result<Record>;

    /// Removes a record, returning it if it existed.
    fn delete(&self, resource: Resource, id: &str) -> Result<Option<Record>>;
}

impl<T: ResourceApi + ?Sized> ResourceApi for &T {
    #[inline]
    fn create(&self, resource: Resource, record: Record) -> Result<Record> {
        (**self).create(resource, record)
    }

    #[inline]
    fn get(&self, resource: Resource, id: &str) -> Result<Option<Record>> {
        (**self).get(resource, id)
    }

    #[inline]
    fn get_many(&self, resource: Resource, owner: &str) -> Result<Vec<Record>> {
        (**self).get_many(resource, owner)
    }

    #[inline]
    fn update(&self, resource: Resource, id: &str, patch: Record) -> Result<Record> {
        (**self).update(resource, id, patch)
    }

    #[inline]
    fn delete(&self, resource: Resource, id: &str) -> Result<Option<Record>> {
        (**self).delete(resource, id)
    }
}

/// Wraps a [`ResourceApi`] for one resource kind.
///
/// Every call takes the id of the acting user; that user's shared per-user
/// key protects the resource's sensitive fields.
#[derive(Debug)]
pub struct EncryptedResource<'a, A> {
    api: A,
    resource: Resource,
    encryptor: RecordFieldEncryptor<'a>,
}

impl<'a, A: ResourceApi> EncryptedResource<'a, A> {
    #[must_use]
    #[inline]
    pub fn new(api: A, resource: Resource, ctx: &'a CipherContext) -> Self {
        Self {
            api,
            resource,
            encryptor: RecordFieldEncryptor::new(ctx).with_policy(PlaintextPolicy::Placeholder),
        }
    }

    #[must_use]
    #[inline]
    pub fn resource(&self) -> Resource {
        self.resource
    }

    #[must_use]
    #[inline]
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Encrypts the sensitive fields of an outgoing payload.
    ///
    /// The payload is assigned to `user_id`; a payload that names another
    /// owner is rejected.
    #[inline]
    pub fn seal_payload(&self, user_id: &str, payload: &Record) -> Result<Record> {
        if user_id.is_empty() {
            bail!("user id must not be empty");
        }
        if let Some(other) = owner(payload).filter(|other| *other != user_id) {
            bail!("payload belongs to {other:?}, not to {user_id:?}");
        }
        let mut sealed = self.encryptor.encrypt_fields(
            payload,
            self.resource.sensitive_fields(),
            KeyContext::Shared(user_id),
        )?;
        sealed.insert(OWNER.into(), user_id.into());
        sealed.insert(IS_CLIENT_ENCRYPTED.into(), Value::Bool(true));
        Ok(sealed)
    }

    /// Decrypts a record read from the base API.
    ///
    /// Never fails: a record that cannot be decrypted as a whole comes back
    /// with `decryptionError` and a generic `errorMessage` set.
    #[must_use]
    #[inline]
    pub fn open_record(&self, user_id: &str, record: Record) -> Record {
        match self.encryptor.decrypt_fields(
            &record,
            self.resource.sensitive_fields(),
            KeyContext::Shared(user_id),
        ) {
            Ok(decrypted) => decrypted,
            Err(err) => {
                warn!(
                    resource = %self.resource,
                    id = record_id(&record).unwrap_or_default(),
                    error = %err,
                    "record could not be decrypted"
                );
                let mut annotated = record;
                annotated.insert(DECRYPTION_ERROR.into(), Value::Bool(true));
                annotated.insert(ERROR_MESSAGE.into(), DECRYPTION_ERROR_MESSAGE.into());
                annotated
            }
        }
    }

    #[inline]
    pub fn create(&self, user_id: &str, payload: &Record) -> Result<Record> {
        let sealed = self.seal_payload(user_id, payload)?;
        let stored = self.api.create(self.resource, sealed)?;
        Ok(self.open_record(user_id, stored))
    }

    /// Records owned by another user are reported as missing.
    #[inline]
    pub fn get(&self, user_id: &str, id: &str) -> Result<Option<Record>> {
        Ok(self
            .api
            .get(self.resource, id)?
            .filter(|record| !is_foreign(user_id, record))
            .map(|record| self.open_record(user_id, record)))
    }

    #[inline]
    pub fn get_many(&self, user_id: &str) -> Result<Vec<Record>> {
        Ok(self
            .api
            .get_many(self.resource, user_id)?
            .into_iter()
            .map(|record| self.open_record(user_id, record))
            .collect())
    }

    /// Fails if the record does not exist or belongs to another user.
    ///
    /// A patch that neither sets nor clears a sensitive field is passed on as
    /// is. Otherwise, if the stored record is still plaintext, its remaining
    /// sensitive fields are encrypted along with the patch so the record never
    /// ends up half encrypted. Clearing a field with `null` also clears its
    /// envelope.
    #[inline]
    pub fn update(&self, user_id: &str, id: &str, patch: &Record) -> Result<Record> {
        if let Some(other) = owner(patch).filter(|other| *other != user_id) {
            bail!("patch assigns the record to {other:?}");
        }
        let existing = self.owned(user_id, id)?;
        let fields = self.resource.sensitive_fields();
        let mut payload = if fields.iter().any(|field| has_value(patch, field)) {
            let mut payload = patch.clone();
            if !is_encrypted(&existing) {
                for &field in fields {
                    if payload.contains_key(field) {
                        continue;
                    }
                    if let Some(value) = existing.get(field) {
                        payload.insert(field.into(), value.clone());
                    }
                }
            }
            self.seal_payload(user_id, &payload)?
        } else {
            patch.clone()
        };
        for &field in fields {
            if patch.get(field) == Some(&Value::Null) {
                let sibling = encrypted_field_name(field);
                if existing.contains_key(&sibling) {
                    payload.insert(sibling, Value::Null);
                }
            }
        }
        let stored = self.api.update(self.resource, id, payload)?;
        Ok(self.open_record(user_id, stored))
    }

    /// Fails if the record belongs to another user.
    #[inline]
    pub fn delete(&self, user_id: &str, id: &str) -> Result<Option<Record>> {
        if let Some(existing) = self.api.get(self.resource, id)?
            && is_foreign(user_id, &existing)
        {
            bail!("{} record {id} belongs to another user", self.resource);
        }
        Ok(self
            .api
            .delete(self.resource, id)?
            .map(|record| self.open_record(user_id, record)))
    }

    fn owned(&self, user_id: &str, id: &str) -> Result<Record> {
        let Some(existing) = self.api.get(self.resource, id)? else {
            bail!("{} record {id} does not exist", self.resource);
        };
        if is_foreign(user_id, &existing) {
            bail!("{} record {id} belongs to another user", self.resource);
        }
        Ok(existing)
    }
}

/// Whether `record` is owned by someone other than `user_id`. Records without
/// an owner belong to nobody in particular.
fn is_foreign(user_id: &str, record: &Record) -> bool {
    owner(record).is_some_and(|owner| owner != user_id)
}

fn has_value(record: &Record, field: &str) -> bool {
    match record.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => text != ENCRYPTED_PLACEHOLDER,
        Some(_) => true,
    }
}
