use {
    derive_more::Display,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    std::str::FromStr,
};

/// A persisted entity as the storage layer sees it: a flat JSON object.
pub type Record = Map<String, Value>;

pub const ID: &str = "id";
/// Identity the record's per-user keys are derived for.
pub const OWNER: &str = "userId";
pub const IS_ENCRYPTED: &str = "isEncrypted";
pub const ENCRYPTION_VERSION: &str = "encryptionVersion";
pub const IS_CLIENT_ENCRYPTED: &str = "isClientEncrypted";
pub const DECRYPTION_ERROR: &str = "decryptionError";
pub const ERROR_MESSAGE: &str = "errorMessage";

pub const CURRENT_ENCRYPTION_VERSION: &str = "1.0";

/// Written in place of a field that could not be decrypted.
pub const DECRYPTION_FAILED: &str = "[DECRYPTION_FAILED]";
/// Written in place of plaintext once its encrypted sibling exists.
pub const ENCRYPTED_PLACEHOLDER: &str = "[ENCRYPTED]";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    #[display("documents")]
    Documents,
    #[display("templates")]
    Templates,
}

impl Resource {
    pub const ALL: [Self; 2] = [Self::Documents, Self::Templates];

    /// Attributes that never reach storage in plaintext.
    #[must_use]
    #[inline]
    pub const fn sensitive_fields(self) -> &'static [&'static str] {
        match self {
            Self::Documents => &[
                "caseNumber",
                "crimeDescription",
                "statute",
                "transactionData",
                "requestedData",
            ],
            Self::Templates => &["name", "content", "markers", "customFields"],
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown resource `{0}`")]
pub struct UnknownResource(pub String);

impl FromStr for Resource {
    type Err = UnknownResource;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "documents" => Ok(Self::Documents),
            "templates" => Ok(Self::Templates),
            other => Err(UnknownResource(other.to_owned())),
        }
    }
}

/// Name of the attribute holding the envelope of `field`: `caseNumber`
/// is stored next to `encryptedCaseNumber`.
#[must_use]
#[inline]
pub fn encrypted_field_name(field: &str) -> String {
    let mut chars = field.chars();
    chars.next().map_or_else(
        || "encrypted".to_owned(),
        |first| format!("encrypted{}{}", first.to_uppercase(), chars.as_str()),
    )
}

#[must_use]
#[inline]
pub fn is_encrypted(record: &Record) -> bool {
    record.get(IS_ENCRYPTED).and_then(Value::as_bool) == Some(true)
}

#[must_use]
#[inline]
pub fn owner(record: &Record) -> Option<&str> {
    record
        .get(OWNER)
        .and_then(Value::as_str)
        .filter(|owner| !owner.is_empty())
}

#[must_use]
#[inline]
pub fn record_id(record: &Record) -> Option<&str> {
    record.get(ID).and_then(Value::as_str)
}
