pub mod client;
pub mod context;
pub mod crypto;
pub mod fields;

pub use crate::{
    client::{EncryptedResource, ResourceApi},
    context::{CipherContext, ConfigurationError, KeyMaterialSource, KeyOrigin, Profile},
    crypto::{FileCipher, KeyContext, TextCipher},
    fields::{PlaintextPolicy, RecordFieldEncryptor},
};
