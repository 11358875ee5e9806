//! Data shared by every layer of case-document encryption: key material,
//! the packed envelope format and the record conventions used to store
//! encrypted attributes next to their plaintext names.

pub mod credentials;
pub mod envelope;
mod error;
pub mod record;

pub use crate::{
    credentials::{KEY_LENGTH, MasterSecret, SymmetricKey},
    envelope::{Envelope, EnvelopeFlavor},
    error::CryptoError,
    record::{Record, Resource},
};
