//! All encryption operations use AES-256-GCM with a 128-bit IV.
//!
//! A fresh random IV is generated inside every encryption call; there is no API
//! that accepts an IV for encryption, so nonce reuse under one key cannot be
//! expressed by callers. The tag is kept detached from the ciphertext so that
//! envelopes can lay out `IV ‖ TAG ‖ CIPHERTEXT` explicitly.
//!
//! Two kinds of keys are used:
//!
//! - the document key, a fixed 256-bit key from configuration. It encrypts
//!   files and master-key text fields.
//! - per-user keys, derived on every call with PBKDF2-HMAC-SHA512 from the
//!   master secret, the user id and a salt. They are never cached or stored.
//!   Server-side user fields salt with the SHA-256 of the user id; fields
//!   shared with the client use a fresh 64-byte random salt, carried in front
//!   of the envelope so the reader can derive the same key again.
//!
//! File artifacts are the raw bytes `IV ‖ TAG ‖ CIPHERTEXT` of the whole file,
//! encrypted in one pass. They are written next to the original under a
//! different name and made durable before the caller may remove the original.

mod cipher;
mod file;
mod kdf;
mod text;

pub use {
    cipher::{Cipher, Sealed},
    file::{
        ALGORITHM, ARTIFACT_EXTENSION, FileCipher, FileEncryptionMetadata, artifact_path,
        plaintext_path,
    },
    kdf::{DEFAULT_ITERATIONS, Pbkdf2, identity_salt, random_salt},
    text::{KeyContext, TextCipher},
};
