use {
    casecrypt_protocol::{
        CryptoError, KEY_LENGTH, MasterSecret, SymmetricKey,
        envelope::{IDENTITY_SALT_LENGTH, SHARED_SALT_LENGTH},
    },
    pbkdf2::pbkdf2_hmac,
    rand::{TryRngCore, rngs::OsRng},
    sha2::{Digest, Sha256, Sha512},
    zeroize::Zeroize,
};

pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// PBKDF2-HMAC-SHA512 with a fixed iteration count.
///
/// The password is the master secret. The PBKDF2 salt is the envelope salt
/// followed by the identity, so a key is bound to its user even when the
/// salt itself travels in the clear next to the ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pbkdf2 {
    iterations: u32,
}

impl Default for Pbkdf2 {
    #[inline]
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl Pbkdf2 {
    #[must_use]
    #[inline]
    pub const fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: if iterations == 0 { 1 } else { iterations },
        }
    }

    #[must_use]
    #[inline]
    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    #[must_use]
    #[inline]
    pub fn derive(&self, master: &MasterSecret, identity: &str, salt: &[u8]) -> SymmetricKey {
        let mut input = Vec::with_capacity(salt.len().saturating_add(identity.len()));
        input.extend_from_slice(salt);
        input.extend_from_slice(identity.as_bytes());
        let mut output = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha512>(master.as_bytes(), &input, self.iterations, &mut output);
        let key = SymmetricKey::from_bytes(output);
        output.zeroize();
        key
    }

    /// Key for server-side per-user fields, salted with the identity hash.
    #[must_use]
    #[inline]
    pub fn derive_for_identity(&self, master: &MasterSecret, identity: &str) -> SymmetricKey {
        self.derive(master, identity, &identity_salt(identity))
    }
}

#[must_use]
#[inline]
pub fn identity_salt(identity: &str) -> [u8; IDENTITY_SALT_LENGTH] {
    Sha256::digest(identity.as_bytes()).into()
}

#[inline]
pub fn random_salt() -> Result<[u8; SHARED_SALT_LENGTH], CryptoError> {
    let mut salt = [0u8; SHARED_SALT_LENGTH];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|err| CryptoError::Random(err.to_string()))?;
    Ok(salt)
}
