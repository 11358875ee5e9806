use {
    aes_gcm::{
        AesGcm, Key, Nonce, Tag,
        aead::{self, AeadInPlace, KeyInit, consts::U16},
        aes::Aes256,
    },
    casecrypt_protocol::{
        CryptoError, Envelope, SymmetricKey,
        envelope::{IV_LENGTH, TAG_LENGTH},
    },
    rand::{TryRngCore, rngs::OsRng},
    std::fmt::{self, Debug},
};

/// AES-256-GCM with a 16-byte nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Result of one encryption: the IV it generated, the detached tag and the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: [u8; IV_LENGTH],
    pub tag: [u8; TAG_LENGTH],
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    #[must_use]
    #[inline]
    pub fn into_envelope(self, salt: Option<Vec<u8>>) -> Envelope {
        Envelope {
            salt,
            iv: self.iv,
            tag: self.tag,
            ciphertext: self.ciphertext,
        }
    }
}

pub struct Cipher {
    inner: Aes256Gcm16,
}

impl Cipher {
    #[must_use]
    #[inline]
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            inner: Aes256Gcm16::new(Key::<Aes256Gcm16>::from_slice(key.as_bytes())),
        }
    }

    #[inline]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed, CryptoError> {
        let mut iv = [0u8; IV_LENGTH];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|err| CryptoError::Random(err.to_string()))?;
        let mut ciphertext = plaintext.to_vec();
        let tag = self
            .inner
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), &[], &mut ciphertext)
            .map_err(|aead::Error| CryptoError::Encryption)?;
        Ok(Sealed {
            iv,
            tag: tag.into(),
            ciphertext,
        })
    }

    /// Fails with [`CryptoError::Authentication`] whenever the tag does not verify.
    #[inline]
    pub fn decrypt(
        &self,
        iv: &[u8; IV_LENGTH],
        tag: &[u8; TAG_LENGTH],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let mut plaintext = ciphertext.to_vec();
        self.inner
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(iv),
                &[],
                &mut plaintext,
                Tag::<U16>::from_slice(tag),
            )
            .map_err(|aead::Error| CryptoError::Authentication)?;
        Ok(plaintext)
    }

    #[inline]
    pub fn open(&self, envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
        self.decrypt(&envelope.iv, &envelope.tag, &envelope.ciphertext)
    }
}

impl Debug for Cipher {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}
