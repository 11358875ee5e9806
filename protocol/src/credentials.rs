use {
    crate::error::CryptoError,
    rand::{TryRngCore, rngs::OsRng},
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    std::{
        borrow::Cow,
        fmt::{self, Debug},
        str::FromStr,
    },
    zeroize::{Zeroize, ZeroizeOnDrop},
};

/// Length of every symmetric key handed to the authenticated cipher.
pub const KEY_LENGTH: usize = 32;

/// 256-bit key used directly by AES-256-GCM.
///
/// Both the document key and per-user derived keys use this type.
/// The bytes are wiped when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LENGTH]);

impl SymmetricKey {
    #[inline]
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| CryptoError::Random(err.to_string()))?;
        let key = Self(bytes);
        bytes.zeroize();
        Ok(key)
    }

    #[must_use]
    #[inline]
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn to_unmasked_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for SymmetricKey {
    type Err = CryptoError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = hex::decode(s.trim())
            .map_err(|err| CryptoError::InvalidKey(format!("not valid hex: {err}")))?;
        let array = <[u8; KEY_LENGTH]>::try_from(bytes.as_slice()).map_err(|_len| {
            CryptoError::InvalidKey(format!(
                "invalid length; got {} bytes, expected {KEY_LENGTH}",
                bytes.len()
            ))
        });
        bytes.zeroize();
        array.map(Self)
    }
}

impl<'de> Deserialize<'de> for SymmetricKey {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl Serialize for SymmetricKey {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_unmasked_hex().serialize(serializer)
    }
}

impl Debug for SymmetricKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey").finish()
    }
}

/// Process-wide secret that per-user keys are derived from.
///
/// Unlike [`SymmetricKey`] it has no fixed length: it is only ever used as
/// the password input of the key derivation function.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret(Vec<u8>);

impl MasterSecret {
    #[inline]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CryptoError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(CryptoError::InvalidKey("master secret is empty".into()));
        }
        Ok(Self(bytes))
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for MasterSecret {
    type Err = CryptoError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|err| CryptoError::InvalidKey(format!("not valid hex: {err}")))?;
        Self::new(bytes)
    }
}

impl<'de> Deserialize<'de> for MasterSecret {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl Debug for MasterSecret {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterSecret").finish()
    }
}
