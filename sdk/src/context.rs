use {
    crate::crypto::{FileCipher, Pbkdf2, TextCipher},
    casecrypt_protocol::{CryptoError, MasterSecret, SymmetricKey},
    derivative::Derivative,
    derive_more::Display,
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::str::FromStr,
    thiserror::Error,
    tracing::warn,
};

pub const MASTER_KEY_VAR: &str = "ENCRYPTION_MASTER_KEY";
pub const DOCUMENT_KEY_VAR: &str = "DOCUMENT_ENCRYPTION_KEY";
pub const PROFILE_VAR: &str = "APP_ENV";

const INSECURE_MASTER_SEED: &str = "casecrypt insecure development master secret";
const INSECURE_DOCUMENT_SEED: &str = "casecrypt insecure development document key";

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{var} is not set and fallback keys are not allowed in the {profile} profile")]
    MissingKey { var: &'static str, profile: Profile },
    #[error("{var} is invalid: {source}")]
    InvalidKey {
        var: &'static str,
        #[source]
        source: CryptoError,
    },
    #[error("{var} must be configured explicitly for this operation")]
    FallbackRefused { var: &'static str },
    #[error("unknown profile {0:?} (expected production, development or test)")]
    InvalidProfile(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[display("production")]
    Production,
    #[default]
    #[display("development")]
    Development,
    #[display("test")]
    Test,
}

impl Profile {
    #[must_use]
    #[inline]
    pub const fn allows_fallback(self) -> bool {
        !matches!(self, Self::Production)
    }
}

impl FromStr for Profile {
    type Err = ConfigurationError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            _ => Err(ConfigurationError::InvalidProfile(s.into())),
        }
    }
}

/// Where a key in a [`CipherContext`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum KeyOrigin {
    #[display("configured")]
    Configured,
    #[display("insecure fallback")]
    InsecureFallback,
}

/// Raw key settings as they appear in configuration, before validation.
///
/// Empty strings count as unset.
#[derive(Derivative, Clone, Default)]
#[derivative(Debug)]
pub struct KeyMaterialSource {
    #[derivative(Debug = "ignore")]
    pub master_key: Option<String>,
    #[derivative(Debug = "ignore")]
    pub document_key: Option<String>,
    pub profile: Profile,
}

impl KeyMaterialSource {
    /// Validates the configured keys and builds the context every cipher uses.
    ///
    /// A missing key falls back to a fixed insecure value outside production,
    /// with a warning. In production it is an error.
    #[inline]
    pub fn resolve(&self) -> Result<CipherContext, ConfigurationError> {
        let (master, master_origin) = match non_empty(self.master_key.as_deref()) {
            Some(hex) => (
                hex.parse::<MasterSecret>()
                    .map_err(|source| ConfigurationError::InvalidKey {
                        var: MASTER_KEY_VAR,
                        source,
                    })?,
                KeyOrigin::Configured,
            ),
            None => {
                self.check_fallback(MASTER_KEY_VAR)?;
                let seed: [u8; 32] = Sha256::digest(INSECURE_MASTER_SEED).into();
                let secret = MasterSecret::new(seed.to_vec()).map_err(|source| {
                    ConfigurationError::InvalidKey {
                        var: MASTER_KEY_VAR,
                        source,
                    }
                })?;
                (secret, KeyOrigin::InsecureFallback)
            }
        };
        let (document_key, document_origin) = match non_empty(self.document_key.as_deref()) {
            Some(hex) => (
                hex.parse::<SymmetricKey>()
                    .map_err(|source| ConfigurationError::InvalidKey {
                        var: DOCUMENT_KEY_VAR,
                        source,
                    })?,
                KeyOrigin::Configured,
            ),
            None => {
                self.check_fallback(DOCUMENT_KEY_VAR)?;
                (
                    SymmetricKey::from_bytes(Sha256::digest(INSECURE_DOCUMENT_SEED).into()),
                    KeyOrigin::InsecureFallback,
                )
            }
        };
        Ok(CipherContext {
            master,
            document_key,
            kdf: Pbkdf2::default(),
            master_origin,
            document_origin,
        })
    }

    fn check_fallback(&self, var: &'static str) -> Result<(), ConfigurationError> {
        if !self.profile.allows_fallback() {
            return Err(ConfigurationError::MissingKey {
                var,
                profile: self.profile,
            });
        }
        warn!(
            %var,
            profile = %self.profile,
            "key is not configured, using an INSECURE fallback key; never use this with real data"
        );
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Validated key material, built once at startup and passed by reference to
/// every component that encrypts or decrypts.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CipherContext {
    #[derivative(Debug = "ignore")]
    master: MasterSecret,
    #[derivative(Debug = "ignore")]
    document_key: SymmetricKey,
    kdf: Pbkdf2,
    master_origin: KeyOrigin,
    document_origin: KeyOrigin,
}

impl CipherContext {
    /// Context from keys the caller already holds; both count as configured.
    #[must_use]
    #[inline]
    pub fn new(master: MasterSecret, document_key: SymmetricKey) -> Self {
        Self {
            master,
            document_key,
            kdf: Pbkdf2::default(),
            master_origin: KeyOrigin::Configured,
            document_origin: KeyOrigin::Configured,
        }
    }

    #[must_use]
    #[inline]
    pub fn with_kdf(mut self, kdf: Pbkdf2) -> Self {
        self.kdf = kdf;
        self
    }

    #[must_use]
    #[inline]
    pub fn master(&self) -> &MasterSecret {
        &self.master
    }

    #[must_use]
    #[inline]
    pub fn document_key(&self) -> &SymmetricKey {
        &self.document_key
    }

    #[must_use]
    #[inline]
    pub fn kdf(&self) -> &Pbkdf2 {
        &self.kdf
    }

    #[must_use]
    #[inline]
    pub fn master_origin(&self) -> KeyOrigin {
        self.master_origin
    }

    #[must_use]
    #[inline]
    pub fn document_origin(&self) -> KeyOrigin {
        self.document_origin
    }

    /// Fails unless the master secret was configured explicitly.
    #[inline]
    pub fn require_configured_master(&self) -> Result<(), ConfigurationError> {
        match self.master_origin {
            KeyOrigin::Configured => Ok(()),
            KeyOrigin::InsecureFallback => Err(ConfigurationError::FallbackRefused {
                var: MASTER_KEY_VAR,
            }),
        }
    }

    #[must_use]
    #[inline]
    pub fn text(&self) -> TextCipher<'_> {
        TextCipher::new(self)
    }

    #[must_use]
    #[inline]
    pub fn files(&self) -> FileCipher {
        FileCipher::new(&self.document_key)
    }
}
