use {
    crate::{
        db::Db,
        documents::DocumentPipeline,
        util::{CONFIG_FILE_NAME, default_config_dir, default_data_dir},
    },
    anyhow::{Context, Result},
    casecrypt_sdk::{
        CipherContext, KeyMaterialSource, Profile,
        context::{DOCUMENT_KEY_VAR, MASTER_KEY_VAR, PROFILE_VAR},
    },
    derivative::Derivative,
    serde::Deserialize,
    std::{
        env,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

pub const ENABLE_DOCUMENT_ENCRYPTION_VAR: &str = "ENABLE_DOCUMENT_ENCRYPTION";
pub const LOG_FILTER_VAR: &str = "RUST_LOG";

/// Settings read from an optional json5 file and then from the environment.
/// Environment variables win over the file.
#[derive(Derivative, Clone, Deserialize)]
#[derivative(Debug)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Hex-encoded master secret for per-user key derivation.
    #[derivative(Debug = "ignore")]
    pub master_key: Option<String>,
    /// Hex-encoded 32-byte key for files and master-key fields.
    #[derivative(Debug = "ignore")]
    pub document_key: Option<String>,
    pub enable_document_encryption: bool,
    pub profile: Profile,
    pub database_path: Option<PathBuf>,
    pub documents_path: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            master_key: None,
            document_key: None,
            enable_document_encryption: false,
            profile: Profile::default(),
            database_path: None,
            documents_path: None,
            log_filter: "info".into(),
        }
    }
}

impl Config {
    #[inline]
    pub fn parse(path: &Path) -> Result<Self> {
        json5::from_str(&fs_err::read_to_string(path)?)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Reads `path`, or the default config file if it exists, then applies
    /// the process environment.
    #[inline]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::parse(path)?,
            None => {
                let default_path = default_config_dir()?.join(CONFIG_FILE_NAME);
                if default_path.try_exists()? {
                    Self::parse(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|name| env::var(name).ok())?;
        Ok(config)
    }

    #[inline]
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(MASTER_KEY_VAR) {
            self.master_key = Some(value);
        }
        if let Some(value) = lookup(DOCUMENT_KEY_VAR) {
            self.document_key = Some(value);
        }
        if let Some(value) = lookup(ENABLE_DOCUMENT_ENCRYPTION_VAR) {
            self.enable_document_encryption = value.trim() == "true";
        }
        if let Some(value) = lookup(PROFILE_VAR) {
            self.profile = value.parse()?;
        }
        if let Some(value) = lookup(LOG_FILTER_VAR) {
            self.log_filter = value;
        }
        Ok(())
    }

    #[must_use]
    #[inline]
    pub fn key_material(&self) -> KeyMaterialSource {
        KeyMaterialSource {
            master_key: self.master_key.clone(),
            document_key: self.document_key.clone(),
            profile: self.profile,
        }
    }

    #[inline]
    pub fn cipher_context(&self) -> Result<CipherContext> {
        Ok(self.key_material().resolve()?)
    }

    #[inline]
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(default_data_dir()?.join("casecrypt.db")),
        }
    }

    #[inline]
    pub fn documents_path(&self) -> Result<PathBuf> {
        match &self.documents_path {
            Some(path) => Ok(path.clone()),
            None => Ok(default_data_dir()?.join("documents")),
        }
    }
    /// Document pipeline honoring `enable_document_encryption`.
    #[inline]
    pub fn document_pipeline(&self, ctx: Arc<CipherContext>, db: Db) -> Result<DocumentPipeline> {
        DocumentPipeline::new(
            ctx,
            db,
            self.documents_path()?,
            self.enable_document_encryption,
        )
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        casecrypt_sdk::{ConfigurationError, KeyOrigin},
        std::collections::HashMap,
    };

    const DOCUMENT_HEX: &str = "0202020202020202020202020202020202020202020202020202020202020202";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn json5_file() {
        let config: Config = json5::from_str(&format!(
            r#"{{
                // keys
                master_key: "{}",
                document_key: "{DOCUMENT_HEX}",
                enable_document_encryption: true,
                profile: "production",
                database_path: "/var/lib/casecrypt/db",
            }}"#,
            "74657374",
        ))
        .unwrap();
        assert!(config.enable_document_encryption);
        assert_eq!(config.profile, Profile::Production);
        assert_eq!(config.log_filter, "info");
        assert_eq!(
            config.database_path().unwrap(),
            Path::new("/var/lib/casecrypt/db")
        );
        let ctx = config.cipher_context().unwrap();
        assert_eq!(ctx.master().as_bytes(), b"test");

        json5::from_str::<Config>("{ unknown_key: 1 }").unwrap_err();
    }

    #[test]
    fn environment_wins() {
        let mut config = Config {
            enable_document_encryption: true,
            document_key: Some("00".into()),
            ..Config::default()
        };
        config
            .apply_env(lookup(&[
                (ENABLE_DOCUMENT_ENCRYPTION_VAR, "yes"),
                (DOCUMENT_KEY_VAR, DOCUMENT_HEX),
                (PROFILE_VAR, "test"),
                (LOG_FILTER_VAR, "debug"),
            ]))
            .unwrap();
        assert!(!config.enable_document_encryption);
        assert_eq!(config.document_key.as_deref(), Some(DOCUMENT_HEX));
        assert_eq!(config.profile, Profile::Test);
        assert_eq!(config.log_filter, "debug");

        config
            .apply_env(lookup(&[(ENABLE_DOCUMENT_ENCRYPTION_VAR, "true")]))
            .unwrap();
        assert!(config.enable_document_encryption);

        config
            .apply_env(lookup(&[(PROFILE_VAR, "staging")]))
            .unwrap_err();
    }

    #[test]
    fn production_without_keys() {
        let mut config = Config::default();
        config
            .apply_env(lookup(&[(PROFILE_VAR, "production")]))
            .unwrap();
        let err = config.cipher_context().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::MissingKey { .. })
        ));

        let ctx = Config::default().cipher_context().unwrap();
        assert_eq!(ctx.master_origin(), KeyOrigin::InsecureFallback);
    }

    #[test]
    fn pipeline_follows_flag() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            enable_document_encryption: true,
            documents_path: Some(dir.path().join("docs")),
            ..Config::default()
        };
        let ctx = Arc::new(config.cipher_context().unwrap());
        let pipeline = config
            .document_pipeline(ctx, Db::temporary().unwrap())
            .unwrap();
        assert_eq!(pipeline.root(), dir.path().join("docs"));
        assert!(pipeline.encrypts());
    }

    #[test]
    fn debug_hides_keys() {
        let config = Config {
            document_key: Some(DOCUMENT_HEX.into()),
            ..Config::default()
        };
        assert!(!format!("{config:?}").contains(DOCUMENT_HEX));
    }
}
