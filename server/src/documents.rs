//! Document generation output: the record and its rendered file.
//!
//! With document encryption enabled the record goes through
//! [`EncryptedResource`] and the file is replaced by its encrypted artifact.
//! Otherwise both are stored as they are.

use {
    crate::{db::Db, util::retry},
    anyhow::{Context, Result, bail},
    casecrypt_protocol::{
        Record, Resource,
        record::{OWNER, record_id},
    },
    casecrypt_sdk::{
        CipherContext, EncryptedResource, ResourceApi,
        crypto::{FileEncryptionMetadata, artifact_path},
    },
    fs_err::{create_dir_all, remove_file},
    serde::Serialize,
    std::{
        path::{Component, Path, PathBuf},
        sync::Arc,
    },
    tokio::task::spawn_blocking,
    tracing::{error, info, instrument, warn},
};

/// Attribute of a document record naming its stored file.
pub const FILE_NAME: &str = "fileName";
pub const PLAINTEXT_REMOVAL_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    /// Path of the file that now holds the document.
    pub path: PathBuf,
    pub encrypted: bool,
    pub metadata: Option<FileEncryptionMetadata>,
    /// `false` if the plaintext could not be deleted after encryption. The
    /// file is then left for the plaintext sweep.
    pub plaintext_removed: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedDocument {
    pub record: Record,
    pub file: StoredDocument,
}

#[derive(Debug, Clone)]
pub struct DocumentPipeline {
    ctx: Arc<CipherContext>,
    db: Db,
    root: PathBuf,
    encrypt: bool,
}

impl DocumentPipeline {
    #[inline]
    pub fn new(ctx: Arc<CipherContext>, db: Db, root: PathBuf, encrypt: bool) -> Result<Self> {
        create_dir_all(&root)?;
        if !encrypt {
            warn!("document encryption is disabled, documents are stored in plaintext");
        }
        Ok(Self {
            ctx,
            db,
            root,
            encrypt,
        })
    }

    #[must_use]
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    #[inline]
    pub fn encrypts(&self) -> bool {
        self.encrypt
    }

    /// Stores the file and then the record that points to it.
    #[instrument(skip_all, fields(%user_id, file = %file.name))]
    #[inline]
    pub async fn create(
        &self,
        user_id: String,
        mut record: Record,
        file: GeneratedFile,
    ) -> Result<CreatedDocument> {
        let this = self.clone();
        spawn_blocking(move || {
            let stored = this.store_file(&file)?;
            record.insert(FILE_NAME.into(), file.name.clone().into());
            let created = if this.encrypt {
                EncryptedResource::new(&this.db, Resource::Documents, &this.ctx)
                    .create(&user_id, &record)
            } else {
                record.insert(OWNER.into(), user_id.clone().into());
                this.db.create(Resource::Documents, record)
            };
            let record = match created {
                Ok(record) => record,
                Err(err) => {
                    discard(&stored.path);
                    if stored.encrypted && !stored.plaintext_removed {
                        discard(&this.root.join(&file.name));
                    }
                    return Err(err.context("failed to store document record"));
                }
            };
            info!(
                id = record_id(&record).unwrap_or_default(),
                encrypted = stored.encrypted,
                "document created"
            );
            Ok(CreatedDocument {
                record,
                file: stored,
            })
        })
        .await?
    }

    /// Reads a document record as `user_id` sees it.
    #[inline]
    pub async fn get(&self, user_id: String, id: String) -> Result<Option<Record>> {
        let this = self.clone();
        spawn_blocking(move || {
            EncryptedResource::new(&this.db, Resource::Documents, &this.ctx).get(&user_id, &id)
        })
        .await?
    }

    /// Plaintext of a stored file.
    ///
    /// If an encrypted artifact exists it must decrypt; its raw bytes are
    /// never returned.
    #[instrument(skip_all, fields(%name))]
    #[inline]
    pub async fn read_file(&self, name: String) -> Result<Vec<u8>> {
        let this = self.clone();
        spawn_blocking(move || {
            let path = this.file_path(&name)?;
            let artifact = artifact_path(&path);
            if artifact.try_exists()? {
                this.ctx
                    .files()
                    .decrypt_file(&artifact, None)
                    .with_context(|| format!("failed to decrypt {}", artifact.display()))
            } else {
                Ok(fs_err::read(&path)?)
            }
        })
        .await?
    }

    fn file_path(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(name)),
            _ => bail!("invalid document file name {name:?}"),
        }
    }

    fn store_file(&self, file: &GeneratedFile) -> Result<StoredDocument> {
        let path = self.file_path(&file.name)?;
        if path.try_exists()? || artifact_path(&path).try_exists()? {
            bail!("document file {} already exists", file.name);
        }
        fs_err::write(&path, &file.content)?;
        if !self.encrypt {
            return Ok(StoredDocument {
                path,
                encrypted: false,
                metadata: None,
                plaintext_removed: false,
            });
        }

        let (artifact, metadata) = match self.ctx.files().encrypt_file(&path) {
            Ok(encrypted) => encrypted,
            Err(err) => {
                discard(&path);
                return Err(err);
            }
        };
        let plaintext_removed = match retry("remove plaintext", PLAINTEXT_REMOVAL_ATTEMPTS, || {
            Ok(remove_file(&path)?)
        }) {
            Ok(()) => true,
            Err(err) => {
                error!(
                    path = %path.display(),
                    error = %err,
                    "failed to remove plaintext after encryption; it stays on disk until swept"
                );
                false
            }
        };
        Ok(StoredDocument {
            path: artifact,
            encrypted: true,
            metadata: Some(metadata),
            plaintext_removed,
        })
    }
}

/// Removes a file written for a document that could not be created.
fn discard(path: &Path) {
    if let Err(err) = remove_file(path) {
        error!(path = %path.display(), error = %err, "failed to remove file of failed document");
    }
}
