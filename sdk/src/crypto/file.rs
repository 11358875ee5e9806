use {
    super::Cipher,
    anyhow::{Context, Result, bail},
    casecrypt_protocol::{
        Envelope, EnvelopeFlavor, SymmetricKey,
        envelope::{IV_LENGTH, TAG_LENGTH},
    },
    chrono::{DateTime, Utc},
    fs_err::read,
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::{
        ffi::OsString,
        io::Write,
        path::{Path, PathBuf},
    },
    tempfile::NamedTempFile,
    tracing::debug,
};

pub const ARTIFACT_EXTENSION: &str = "enc";
pub const ALGORITHM: &str = "aes-256-gcm";

/// Path of the encrypted artifact for a plaintext file: the same name with
/// `.enc` appended.
#[must_use]
#[inline]
pub fn artifact_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".");
    name.push(ARTIFACT_EXTENSION);
    PathBuf::from(name)
}

/// Returns the plaintext path an artifact was created from, if `path` looks like one.
#[must_use]
#[inline]
pub fn plaintext_path(path: &Path) -> Option<PathBuf> {
    if path.extension()? != ARTIFACT_EXTENSION {
        return None;
    }
    let stem: OsString = path.file_stem()?.to_owned();
    Some(path.with_file_name(stem))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEncryptionMetadata {
    pub algorithm: String,
    pub original_size: u64,
    pub encrypted_size: u64,
    pub iv_length: usize,
    pub tag_length: usize,
    /// Hex SHA-256 of the plaintext.
    pub content_sha256: String,
    pub encrypted_at: DateTime<Utc>,
}

/// Whole-file encryption with the document key.
///
/// The file is read into memory and encrypted in one pass. Calls block on
/// disk I/O; async callers should run them on a blocking thread.
#[derive(Debug)]
pub struct FileCipher {
    cipher: Cipher,
}

impl FileCipher {
    #[must_use]
    #[inline]
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            cipher: Cipher::new(key),
        }
    }

    /// Writes `IV ‖ TAG ‖ CIPHERTEXT` of `input` to `<input>.enc`.
    ///
    /// The input is left in place. The artifact is written to a temporary file
    /// in the same directory, synced to disk and then renamed into place; an
    /// existing artifact is never overwritten.
    #[inline]
    pub fn encrypt_file(&self, input: &Path) -> Result<(PathBuf, FileEncryptionMetadata)> {
        let plaintext = read(input)?;
        let sealed = self.cipher.encrypt(&plaintext)?;
        let bytes = sealed.into_envelope(None).to_bytes();

        let output = artifact_path(input);
        let dir = output
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist_noclobber(&output)
            .with_context(|| format!("failed to persist {}", output.display()))?;

        let metadata = FileEncryptionMetadata {
            algorithm: ALGORITHM.into(),
            original_size: u64::try_from(plaintext.len())?,
            encrypted_size: u64::try_from(bytes.len())?,
            iv_length: IV_LENGTH,
            tag_length: TAG_LENGTH,
            content_sha256: hex::encode(Sha256::digest(&plaintext)),
            encrypted_at: Utc::now(),
        };
        debug!(path = %output.display(), size = metadata.encrypted_size, "wrote encrypted artifact");
        Ok((output, metadata))
    }

    /// Decrypts an artifact, optionally also writing the plaintext to `output`.
    ///
    /// A tag mismatch is an error; the encrypted bytes are never returned.
    #[inline]
    pub fn decrypt_file(&self, input: &Path, output: Option<&Path>) -> Result<Vec<u8>> {
        if output == Some(input) {
            bail!("refusing to overwrite artifact {} with plaintext", input.display());
        }
        let plaintext = self.decrypt_bytes(&read(input)?)?;
        if let Some(output) = output {
            fs_err::write(output, &plaintext)?;
        }
        Ok(plaintext)
    }

    #[inline]
    pub fn decrypt_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let envelope = Envelope::unpack(bytes, EnvelopeFlavor::Master)?;
        Ok(self.cipher.open(&envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        casecrypt_protocol::CryptoError,
        rand::{RngCore, rng},
        tempfile::TempDir,
    };

    fn cipher() -> FileCipher {
        FileCipher::new(&SymmetricKey::from_bytes([8; 32]))
    }

    #[test]
    fn ten_kilobytes_roundtrip() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("indictment.pdf");
        let mut content = vec![0u8; 10 * 1024];
        rng().fill_bytes(&mut content);
        fs_err::write(&input, &content).unwrap();

        let cipher = cipher();
        let (artifact, metadata) = cipher.encrypt_file(&input).unwrap();
        assert_eq!(artifact, dir.path().join("indictment.pdf.enc"));
        assert_eq!(metadata.original_size, 10 * 1024);
        assert_eq!(metadata.encrypted_size, 10 * 1024 + 32);
        assert_eq!(metadata.algorithm, ALGORITHM);
        assert_eq!(metadata.content_sha256, hex::encode(Sha256::digest(&content)));

        // Input is untouched and the artifact is not the plaintext.
        assert_eq!(fs_err::read(&input).unwrap(), content);
        let raw = fs_err::read(&artifact).unwrap();
        assert_ne!(raw.get(32..), Some(content.as_slice()));

        let restored = dir.path().join("restored.pdf");
        let plaintext = cipher.decrypt_file(&artifact, Some(&restored)).unwrap();
        assert_eq!(plaintext, content);
        assert_eq!(fs_err::read(&restored).unwrap(), content);
    }

    #[test]
    fn bad_tag_is_an_error() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("doc.docx");
        fs_err::write(&input, b"contents").unwrap();
        let cipher = cipher();
        let (artifact, _) = cipher.encrypt_file(&input).unwrap();

        let mut raw = fs_err::read(&artifact).unwrap();
        raw[IV_LENGTH] ^= 1;
        fs_err::write(&artifact, &raw).unwrap();
        let err = cipher.decrypt_file(&artifact, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CryptoError>(),
            Some(CryptoError::Authentication)
        ));

        let other = FileCipher::new(&SymmetricKey::from_bytes([9; 32]));
        fs_err::write(&input, b"contents").unwrap();
        fs_err::remove_file(&artifact).unwrap();
        let (artifact, _) = cipher.encrypt_file(&input).unwrap();
        let err = other.decrypt_file(&artifact, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CryptoError>(),
            Some(CryptoError::Authentication)
        ));
    }

    #[test]
    fn truncated_artifact() {
        let err = cipher().decrypt_bytes(&[0; 20]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CryptoError>(),
            Some(CryptoError::MalformedEnvelope { got: 20, .. })
        ));
    }

    #[test]
    fn existing_artifact_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("doc.pdf");
        fs_err::write(&input, b"first").unwrap();
        let cipher = cipher();
        let (artifact, _) = cipher.encrypt_file(&input).unwrap();
        let before = fs_err::read(&artifact).unwrap();

        fs_err::write(&input, b"second").unwrap();
        cipher.encrypt_file(&input).unwrap_err();
        assert_eq!(fs_err::read(&artifact).unwrap(), before);
        assert_eq!(cipher.decrypt_file(&artifact, None).unwrap(), b"first");
    }

    #[test]
    fn paths() {
        let artifact = artifact_path(Path::new("/data/docs/a.pdf"));
        assert_eq!(artifact, Path::new("/data/docs/a.pdf.enc"));
        assert_eq!(
            plaintext_path(&artifact).as_deref(),
            Some(Path::new("/data/docs/a.pdf"))
        );
        assert_eq!(plaintext_path(Path::new("/data/docs/a.pdf")), None);
    }
}
