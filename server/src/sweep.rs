use {
    anyhow::Result,
    casecrypt_sdk::{FileCipher, crypto::plaintext_path},
    fs_err::{read, read_dir, remove_file},
    serde::Serialize,
    std::path::Path,
    tracing::{error, info, instrument, warn},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Encrypted artifacts found.
    pub artifacts: u64,
    /// Plaintext files deleted because their artifact holds the same content.
    pub removed: u64,
    /// Plaintext files kept because their artifact is unreadable or differs.
    pub kept: u64,
}

/// Deletes plaintext documents left behind next to their encrypted artifact.
///
/// A plaintext file is only deleted after its artifact has been decrypted and
/// compared equal to it.
#[instrument(skip_all, fields(root = %root.display()))]
#[inline]
pub fn sweep_plaintext(root: &Path, files: &FileCipher) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    let mut dirs = vec![root.to_owned()];
    while let Some(dir) = dirs.pop() {
        for entry in read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                dirs.push(path);
                continue;
            }
            let Some(plaintext) = plaintext_path(&path) else {
                continue;
            };
            report.artifacts = report.artifacts.saturating_add(1);
            if !plaintext.try_exists()? {
                continue;
            }
            let decrypted = match files.decrypt_file(&path, None) {
                Ok(decrypted) => decrypted,
                Err(err) => {
                    error!(
                        artifact = %path.display(),
                        error = %format_args!("{err:#}"),
                        "artifact cannot be decrypted, keeping plaintext"
                    );
                    report.kept = report.kept.saturating_add(1);
                    continue;
                }
            };
            if decrypted != read(&plaintext)? {
                warn!(
                    path = %plaintext.display(),
                    "plaintext differs from its artifact, keeping it"
                );
                report.kept = report.kept.saturating_add(1);
                continue;
            }
            remove_file(&plaintext)?;
            info!(path = %plaintext.display(), "removed orphaned plaintext");
            report.removed = report.removed.saturating_add(1);
        }
    }
    Ok(report)
}
