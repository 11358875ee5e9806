use {
    anyhow::{Result, anyhow},
    std::{path::PathBuf, thread::sleep, time::Duration},
    tracing::warn,
};

pub const CONFIG_FILE_NAME: &str = "casecrypt.json5";

#[cfg(target_os = "linux")]
#[inline]
pub fn default_config_dir() -> Result<PathBuf> {
    Ok("/etc".into())
}

// Windows: %APPDATA% (%USERPROFILE%\AppData\Roaming);
// macOS: $HOME/Library/Application Support
#[cfg(not(target_os = "linux"))]
#[inline]
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir().ok_or_else(|| anyhow!("failed to get config dir"))
}

#[inline]
pub fn default_data_dir() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .ok_or_else(|| anyhow!("failed to get data dir"))?
        .join("casecrypt"))
}

/// Calls `f` up to `attempts` times, pausing a little longer after each failure.
///
/// Blocks the current thread between attempts.
#[inline]
pub fn retry<T>(
    what: &str,
    attempts: u32,
    mut f: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 1;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!(%what, attempt, error = %err, "attempt failed, retrying");
                sleep(Duration::from_millis(50).saturating_mul(attempt));
                attempt = attempt.saturating_add(1);
            }
            Err(err) => return Err(err),
        }
    }
}
