use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;

use crate::error::StoreError;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "lockbox";
pub const APP_NAME: &str = "lockbox";

/// Overrides the platform data directory when set.
pub const DATA_DIR_ENV: &str = "LOCKBOX_DATA_DIR";

pub const SETTINGS_FILE: &str = "lockbox.json";
pub const MASTER_KEY_FILE: &str = "master.key";

pub fn data_dir() -> Result<PathBuf, StoreError> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME).ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "cannot determine data directory",
        ))
    })?;
    Ok(dirs.data_dir().to_path_buf())
}

/// Create `dir` if needed. New directories are owner-only on unix.
pub fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Replace `path` with `body` via a synced temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, body: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
