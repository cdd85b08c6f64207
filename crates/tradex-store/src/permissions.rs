//! File permission enforcement.
//!
//! The database file, its WAL/SHM sidecars and every backup artifact
//! must carry owner-only permissions no matter what umask the process
//! inherited. `set_permissions` with an absolute mode satisfies that;
//! umask only affects modes at creation time.

use std::path::{Path, PathBuf};

use crate::error::StoreError;

#[cfg(unix)]
pub const OWNER_ONLY_FILE: u32 = 0o600;
#[cfg(unix)]
pub const OWNER_ONLY_DIR: u32 = 0o700;

/// Force owner-only (600) permissions on a file.
pub fn enforce_owner_only(path: &Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, Permissions::from_mode(OWNER_ONLY_FILE))
            .map_err(|e| classify_io(path, e))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Force owner-only (700) permissions on a directory.
pub fn enforce_owner_only_dir(path: &Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, Permissions::from_mode(OWNER_ONLY_DIR))
            .map_err(|e| classify_io(path, e))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// The `-wal` and `-shm` sidecar paths for a database file.
pub fn sidecar_paths(db_path: &Path) -> (PathBuf, PathBuf) {
    let name = db_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    (
        db_path.with_file_name(format!("{name}-wal")),
        db_path.with_file_name(format!("{name}-shm")),
    )
}

/// Enforce owner-only permissions on the database file and any sidecar
/// that currently exists.
pub fn enforce_db_family(db_path: &Path) -> Result<(), StoreError> {
    let (wal, shm) = sidecar_paths(db_path);
    for path in [db_path, wal.as_path(), shm.as_path()] {
        if path.exists() {
            enforce_owner_only(path)?;
        }
    }
    Ok(())
}

/// Classify an I/O failure: permission problems get their own error so
/// the operator sees them as such, everything else stays an I/O error.
pub(crate) fn classify_io(path: &Path, source: std::io::Error) -> StoreError {
    if source.kind() == std::io::ErrorKind::PermissionDenied {
        StoreError::Permission {
            path: path.display().to_string(),
            source,
        }
    } else {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
