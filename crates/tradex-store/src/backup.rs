//! Consistent snapshot and restore for the live database.
//!
//! # Snapshot discipline
//! A backup must capture a single point in time including data that is
//! still only in the WAL, without corrupting the destination if the
//! process dies mid-copy. The sequence is:
//!
//! 1. a *gate* connection takes `BEGIN IMMEDIATE`, holding the SQLite
//!    write lock so no commit can land until the copy finishes
//!    (readers are unaffected),
//! 2. a second connection runs `PRAGMA wal_checkpoint(PASSIVE)` and the
//!    result is checked for completeness. PASSIVE because a blocking
//!    checkpoint mode would wait on the write lock our own gate holds;
//!    the checkpoint also cannot run on the gate connection itself,
//!    SQLite refuses to checkpoint inside an open transaction,
//! 3. the main database file is copied to a staging path in the
//!    destination directory, fsynced, chmodded to 600, and atomically
//!    renamed over the destination.
//!
//! Restore validates the backup first (`PRAGMA quick_check`), stages
//! the copy next to the live path, renames over it, and drops the now
//! stale `-wal`/`-shm` sidecars. Restore assumes exclusive access to
//! the live database; stopping any server process is the caller's job.

use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::connect_options;
use crate::error::StoreError;
use crate::permissions::{self, classify_io};

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// One-shot backup/restore operations for the configured database.
pub struct BackupTool {
    config: Config,
}

impl BackupTool {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Write a consistent snapshot of the live database to
    /// `destination`. Repeating the call overwrites the destination
    /// with an equally valid snapshot.
    pub async fn backup(&self, destination: &Path) -> Result<(), StoreError> {
        let source = self.config.db_path.clone();
        if !source.exists() {
            return Err(StoreError::SourceNotFound(source.display().to_string()));
        }

        let dest_dir = parent_dir(destination);
        if !dest_dir.exists() {
            fs::create_dir_all(&dest_dir).map_err(|e| classify_io(&dest_dir, e))?;
            permissions::enforce_owner_only_dir(&dest_dir)?;
        }
        cleanup_stale_staging(&dest_dir, destination);

        let mut gate = connect_options(&self.config.encryption, &source, false)
            .connect()
            .await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut gate).await?;

        let result = self.checkpoint_and_copy(&source, destination, &dest_dir).await;

        // Nothing was written through the gate; ROLLBACK just releases
        // the write lock.
        let _ = sqlx::query("ROLLBACK").execute(&mut gate).await;
        let _ = gate.close().await;

        if result.is_ok() {
            info!(
                source = %source.display(),
                destination = %destination.display(),
                "backup complete"
            );
        }
        result
    }

    async fn checkpoint_and_copy(
        &self,
        source: &Path,
        destination: &Path,
        dest_dir: &Path,
    ) -> Result<(), StoreError> {
        let mut conn = connect_options(&self.config.encryption, source, false)
            .connect()
            .await?;
        let checkpoint = sqlx::query_as::<_, (i64, i64, i64)>("PRAGMA wal_checkpoint(PASSIVE)")
            .fetch_one(&mut conn)
            .await;
        let _ = conn.close().await;

        // With the gate held no new frames can appear, so a complete
        // checkpoint means the main file is the whole snapshot.
        let (busy, log_frames, checkpointed) = checkpoint?;
        if busy != 0 || checkpointed < log_frames {
            return Err(StoreError::Backup(format!(
                "wal checkpoint incomplete ({checkpointed} of {log_frames} frames), \
                 a concurrent reader is pinning the WAL"
            )));
        }
        debug!(log_frames, checkpointed, "wal checkpoint complete");

        let staging = staging_path(dest_dir, destination);
        let copied = stage_copy(source, &staging, destination);
        if copied.is_err() {
            let _ = fs::remove_file(&staging);
        }
        copied
    }

    /// Replace the live database with the contents of `backup_file`.
    pub async fn restore(&self, backup_file: &Path) -> Result<(), StoreError> {
        let live = self.config.db_path.clone();
        self.restore_to(backup_file, &live).await
    }

    /// Replace `destination` with the contents of `backup_file`. The
    /// live path is never missing or half-written: the copy goes to a
    /// staging file in the same directory and is renamed into place.
    pub async fn restore_to(
        &self,
        backup_file: &Path,
        destination: &Path,
    ) -> Result<(), StoreError> {
        self.validate_backup(backup_file).await?;

        let dest_dir = parent_dir(destination);
        if !dest_dir.exists() {
            fs::create_dir_all(&dest_dir).map_err(|e| classify_io(&dest_dir, e))?;
            permissions::enforce_owner_only_dir(&dest_dir)?;
        }
        cleanup_stale_staging(&dest_dir, destination);

        let staging = staging_path(&dest_dir, destination);
        let copied = stage_copy(backup_file, &staging, destination);
        if copied.is_err() {
            let _ = fs::remove_file(&staging);
            return copied;
        }

        // The restored file replaces the whole database; any WAL or SHM
        // left over from the previous incarnation is stale.
        let (wal, shm) = permissions::sidecar_paths(destination);
        for sidecar in [wal, shm] {
            if sidecar.exists() {
                fs::remove_file(&sidecar).map_err(|e| classify_io(&sidecar, e))?;
            }
        }
        permissions::enforce_db_family(destination)?;

        info!(
            backup = %backup_file.display(),
            destination = %destination.display(),
            "restore complete"
        );
        Ok(())
    }

    /// A valid backup is a non-empty regular file that the configured
    /// backend can open and that passes `PRAGMA quick_check`.
    async fn validate_backup(&self, backup_file: &Path) -> Result<(), StoreError> {
        let invalid = |reason: String| StoreError::InvalidBackup {
            path: backup_file.display().to_string(),
            reason,
        };

        let meta =
            fs::metadata(backup_file).map_err(|_| invalid("file does not exist".into()))?;
        if !meta.is_file() {
            return Err(invalid("not a regular file".into()));
        }
        if meta.len() == 0 {
            return Err(invalid("file is empty".into()));
        }

        if self.config.encryption.expects_plain_header() {
            let mut header = [0u8; 16];
            let mut file = File::open(backup_file).map_err(|e| classify_io(backup_file, e))?;
            file.read_exact(&mut header)
                .map_err(|_| invalid("shorter than a database header".into()))?;
            if &header != SQLITE_MAGIC {
                return Err(invalid("missing SQLite header".into()));
            }
        }

        // No journal-mode pragma here: switching the journal mode would
        // rewrite the backup's header.
        let opts = SqliteConnectOptions::new()
            .filename(backup_file)
            .create_if_missing(false);
        let mut conn = self
            .config
            .encryption
            .apply(opts)
            .connect()
            .await
            .map_err(|e| invalid(format!("cannot open as a database: {e}")))?;
        let verdict = sqlx::query_scalar::<_, String>("PRAGMA quick_check")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| invalid(format!("integrity check failed: {e}")));
        let _ = conn.close().await;

        let verdict = verdict?;
        if verdict != "ok" {
            return Err(invalid(format!("integrity check reported: {verdict}")));
        }
        Ok(())
    }
}

/// Copy `source` to `staging`, fsync, force owner-only permissions,
/// then atomically rename over `destination` and fsync the directory.
fn stage_copy(source: &Path, staging: &Path, destination: &Path) -> Result<(), StoreError> {
    fs::copy(source, staging).map_err(|e| classify_io(staging, e))?;

    let file = OpenOptions::new()
        .read(true)
        .open(staging)
        .map_err(|e| classify_io(staging, e))?;
    file.sync_all().map_err(|e| classify_io(staging, e))?;

    permissions::enforce_owner_only(staging)?;

    fs::rename(staging, destination).map_err(|e| classify_io(destination, e))?;
    fsync_dir(&parent_dir(destination))?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn staging_path(dir: &Path, destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".into());
    dir.join(format!(".{name}.{}.staging", Uuid::new_v4()))
}

/// Remove staging files for this destination left behind by a crash.
fn cleanup_stale_staging(dir: &Path, destination: &Path) {
    let Some(name) = destination.file_name() else {
        return;
    };
    let prefix = format!(".{}.", name.to_string_lossy());
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&prefix) && file_name.ends_with(".staging") {
                warn!(path = %entry.path().display(), "removing orphaned staging file");
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

fn fsync_dir(path: &Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        let dir = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| classify_io(path, e))?;
        dir.sync_all().map_err(|e| classify_io(path, e))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
