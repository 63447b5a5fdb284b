use std::path::{Path, PathBuf};
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use rusqlite::backup::{Backup, StepResult};
use rusqlite::{Connection, OpenFlags};
use crate::database::SourceDatabase;
use crate::error::BoxError;
use crate::utils::{backup_file_path, remove_file_if_exists};

/// Produces the raw snapshot file of the source inside `dir`.
#[async_trait]
pub trait Copier: Send + Sync {
    async fn create_snapshot(
        &self,
        source: &SourceDatabase,
        dir: &Path,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf, BoxError>;
}

/// Copies the live database through the SQLite online backup API.
///
/// The whole database is copied in a single step, which holds one read
/// transaction for the entire copy: writers to the source can neither restart
/// the copy nor leave it inconsistent. Only a busy or locked source is retried,
/// after `pause`.
#[derive(Debug, Clone)]
pub struct SqliteBackupCopier {
    pause: Duration,
    busy_timeout: Duration,
}

impl SqliteBackupCopier {
    pub fn new(pause: Duration, busy_timeout: Duration) -> SqliteBackupCopier {
        SqliteBackupCopier {
            pause,
            busy_timeout,
        }
    }

    fn copy(&self, source: &Path, destination: &Path) -> Result<(), rusqlite::Error> {
        let src = Connection::open_with_flags(
            source,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        src.busy_timeout(self.busy_timeout)?;
        let mut dst = Connection::open(destination)?;

        {
            let backup = Backup::new(&src, &mut dst)?;
            // -1 copies every remaining page at once
            while !matches!(backup.step(-1)?, StepResult::Done) {
                std::thread::sleep(self.pause);
            }
        }

        // The copy carries the source header; make it a single standalone file.
        let mode: String =
            dst.pragma_update_and_check(None, "journal_mode", "DELETE", |row| row.get(0))?;
        debug!(target: "backup", "snapshot journal mode set to {}", mode);
        dst.close().map_err(|(_, e)| e)
    }
}

impl Default for SqliteBackupCopier {
    fn default() -> Self {
        SqliteBackupCopier::new(Duration::from_millis(10), Duration::from_secs(5))
    }
}

#[async_trait]
impl Copier for SqliteBackupCopier {
    /// Reads the source by path on its own connection; the sqlx handle is only
    /// consulted to refuse sources that were already closed.
    async fn create_snapshot(
        &self,
        source: &SourceDatabase,
        dir: &Path,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf, BoxError> {
        if source.is_closed() {
            return Err(format!("source {} is closed", source.path().display()).into());
        }

        let copier = self.clone();
        let source_path = source.path().to_path_buf();
        let destination = backup_file_path(dir, timestamp);

        let target = destination.clone();
        let result = tokio::task::spawn_blocking(move || copier.copy(&source_path, &target)).await;

        let error: BoxError = match result {
            Ok(Ok(())) => return Ok(destination),
            Ok(Err(e)) => e.into(),
            Err(e) => e.into(),
        };
        if let Err(e) = remove_file_if_exists(&destination) {
            error!(target: "backup", "removing partial snapshot {}: {}", destination.display(), e);
        }
        Err(error)
    }
}
