use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, error, info};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use crate::backup::compress::compress_file;
use crate::backup::copier::{Copier, SqliteBackupCopier};
use crate::backup::prune::prune;
use crate::database::{self, SourceDatabase};
use crate::error::{BackupError, Result};
use crate::utils::{backup_file_path, compressed_path, get_size, parse_backup_timestamp, remove_file_if_exists};

/// Toggles for the optional pipeline stages. All disabled by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupConfig {
    pub vacuum: bool,
    pub compression: bool,
    pub pruning: bool,
    pub keep_files: usize,
}

impl BackupConfig {
    pub fn with_vacuum(mut self, enabled: bool) -> Self {
        self.vacuum = enabled;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// `keep_files` is a hard cap: zero removes every backup in the directory.
    pub fn with_pruning(mut self, enabled: bool, keep_files: usize) -> Self {
        self.pruning = enabled;
        self.keep_files = keep_files;
        self
    }
}

/// Outcome of one successful run. Fields of disabled stages stay zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
    pub size_after_vacuum: u64,
    pub size_after_compression: u64,
    pub elapsed_time: Duration,
    pub vacuum_elapsed_time: Duration,
    pub compression_elapsed_time: Duration,
}

impl BackupResult {
    /// Size of the file at `path`, i.e. after the last stage that ran.
    pub fn artifact_size(&self) -> u64 {
        if self.size_after_compression > 0 {
            self.size_after_compression
        } else if self.size_after_vacuum > 0 {
            self.size_after_vacuum
        } else {
            self.size
        }
    }
}

/// Turns the live source database into backup artifacts inside `backup_dir`.
///
/// Nothing else is expected to write into `backup_dir` while a backup runs.
pub struct Backuper {
    source: Mutex<Option<SourceDatabase>>,
    backup_dir: PathBuf,
    config: BackupConfig,
    copier: Arc<dyn Copier>,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl Backuper {
    pub async fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        source_path: P,
        backup_dir: Q,
        config: BackupConfig,
    ) -> Result<Backuper> {
        let source_path = source_path.as_ref();
        let source = SourceDatabase::open(source_path)
            .await
            .map_err(|source| BackupError::SourceUnavailable {
                path: source_path.to_path_buf(),
                source,
            })?;

        let backup_dir = backup_dir.as_ref().to_path_buf();
        if let Err(e) = tokio::fs::create_dir_all(&backup_dir).await {
            source.close().await;
            return Err(BackupError::BackupDirUnavailable {
                path: backup_dir,
                source: e,
            });
        }

        debug!(target: "backup", "backuper ready for {} into {}", source_path.display(), backup_dir.display());

        Ok(Backuper {
            source: Mutex::new(Some(source)),
            backup_dir,
            config,
            copier: Arc::new(SqliteBackupCopier::default()),
            last_timestamp: Mutex::new(None),
        })
    }

    /// Replaces the strategy that produces the raw snapshot.
    pub fn with_copier(mut self, copier: Arc<dyn Copier>) -> Self {
        self.copier = copier;
        self
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Runs copy, vacuum, compression and pruning, in that order.
    ///
    /// The token is checked before every stage. A cancelled or failed stage
    /// leaves the artifact of the previous stage on disk.
    pub async fn backup(&self, cancel: &CancellationToken) -> Result<BackupResult> {
        let started = Instant::now();
        let source = self.source.lock().await.clone().ok_or(BackupError::Closed)?;
        check_cancelled(cancel)?;

        let requested = self.next_timestamp().await;
        let path = self
            .copier
            .create_snapshot(&source, &self.backup_dir, requested)
            .await
            .map_err(BackupError::CopyFailed)?;
        let size = snapshot_size(&path)?;
        let timestamp = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_backup_timestamp)
            .unwrap_or(requested);
        debug!(target: "backup", "copied {} ({} bytes)", path.display(), size);

        let mut result = BackupResult {
            path,
            timestamp,
            size,
            size_after_vacuum: 0,
            size_after_compression: 0,
            elapsed_time: Duration::ZERO,
            vacuum_elapsed_time: Duration::ZERO,
            compression_elapsed_time: Duration::ZERO,
        };

        let processed = self.process(&mut result, cancel).await;
        if let Err(BackupError::Cancelled) = processed {
            return Err(BackupError::Cancelled);
        }

        if self.config.pruning {
            self.prune().await;
        }

        processed?;
        result.elapsed_time = started.elapsed();
        Ok(result)
    }

    async fn process(&self, result: &mut BackupResult, cancel: &CancellationToken) -> Result<()> {
        if self.config.vacuum {
            check_cancelled(cancel)?;
            let started = Instant::now();
            database::vacuum(&result.path)
                .await
                .and_then(|()| get_size(&result.path).map_err(sqlx::Error::Io))
                .map(|size| result.size_after_vacuum = size)
                .map_err(|source| BackupError::VacuumFailed {
                    path: result.path.clone(),
                    source,
                })?;
            result.vacuum_elapsed_time = started.elapsed();
            debug!(target: "backup", "vacuumed {} ({} bytes)", result.path.display(), result.size_after_vacuum);
        }

        if self.config.compression {
            check_cancelled(cancel)?;
            let started = Instant::now();
            let uncompressed = result.path.clone();
            let compressed = tokio::task::spawn_blocking(move || compress_file(&uncompressed))
                .await
                .map_err(std::io::Error::other)
                .and_then(|compressed| compressed)
                .and_then(|compressed| get_size(&compressed).map(|size| (compressed, size)))
                .map_err(|source| BackupError::CompressionFailed {
                    path: result.path.clone(),
                    source,
                })?;
            result.compression_elapsed_time = started.elapsed();
            (result.path, result.size_after_compression) = compressed;
            debug!(target: "backup", "compressed {} ({} bytes)", result.path.display(), result.size_after_compression);
        }

        Ok(())
    }

    async fn prune(&self) {
        let dir = self.backup_dir.clone();
        let keep_files = self.config.keep_files;
        match tokio::task::spawn_blocking(move || prune(&dir, keep_files)).await {
            Ok(Ok(report)) => info!(
                target: "backup::prune",
                "pruned backups: kept={} deleted={} skipped={} failed={}",
                report.kept.len(),
                report.deleted.len(),
                report.skipped.len(),
                report.failed.len()
            ),
            Ok(Err(source)) => {
                let err = BackupError::PruneFailed {
                    path: self.backup_dir.clone(),
                    source,
                };
                error!(target: "backup::prune", "{}", err);
            }
            Err(e) => error!(target: "backup::prune", "prune task failed: {}", e),
        }
    }

    /// Strictly increasing, second precision, never naming a file already on disk.
    async fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_timestamp.lock().await;
        let mut timestamp = Utc::now().trunc_subsecs(0);
        if let Some(previous) = *last {
            if timestamp <= previous {
                timestamp = previous + chrono::Duration::seconds(1);
            }
        }
        while self.name_taken(timestamp) {
            timestamp += chrono::Duration::seconds(1);
        }
        *last = Some(timestamp);
        timestamp
    }

    fn name_taken(&self, timestamp: DateTime<Utc>) -> bool {
        let path = backup_file_path(&self.backup_dir, timestamp);
        path.exists() || compressed_path(&path).exists()
    }

    /// Releases the source handle. Later calls to `backup` fail with `Closed`.
    pub async fn close(&self) -> Result<()> {
        let source = self.source.lock().await.take().ok_or(BackupError::Closed)?;
        source.close().await;
        Ok(())
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }
    Ok(())
}

/// An empty or unreadable snapshot is an integrity error; it is removed.
fn snapshot_size(path: &Path) -> Result<u64> {
    let error: std::io::Error = match get_size(path) {
        Ok(0) => std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("snapshot {} is empty", path.display()),
        ),
        Ok(size) => return Ok(size),
        Err(e) => e,
    };
    if let Err(e) = remove_file_if_exists(path) {
        error!(target: "backup", "removing broken snapshot {}: {}", path.display(), e);
    }
    Err(BackupError::CopyFailed(error.into()))
}
