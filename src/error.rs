use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("source database unavailable at {}: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    #[error("backup directory unavailable at {}: {source}", path.display())]
    BackupDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("copy failed: {0}")]
    CopyFailed(#[source] BoxError),

    #[error("vacuum of {} failed: {source}", path.display())]
    VacuumFailed {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    #[error("compression of {} failed: {source}", path.display())]
    CompressionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pruning {} failed: {source}", path.display())]
    PruneFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frequency should be in [1,1440), got {0}")]
    InvalidFrequency(i64),

    #[error("new backuper: {0}")]
    SchedulerInitFailed(#[source] Box<BackupError>),

    #[error("backuper is closed")]
    Closed,

    #[error("backup cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, BackupError>;
