pub mod backuper;
pub mod compress;
pub mod copier;
pub mod prune;
pub mod scheduler;
pub mod timing;

pub use backuper::{BackupConfig, BackupResult, Backuper};
pub use copier::{Copier, SqliteBackupCopier};
pub use scheduler::{BackuperOptions, Scheduler, SchedulerState};
