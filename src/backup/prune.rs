use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use crate::error::BackupError;
use crate::utils::{is_backup_file_name, parse_backup_timestamp};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub kept: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Keeps the `keep_files` newest backups in `dir` and deletes the rest.
///
/// Ordering comes only from the timestamp embedded in each file name, so the
/// result depends on what is on disk and not on which run produced it. Files
/// named like backups whose timestamp cannot be parsed are left alone, and so
/// are entries that cannot be inspected. Failed deletions are logged and
/// reported, never returned as an error. Only an unreadable `dir` fails.
pub fn prune(dir: &Path, keep_files: usize) -> Result<PruneReport, std::io::Error> {
    let mut report = PruneReport::default();
    let mut candidates: Vec<(DateTime<Utc>, PathBuf)> = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(target: "backup::prune", "skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_backup_file_name(name) {
            continue;
        }
        match entry.file_type() {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                warn!(target: "backup::prune", "skipping {}: {}", name, e);
                continue;
            }
        }

        match parse_backup_timestamp(name) {
            Some(timestamp) => candidates.push((timestamp, entry.path())),
            None => {
                warn!(target: "backup::prune", "skipping {}: unparsable timestamp", name);
                report.skipped.push(entry.path());
            }
        }
    }

    // newest first; names break ties so the order is stable
    candidates.sort_by(|a, b| b.cmp(a));

    for (index, (_, path)) in candidates.into_iter().enumerate() {
        if index < keep_files {
            report.kept.push(path);
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(target: "backup::prune", "deleted {}", path.display());
                report.deleted.push(path);
            }
            Err(source) => {
                let err = BackupError::PruneFailed { path: path.clone(), source };
                error!(target: "backup::prune", "{}", err);
                report.failed.push(path);
            }
        }
    }

    Ok(report)
}
