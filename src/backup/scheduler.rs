use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use crate::backup::backuper::{BackupConfig, BackupResult, Backuper};
use crate::backup::timing::next_wait;
use crate::error::{BackupError, Result};

const MIN_FREQUENCY: i64 = 1;
const MAX_FREQUENCY: i64 = 1440;

/// Everything needed to build the scheduler's backuper.
#[derive(Debug, Clone)]
pub struct BackuperOptions {
    pub source_path: PathBuf,
    pub backup_dir: PathBuf,
    pub config: BackupConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Running,
    Shutdown,
}

impl SchedulerState {
    fn from_u8(value: u8) -> SchedulerState {
        match value {
            0 => SchedulerState::Created,
            1 => SchedulerState::Running,
            _ => SchedulerState::Shutdown,
        }
    }
}

/// Executes backups at a regular interval and publishes every successful
/// result on the channel.
pub struct Scheduler {
    backuper: Backuper,
    frequency: Duration,
    results: mpsc::Sender<BackupResult>,
    shutdown: CancellationToken,
    state: AtomicU8,
}

impl Scheduler {
    /// `frequency` is in minutes and must be in `[1, 1440)`.
    pub async fn new(
        frequency: i64,
        results: mpsc::Sender<BackupResult>,
        options: BackuperOptions,
    ) -> Result<Scheduler> {
        if !(MIN_FREQUENCY..MAX_FREQUENCY).contains(&frequency) {
            return Err(BackupError::InvalidFrequency(frequency));
        }

        let backuper = Backuper::new(&options.source_path, &options.backup_dir, options.config)
            .await
            .map_err(|e| BackupError::SchedulerInitFailed(Box::new(e)))?;

        Ok(Scheduler::from_parts(
            backuper,
            Duration::from_secs(frequency as u64 * 60),
            results,
        ))
    }

    pub(crate) fn from_parts(
        backuper: Backuper,
        frequency: Duration,
        results: mpsc::Sender<BackupResult>,
    ) -> Scheduler {
        Scheduler {
            backuper,
            frequency,
            results,
            shutdown: CancellationToken::new(),
            state: AtomicU8::new(SchedulerState::Created as u8),
        }
    }

    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Runs until `shutdown` is called. The first tick waits for the next
    /// boundary aligned to the frequency; later ticks are paced by the
    /// frequency minus the time the previous tick took.
    pub async fn run(&self) {
        if let Err(current) = self.state.compare_exchange(
            SchedulerState::Created as u8,
            SchedulerState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            let current = SchedulerState::from_u8(current);
            warn!(target: "backup::scheduler", "scheduler cannot run from state {:?}", current);
            if current == SchedulerState::Shutdown {
                // shut down before ever running; the backuper may still be open
                let _ = self.backuper.close().await;
            }
            return;
        }

        info!(target: "backup::scheduler", "starting backup scheduler");
        let mut wait = next_wait(Utc::now(), self.frequency, None);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!(target: "backup::scheduler", "closing backup scheduler");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    let started = Instant::now();
                    self.tick().await;

                    // runs again next tick independent of error
                    wait = next_wait(Utc::now(), self.frequency, Some(started.elapsed()));
                }
            }
        }

        if let Err(e) = self.backuper.close().await {
            error!(target: "backup::scheduler", "closing backuper: {}", e);
        }
        self.state.store(SchedulerState::Shutdown as u8, Ordering::SeqCst);
    }

    /// Stops the loop at its next select. Safe to call any number of times,
    /// before or after `run`.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(target: "backup::scheduler", "shutdown requested");
        }
        self.shutdown.cancel();
        let _ = self.state.compare_exchange(
            SchedulerState::Created as u8,
            SchedulerState::Shutdown as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    async fn tick(&self) {
        let result = match self.backuper.backup(&self.shutdown.child_token()).await {
            Ok(result) => result,
            Err(e) => {
                error!(target: "backup::scheduler", "backup failed: {}", error_chain(&e));
                return;
            }
        };

        info!(
            target: "backup::scheduler",
            "backup succeeded path={} file_timestamp={} elapsed_time={}ms elapsed_time_vacuum={}ms \
             elapsed_time_compression={}ms size={} size_vacuum={} size_compression={}",
            result.path.display(),
            result.timestamp.to_rfc3339(),
            result.elapsed_time.as_millis(),
            result.vacuum_elapsed_time.as_millis(),
            result.compression_elapsed_time.as_millis(),
            result.size,
            result.size_after_vacuum,
            result.size_after_compression,
        );

        tokio::select! {
            sent = self.results.send(result) => {
                if sent.is_err() {
                    warn!(target: "backup::scheduler", "result channel closed, backup not published");
                }
            }
            _ = self.shutdown.cancelled() => {
                warn!(target: "backup::scheduler", "shutdown while publishing, backup not published");
            }
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}
