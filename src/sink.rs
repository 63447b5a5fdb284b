use async_trait::async_trait;
use log::{error, info};
use tokio::sync::mpsc;
use crate::backup::BackupResult;
use crate::error::BoxError;

/// Downstream consumer of finished artifacts, e.g. offsite storage.
///
/// The file at `result.path` is complete when it arrives, but later pruning
/// may delete it, so a sink must not rely on it staying around.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn consume(&self, result: &BackupResult) -> Result<(), BoxError>;
}

/// Feeds every published result to `sink` until the channel closes.
/// A failing sink is logged and does not stop the drain.
pub async fn drain<S: ResultSink + ?Sized>(mut results: mpsc::Receiver<BackupResult>, sink: &S) {
    while let Some(result) = results.recv().await {
        if let Err(e) = sink.consume(&result).await {
            error!(target: "sink", "sink failed for {}: {}", result.path.display(), e);
        }
    }
    info!(target: "sink", "result channel closed");
}

/// Logs each artifact that is ready to be shipped.
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn consume(&self, result: &BackupResult) -> Result<(), BoxError> {
        info!(
            target: "sink",
            "backup ready path={} file_timestamp={} size={}",
            result.path.display(),
            result.timestamp.to_rfc3339(),
            result.artifact_size()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use chrono::Utc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        seen: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl ResultSink for CollectingSink {
        async fn consume(&self, result: &BackupResult) -> Result<(), BoxError> {
            let mut seen = self.seen.lock().await;
            seen.push(result.path.clone());
            if seen.len() == 1 {
                return Err("upload rejected".into());
            }
            Ok(())
        }
    }

    fn result(name: &str) -> BackupResult {
        BackupResult {
            path: PathBuf::from(name),
            timestamp: Utc::now(),
            size: 4096,
            size_after_vacuum: 0,
            size_after_compression: 0,
            elapsed_time: Duration::from_millis(3),
            vacuum_elapsed_time: Duration::ZERO,
            compression_elapsed_time: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_drain_continues_after_sink_error() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(result("a.db")).await.unwrap();
        tx.send(result("b.db")).await.unwrap();
        drop(tx);

        let sink = CollectingSink::default();
        drain(rx, &sink).await;

        assert_eq!(*sink.seen.lock().await, vec![PathBuf::from("a.db"), PathBuf::from("b.db")]);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_results() {
        assert!(LogSink.consume(&result("a.db")).await.is_ok());
    }
}
