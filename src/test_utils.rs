use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use crate::backup::copier::Copier;
use crate::database::SourceDatabase;
use crate::error::BoxError;
use crate::utils::backup_file_path;

/// Creates a database with free pages: rows are inserted, then every other one is deleted.
pub async fn create_control_database(dir: &Path) -> PathBuf {
    let path = dir.join("control.db");
    let mut conn = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .connect()
        .await
        .unwrap();

    sqlx::query("CREATE TABLE records (id INTEGER PRIMARY KEY, payload BLOB NOT NULL)")
        .execute(&mut conn)
        .await
        .unwrap();
    sqlx::query(
        "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 200) \
         INSERT INTO records (id, payload) SELECT n, randomblob(5000) FROM seq",
    )
    .execute(&mut conn)
    .await
    .unwrap();
    sqlx::query("DELETE FROM records WHERE id % 2 = 0")
        .execute(&mut conn)
        .await
        .unwrap();

    conn.close().await.unwrap();
    path
}

/// Materializes a copy of `fixture` at the backup name for the requested
/// (or a pinned) timestamp, without touching the source handle.
pub struct FixtureCopier {
    pub fixture: PathBuf,
    pub timestamp: Option<DateTime<Utc>>,
}

#[async_trait]
impl Copier for FixtureCopier {
    async fn create_snapshot(
        &self,
        _source: &SourceDatabase,
        dir: &Path,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf, BoxError> {
        let path = backup_file_path(dir, self.timestamp.unwrap_or(timestamp));
        fs::copy(&self.fixture, &path)?;
        Ok(path)
    }
}

/// Writes `contents` as the snapshot, whatever they are.
pub struct BytesCopier(pub Vec<u8>);

#[async_trait]
impl Copier for BytesCopier {
    async fn create_snapshot(
        &self,
        _source: &SourceDatabase,
        dir: &Path,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf, BoxError> {
        let path = backup_file_path(dir, timestamp);
        fs::write(&path, &self.0)?;
        Ok(path)
    }
}

/// Fails the first `failures` calls, then delegates.
pub struct FlakyCopier<C> {
    pub inner: C,
    pub failures: usize,
    pub calls: AtomicUsize,
}

impl<C> FlakyCopier<C> {
    pub fn new(inner: C, failures: usize) -> FlakyCopier<C> {
        FlakyCopier {
            inner,
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<C: Copier> Copier for FlakyCopier<C> {
    async fn create_snapshot(
        &self,
        source: &SourceDatabase,
        dir: &Path,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf, BoxError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err("snapshot refused".into());
        }
        self.inner.create_snapshot(source, dir, timestamp).await
    }
}

pub fn backup_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(crate::utils::BACKUP_PREFIX))
        .collect();
    names.sort();
    names
}

/// Keeps inserting into the control database from its own thread until stopped.
pub struct BackgroundWriter {
    stop: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl BackgroundWriter {
    pub fn start(path: &Path) -> BackgroundWriter {
        let stop = Arc::new(AtomicBool::new(false));
        let writes = Arc::new(AtomicUsize::new(0));
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.busy_timeout(Duration::from_secs(5)).unwrap();

        let handle = std::thread::spawn({
            let stop = stop.clone();
            let writes = writes.clone();
            move || {
                while !stop.load(Ordering::SeqCst) {
                    if conn
                        .execute("INSERT INTO records (payload) VALUES (randomblob(3000))", ())
                        .is_ok()
                    {
                        writes.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
            }
        });

        BackgroundWriter { stop, writes, handle }
    }

    pub fn wait_for_writes(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.writes.load(Ordering::SeqCst) < count {
            assert!(Instant::now() < deadline, "writer made no progress");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Stops the writer and returns how many inserts it committed.
    pub fn stop(self) -> usize {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.join().unwrap();
        self.writes.load(Ordering::SeqCst)
    }
}

pub fn integrity_check(path: &Path) -> String {
    let conn = rusqlite::Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY).unwrap();
    conn.query_row("PRAGMA integrity_check", (), |row| row.get(0)).unwrap()
}
