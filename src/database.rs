use std::path::{Path, PathBuf};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Connection, FromRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct DatabaseStats {
    pub page_count: i64,
    pub page_size: i64,
    pub freelist_count: i64,
}

impl DatabaseStats {
    pub fn size(&self) -> i64 {
        self.page_count * self.page_size
    }
}

const STATS_QUERY: &str = "SELECT page_count, page_size, freelist_count \
     FROM pragma_page_count(), pragma_page_size(), pragma_freelist_count()";

/// Read-only handle on the live database being backed up.
///
/// Opening it proves the path is a readable SQLite database, and `stats`
/// reports its page layout. Snapshots are not streamed through this pool: the
/// copier opens its own connection for the online backup API and only checks
/// `is_closed` here, so closing the handle stops further snapshots.
#[derive(Debug, Clone)]
pub struct SourceDatabase {
    path: PathBuf,
    pool: SqlitePool,
}

impl SourceDatabase {
    /// Opens the source read-only and checks that it really is a SQLite database.
    pub async fn open(path: &Path) -> Result<SourceDatabase, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let source = SourceDatabase {
            path: path.to_path_buf(),
            pool,
        };
        if let Err(e) = source.stats().await {
            source.close().await;
            return Err(e);
        }
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn stats(&self) -> Result<DatabaseStats, sqlx::Error> {
        sqlx::query_as(STATS_QUERY).fetch_one(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Rewrites the database file at `path` in place, dropping free pages.
pub async fn vacuum(path: &Path) -> Result<(), sqlx::Error> {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .journal_mode(SqliteJournalMode::Delete)
        .connect()
        .await?;
    sqlx::query("VACUUM").execute(&mut conn).await?;
    conn.close().await
}

/// Stats of a database file that is not the live source, e.g. a finished artifact.
pub async fn file_stats(path: &Path) -> Result<DatabaseStats, sqlx::Error> {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false)
        .connect()
        .await?;
    let stats = sqlx::query_as(STATS_QUERY).fetch_one(&mut conn).await?;
    conn.close().await?;
    Ok(stats)
}
