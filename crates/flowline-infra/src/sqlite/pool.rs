//! SQLite connection management for the engine's storage.
//!
//! One writer connection, many readers. Checkpointing serializes every
//! write through the single writer anyway, while the dispatcher, the
//! schedule checker, and the resume sweep all read concurrently, so the
//! reader side gets a real pool. WAL mode keeps readers from blocking the
//! writer.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Reader connections opened by [`DatabasePool::new`]. Sized for the
/// engine's steady state: trigger lookups, checker sweeps, and resume
/// queries running alongside each other.
pub const DEFAULT_READERS: u32 = 8;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Split read/write handle to one SQLite database.
///
/// `writer` is a single-connection pool, so checkpoint writes queue instead
/// of failing with `SQLITE_BUSY`. `reader` is a read-only pool for
/// everything else.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open the database at `database_url` with [`DEFAULT_READERS`] reader
    /// connections, creating the file if needed and running migrations.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::with_readers(database_url, DEFAULT_READERS).await
    }

    /// Like [`new`](Self::new) with an explicit reader pool size.
    ///
    /// Migrations run on the writer before the readers open, so a reader
    /// never sees a half-migrated schema.
    pub async fn with_readers(database_url: &str, readers: u32) -> Result<Self, sqlx::Error> {
        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options(database_url)?)
            .await?;

        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(readers.max(1))
            .connect_with(connect_options(database_url)?.read_only(true))
            .await?;

        Ok(Self { reader, writer })
    }
}

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        .create_if_missing(true))
}

/// Database URL from `FLOWLINE_DATA_DIR`, falling back to
/// `~/.flowline/flowline.db`.
pub fn default_database_url() -> String {
    let data_dir = std::env::var("FLOWLINE_DATA_DIR").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/.flowline")
    });
    format!("sqlite://{data_dir}/flowline.db")
}
