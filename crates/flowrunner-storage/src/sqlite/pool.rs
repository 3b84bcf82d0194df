//! Database pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows only one writer at a time. This mirrors the teacher's own
//! `DatabasePool` (`boternity-infra/src/sqlite/pool.rs`): a multi-connection
//! reader pool for concurrent reads, a single-connection writer pool for
//! serialized writes, both in WAL mode with foreign keys enforced.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Split read/write pool for SQLite with WAL mode.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if missing) and migrate the database at `database_url`.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5))
            .create_if_missing(true);

        let read_opts = base_opts.clone().read_only(true);
        let write_opts = base_opts;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(write_opts)
            .await?;

        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(read_opts)
            .await?;

        Ok(Self { reader, writer })
    }
}

/// Default database URL from `FLOWRUNNER_DATA_DIR`, falling back to
/// `~/.flowrunner/flowrunner.db` (teacher's `default_database_url`,
/// renamed env var).
pub fn default_database_url() -> String {
    let data_dir = std::env::var("FLOWRUNNER_DATA_DIR").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/.flowrunner")
    });
    format!("sqlite://{data_dir}/flowrunner.db")
}
