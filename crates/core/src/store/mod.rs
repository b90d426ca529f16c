//! Local persistence: a key-value settings store and the append-only
//! event log, both on one sqlite pool.

pub mod event_log;
pub mod settings;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Open a sqlite pool. Single connection: the workload is a single writer,
/// and `sqlite::memory:` fallbacks would otherwise get one database per
/// connection. Reaping is disabled for the same reason — closing the only
/// connection of an in-memory database discards it.
pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(url)
        .await
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("../../migrations").run(&pool).await.unwrap();
    pool
}
