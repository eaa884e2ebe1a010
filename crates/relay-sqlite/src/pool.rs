//! SQLite connection pool setup.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

/// Open a pool for `database_url` (`sqlite://path`, a bare path or `sqlite::memory:`).
///
/// The database file is created if missing. An in-memory database lives on a
/// single connection that is never recycled, so every query sees the same data.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    info!("Initializing SQLite pool: {}", database_url);

    let in_memory = is_in_memory(database_url);
    let options = if database_url.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(database_url)?
    } else {
        SqliteConnectOptions::new().filename(database_url)
    }
    .create_if_missing(true);

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    pool_options.connect_with(options).await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
