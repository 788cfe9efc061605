/// Database layer for the whitelist bridge
///
/// Manages the SQLite connection pool, startup reachability checks and
/// embedded migrations.

use crate::{
    config::StorageConfig,
    error::{WhitelistError, WhitelistResult},
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::{info, warn};

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
    pub acquire_timeout: Duration,
    /// Startup pings stop once the backoff delay exceeds this
    pub connect_retry_max: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
            acquire_timeout: Duration::from_secs(5),
            connect_retry_max: Duration::from_secs(2),
        }
    }
}

impl From<&StorageConfig> for DatabaseOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            acquire_timeout: config.timeout(),
            connect_retry_max: Duration::from_millis(config.connect_retry_max_ms),
            ..Self::default()
        }
    }
}

/// Open the pool, wait until the database answers, then run migrations
pub async fn connect(config: &StorageConfig) -> WhitelistResult<SqlitePool> {
    let options = DatabaseOptions::from(config);
    let pool = create_pool(&config.database_path, &options).await?;
    wait_until_reachable(&pool, options.connect_retry_max).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &std::path::Path, options: &DatabaseOptions) -> WhitelistResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WhitelistError::Internal(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }
    }

    let connect_options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(if options.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        })
        .foreign_keys(true)
        .busy_timeout(options.acquire_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .acquire_timeout(options.acquire_timeout)
        .connect_with(connect_options)
        .await?;

    info!(path = %path.display(), "database pool created");
    Ok(pool)
}

/// Ping with exponential backoff starting at 100ms
pub async fn wait_until_reachable(pool: &SqlitePool, retry_max: Duration) -> WhitelistResult<()> {
    let mut backoff = Duration::from_millis(100);

    loop {
        let attempt = tokio::time::timeout(Duration::from_secs(2), test_connection(pool)).await;

        let err = match attempt {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => WhitelistError::Timeout("database ping".to_string()),
        };

        if backoff > retry_max {
            return Err(err);
        }

        warn!(error = %err, backoff_ms = backoff.as_millis() as u64, "database not reachable yet");
        tokio::time::sleep(backoff).await;
        backoff *= 2;
    }
}

/// Run migrations for a database
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> WhitelistResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| WhitelistError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> WhitelistResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Single-connection in-memory database with migrations applied
#[cfg(test)]
pub async fn create_memory_pool() -> WhitelistResult<SqlitePool> {
    // One connection, otherwise every pooled connection sees its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_storage_config() {
        let config = StorageConfig {
            database_path: "./data/test.sqlite".into(),
            max_connections: 3,
            connect_retry_max_ms: 800,
            timeout_secs: 7,
        };

        let options = DatabaseOptions::from(&config);
        assert_eq!(options.max_connections, 3);
        assert_eq!(options.acquire_timeout, Duration::from_secs(7));
        assert_eq!(options.connect_retry_max, Duration::from_millis(800));
        assert!(options.enable_wal);
    }

    #[tokio::test]
    async fn test_connect_creates_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("nested").join("whitelist.sqlite"),
            max_connections: 2,
            connect_retry_max_ms: 200,
            timeout_secs: 5,
        };

        let pool = connect(&config).await.unwrap();
        assert!(config.database_path.exists());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM whitelist_users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        // Running migrations twice is harmless
        run_migrations(&pool).await.unwrap();
        pool.close().await;
    }

    #[tokio::test]
    async fn test_wait_until_reachable_gives_up_on_closed_pool() {
        let pool = create_memory_pool().await.unwrap();
        pool.close().await;

        let result = wait_until_reachable(&pool, Duration::from_millis(150)).await;
        assert!(result.is_err());
    }
}
