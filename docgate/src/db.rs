//! Database management for docgate.
//!
//! Provides a shared connection pool used by the document, access log and
//! admin auth stores.
//!
//! The database backend is selected at compile time via feature flags:
//! - `sqlite` (default): Uses SQLite
//! - `postgres`: Uses PostgreSQL

use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use tracing::info;

#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
#[cfg(feature = "sqlite")]
use std::str::FromStr;

#[cfg(feature = "postgres")]
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

// Re-export the pool and row types for the selected backend
#[cfg(feature = "sqlite")]
pub use sqlx::{SqlitePool as DbPool, sqlite::SqliteRow as DbRow};

#[cfg(feature = "postgres")]
pub use sqlx::{PgPool as DbPool, postgres::PgRow as DbRow};

/// Shared database.
///
/// Owns the connection pool and runs migrations. Create once at startup and
/// hand `pool()` clones to the stores.
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Connect (creating the SQLite file if needed) and run pending migrations.
    #[cfg(feature = "sqlite")]
    pub async fn new(config: &DatabaseConfig, data_dir: &Path) -> Result<Self> {
        let db_path = config
            .path
            .clone()
            .unwrap_or_else(|| data_dir.join("docgate.db"));

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        sqlx::migrate!("./migrations/shared")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        info!(backend = "sqlite", path = %db_path.display(), "Database connected");

        Ok(Self { pool })
    }

    /// Connect and run pending migrations.
    #[cfg(feature = "postgres")]
    pub async fn new(config: &DatabaseConfig, _data_dir: &Path) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        sqlx::migrate!("./migrations/shared")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        info!(
            backend = "postgres",
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Database connected"
        );

        Ok(Self { pool })
    }

    /// Get a clone of the connection pool (internally Arc-based).
    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }
}

/// Encode a timestamp for storage. Fixed width, so text order is time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp in database: {value}"))?
        .with_timezone(&Utc))
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_connection() {
        let temp = TempDir::new().unwrap();
        let config = DatabaseConfig::default();
        let db = Database::new(&config, temp.path()).await.unwrap();

        let _pool = db.pool();
        assert!(temp.path().join("docgate.db").exists());
    }

    #[test]
    fn test_timestamp_text_order_matches_time_order() {
        let earlier = parse_timestamp("2026-01-15T09:00:00Z").unwrap();
        let later = earlier + chrono::Duration::milliseconds(1500);

        let a = format_timestamp(earlier);
        let b = format_timestamp(later);
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp(&b).unwrap(), later);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
