//! Append-only log of gate passes.

use anyhow::{Context, Result};
use sqlx::Row;
use uuid::Uuid;

use crate::access::AccessRecord;
use crate::db::{DbPool, DbRow, format_timestamp, parse_timestamp};
use crate::sql;

#[derive(Clone)]
pub struct AccessLogStore {
    pool: DbPool,
}

impl AccessLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a record. Repeat visits by the same email are separate rows.
    pub async fn insert(&self, record: &AccessRecord) -> Result<()> {
        sqlx::query(sql::INSERT_ACCESS_RECORD)
            .bind(Uuid::new_v4().to_string())
            .bind(&record.email)
            .bind(format_timestamp(record.accessed_at))
            .bind(&record.user_agent)
            .bind(&record.ip_address)
            .execute(&self.pool)
            .await
            .context("Failed to insert access record")?;

        Ok(())
    }

    /// All records, most recent first.
    pub async fn list(&self) -> Result<Vec<AccessRecord>> {
        let rows = sqlx::query(sql::SELECT_ALL_ACCESS_RECORDS)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list access records")?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &DbRow) -> Result<AccessRecord> {
    Ok(AccessRecord {
        email: row.try_get("email")?,
        accessed_at: parse_timestamp(row.try_get("accessed_at")?)?,
        user_agent: row.try_get("user_agent")?,
        ip_address: row.try_get("ip_address")?,
    })
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::Database;
    use chrono::{Duration, SubsecRound, Utc};
    use tempfile::TempDir;

    fn record(email: &str, minutes_ago: i64) -> AccessRecord {
        AccessRecord {
            email: email.to_string(),
            accessed_at: (Utc::now() - Duration::minutes(minutes_ago)).trunc_subsecs(6),
            user_agent: "Mozilla/5.0".to_string(),
            ip_address: "unknown".to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_only_newest_first() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&DatabaseConfig::default(), temp.path())
            .await
            .unwrap();
        let store = AccessLogStore::new(db.pool());

        let first = record("a@b.com", 30);
        let second = record("c@d.com", 10);
        let repeat = record("a@b.com", 1);

        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();
        store.insert(&repeat).await.unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records, vec![repeat, second, first]);
    }
}
