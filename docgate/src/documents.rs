//! Document metadata store.
//!
//! One row per uploaded object. The newest row is the document visitors see.

use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::access::DocumentRef;
use crate::db::{DbPool, DbRow, format_timestamp, parse_timestamp};
use crate::sql;

/// Database-backed document metadata.
#[derive(Clone)]
pub struct DocumentStore {
    pool: DbPool,
}

impl DocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record a newly uploaded object.
    pub async fn insert(&self, name: &str, storage_path: &str, size: i64) -> Result<DocumentRef> {
        self.insert_at(name, storage_path, size, Utc::now()).await
    }

    /// Record an object with an explicit creation time.
    pub async fn insert_at(
        &self,
        name: &str,
        storage_path: &str,
        size: i64,
        created_at: DateTime<Utc>,
    ) -> Result<DocumentRef> {
        let document = DocumentRef {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            storage_path: storage_path.to_string(),
            size,
            // Stored with microsecond precision
            created_at: created_at.trunc_subsecs(6),
        };

        sqlx::query(sql::INSERT_DOCUMENT)
            .bind(&document.id)
            .bind(&document.name)
            .bind(&document.storage_path)
            .bind(document.size)
            .bind(format_timestamp(document.created_at))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert document {name}"))?;

        debug!(id = %document.id, document_name = name, storage_path, size, "Document recorded");
        Ok(document)
    }

    /// The current document: greatest `created_at`.
    pub async fn latest(&self) -> Result<Option<DocumentRef>> {
        let row = sqlx::query(sql::SELECT_LATEST_DOCUMENT)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query latest document")?;

        row.as_ref().map(row_to_document).transpose()
    }

    /// All documents, newest first.
    pub async fn list(&self) -> Result<Vec<DocumentRef>> {
        let rows = sqlx::query(sql::SELECT_ALL_DOCUMENTS)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list documents")?;

        rows.iter().map(row_to_document).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Option<DocumentRef>> {
        let row = sqlx::query(sql::SELECT_DOCUMENT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query document")?;

        row.as_ref().map(row_to_document).transpose()
    }

    /// Delete a document row. Returns false if it did not exist.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(sql::DELETE_DOCUMENT)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_document(row: &DbRow) -> Result<DocumentRef> {
    Ok(DocumentRef {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        storage_path: row.try_get("storage_path")?,
        size: row.try_get("size")?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
    })
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::Database;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn store() -> (TempDir, DocumentStore) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&DatabaseConfig::default(), temp.path())
            .await
            .unwrap();
        (temp, DocumentStore::new(db.pool()))
    }

    #[tokio::test]
    async fn test_latest_empty() {
        let (_temp, store) = store().await;
        assert!(store.latest().await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_is_newest_created() {
        let (_temp, store) = store().await;
        let now = Utc::now();

        store
            .insert_at("old.pdf", "a.pdf", 10, now - Duration::hours(2))
            .await
            .unwrap();
        let newest = store.insert_at("new.pdf", "b.pdf", 20, now).await.unwrap();
        store
            .insert_at("mid.pdf", "c.pdf", 30, now - Duration::hours(1))
            .await
            .unwrap();

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest, newest);

        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["new.pdf", "mid.pdf", "old.pdf"]);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let (_temp, store) = store().await;
        let doc = store.insert("cv.pdf", "x.pdf", 2048).await.unwrap();

        let fetched = store.get(&doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.storage_path, "x.pdf");
        assert_eq!(fetched.size, 2048);

        assert!(store.delete(&doc.id).await.unwrap());
        assert!(!store.delete(&doc.id).await.unwrap());
        assert!(store.get(&doc.id).await.unwrap().is_none());
    }
}
