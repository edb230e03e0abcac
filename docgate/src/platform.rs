//! Server-side store backend for the access controller.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::access::{AccessBackend, AccessError, AccessRecord, DocumentRef, Result};
use crate::access_log::AccessLogStore;
use crate::documents::DocumentStore;
use crate::storage::ObjectStore;

/// Access backend wired directly to the local database and object store.
#[derive(Clone)]
pub struct PlatformBackend {
    pub access_log: AccessLogStore,
    pub documents: DocumentStore,
    pub objects: Arc<ObjectStore>,
}

impl PlatformBackend {
    pub fn new(
        access_log: AccessLogStore,
        documents: DocumentStore,
        objects: Arc<ObjectStore>,
    ) -> Self {
        Self {
            access_log,
            documents,
            objects,
        }
    }
}

#[async_trait]
impl AccessBackend for PlatformBackend {
    async fn insert_access_record(&self, record: &AccessRecord) -> Result<()> {
        self.access_log
            .insert(record)
            .await
            .map_err(|e| AccessError::Store(format!("{e:#}")))
    }

    async fn latest_document(&self) -> Result<Option<DocumentRef>> {
        self.documents
            .latest()
            .await
            .map_err(|e| AccessError::Store(format!("{e:#}")))
    }

    async fn create_signed_url(&self, storage_path: &str, ttl: Duration) -> Result<String> {
        self.objects
            .create_signed_url(storage_path, ttl, Utc::now())
            .await
            .map(|link| link.url)
            .map_err(|e| AccessError::Store(e.to_string()))
    }
}
