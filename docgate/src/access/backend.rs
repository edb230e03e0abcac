//! Collaborator contracts consumed by the access controller.
//!
//! The controller never talks to a database, object store or browser storage
//! directly. It goes through these traits so the same state machine runs
//! inside the HTTP server (backed by the local stores) and in the CLI viewer
//! (backed by the server's JSON API).

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use super::error::{AccessError, Result};
use super::model::{AccessRecord, DocumentRef};

/// The store holding access logs, document metadata and document bytes.
#[async_trait]
pub trait AccessBackend: Send + Sync {
    /// Append an access record. No uniqueness constraint.
    async fn insert_access_record(&self, record: &AccessRecord) -> Result<()>;

    /// The most recently created document, if any.
    async fn latest_document(&self) -> Result<Option<DocumentRef>>;

    /// Sign a URL for the object at `storage_path`, valid for `ttl`.
    async fn create_signed_url(&self, storage_path: &str, ttl: Duration) -> Result<String>;
}

/// Client-local key/value persistence with no expiry.
#[async_trait]
pub trait GateTokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Best-effort lookup of the requester's network address.
///
/// Failures are absorbed by the controller and replaced with
/// [`UNKNOWN_IP`](super::model::UNKNOWN_IP).
#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn lookup(&self) -> Result<String>;
}

/// In-memory gate token store. Used per request by the HTTP viewer, where the
/// real client-side storage is a cookie.
#[derive(Default)]
pub struct MemoryGateTokenStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryGateTokenStore {
    /// Create a store that already holds a gate token for `email`.
    pub fn with_gate_token(email: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(super::model::GATE_TOKEN_KEY.to_string(), email.to_string());
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl GateTokenStore for MemoryGateTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Address already known to the caller, e.g. taken from the HTTP connection.
pub struct KnownIp(pub Option<String>);

#[async_trait]
impl IpLookup for KnownIp {
    async fn lookup(&self) -> Result<String> {
        self.0
            .clone()
            .ok_or_else(|| AccessError::IpLookup("client address unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::model::GATE_TOKEN_KEY;

    #[tokio::test]
    async fn test_memory_gate_token_store() {
        let store = MemoryGateTokenStore::default();
        assert_eq!(store.get(GATE_TOKEN_KEY).await.unwrap(), None);

        store.set(GATE_TOKEN_KEY, "a@b.com").await.unwrap();
        assert_eq!(
            store.get(GATE_TOKEN_KEY).await.unwrap(),
            Some("a@b.com".to_string())
        );

        let seeded = MemoryGateTokenStore::with_gate_token("c@d.com");
        assert_eq!(
            seeded.get(GATE_TOKEN_KEY).await.unwrap(),
            Some("c@d.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_known_ip() {
        assert_eq!(
            KnownIp(Some("10.0.0.1".to_string())).lookup().await.unwrap(),
            "10.0.0.1"
        );
        assert!(KnownIp(None).lookup().await.is_err());
    }
}
