//! Collaborators for running the access controller away from the server.
//!
//! Used by `docgate view`: the store is the server's JSON API, the client-local
//! storage is a small JSON file in the data directory, and the requester
//! address comes from a public IP echo service.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::access::{
    AccessBackend, AccessError, AccessRecord, DocumentRef, GateTokenStore, IpLookup, Result,
};
use crate::api::{ApiError, SignRequest, SignResponse};

const USER_AGENT: &str = concat!("docgate/", env!("CARGO_PKG_VERSION"));

/// Store backend speaking to a docgate server.
pub struct HttpBackend {
    base_url: String,
    http_client: Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Turn a non-success response into a store error carrying the server's message.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    Err(AccessError::Store(format!("Server error ({status}): {message}")))
}

fn network(err: reqwest::Error) -> AccessError {
    AccessError::Network(err.to_string())
}

#[async_trait]
impl AccessBackend for HttpBackend {
    async fn insert_access_record(&self, record: &AccessRecord) -> Result<()> {
        let response = self
            .http_client
            .post(self.url("/api/access"))
            .json(record)
            .send()
            .await
            .map_err(network)?;

        check_status(response).await?;
        Ok(())
    }

    async fn latest_document(&self) -> Result<Option<DocumentRef>> {
        let response = self
            .http_client
            .get(self.url("/api/documents/latest"))
            .send()
            .await
            .map_err(network)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AccessError::Store(format!("Invalid document response: {e}")))
    }

    async fn create_signed_url(&self, storage_path: &str, ttl: Duration) -> Result<String> {
        let request = SignRequest {
            path: storage_path.to_string(),
            expires_in: ttl.as_secs(),
        };

        let response = self
            .http_client
            .post(self.url("/api/storage/sign"))
            .json(&request)
            .send()
            .await
            .map_err(network)?;

        let signed: SignResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AccessError::Store(format!("Invalid sign response: {e}")))?;

        Ok(signed.signed_url)
    }
}

#[derive(Deserialize)]
struct IpEcho {
    ip: String,
}

/// Public IP lookup against an ipify-style service (`{"ip": "..."}`).
pub struct HttpIpLookup {
    url: String,
    http_client: Client,
}

impl HttpIpLookup {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            url: url.to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl IpLookup for HttpIpLookup {
    async fn lookup(&self) -> Result<String> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| AccessError::IpLookup(e.to_string()))?;

        let echo: IpEcho = response
            .json()
            .await
            .map_err(|e| AccessError::IpLookup(e.to_string()))?;

        debug!(ip = %echo.ip, "Resolved public address");
        Ok(echo.ip)
    }
}

/// Client-local key/value storage persisted as JSON, with no expiry.
pub struct FileGateTokenStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileGateTokenStore {
    /// Open `local_storage.json` in `data_dir`, loading any existing entries.
    pub fn new(data_dir: &Path) -> Self {
        let path = data_dir.join("local_storage.json");
        let entries = Self::load_from_file(&path).unwrap_or_default();
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    fn load_from_file(path: &Path) -> Option<HashMap<String, String>> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    warn!(path = %path.display(), "Failed to parse local storage file: {e}");
                    None
                }
            },
            Err(e) => {
                warn!(path = %path.display(), "Failed to read local storage file: {e}");
                None
            }
        }
    }

    async fn save(&self, entries: &HashMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| AccessError::LocalStorage(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AccessError::LocalStorage(e.to_string()))?;
        }

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| AccessError::LocalStorage(e.to_string()))
    }
}

#[async_trait]
impl GateTokenStore for FileGateTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::model::GATE_TOKEN_KEY;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_gate_token_store_persists() {
        let temp = TempDir::new().unwrap();

        let store = FileGateTokenStore::new(temp.path());
        assert_eq!(store.get(GATE_TOKEN_KEY).await.unwrap(), None);
        store.set(GATE_TOKEN_KEY, "a@b.com").await.unwrap();

        let reopened = FileGateTokenStore::new(temp.path());
        assert_eq!(
            reopened.get(GATE_TOKEN_KEY).await.unwrap(),
            Some("a@b.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_file_gate_token_store_ignores_corrupt_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("local_storage.json"), "{not json").unwrap();

        let store = FileGateTokenStore::new(temp.path());
        assert_eq!(store.get(GATE_TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Port 9 (discard) on localhost is not serving HTTP
        let backend = HttpBackend::new("http://127.0.0.1:9").unwrap();
        let err = backend.latest_document().await.unwrap_err();
        assert!(matches!(err, AccessError::Network(_)));
        assert!(err.is_store_failure());
    }

    #[tokio::test]
    async fn test_ip_lookup_failure() {
        let lookup = HttpIpLookup::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            lookup.lookup().await,
            Err(AccessError::IpLookup(_))
        ));
    }
}
