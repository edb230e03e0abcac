//! Filesystem object store with HMAC-signed, time-limited links.
//!
//! Objects live as flat files under one root directory. A signed link looks
//! like:
//!
//! ```text
//! <public_url>/storage/<path>?expires=<unix seconds>&signature=<hex>
//! ```
//!
//! where the signature is HMAC-SHA256 over `"<path>\n<expires>"`. The link is
//! honoured while `now < expires`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::access::SignedLink;

type HmacSha256 = Hmac<Sha256>;

/// Object store error type.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object path: {0:?}")]
    InvalidPath(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid link signature")]
    InvalidSignature,

    #[error("Link expired")]
    Expired,

    #[error("Invalid signing secret")]
    InvalidSecret,

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Flat-file bucket.
pub struct ObjectStore {
    root: PathBuf,
    public_url: String,
    mac: HmacSha256,
}

impl ObjectStore {
    /// Open (creating if needed) the bucket at `root`.
    pub fn new(root: &Path, public_url: &str, signing_secret: &str) -> Result<Self> {
        if signing_secret.is_empty() {
            return Err(StorageError::InvalidSecret);
        }
        let mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
            .map_err(|_| StorageError::InvalidSecret)?;

        std::fs::create_dir_all(root)?;

        Ok(Self {
            root: root.to_path_buf(),
            public_url: public_url.trim_end_matches('/').to_string(),
            mac,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `bytes` under a fresh random name that keeps the extension of
    /// `original_name`. Returns the storage path.
    pub async fn upload(&self, original_name: &str, bytes: &[u8]) -> Result<String> {
        let storage_path = match extension(original_name) {
            Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
            None => Uuid::new_v4().to_string(),
        };

        tokio::fs::write(self.root.join(&storage_path), bytes).await?;
        debug!(storage_path = %storage_path, size = bytes.len(), "Object stored");

        Ok(storage_path)
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.object_path(path)?;
        tokio::fs::read(&file).await.map_err(|e| not_found_or(e, path))
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        let file = self.object_path(path)?;
        tokio::fs::remove_file(&file)
            .await
            .map_err(|e| not_found_or(e, path))?;
        debug!(storage_path = path, "Object removed");
        Ok(())
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        let file = self.object_path(path)?;
        Ok(tokio::fs::try_exists(&file).await?)
    }

    /// Issue a link to `path` valid for `ttl` from `now`.
    ///
    /// Fails with `NotFound` if the object does not exist.
    pub async fn create_signed_url(
        &self,
        path: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<SignedLink> {
        if !self.exists(path).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let expires = now.timestamp().saturating_add(ttl.as_secs() as i64);
        let signature = hex::encode(self.sign(path, expires));

        Ok(SignedLink {
            url: format!(
                "{}/storage/{path}?expires={expires}&signature={signature}",
                self.public_url
            ),
            issued_at: now,
            ttl,
        })
    }

    /// Check a presented link. The signature is compared in constant time.
    pub fn verify(
        &self,
        path: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        validate_path(path)?;

        let signature_bytes = hex::decode(signature).map_err(|_| StorageError::InvalidSignature)?;

        let mut mac = self.mac.clone();
        mac.update(signing_payload(path, expires).as_bytes());
        mac.verify_slice(&signature_bytes)
            .map_err(|_| StorageError::InvalidSignature)?;

        if now.timestamp() >= expires {
            return Err(StorageError::Expired);
        }

        Ok(())
    }

    fn sign(&self, path: &str, expires: i64) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(signing_payload(path, expires).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn object_path(&self, path: &str) -> Result<PathBuf> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

fn signing_payload(path: &str, expires: i64) -> String {
    format!("{path}\n{expires}")
}

fn not_found_or(err: std::io::Error, path: &str) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Io(err)
    }
}

/// A storage path is a single file name made of `[A-Za-z0-9._-]` that does
/// not start with a dot.
fn validate_path(path: &str) -> Result<()> {
    let valid = !path.is_empty()
        && path.len() <= 128
        && !path.starts_with('.')
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidPath(path.to_string()))
    }
}

/// Lowercased extension of an uploaded file name, if it has a sane one.
fn extension(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(600);

    fn store(temp: &TempDir) -> ObjectStore {
        ObjectStore::new(temp.path(), "https://docs.example.com/", "test-secret").unwrap()
    }

    #[tokio::test]
    async fn test_upload_keeps_extension() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let a = store.upload("My CV.PDF", b"%PDF-1.7").await.unwrap();
        let b = store.upload("My CV.PDF", b"%PDF-1.7").await.unwrap();

        assert!(a.ends_with(".pdf"));
        assert_ne!(a, b);
        assert_eq!(store.read(&a).await.unwrap(), b"%PDF-1.7");

        let bare = store.upload("README", b"x").await.unwrap();
        assert!(!bare.contains('.'));
    }

    #[tokio::test]
    async fn test_remove() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let path = store.upload("doc.pdf", b"data").await.unwrap();
        store.remove(&path).await.unwrap();

        assert!(!store.exists(&path).await.unwrap());
        assert!(matches!(
            store.remove(&path).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.read(&path).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        for path in ["../secret", "a/b.pdf", "..", ".hidden", "", "a\\b"] {
            assert!(
                matches!(store.read(path).await, Err(StorageError::InvalidPath(_))),
                "{path:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_secret_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            ObjectStore::new(temp.path(), "http://localhost", ""),
            Err(StorageError::InvalidSecret)
        ));
    }

    #[tokio::test]
    async fn test_signed_url_format_and_verify() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let path = store.upload("doc.pdf", b"data").await.unwrap();

        let now = DateTime::parse_from_rfc3339("2026-01-15T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let link = store.create_signed_url(&path, TTL, now).await.unwrap();

        let expires = now.timestamp() + 600;
        let prefix =
            format!("https://docs.example.com/storage/{path}?expires={expires}&signature=");
        assert!(link.url.starts_with(&prefix), "{}", link.url);
        assert_eq!(link.issued_at, now);
        assert_eq!(link.ttl, TTL);

        let signature = &link.url[prefix.len()..];
        assert!(store.verify(&path, expires, signature, now).is_ok());
        assert!(
            store
                .verify(&path, expires, signature, now + chrono::Duration::seconds(599))
                .is_ok()
        );
        assert!(matches!(
            store.verify(&path, expires, signature, now + chrono::Duration::seconds(600)),
            Err(StorageError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_verify_rejects_tampering() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let path = store.upload("doc.pdf", b"data").await.unwrap();
        let other = store.upload("other.pdf", b"data").await.unwrap();

        let now = Utc::now();
        let link = store.create_signed_url(&path, TTL, now).await.unwrap();
        let (_, query) = link.url.split_once("signature=").unwrap();
        let expires = now.timestamp() + 600;

        // Different object
        assert!(matches!(
            store.verify(&other, expires, query, now),
            Err(StorageError::InvalidSignature)
        ));
        // Extended expiry
        assert!(matches!(
            store.verify(&path, expires + 3600, query, now),
            Err(StorageError::InvalidSignature)
        ));
        // Garbage signature
        assert!(matches!(
            store.verify(&path, expires, "not-hex", now),
            Err(StorageError::InvalidSignature)
        ));

        // Different secret
        let foreign = ObjectStore::new(temp.path(), "https://docs.example.com", "other").unwrap();
        assert!(foreign.verify(&path, expires, query, now).is_err());
    }

    #[tokio::test]
    async fn test_sign_missing_object() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        assert!(matches!(
            store.create_signed_url("missing.pdf", TTL, Utc::now()).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
