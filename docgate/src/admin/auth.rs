//! Admin authentication: the admin lookup table, magic sign-in links and
//! sessions.
//!
//! Anyone with a well-formed email can request a sign-in link, but only
//! emails in `admin_users` get a session when it is redeemed. The request
//! extractor checks the table again on every request, so removing an admin
//! takes effect immediately.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use sqlx::Row;
use tracing::{debug, info};

use crate::db::{DbPool, DbRow, format_timestamp, parse_timestamp};
use crate::sql;

/// Admin user record
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Admin session record
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Delivers magic sign-in links.
#[async_trait]
pub trait MagicLinkSender: Send + Sync {
    async fn send(&self, email: &str, link: &str) -> Result<()>;
}

/// Writes the link to the log. For single-operator installs without mail.
pub struct LogMagicLinkSender;

#[async_trait]
impl MagicLinkSender for LogMagicLinkSender {
    async fn send(&self, email: &str, link: &str) -> Result<()> {
        info!(email, link, "Magic sign-in link issued");
        Ok(())
    }
}

/// Emails are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// `now + ttl_secs`, or an error when the lifetime does not fit a timestamp.
fn expiry(now: DateTime<Utc>, ttl_secs: u64) -> Result<DateTime<Utc>> {
    i64::try_from(ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .with_context(|| format!("Lifetime of {ttl_secs}s is out of range"))
}

/// Database-backed storage for admin users, magic links and sessions.
#[derive(Clone)]
pub struct AdminAuthStore {
    pool: DbPool,
}

impl AdminAuthStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// 64 alphanumeric characters from the thread-local CSPRNG.
    fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect()
    }

    /// Add an email to the admin table. Returns false if it was already there.
    pub async fn add_user(&self, email: &str) -> Result<bool> {
        let result = sqlx::query(sql::INSERT_ADMIN_USER)
            .bind(normalize_email(email))
            .bind(format_timestamp(Utc::now()))
            .execute(&self.pool)
            .await
            .context("Failed to create admin user")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_user(&self, email: &str) -> Result<Option<AdminUser>> {
        let row = sqlx::query(sql::SELECT_ADMIN_USER)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query admin user")?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn is_admin(&self, email: &str) -> Result<bool> {
        Ok(self.get_user(email).await?.is_some())
    }

    pub async fn list_users(&self) -> Result<Vec<AdminUser>> {
        let rows = sqlx::query(sql::SELECT_ALL_ADMIN_USERS)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list admin users")?;

        rows.iter().map(row_to_user).collect()
    }

    /// Remove an admin and end their sessions. Returns false if not found.
    pub async fn remove_user(&self, email: &str) -> Result<bool> {
        let email = normalize_email(email);

        sqlx::query(sql::DELETE_ADMIN_SESSIONS_BY_EMAIL)
            .bind(&email)
            .execute(&self.pool)
            .await
            .context("Failed to delete user sessions")?;

        let result = sqlx::query(sql::DELETE_ADMIN_USER)
            .bind(&email)
            .execute(&self.pool)
            .await
            .context("Failed to delete admin user")?;

        Ok(result.rows_affected() > 0)
    }

    /// Issue a single-use sign-in token for `email`.
    pub async fn create_magic_link(&self, email: &str, ttl_secs: u64) -> Result<String> {
        let token = Self::generate_token();
        let now = Utc::now();
        let expires_at = expiry(now, ttl_secs)?;

        sqlx::query(sql::INSERT_MAGIC_LINK)
            .bind(&token)
            .bind(normalize_email(email))
            .bind(format_timestamp(now))
            .bind(format_timestamp(expires_at))
            .execute(&self.pool)
            .await
            .context("Failed to store magic link")?;

        Ok(token)
    }

    /// Redeem a sign-in token. The token is gone afterwards whether or not it
    /// was still valid. Returns the email it was issued to.
    pub async fn consume_magic_link(&self, token: &str) -> Result<Option<String>> {
        let row = sqlx::query(sql::CONSUME_MAGIC_LINK)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to consume magic link")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at = parse_timestamp(row.try_get("expires_at")?)?;
        if expires_at <= Utc::now() {
            debug!("Magic link expired");
            return Ok(None);
        }

        Ok(Some(row.try_get("email")?))
    }

    /// Start a session. Returns the session ID for the cookie.
    pub async fn create_session(
        &self,
        email: &str,
        session_timeout_secs: u64,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<String> {
        let email = normalize_email(email);
        let session_id = Self::generate_token();
        let now = Utc::now();
        let expires_at = expiry(now, session_timeout_secs)?;

        sqlx::query(sql::INSERT_ADMIN_SESSION)
            .bind(&session_id)
            .bind(&email)
            .bind(format_timestamp(now))
            .bind(format_timestamp(expires_at))
            .bind(&ip_address)
            .bind(&user_agent)
            .execute(&self.pool)
            .await
            .context("Failed to create session")?;

        // Only admins have a row to update
        sqlx::query(sql::UPDATE_ADMIN_USER_LAST_LOGIN)
            .bind(format_timestamp(now))
            .bind(&email)
            .execute(&self.pool)
            .await
            .ok();

        Ok(session_id)
    }

    /// Look up a live session. Expired sessions are deleted and reported as
    /// absent.
    pub async fn validate_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(sql::SELECT_ADMIN_SESSION)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query session")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let session = row_to_session(&row)?;
        if session.expires_at < Utc::now() {
            self.delete_session(session_id).await.ok();
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Delete a session (logout).
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        sqlx::query(sql::DELETE_ADMIN_SESSION)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    /// Delete expired sessions and magic links (background cleanup task).
    /// Returns `(sessions, links)` removed.
    pub async fn cleanup_expired(&self) -> Result<(u64, u64)> {
        let now = format_timestamp(Utc::now());

        let sessions = sqlx::query(sql::DELETE_EXPIRED_ADMIN_SESSIONS)
            .bind(&now)
            .execute(&self.pool)
            .await
            .context("Failed to delete expired sessions")?;

        let links = sqlx::query(sql::DELETE_EXPIRED_MAGIC_LINKS)
            .bind(&now)
            .execute(&self.pool)
            .await
            .context("Failed to delete expired magic links")?;

        Ok((sessions.rows_affected(), links.rows_affected()))
    }
}

fn row_to_user(row: &DbRow) -> Result<AdminUser> {
    Ok(AdminUser {
        email: row.try_get("email")?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
        last_login: row
            .try_get::<Option<String>, _>("last_login")?
            .map(|s| parse_timestamp(&s))
            .transpose()?,
    })
}

fn row_to_session(row: &DbRow) -> Result<SessionRecord> {
    Ok(SessionRecord {
        session_id: row.try_get("session_id")?,
        email: row.try_get("email")?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
        expires_at: parse_timestamp(row.try_get("expires_at")?)?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
    })
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::Database;
    use tempfile::TempDir;

    async fn store() -> (TempDir, AdminAuthStore) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&DatabaseConfig::default(), temp.path())
            .await
            .unwrap();
        (temp, AdminAuthStore::new(db.pool()))
    }

    #[tokio::test]
    async fn test_admin_users() {
        let (_temp, store) = store().await;

        assert!(store.add_user("Owner@Example.com").await.unwrap());
        assert!(!store.add_user("owner@example.com").await.unwrap());

        assert!(store.is_admin("OWNER@example.com").await.unwrap());
        assert!(!store.is_admin("someone@example.com").await.unwrap());

        let users = store.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "owner@example.com");
        assert!(users[0].last_login.is_none());

        assert!(store.remove_user("owner@example.com").await.unwrap());
        assert!(!store.remove_user("owner@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_magic_link_single_use() {
        let (_temp, store) = store().await;

        let token = store.create_magic_link("a@b.com", 900).await.unwrap();
        assert_eq!(token.len(), 64);

        assert_eq!(
            store.consume_magic_link(&token).await.unwrap(),
            Some("a@b.com".to_string())
        );
        assert_eq!(store.consume_magic_link(&token).await.unwrap(), None);
        assert_eq!(store.consume_magic_link("bogus").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_magic_link_expired() {
        let (_temp, store) = store().await;

        let token = store.create_magic_link("a@b.com", 0).await.unwrap();
        assert_eq!(store.consume_magic_link(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_out_of_range_lifetimes_are_errors() {
        let (_temp, store) = store().await;

        assert!(store.create_magic_link("a@b.com", u64::MAX).await.is_err());
        assert!(store.create_session("a@b.com", i64::MAX as u64, None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_sessions() {
        let (_temp, store) = store().await;
        store.add_user("a@b.com").await.unwrap();

        let session_id = store
            .create_session("a@b.com", 3600, Some("127.0.0.1".into()), None)
            .await
            .unwrap();

        let session = store.validate_session(&session_id).await.unwrap().unwrap();
        assert_eq!(session.email, "a@b.com");
        assert_eq!(session.ip_address.as_deref(), Some("127.0.0.1"));
        assert!(
            store
                .get_user("a@b.com")
                .await
                .unwrap()
                .unwrap()
                .last_login
                .is_some()
        );

        store.delete_session(&session_id).await.unwrap();
        assert!(store.validate_session(&session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_removing_user_ends_sessions() {
        let (_temp, store) = store().await;
        store.add_user("a@b.com").await.unwrap();
        let session_id = store
            .create_session("a@b.com", 3600, None, None)
            .await
            .unwrap();

        store.remove_user("a@b.com").await.unwrap();
        assert!(store.validate_session(&session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let (_temp, store) = store().await;

        store.create_session("a@b.com", 0, None, None).await.unwrap();
        store.create_session("a@b.com", 3600, None, None).await.unwrap();
        store.create_magic_link("a@b.com", 0).await.unwrap();
        store.create_magic_link("a@b.com", 900).await.unwrap();

        // Let the zero-lifetime rows fall strictly into the past
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(store.cleanup_expired().await.unwrap(), (1, 1));
    }
}
