//! Records and links exchanged between the access controller and its store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Validity window requested for every signed link (10 minutes).
pub const LINK_TTL: Duration = Duration::from_secs(600);

/// Interval between link renewals while a view is mounted (10 minutes).
pub const RENEWAL_INTERVAL: Duration = Duration::from_secs(600);

/// Local storage key under which the gate token is kept.
pub const GATE_TOKEN_KEY: &str = "document_access_email";

/// Sentinel stored when the requester address cannot be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// One row of the access log. Written once per successful gate pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub email: String,
    pub accessed_at: DateTime<Utc>,
    pub user_agent: String,
    pub ip_address: String,
}

/// Metadata for an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub name: String,
    pub storage_path: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

/// A time-limited URL to the current document. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedLink {
    pub url: String,
    pub issued_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl SignedLink {
    /// Instant after which the link must not be handed out.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero())
    }

    /// A link is invalid once `now - issued_at >= ttl`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

/// Client-side marker that the gate was passed with this email.
///
/// Only used to skip re-prompting; it grants nothing on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalGateToken {
    pub email: String,
}

/// Syntactic email check: a non-empty local part and an ASCII hostname domain.
/// Whitespace, quotes and cookie separators are refused; other characters,
/// non-ASCII included, are allowed in the local part.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }

    if email
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | ',' | '"' | '\\'))
    {
        return false;
    }

    domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last+tag@example.co.uk"));
        assert!(is_valid_email("user@localhost"));

        assert!(!is_valid_email(""));
        assert!(!is_valid_email("plainaddress"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@exa mple.com"));
        assert!(!is_valid_email("user@example..com"));
        assert!(!is_valid_email("user@-example.com"));
        assert!(!is_valid_email("us;er@example.com"));
    }

    #[test]
    fn test_signed_link_validity_window() {
        let issued_at = Utc::now();
        let link = SignedLink {
            url: "https://example.com/storage/x.pdf".to_string(),
            issued_at,
            ttl: LINK_TTL,
        };

        assert!(link.is_valid_at(issued_at));
        assert!(link.is_valid_at(issued_at + chrono::Duration::seconds(599)));
        // Invalid exactly at issued_at + ttl
        assert!(!link.is_valid_at(issued_at + chrono::Duration::seconds(600)));
        assert!(!link.is_valid_at(issued_at + chrono::Duration::seconds(601)));
    }
}
