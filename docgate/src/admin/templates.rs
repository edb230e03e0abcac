//! Askama templates for the admin UI.

use askama::Template;

use crate::access::{AccessRecord, DocumentRef};

pub use crate::templates::render;

/// Login page template
#[derive(Template)]
#[template(path = "admin/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    /// Shown after a sign-in link was sent
    pub message: Option<String>,
}

/// Document row on the dashboard
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub size_kb: String,
    pub uploaded_at: String,
}

impl From<DocumentRef> for DocumentSummary {
    fn from(doc: DocumentRef) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
            size_kb: format!("{:.2}", doc.size as f64 / 1024.0),
            uploaded_at: doc.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Access log row on the dashboard
pub struct AccessSummary {
    pub email: String,
    pub accessed_at: String,
    pub user_agent: String,
    pub ip_address: String,
}

impl From<AccessRecord> for AccessSummary {
    fn from(record: AccessRecord) -> Self {
        Self {
            email: record.email,
            accessed_at: record.accessed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            user_agent: record.user_agent,
            ip_address: record.ip_address,
        }
    }
}

/// Dashboard page template
#[derive(Template)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub email: String,
    pub documents: Vec<DocumentSummary>,
    pub access_logs: Vec<AccessSummary>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_document_summary_size_in_kb() {
        let summary = DocumentSummary::from(DocumentRef {
            id: "1".to_string(),
            name: "cv.pdf".to_string(),
            storage_path: "x.pdf".to_string(),
            size: 1536,
            created_at: Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0).unwrap(),
        });

        assert_eq!(summary.size_kb, "1.50");
        assert_eq!(summary.uploaded_at, "2026-01-15 09:30");
    }

    #[test]
    fn test_dashboard_renders_rows() {
        let html = DashboardTemplate {
            email: "owner@example.com".to_string(),
            documents: vec![DocumentSummary {
                id: "doc-1".to_string(),
                name: "<cv>.pdf".to_string(),
                size_kb: "1.00".to_string(),
                uploaded_at: "2026-01-15 09:30".to_string(),
            }],
            access_logs: vec![],
            error: None,
        }
        .render()
        .unwrap();

        assert!(html.contains("/admin/documents/doc-1/delete"));
        // Names are escaped
        assert!(html.contains("&lt;cv&gt;.pdf"));
        assert!(html.contains("No one has viewed the document yet"));
    }
}
