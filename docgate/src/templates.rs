//! Askama templates for the public viewer pages.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

/// Render a page, falling back to the error text if the template fails.
pub fn render<T: Template>(status: StatusCode, template: &T) -> Response {
    (
        status,
        Html(
            template
                .render()
                .unwrap_or_else(|e| format!("Template error: {e}")),
        ),
    )
        .into_response()
}

/// Gate form page
#[derive(Template)]
#[template(path = "gate.html")]
pub struct GateTemplate {
    /// Prefilled email after a failed submit
    pub email: String,
    pub error: Option<String>,
}

/// Document page
#[derive(Template)]
#[template(path = "viewer.html")]
pub struct ViewerTemplate {
    pub email: String,
    pub link_url: Option<String>,
    pub no_document: bool,
    pub notice: Option<String>,
    pub notice_is_error: bool,
    /// Seconds until the page reloads for a fresh link
    pub refresh_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_embeds_link_and_refresh() {
        let html = ViewerTemplate {
            email: "a@b.com".to_string(),
            link_url: Some("http://localhost/storage/x.pdf?expires=1&signature=ab".to_string()),
            no_document: false,
            notice: None,
            notice_is_error: false,
            refresh_secs: 600,
        }
        .render()
        .unwrap();

        assert!(html.contains(r#"content="600; url=/""#));
        assert!(html.contains("/storage/x.pdf?expires=1&amp;signature=ab"));
        assert!(html.contains(r#"oncontextmenu="return false;""#));
    }

    #[test]
    fn test_viewer_no_document() {
        let html = ViewerTemplate {
            email: "a@b.com".to_string(),
            link_url: None,
            no_document: true,
            notice: Some("No documents found".to_string()),
            notice_is_error: false,
            refresh_secs: 600,
        }
        .render()
        .unwrap();

        assert!(html.contains("No document has been published yet"));
        assert!(!html.contains("<iframe"));
    }

    #[test]
    fn test_gate_shows_error() {
        let html = GateTemplate {
            email: "a@b.com".to_string(),
            error: Some("Network error: connection refused".to_string()),
        }
        .render()
        .unwrap();

        assert!(html.contains("Network error: connection refused"));
        assert!(html.contains(r#"action="/access""#));
    }
}
