//! Admin state and the per-request admin capability.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;
use tracing::{error, warn};

use crate::access_log::AccessLogStore;
use crate::admin::auth::{AdminAuthStore, MagicLinkSender};
use crate::admin::templates::{LoginTemplate, render};
use crate::documents::DocumentStore;
use crate::storage::ObjectStore;

/// Cookie name for the session ID
pub const SESSION_COOKIE: &str = "docgate_admin_session";

/// State shared by admin routes
pub struct AdminState {
    /// Admin users, magic links and sessions
    pub auth_store: AdminAuthStore,
    pub documents: DocumentStore,
    pub access_log: AccessLogStore,
    pub objects: Arc<ObjectStore>,
    /// Where sign-in links go
    pub link_sender: Arc<dyn MagicLinkSender>,
    /// Base URL for sign-in links
    pub public_url: String,
    /// Session timeout in seconds
    pub session_timeout_secs: u64,
    /// Magic link lifetime in seconds
    pub magic_link_ttl_secs: u64,
}

/// Proof that the current request comes from an admin.
///
/// Built once per request from the session cookie. Handlers that take it as
/// an argument never run for anyone else.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub session_id: String,
    pub email: String,
}

impl AdminSession {
    /// Resolve the session cookie into an admin capability, if it is one.
    pub async fn from_jar(state: &AdminState, jar: &CookieJar) -> anyhow::Result<Option<Self>> {
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(None);
        };

        let Some(session) = state.auth_store.validate_session(cookie.value()).await? else {
            return Ok(None);
        };

        if !state.auth_store.is_admin(&session.email).await? {
            warn!(email = %session.email, "Signed-in user is not an admin");
            return Ok(None);
        }

        Ok(Some(Self {
            session_id: session.session_id,
            email: session.email,
        }))
    }
}

impl FromRequestParts<Arc<AdminState>> for AdminSession {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AdminState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        match Self::from_jar(state, &jar).await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Err(Redirect::to("/admin/login").into_response()),
            Err(e) => {
                error!("Failed to check admin session: {e:#}");
                let template = LoginTemplate {
                    error: Some("An error occurred. Please try again.".to_string()),
                    message: None,
                };
                Err(render(StatusCode::SERVICE_UNAVAILABLE, &template))
            }
        }
    }
}
