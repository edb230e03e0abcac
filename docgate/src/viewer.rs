//! Public viewer routes: the email gate, the document page, the signed
//! object endpoint and the JSON API used by remote viewers.
//!
//! Each page request runs its own [`AccessSessionController`]. The gate token
//! lives in a cookie; the page re-requests itself every renewal interval,
//! which is the browser's renewal tick.

use axum::{
    Form, Json, Router,
    body::Body,
    extract::{ConnectInfo, Path, Query, State},
    http::{Extensions, HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::{CookieJar, cookie::Cookie};
use chrono::Utc;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::access::model::{GATE_TOKEN_KEY, is_valid_email};
use crate::access::{
    AccessBackend, AccessError, AccessRecord, AccessSessionController, ControllerConfig,
    DocumentView, KnownIp, MemoryGateTokenStore, Notice,
};
use crate::api::{ApiError, SignRequest, SignResponse};
use crate::platform::PlatformBackend;
use crate::storage::StorageError;
use crate::templates::{GateTemplate, ViewerTemplate, render};

/// Cookie carrying the gate token. Same key the controller uses.
pub const GATE_COOKIE: &str = GATE_TOKEN_KEY;

/// Gate cookies never expire on their own; one year is the practical maximum.
const GATE_COOKIE_MAX_AGE: u64 = 365 * 24 * 60 * 60;

/// State shared by viewer routes
pub struct ViewerState {
    pub platform: PlatformBackend,
    /// Link lifetime and renewal interval; the user agent is per request
    pub controller: ControllerConfig,
}

impl ViewerState {
    async fn open_controller(
        &self,
        tokens: MemoryGateTokenStore,
        user_agent: String,
        ip: Option<String>,
    ) -> AccessSessionController {
        let config = ControllerConfig {
            user_agent,
            ..self.controller.clone()
        };
        AccessSessionController::open(
            config,
            Arc::new(self.platform.clone()),
            Arc::new(tokens),
            Arc::new(KnownIp(ip)),
        )
        .await
    }
}

/// Build the viewer router.
pub fn viewer_router(state: Arc<ViewerState>) -> Router {
    Router::new()
        .route("/", get(view_page))
        .route("/view/{id}", get(view_document))
        .route("/access", post(access_submit))
        .route("/storage/{path}", get(storage_object))
        .route("/api/access", post(api_access))
        .route("/api/documents/latest", get(api_latest_document))
        .route("/api/storage/sign", post(api_sign))
        .with_state(state)
}

fn gate_email(jar: &CookieJar) -> Option<String> {
    jar.get(GATE_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|email| is_valid_email(email))
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Client address: first `X-Forwarded-For` hop, else the socket peer.
fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[derive(Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    granted: bool,
}

async fn view_page(
    State(state): State<Arc<ViewerState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> Response {
    match gate_email(&jar) {
        Some(email) => render_viewer(&state, email, user_agent(&headers), query.granted).await,
        None => render(
            StatusCode::OK,
            &GateTemplate {
                email: String::new(),
                error: None,
            },
        ),
    }
}

/// Share links point at a specific upload, but visitors always see the
/// current document.
async fn view_document(
    state: State<Arc<ViewerState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Path(_id): Path<String>,
    query: Query<ViewQuery>,
) -> Response {
    view_page(state, jar, headers, query).await
}

async fn render_viewer(
    state: &ViewerState,
    email: String,
    user_agent: String,
    granted: bool,
) -> Response {
    let controller = state
        .open_controller(MemoryGateTokenStore::with_gate_token(&email), user_agent, None)
        .await;
    controller.refresh_now().await;
    let snapshot = controller.snapshot();

    let mut notice = snapshot.notice;
    if granted && !notice.as_ref().is_some_and(Notice::is_error) {
        notice = Some(Notice::Success("Access granted!".to_string()));
    }

    let (link_url, no_document) = match snapshot.document {
        DocumentView::Ready(link) => (Some(link.url), false),
        DocumentView::NoDocument => (None, true),
        _ => (None, false),
    };

    let template = ViewerTemplate {
        email,
        link_url,
        no_document,
        notice_is_error: notice.as_ref().is_some_and(Notice::is_error),
        notice: notice.map(|n| n.message().to_string()),
        refresh_secs: state.controller.renewal_interval.as_secs(),
    };

    render(StatusCode::OK, &template)
}

#[derive(Deserialize)]
pub struct AccessForm {
    email: String,
}

async fn access_submit(
    State(state): State<Arc<ViewerState>>,
    headers: HeaderMap,
    extensions: Extensions,
    Form(form): Form<AccessForm>,
) -> Response {
    let controller = state
        .open_controller(
            MemoryGateTokenStore::default(),
            user_agent(&headers),
            client_ip(&headers, &extensions),
        )
        .await;

    match controller.submit(&form.email).await {
        Ok(()) => {
            // Percent-encoded so non-ASCII addresses survive the round trip;
            // the jar decodes it on the way back in.
            let token = Cookie::new(GATE_COOKIE, form.email.trim().to_string());
            let cookie = format!(
                "{}; Path=/; Max-Age={GATE_COOKIE_MAX_AGE}; HttpOnly; SameSite=Lax",
                token.encoded()
            );

            Response::builder()
                .status(StatusCode::SEE_OTHER)
                .header(header::LOCATION, "/?granted=true")
                .header(header::SET_COOKIE, cookie)
                .body(Body::empty())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => {
            let status = match e {
                AccessError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            };
            let message = controller
                .snapshot()
                .notice
                .map(|n| n.message().to_string())
                .unwrap_or_else(|| e.to_string());

            render(
                status,
                &GateTemplate {
                    email: form.email,
                    error: Some(message),
                },
            )
        }
    }
}

#[derive(Deserialize)]
pub struct LinkQuery {
    expires: i64,
    signature: String,
}

/// Serve object bytes against a valid signed link.
async fn storage_object(
    State(state): State<Arc<ViewerState>>,
    Path(path): Path<String>,
    Query(link): Query<LinkQuery>,
) -> Response {
    let objects = &state.platform.objects;

    if let Err(e) = objects.verify(&path, link.expires, &link.signature, Utc::now()) {
        return match e {
            StorageError::InvalidPath(_) => {
                (StatusCode::BAD_REQUEST, "Invalid path").into_response()
            }
            StorageError::Expired => (StatusCode::FORBIDDEN, "Link expired").into_response(),
            _ => {
                warn!(storage_path = %path, "Rejected object request with bad signature");
                (StatusCode::FORBIDDEN, "Invalid signature").into_response()
            }
        };
    }

    match objects.read(&path).await {
        Ok(bytes) => {
            let content_type = if path.ends_with(".pdf") {
                "application/pdf"
            } else {
                "application/octet-stream"
            };
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_DISPOSITION, "inline"),
                    (header::CACHE_CONTROL, "private, no-store"),
                ],
                bytes,
            )
                .into_response()
        }
        Err(StorageError::NotFound(_)) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            error!(storage_path = %path, "Failed to read object: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read object").into_response()
        }
    }
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiError::new(message))).into_response()
}

async fn api_access(
    State(state): State<Arc<ViewerState>>,
    Json(record): Json<AccessRecord>,
) -> Response {
    if !is_valid_email(&record.email) {
        return api_error(
            StatusCode::BAD_REQUEST,
            AccessError::InvalidEmail(record.email).to_string(),
        );
    }

    match state.platform.insert_access_record(&record).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => {
            error!(email = %record.email, "Failed to record access: {e}");
            api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

async fn api_latest_document(State(state): State<Arc<ViewerState>>) -> Response {
    match state.platform.latest_document().await {
        Ok(document) => Json(document).into_response(),
        Err(e) => {
            error!("Failed to query latest document: {e}");
            api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

/// Sign a link to the current document. Other objects cannot be linked.
async fn api_sign(
    State(state): State<Arc<ViewerState>>,
    Json(request): Json<SignRequest>,
) -> Response {
    let max_ttl = state.controller.link_ttl.as_secs();
    if request.expires_in == 0 || request.expires_in > max_ttl {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("expires_in must be between 1 and {max_ttl} seconds"),
        );
    }

    let latest = match state.platform.documents.latest().await {
        Ok(latest) => latest,
        Err(e) => {
            error!("Failed to query latest document: {e:#}");
            return api_error(StatusCode::SERVICE_UNAVAILABLE, "Document store unavailable");
        }
    };

    if latest.is_none_or(|d| d.storage_path != request.path) {
        return api_error(StatusCode::FORBIDDEN, "Only the current document can be linked");
    }

    match state
        .platform
        .objects
        .create_signed_url(
            &request.path,
            Duration::from_secs(request.expires_in),
            Utc::now(),
        )
        .await
    {
        Ok(link) => Json(SignResponse {
            signed_url: link.url,
        })
        .into_response(),
        Err(StorageError::NotFound(path)) => {
            api_error(StatusCode::NOT_FOUND, format!("Object not found: {path}"))
        }
        Err(e) => {
            error!(storage_path = %request.path, "Failed to sign link: {e}");
            api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}
