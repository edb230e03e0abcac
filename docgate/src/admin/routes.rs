//! Admin route handlers.
//!
//! Provides HTTP handlers for the admin UI: magic-link sign-in, logout,
//! dashboard, document upload and delete.

use axum::{
    Form, Router,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::access::model::is_valid_email;
use crate::admin::middleware::{AdminSession, AdminState, SESSION_COOKIE};
use crate::admin::templates::{
    AccessSummary, DashboardTemplate, DocumentSummary, LoginTemplate, render,
};
use crate::storage::StorageError;

/// Build the admin router.
pub fn admin_router(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/login", get(login_page))
        .route("/login", post(login_submit))
        .route("/auth/callback", get(auth_callback))
        .route("/dashboard", get(dashboard))
        .route("/logout", post(logout))
        .route("/documents", post(document_upload))
        .route("/documents/{id}/delete", post(document_delete))
        .with_state(state)
}

fn login_page_with(status: StatusCode, error: Option<&str>, message: Option<&str>) -> Response {
    let template = LoginTemplate {
        error: error.map(str::to_string),
        message: message.map(str::to_string),
    };
    render(status, &template)
}

fn see_other(location: &str, cookie: String) -> Response {
    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, location)
        .header(header::SET_COOKIE, cookie)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Login page handler.
async fn login_page(State(state): State<Arc<AdminState>>, jar: CookieJar) -> Response {
    // If already logged in, redirect to dashboard
    if let Ok(Some(_)) = AdminSession::from_jar(&state, &jar).await {
        return Redirect::to("/admin/dashboard").into_response();
    }

    login_page_with(StatusCode::OK, None, None)
}

/// Login form data.
#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
}

/// Send a magic sign-in link.
///
/// The response is the same whether or not the email is an admin.
async fn login_submit(
    State(state): State<Arc<AdminState>>,
    Form(form): Form<LoginForm>,
) -> Response {
    let email = form.email.trim();
    if !is_valid_email(email) {
        return login_page_with(
            StatusCode::BAD_REQUEST,
            Some("Please enter a valid email address"),
            None,
        );
    }

    let token = match state
        .auth_store
        .create_magic_link(email, state.magic_link_ttl_secs)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to create magic link: {e:#}");
            return login_page_with(
                StatusCode::SERVICE_UNAVAILABLE,
                Some("An error occurred. Please try again."),
                None,
            );
        }
    };

    let link = format!(
        "{}/admin/auth/callback?token={token}",
        state.public_url.trim_end_matches('/')
    );

    if let Err(e) = state.link_sender.send(email, &link).await {
        error!(email, "Failed to send magic link: {e:#}");
        return login_page_with(
            StatusCode::SERVICE_UNAVAILABLE,
            Some("Could not send the sign-in link. Please try again."),
            None,
        );
    }

    login_page_with(
        StatusCode::OK,
        None,
        Some("Check your email for the magic link!"),
    )
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    token: Option<String>,
}

/// Redeem a magic link and start a session.
async fn auth_callback(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        warn!("Sign-in callback without a token");
        return login_page_with(
            StatusCode::BAD_REQUEST,
            Some("This sign-in link is incomplete. Request a new one."),
            None,
        );
    };

    let email = match state.auth_store.consume_magic_link(&token).await {
        Ok(Some(email)) => email,
        Ok(None) => {
            return login_page_with(
                StatusCode::BAD_REQUEST,
                Some("This sign-in link is invalid or has expired. Request a new one."),
                None,
            );
        }
        Err(e) => {
            error!("Failed to redeem magic link: {e:#}");
            return login_page_with(
                StatusCode::SERVICE_UNAVAILABLE,
                Some("An error occurred. Please try again."),
                None,
            );
        }
    };

    // Only admins get a session row
    match state.auth_store.is_admin(&email).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(email = %email, "Non-admin tried to sign in");
            return login_page_with(
                StatusCode::FORBIDDEN,
                Some("This account does not have admin access."),
                None,
            );
        }
        Err(e) => {
            error!(email = %email, "Failed to check admin access: {e:#}");
            return login_page_with(
                StatusCode::SERVICE_UNAVAILABLE,
                Some("An error occurred. Please try again."),
                None,
            );
        }
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    let session_id = match state
        .auth_store
        .create_session(&email, state.session_timeout_secs, ip_address, user_agent)
        .await
    {
        Ok(session_id) => session_id,
        Err(e) => {
            error!(email = %email, "Failed to create session: {e:#}");
            return login_page_with(
                StatusCode::SERVICE_UNAVAILABLE,
                Some("An error occurred. Please try again."),
                None,
            );
        }
    };
    info!(email = %email, "Admin signed in");

    let cookie = format!(
        "{SESSION_COOKIE}={session_id}; Path=/admin; Max-Age={}; HttpOnly; SameSite=Lax",
        state.session_timeout_secs
    );
    see_other("/admin/dashboard", cookie)
}

/// Logout handler.
async fn logout(State(state): State<Arc<AdminState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && let Err(e) = state.auth_store.delete_session(cookie.value()).await
    {
        error!("Failed to delete session: {e:#}");
    }

    // Clear cookie by setting it to expire in the past
    let cookie = format!("{SESSION_COOKIE}=; Path=/admin; HttpOnly; SameSite=Lax; Max-Age=0");
    see_other("/admin/login", cookie)
}

/// Dashboard handler.
async fn dashboard(State(state): State<Arc<AdminState>>, session: AdminSession) -> Response {
    render_dashboard(&state, &session, StatusCode::OK, None).await
}

/// Render dashboard with an optional error banner.
async fn render_dashboard(
    state: &AdminState,
    session: &AdminSession,
    status: StatusCode,
    error: Option<String>,
) -> Response {
    let mut error = error;

    let documents = match state.documents.list().await {
        Ok(docs) => docs.into_iter().map(DocumentSummary::from).collect(),
        Err(e) => {
            error!("Failed to list documents: {e:#}");
            error.get_or_insert_with(|| "Error fetching documents".to_string());
            Vec::new()
        }
    };

    let access_logs = match state.access_log.list().await {
        Ok(records) => records.into_iter().map(AccessSummary::from).collect(),
        Err(e) => {
            error!("Failed to list access logs: {e:#}");
            error.get_or_insert_with(|| "Error fetching access logs".to_string());
            Vec::new()
        }
    };

    let template = DashboardTemplate {
        email: session.email.clone(),
        documents,
        access_logs,
        error,
    };
    render(status, &template)
}

/// Upload a PDF as the new current document.
async fn document_upload(
    State(state): State<Arc<AdminState>>,
    session: AdminSession,
    mut multipart: Multipart,
) -> Response {
    let mut upload = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => upload = Some((name, bytes)),
                    Err(e) => {
                        warn!("Failed to read upload: {e}");
                        return render_dashboard(
                            &state,
                            &session,
                            StatusCode::BAD_REQUEST,
                            Some(format!("Error uploading file: {e}")),
                        )
                        .await;
                    }
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed upload: {e}");
                return render_dashboard(
                    &state,
                    &session,
                    StatusCode::BAD_REQUEST,
                    Some(format!("Error uploading file: {e}")),
                )
                .await;
            }
        }
    }

    let Some((name, bytes)) = upload.filter(|(name, bytes)| !name.is_empty() && !bytes.is_empty())
    else {
        return render_dashboard(
            &state,
            &session,
            StatusCode::BAD_REQUEST,
            Some("Choose a PDF file to upload".to_string()),
        )
        .await;
    };

    if !name.to_ascii_lowercase().ends_with(".pdf") || !bytes.starts_with(b"%PDF") {
        return render_dashboard(
            &state,
            &session,
            StatusCode::BAD_REQUEST,
            Some("Only PDF files can be uploaded".to_string()),
        )
        .await;
    }

    let storage_path = match state.objects.upload(&name, &bytes).await {
        Ok(path) => path,
        Err(e) => {
            error!(file_name = %name, "Failed to store upload: {e}");
            return render_dashboard(
                &state,
                &session,
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(format!("Error uploading file: {e}")),
            )
            .await;
        }
    };

    if let Err(e) = state
        .documents
        .insert(&name, &storage_path, bytes.len() as i64)
        .await
    {
        error!(file_name = %name, "Failed to record upload: {e:#}");
        if let Err(e) = state.objects.remove(&storage_path).await {
            warn!(storage_path = %storage_path, "Failed to clean up orphaned object: {e}");
        }
        return render_dashboard(
            &state,
            &session,
            StatusCode::INTERNAL_SERVER_ERROR,
            Some("Error uploading file".to_string()),
        )
        .await;
    }

    info!(admin = %session.email, file_name = %name, size = bytes.len(), "Document uploaded");
    Redirect::to("/admin/dashboard").into_response()
}

/// Delete a document: object first, then the row.
async fn document_delete(
    State(state): State<Arc<AdminState>>,
    session: AdminSession,
    Path(id): Path<String>,
) -> Response {
    let document = match state.documents.get(&id).await {
        Ok(Some(document)) => document,
        Ok(None) => return (StatusCode::NOT_FOUND, "Document not found").into_response(),
        Err(e) => {
            error!(document_id = %id, "Failed to look up document: {e:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete document")
                .into_response();
        }
    };

    match state.objects.remove(&document.storage_path).await {
        Ok(()) => {}
        Err(StorageError::NotFound(_)) => {
            warn!(storage_path = %document.storage_path, "Object already missing, removing row");
        }
        Err(e) => {
            error!(storage_path = %document.storage_path, "Failed to remove object: {e}");
            return render_dashboard(
                &state,
                &session,
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(format!("Error deleting document: {e}")),
            )
            .await;
        }
    }

    if let Err(e) = state.documents.delete(&id).await {
        error!(document_id = %id, "Failed to delete document row: {e:#}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete document").into_response();
    }

    info!(admin = %session.email, document_id = %id, "Document deleted");
    Redirect::to("/admin/dashboard").into_response()
}
