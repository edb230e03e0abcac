//! HTTP server: wiring, router and listener.

use anyhow::{Context, Result};
use axum::{Router, extract::DefaultBodyLimit, response::Redirect, routing::get};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::access::ControllerConfig;
use crate::access_log::AccessLogStore;
use crate::admin::{AdminAuthStore, AdminState, MagicLinkSender, admin_router};
use crate::config::Config;
use crate::db::Database;
use crate::documents::DocumentStore;
use crate::platform::PlatformBackend;
use crate::storage::ObjectStore;
use crate::viewer::{ViewerState, viewer_router};

/// Configuration for the HTTP listener
pub struct ServerConfig {
    /// Address to listen on
    pub listen_addr: SocketAddr,
}

/// Route state for the viewer and admin surfaces.
pub struct AppState {
    pub viewer: Arc<ViewerState>,
    pub admin: Arc<AdminState>,
}

impl AppState {
    /// Open the database and object store and build both route states.
    pub async fn build(
        config: &Config,
        data_dir: &Path,
        link_sender: Arc<dyn MagicLinkSender>,
    ) -> Result<Self> {
        let db = Database::new(&config.database, data_dir).await?;

        let objects_dir = config.storage.dir_or_default(data_dir);
        let objects = Arc::new(
            ObjectStore::new(
                &objects_dir,
                &config.http.public_url,
                &config.storage.signing_secret,
            )
            .with_context(|| {
                format!("Failed to open object store: {}", objects_dir.display())
            })?,
        );

        let documents = DocumentStore::new(db.pool());
        let access_log = AccessLogStore::new(db.pool());

        let viewer = Arc::new(ViewerState {
            platform: PlatformBackend::new(access_log.clone(), documents.clone(), objects.clone()),
            controller: ControllerConfig {
                link_ttl: config.storage.link_ttl(),
                renewal_interval: config.gate.renewal_interval(),
                ..ControllerConfig::default()
            },
        });

        let admin = Arc::new(AdminState {
            auth_store: AdminAuthStore::new(db.pool()),
            documents,
            access_log,
            objects,
            link_sender,
            public_url: config.http.public_url.clone(),
            session_timeout_secs: config.admin.session_timeout_secs,
            magic_link_ttl_secs: config.admin.magic_link_ttl_secs,
        });

        Ok(Self { viewer, admin })
    }
}

/// Build the combined HTTP router with viewer and admin UI.
pub fn http_router(state: &AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(viewer_router(state.viewer.clone()))
        // Handle both /admin and /admin/ by redirecting to dashboard
        .route("/admin", get(|| async { Redirect::to("/admin/dashboard") }))
        .route("/admin/", get(|| async { Redirect::to("/admin/dashboard") }))
        .nest("/admin", admin_router(state.admin.clone()))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}

/// Serve `router` until `shutdown` resolves.
pub async fn run_server(
    config: ServerConfig,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    info!(addr = %config.listen_addr, "Starting HTTP server");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}
