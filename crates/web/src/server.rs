//! Web server implementation

use crate::auth::middleware::auth_middleware;
use crate::upstream::Upstream;
use crate::{auth, dashboard, integrations, proxy, static_files, widgets};
use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use nexus_common::{accounts, crypto, Database, NexusConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared handler state
pub struct AppState {
    pub db: Database,
    pub config: NexusConfig,
    pub upstream: Upstream,
    /// Verified against when a login names an unknown account.
    pub dummy_password_hash: String,
}

pub type SharedState = Arc<AppState>;

/// Web server
#[derive(Clone)]
pub struct WebServer {
    state: SharedState,
}

impl WebServer {
    /// Create a server over an already opened database.
    pub fn new(config: NexusConfig, db: Database) -> anyhow::Result<Self> {
        let upstream = Upstream::new(&config.upstream)?;
        let dummy_password_hash = crypto::hash_password(&crypto::generate_password())?;
        Ok(Self {
            state: Arc::new(AppState {
                db,
                config,
                upstream,
                dummy_password_hash,
            }),
        })
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Create router
    pub fn router(&self) -> Router {
        let state = self.state.clone();
        let auth_layer = middleware::from_fn(move |req, next| {
            let state = state.clone();
            async move { auth_middleware(state, req, next).await }
        });

        // Protected routes (require a session)
        let protected_routes = Router::new()
            // Account
            .route("/api/auth/logout", post(auth::routes::logout_handler))
            .route("/api/auth/me", get(auth::routes::me_handler))
            .route("/api/auth/profile", put(auth::routes::update_profile_handler))

            // Integrations
            .route(
                "/api/integrations",
                get(integrations::list_handler).post(integrations::create_handler),
            )
            .route("/api/integrations/test", post(integrations::test_unsaved_handler))
            .route(
                "/api/integrations/:id",
                get(integrations::get_handler)
                    .put(integrations::update_handler)
                    .delete(integrations::delete_handler),
            )
            .route("/api/integrations/:id/test", post(integrations::test_handler))
            .route("/api/integrations/:id/nodes", get(integrations::nodes_handler))
            .route("/api/integration-types", get(integrations::types_handler))

            // Dashboard
            .route(
                "/api/dashboard",
                get(dashboard::get_handler)
                    .put(dashboard::put_handler)
                    .delete(dashboard::delete_handler),
            )
            .route("/api/dashboard/export", get(dashboard::export_handler))
            .route("/api/dashboard/import", post(dashboard::import_handler))

            // Widgets
            .route("/api/widgets", get(widgets::list_handler))
            .route("/api/tiles/:tile_id/status", get(widgets::tile_status_handler))

            // Vendor relays
            .route("/api/proxmox/query", post(proxy::proxmox_query_handler))
            .route("/api/proxmox/action", post(proxy::proxmox_action_handler))
            .route("/api/adguard/query", post(proxy::adguard_query_handler))
            .route("/api/adguard/action", post(proxy::adguard_action_handler))
            .route("/api/nginx-proxy-manager/query", post(proxy::npm_query_handler))
            .route("/api/nginx-proxy-manager/action", post(proxy::npm_action_handler))
            .layer(auth_layer);

        // Public routes (no auth required)
        let router = Router::new()
            .route("/api/health", get(health_handler))
            .route("/api/auth/status", get(auth::routes::status_handler))
            .route("/api/auth/register", post(auth::routes::register_handler))
            .route("/api/auth/login", post(auth::routes::login_handler))
            .merge(protected_routes)
            // SPA and unknown /api paths
            .fallback(static_files::fallback_handler)
            .with_state(self.state.clone());

        let router = if self.state.config.server.cors_allow_any {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        };

        router.layer(TraceLayer::new_for_http())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("Nexus listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

/// Open the database, create the first admin if needed, start background
/// work and serve until the listener fails.
pub async fn serve(config: NexusConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config.server.listen.parse()?;

    let db = Database::open(&config.database.path)?;
    accounts::ensure_bootstrap_admin(&db, &config.auth.bootstrap_admin)?;

    spawn_session_sweeper(db.clone(), Duration::from_secs(config.auth.session_sweep_secs.max(1)));

    match &config.server.static_dir {
        Some(dir) => info!("Serving frontend from {:?}", dir),
        None => warn!("No static_dir configured; only the API is served"),
    }

    WebServer::new(config, db)?.serve(addr).await
}

/// Periodically delete expired sessions.
pub fn spawn_session_sweeper(db: Database, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match db.cleanup_expired_sessions() {
                Ok(0) => {}
                Ok(n) => debug!("Session sweep removed {} sessions", n),
                Err(e) => warn!("Session sweep failed: {}", e),
            }
        }
    })
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": nexus_common::VERSION,
    }))
}
