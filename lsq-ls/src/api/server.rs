//! HTTP server setup and routing
//!
//! Axum server exposing ingest, profile query, admin, and SSE endpoints.

use crate::error::{Error, Result};
use crate::state::SharedState;
use crate::store::ProfileStore;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
///
/// AppContext implements Clone, which gives `FromRef<AppContext>` for free
/// via Axum's blanket implementation.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<ProfileStore>,
    pub state: Arc<SharedState>,
    pub db_pool: SqlitePool,
}

/// Build the application router
///
/// Separate from `run` so integration tests can drive the router directly.
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Event ingest
        .route("/interactions", post(super::handlers::ingest))
        .route("/interactions/webinar", post(super::handlers::ingest_webinar))
        // Profile queries
        .route("/profiles/:identity_key", get(super::handlers::get_profile))
        .route(
            "/profiles/:identity_key/interactions",
            get(super::handlers::list_interactions),
        )
        .route(
            "/profiles/:identity_key/replay",
            get(super::handlers::replay_profile),
        )
        // Admin surface
        .route("/profiles/:identity_key", patch(super::handlers::patch_profile))
        .route("/profiles/:identity_key", delete(super::handlers::delete_profile))
        .route("/profiles/merge", post(super::handlers::merge_profiles))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        // Attach application context
        .with_state(ctx)
        // Enable CORS for dashboard access
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP API server
pub async fn run(port: u16, ctx: AppContext) -> Result<()> {
    let app = build_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
