//! HTTP server setup.
//!
//! Local pages (`/health`, `/help`, `/static/*`) are explicit routes; every
//! other request falls through to the proxy pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{config::Config, proxy, state::AppState, ui};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    routes: usize,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        routes: state.routes.len(),
    })
}

/// Build the application router around `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.ui.static_dir.clone();
    let body_limit = state.config.max_request_body_bytes();

    Router::new()
        .route("/health", get(health_check))
        .route("/help", get(ui::help))
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(proxy::handle)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run until Ctrl-C.
pub async fn run_server(config: Config) -> Result<()> {
    run_server_with_shutdown(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Run until `shutdown` resolves, then drain in-flight requests.
pub async fn run_server_with_shutdown<F>(config: Config, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid socket address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = Arc::new(AppState::from_config(config).context("Failed to build application state")?);
    info!(
        domain = %state.config.proxy.custom_domain,
        profile = %state.config.proxy.profile,
        routes = state.routes.len(),
        "Starting registry proxy"
    );
    if !state.config.ui.static_dir.is_dir() {
        warn!(dir = %state.config.ui.static_dir.display(), "Static directory not found");
    }

    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Registry proxy listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Received shutdown signal, stopping registry proxy gracefully");
        })
        .await
        .context("Server error")?;

    Ok(())
}
