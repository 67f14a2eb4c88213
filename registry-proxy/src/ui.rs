use std::sync::Arc;

use askama::Template;
use axum::{extract::State, response::Html};
use tracing::error;

use crate::{AppError, AppResult, AppState};

#[derive(Template)]
#[template(path = "help.html")]
struct HelpTemplate {
    domain: String,
    scheme: String,
    version: String,
    routes: Vec<RouteRow>,
}

#[derive(Clone)]
struct RouteRow {
    host: String,
    upstream: String,
    docker_hub: bool,
}

/// Help page: configured virtual hosts and client setup snippets.
pub async fn help(State(state): State<Arc<AppState>>) -> AppResult<Html<String>> {
    let routes = state
        .routes
        .virtual_hosts()
        .map(|entry| RouteRow {
            host: entry.virtual_host.clone(),
            upstream: entry.upstream.to_string(),
            docker_hub: entry.docker_hub,
        })
        .collect();

    let template = HelpTemplate {
        domain: state.config.proxy.custom_domain.clone(),
        scheme: state.scheme().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        routes,
    };

    Ok(Html(template.render().map_err(|e| {
        error!("Template render error: {}", e);
        AppError::Internal(format!("Template render error: {e}"))
    })?))
}
