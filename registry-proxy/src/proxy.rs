//! Per-request pipeline: route → rewrite → forward → rewrite.
//!
//! Mounted as the router fallback, so every path that is not one of the
//! local pages lands here. Each call owns its [`ProxyRequest`] and only reads
//! from [`AppState`]; a failure is turned into a response for that request
//! alone. Dropping the handler future (client gone) cancels the upstream call.

use crate::challenge;
use crate::config::ChallengePolicy;
use crate::rewrite::{rewrite_response, RewriteOutcome};
use crate::routes::RouteTable;
use crate::state::AppState;
use crate::token;
use crate::types::{ProxyRequest, UpstreamResponse};
use crate::{AppError, AppResult};
use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

pub async fn handle(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match proxy(&state, method, uri, headers, body).await {
        Ok(response) => response,
        Err(AppError::UnknownHost(host)) => not_found(&state.routes, &host),
        Err(e) => e.into_response(),
    }
}

async fn proxy(
    state: &AppState,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let host = request_host(&uri, &headers).ok_or_else(|| AppError::UnknownHost(String::new()))?;
    let mut req = ProxyRequest::from_parts(method, state.scheme(), host, &uri, headers, body);
    let now = Utc::now().timestamp();

    if req.path == "/token" {
        if let Some(endpoint) = state.routes.token_endpoint(&req.host) {
            req.docker_hub = endpoint.docker_hub;
            state.rewriter.rewrite(&mut req, now);
            debug!(host = %req.host, endpoint = %endpoint.upstream, "Relaying token request");
            let resp = token::relay_token_endpoint(&state.upstream, endpoint, &req).await?;
            return Ok(rewrite_response(resp, &state.routes).into_response());
        }
    }

    let route = state.routes.resolve(&req.host)?;
    req.docker_hub = route.docker_hub;
    let outcome = state.rewriter.rewrite(&mut req, now);

    if req.path == "/v2/auth" {
        debug!(host = %req.host, upstream = %route.upstream, "Starting token exchange");
        let resp = token::exchange(&state.upstream, route, &req).await?;
        return Ok(rewrite_response(resp, &state.routes).into_response());
    }

    if let RewriteOutcome::Redirect(path) = outcome {
        return Ok(redirect(&req, &path));
    }

    // `/v2/` itself takes this path too: the forwarded call is the probe.
    let target = route.target(&req.path, req.query());
    let resp = state.upstream.forward(&req, &target).await?;
    Ok(finish(state, &req, resp))
}

fn finish(state: &AppState, req: &ProxyRequest, resp: UpstreamResponse) -> Response {
    let synthesize = state.config.proxy.challenge_policy == ChallengePolicy::Synthesize;
    if resp.is_unauthorized() && synthesize && req.path.starts_with("/v2/") {
        debug!(host = %req.host, path = %req.path, "Upstream wants credentials, issuing challenge");
        return challenge::unauthorized(req.scheme, &req.host, &state.config.server.service_name);
    }
    rewrite_response(resp, &state.routes).into_response()
}

fn redirect(req: &ProxyRequest, path: &str) -> Response {
    let location = match req.query() {
        Some(q) if !q.is_empty() => format!("{}://{}{path}?{q}", req.scheme, req.host),
        _ => format!("{}://{}{path}", req.scheme, req.host),
    };
    debug!(from = %req.path, location = %location, "Redirecting to official image path");
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

fn not_found(routes: &RouteTable, host: &str) -> Response {
    let err = AppError::UnknownHost(host.to_string());
    warn!(host = %host, "Rejecting request for unmapped host");

    let body = err.to_error_response();
    let payload = json!({
        "error": body.error,
        "code": body.code,
        "timestamp": body.timestamp,
        "routes": routes.summary(),
    });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

/// `Host` header (last value wins), else the request-target authority.
pub fn request_host(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::HOST)
        .iter()
        .last()
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.as_str().to_string()))
}
