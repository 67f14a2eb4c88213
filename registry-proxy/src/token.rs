//! Token exchange on behalf of registry clients.
//!
//! A pull without credentials runs through three requests:
//!
//! 1. `GET /v2/` → the proxy probes the upstream and answers with its own
//!    challenge pointing at `/v2/auth` (see [`crate::challenge`]).
//! 2. `GET /v2/auth?scope=...` → [`exchange`] probes the upstream again,
//!    reads the real realm and service, and fetches the token there.
//! 3. The client retries with `Authorization: Bearer <token>`.
//!
//! Nothing is remembered between these steps.

use crate::challenge::AuthChallenge;
use crate::rewrite::request::scopes;
use crate::routes::RouteEntry;
use crate::types::{ProxyRequest, UpstreamResponse};
use crate::upstream::UpstreamClient;
use crate::AppResult;
use axum::http::{header, HeaderMap};
use tracing::{debug, warn};
use url::Url;

/// Fetch a token for `req` from the realm `route`'s upstream advertises.
///
/// Falls back to relaying the probe response when the upstream does not ask
/// for Bearer auth or its challenge cannot be read.
pub async fn exchange(
    client: &UpstreamClient,
    route: &RouteEntry,
    req: &ProxyRequest,
) -> AppResult<UpstreamResponse> {
    let probe = client.get(&route.target("/v2/", None), HeaderMap::new()).await?;
    if !probe.is_unauthorized() {
        debug!(upstream = %route.upstream, status = %probe.status, "Probe needs no token");
        return Ok(probe);
    }

    let Some(challenge) = probe
        .headers
        .get(header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .and_then(AuthChallenge::parse)
    else {
        warn!(upstream = %route.upstream, "Upstream 401 without a usable Bearer challenge");
        return Ok(probe);
    };

    let Ok(mut realm) = Url::parse(&challenge.realm) else {
        warn!(realm = %challenge.realm, "Upstream realm is not a URL");
        return Ok(probe);
    };
    {
        let mut query = realm.query_pairs_mut();
        query.append_pair("service", &challenge.service);
        for scope in scopes(req.query()) {
            query.append_pair("scope", &scope);
        }
    }

    let mut headers = HeaderMap::new();
    if let Some(authorization) = req.headers.get(header::AUTHORIZATION) {
        headers.insert(header::AUTHORIZATION, authorization.clone());
    }

    debug!(realm = %realm, service = %challenge.service, "Requesting token");
    client.get(realm.as_str(), headers).await
}

/// Relay `req` to a fixed token endpoint, query included.
pub async fn relay_token_endpoint(
    client: &UpstreamClient,
    endpoint: &RouteEntry,
    req: &ProxyRequest,
) -> AppResult<UpstreamResponse> {
    let url = endpoint.target("", req.query());
    client.forward(req, &url).await
}
