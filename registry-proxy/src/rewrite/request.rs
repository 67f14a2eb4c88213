use crate::config::{HeaderPolicy, NamespacePolicy};
use crate::jwt;
use crate::types::ProxyRequest;
use axum::http::{header, HeaderMap, HeaderName};
use url::form_urlencoded;

/// Headers forwarded under [`HeaderPolicy::AllowList`].
pub const ALLOWED_HEADERS: [HeaderName; 5] = [
    header::AUTHORIZATION,
    header::ACCEPT,
    header::USER_AGENT,
    header::DATE,
    header::ACCEPT_ENCODING,
];

/// Headers dropped under [`HeaderPolicy::DenyList`].
pub const DENIED_HEADERS: [&str; 4] = ["host", "x-real-ip", "x-forwarded-for", "x-forwarded-proto"];

/// Connection and framing headers the outbound client sets itself.
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
    header::CONTENT_LENGTH,
];

const LIBRARY: &str = "library";

/// Applies header, credential and namespace rules to inbound requests.
#[derive(Debug, Clone, Copy)]
pub struct RequestRewriter {
    pub header_policy: HeaderPolicy,
    pub namespace_policy: NamespacePolicy,
}

/// What the pipeline should do after rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    Forward,
    /// Answer with a 301 to this path instead of forwarding
    Redirect(String),
}

impl RequestRewriter {
    pub fn new(header_policy: HeaderPolicy, namespace_policy: NamespacePolicy) -> Self {
        Self {
            header_policy,
            namespace_policy,
        }
    }

    /// Rewrite `req` in place. `now` is seconds since the Unix epoch.
    pub fn rewrite(&self, req: &mut ProxyRequest, now: i64) -> RewriteOutcome {
        req.headers = filter_headers(&req.headers, self.header_policy);
        strip_stale_credentials(&mut req.headers, now);

        if !req.docker_hub {
            return RewriteOutcome::Forward;
        }

        if is_token_request(&req.path) {
            if let Some(query) = req.query.as_deref() {
                req.query = Some(normalize_scope_query(query));
            }
            return RewriteOutcome::Forward;
        }

        match (normalize_repository_path(&req.path), self.namespace_policy) {
            (Some(path), NamespacePolicy::Rewrite) => {
                tracing::debug!(from = %req.path, to = %path, "Normalized repository path");
                req.path = path;
                RewriteOutcome::Forward
            }
            (Some(path), NamespacePolicy::Redirect) => RewriteOutcome::Redirect(path),
            (None, _) => RewriteOutcome::Forward,
        }
    }
}

fn is_token_request(path: &str) -> bool {
    path == "/v2/auth" || path == "/token"
}

/// Copy the headers `policy` lets through. Repeated names keep the last value.
pub fn filter_headers(headers: &HeaderMap, policy: HeaderPolicy) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let keep = match policy {
            HeaderPolicy::AllowList => ALLOWED_HEADERS.contains(name),
            HeaderPolicy::DenyList => {
                !DENIED_HEADERS.contains(&name.as_str()) && !HOP_BY_HOP.contains(name)
            }
        };
        if keep {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}

/// Drop an `Authorization` bearer token that is expired or not a JWT.
pub fn strip_stale_credentials(headers: &mut HeaderMap, now: i64) {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return;
    };
    let forwardable = match value.to_str() {
        Ok(v) => jwt::is_forwardable(v, now),
        Err(_) => false,
    };
    if !forwardable {
        tracing::debug!("Dropping stale bearer credentials");
        headers.remove(header::AUTHORIZATION);
    }
}

/// `/v2/<name>/<kind>/<reference>` → `/v2/library/<name>/<kind>/<reference>`.
///
/// Anything that is not exactly three non-empty segments after `/v2/` is left
/// alone, which also makes the rewrite idempotent.
pub fn normalize_repository_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/v2/")?;
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(format!("/v2/{LIBRARY}/{rest}"))
}

/// `repository:<name>:<action>` → `repository:library/<name>:<action>` for
/// unqualified names.
pub fn normalize_scope(scope: &str) -> Option<String> {
    let parts: Vec<&str> = scope.split(':').collect();
    match parts.as_slice() {
        ["repository", name, action] if !name.is_empty() && !name.contains('/') => {
            Some(format!("repository:{LIBRARY}/{name}:{action}"))
        }
        _ => None,
    }
}

/// Normalize every `scope` pair of a raw query string.
///
/// Other pairs, and scopes that need no change, keep their original bytes.
/// Rewritten values are re-encoded on their own so `&` and `=` delimiters
/// stay intact.
pub fn normalize_scope_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| {
            let mut decoded = form_urlencoded::parse(pair.as_bytes());
            let Some((key, value)) = decoded.next() else {
                return pair.to_string();
            };
            if key != "scope" {
                return pair.to_string();
            }
            match normalize_scope(&value) {
                Some(scope) => {
                    let raw_key = pair.split_once('=').map_or(pair, |(k, _)| k);
                    let encoded: String = form_urlencoded::byte_serialize(scope.as_bytes()).collect();
                    format!("{raw_key}={encoded}")
                }
                None => pair.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Decoded `scope` values of a raw query string, in order.
pub fn scopes(query: Option<&str>) -> Vec<String> {
    query
        .map(|q| {
            form_urlencoded::parse(q.as_bytes())
                .filter(|(k, _)| *k == "scope")
                .map(|(_, v)| v.into_owned())
                .collect()
        })
        .unwrap_or_default()
}
