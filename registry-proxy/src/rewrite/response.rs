use crate::challenge::AuthChallenge;
use crate::routes::RouteTable;
use crate::types::UpstreamResponse;
use axum::http::{header, HeaderValue};
use url::Url;

/// Make an upstream response safe to relay.
///
/// Drops framing headers and points Bearer realms at the matching virtual
/// host. The body is never touched.
pub fn rewrite_response(mut resp: UpstreamResponse, routes: &RouteTable) -> UpstreamResponse {
    resp.headers.remove(header::TRANSFER_ENCODING);
    resp.headers.remove(header::CONNECTION);

    let challenges: Vec<HeaderValue> = resp
        .headers
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .map(|value| rewrite_challenge(value, routes))
        .collect();

    if !challenges.is_empty() {
        resp.headers.remove(header::WWW_AUTHENTICATE);
        for value in challenges {
            resp.headers.append(header::WWW_AUTHENTICATE, value);
        }
    }
    resp
}

fn rewrite_challenge(value: &HeaderValue, routes: &RouteTable) -> HeaderValue {
    let Ok(text) = value.to_str() else {
        return value.clone();
    };
    substitute_realm(text, routes)
        .and_then(|rewritten| HeaderValue::from_str(&rewritten).ok())
        .unwrap_or_else(|| value.clone())
}

/// Challenge with its realm host replaced by the proxy-facing virtual host,
/// or `None` when the header is unparsable or the realm host is unmapped.
pub fn substitute_realm(header: &str, routes: &RouteTable) -> Option<String> {
    let challenge = AuthChallenge::parse(header)?;
    let mut realm = Url::parse(&challenge.realm).ok()?;
    let virtual_host = routes.reverse(realm.host_str()?)?;

    realm.set_host(Some(virtual_host)).ok()?;
    realm.set_port(None).ok()?;

    tracing::debug!(from = %challenge.realm, to = %realm, "Rewrote challenge realm");
    Some(challenge.replace_realm(header, realm.as_str()))
}
