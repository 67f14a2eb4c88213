//! Bearer token expiry inspection.
//!
//! **This is not an authentication check.** Tokens are decoded claims-only
//! with signature validation disabled; the result only decides whether an
//! `Authorization` header is worth forwarding. A token that passes here may
//! still be rejected upstream, and a forged token passes as easily as a real
//! one. Never use [`inspect`] to grant access to anything.

use jsonwebtoken::dangerous::insecure_decode;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    #[serde(default)]
    exp: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Decodes and is not past `exp` (or carries none)
    Live,
    /// `exp` lies before the reference time
    Expired,
    /// Not a decodable JWT
    Malformed,
}

/// Claims of a compact JWS, signature ignored.
///
/// Goes through [`insecure_decode`] so any algorithm (registries mostly issue
/// RS256/ES256) is read without a matching key.
fn claims(token: &str) -> Option<ExpiryClaims> {
    match insecure_decode::<ExpiryClaims>(token) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!(error = %e, "Bearer token did not decode");
            None
        }
    }
}

/// Classify `token` against `now` (seconds since the Unix epoch).
pub fn inspect(token: &str, now: i64) -> TokenState {
    match claims(token) {
        Some(ExpiryClaims { exp: Some(exp) }) if exp < now as f64 => TokenState::Expired,
        Some(_) => TokenState::Live,
        None => TokenState::Malformed,
    }
}

/// Token part of a `Bearer <token>` header value. Scheme match is case-insensitive.
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Whether an `Authorization` value should reach the upstream.
///
/// Non-bearer credentials (Basic, ...) are always forwarded.
pub fn is_forwardable(authorization: &str, now: i64) -> bool {
    match bearer_token(authorization) {
        Some(token) => inspect(token, now) == TokenState::Live,
        None => true,
    }
}
