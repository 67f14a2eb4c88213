//! `WWW-Authenticate` Bearer challenges.
//!
//! Parsing is best-effort: anything that is not a Bearer challenge carrying
//! both `realm` and `service` yields `None` and callers relay the header as is.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: String,
    pub scope: Option<String>,
    /// Byte range of the realm value inside the parsed header
    realm_span: Range<usize>,
}

impl AuthChallenge {
    pub fn parse(header: &str) -> Option<Self> {
        let rest = strip_bearer(header)?;
        let offset = header.len() - rest.len();

        let mut realm = None;
        let mut service = None;
        let mut scope = None;

        for param in Params::new(rest) {
            let span = param.span.start + offset..param.span.end + offset;
            if param.name.eq_ignore_ascii_case("realm") {
                realm = Some((param.value, span));
            } else if param.name.eq_ignore_ascii_case("service") {
                service = Some(param.value);
            } else if param.name.eq_ignore_ascii_case("scope") {
                scope = Some(param.value);
            }
        }

        let (realm, realm_span) = realm?;
        Some(Self {
            realm,
            service: service?,
            scope,
            realm_span,
        })
    }

    /// `header` with the realm value replaced and every other byte kept.
    ///
    /// `header` must be the string this challenge was parsed from.
    pub fn replace_realm(&self, header: &str, realm: &str) -> String {
        let Range { start, end } = self.realm_span.clone();
        let mut out = String::with_capacity(header.len() + realm.len());
        out.push_str(&header[..start]);
        out.push_str(realm);
        out.push_str(&header[end..]);
        out
    }
}

/// 401 pointing registry clients at this proxy's `/v2/auth`.
pub fn unauthorized(scheme: &str, proxy_host: &str, service: &str) -> Response {
    let challenge = format!(r#"Bearer realm="{scheme}://{proxy_host}/v2/auth",service="{service}""#);
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "UNAUTHORIZED" })),
    )
        .into_response();

    match HeaderValue::from_str(&challenge) {
        Ok(value) => {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        Err(e) => {
            tracing::warn!(host = %proxy_host, error = %e, "Challenge header not representable");
        }
    }
    response
}

fn strip_bearer(header: &str) -> Option<&str> {
    let trimmed = header.trim_start();
    let (scheme, rest) = trimmed.split_at_checked(6)?;
    if !scheme.eq_ignore_ascii_case("bearer") || !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some(rest)
}

struct Param<'a> {
    name: &'a str,
    value: String,
    span: Range<usize>,
}

/// `name=value` / `name="quoted, value"` pairs separated by commas.
struct Params<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Params<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_separators(&mut self) {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() && matches!(bytes[self.pos], b' ' | b'\t' | b',') {
            self.pos += 1;
        }
    }
}

impl<'a> Iterator for Params<'a> {
    type Item = Param<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_separators();
        let bytes = self.input.as_bytes();
        if self.pos >= bytes.len() {
            return None;
        }

        let name_start = self.pos;
        while self.pos < bytes.len() && bytes[self.pos] != b'=' && bytes[self.pos] != b',' {
            self.pos += 1;
        }
        if self.pos >= bytes.len() || bytes[self.pos] != b'=' {
            // bare token68 or truncated parameter
            return None;
        }
        let name = self.input[name_start..self.pos].trim();
        self.pos += 1;

        if bytes.get(self.pos) == Some(&b'"') {
            self.pos += 1;
            let start = self.pos;
            let mut value = String::new();
            loop {
                match bytes.get(self.pos)? {
                    b'"' => break,
                    b'\\' => {
                        self.pos += 1;
                        let escaped = self.input[self.pos..].chars().next()?;
                        value.push(escaped);
                        self.pos += escaped.len_utf8();
                    }
                    _ => {
                        let c = self.input[self.pos..].chars().next()?;
                        value.push(c);
                        self.pos += c.len_utf8();
                    }
                }
            }
            let span = start..self.pos;
            self.pos += 1;
            Some(Param { name, value, span })
        } else {
            let start = self.pos;
            while self.pos < bytes.len() && bytes[self.pos] != b',' {
                self.pos += 1;
            }
            let raw = &self.input[start..self.pos];
            let value = raw.trim_end().to_string();
            let span = start..start + value.len();
            Some(Param { name, value, span })
        }
    }
}
