use axum::{
    body::Body,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

/// One inbound request as seen by the rewrite pipeline.
///
/// Built fresh per request and owned by the handler task.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Scheme clients use to reach the proxy
    pub scheme: &'static str,
    /// Inbound `Host` value, port included
    pub host: String,
    pub path: String,
    /// Raw query string, still percent-encoded
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Target follows Docker Hub's implicit `library/` namespace
    pub docker_hub: bool,
}

impl ProxyRequest {
    pub fn from_parts(
        method: Method,
        scheme: &'static str,
        host: impl Into<String>,
        uri: &Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            scheme,
            host: host.into(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            headers,
            body,
            docker_hub: false,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }
}

/// Fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_raw_query() {
        let uri: Uri = "/v2/auth?scope=repository%3Abusybox%3Apull&service=x"
            .parse()
            .unwrap();
        let req = ProxyRequest::from_parts(
            Method::GET,
            "https",
            "docker.example.com",
            &uri,
            HeaderMap::new(),
            Bytes::new(),
        );
        assert_eq!(req.path, "/v2/auth");
        assert_eq!(req.query(), Some("scope=repository%3Abusybox%3Apull&service=x"));
        assert!(!req.docker_hub);
    }
}
