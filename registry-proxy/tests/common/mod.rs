//! Common test utilities and helpers
//!
//! Integration tests drive the real router through `axum-test` while a small
//! axum app on an ephemeral port plays the upstream registry and token server.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{OriginalUri, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing,
    Json, Router,
};
use axum_test::{TestRequest, TestServer};
use registry_proxy::config::{Config, RouteSpec};
use registry_proxy::{build_router, AppState};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::form_urlencoded;

pub const DOCKER_HOST: &str = "docker.example.test";
pub const QUAY_HOST: &str = "quay.example.test";
pub const AUTH_HOST: &str = "docker-auth.example.test";
pub const DEAD_HOST: &str = "dead.example.test";
pub const MOCK_SERVICE: &str = "mock-registry";
pub const CHUNKED_HOST: &str = "chunked.example.test";

/// How long `slow` repositories stall before answering.
pub const SLOW_UPSTREAM: Duration = Duration::from_secs(3);

/// A request as the mock upstream received it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
}

#[derive(Clone)]
struct MockState {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockState {
    fn record(&self, method: Method, uri: &axum::http::Uri, headers: &HeaderMap) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(Recorded {
                method,
                path: uri.path().to_string(),
                query: uri.query().map(str::to_string),
                headers: headers.clone(),
            });
        }
    }

    fn challenge(&self) -> HeaderValue {
        let value = format!(
            r#"Bearer realm="http://{}/token",service="{MOCK_SERVICE}""#,
            self.addr
        );
        HeaderValue::from_str(&value).expect("valid challenge")
    }
}

/// Upstream registry double.
pub struct MockRegistry {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockRegistry {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock registry");
        let addr = listener.local_addr().expect("mock registry addr");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let state = MockState {
            addr,
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/v2/", routing::get(probe))
            .route("/token", routing::get(token))
            .fallback(echo)
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last_request(&self) -> Recorded {
        self.requests()
            .pop()
            .expect("mock registry received no request")
    }
}

/// `/v2/`: 401 with a Bearer challenge unless credentials are present.
async fn probe(
    State(state): State<MockState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    state.record(Method::GET, &uri, &headers);
    if headers.contains_key(header::AUTHORIZATION) {
        return Json(json!({})).into_response();
    }
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({"errors": [{"code": "UNAUTHORIZED"}]})),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, state.challenge());
    response
}

/// `/token`: echoes what a token server would have been asked for.
async fn token(
    State(state): State<MockState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    state.record(Method::GET, &uri, &headers);
    let pairs: Vec<(String, String)> = form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
        .into_owned()
        .collect();
    let service = pairs
        .iter()
        .find(|(k, _)| k == "service")
        .map(|(_, v)| v.clone());
    let scopes: Vec<String> = pairs
        .iter()
        .filter(|(k, _)| k == "scope")
        .map(|(_, v)| v.clone())
        .collect();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Json(json!({
        "token": "mock-token",
        "service": service,
        "scope": scopes,
        "authorization": authorization,
        "raw_query": uri.query(),
    }))
}

/// Everything else: echo the request as JSON. Repositories named `private`
/// demand credentials, `moved` answers a temporary redirect into
/// `/blob-store/` and `slow` stalls for [`SLOW_UPSTREAM`].
async fn echo(
    State(state): State<MockState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    state.record(method.clone(), &uri, &headers);
    let path = uri.path();

    if path.contains("/private/") && !headers.contains_key(header::AUTHORIZATION) {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, state.challenge());
        return response;
    }

    if let Some((_, digest)) = path.split_once("/moved/blobs/") {
        let location = format!("/blob-store/{digest}");
        return (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response();
    }

    if path.starts_with("/blob-store/") {
        return (StatusCode::OK, "blob-bytes").into_response();
    }

    if path.contains("/slow/") {
        tokio::time::sleep(SLOW_UPSTREAM).await;
    }

    let header_names: Vec<String> = headers.keys().map(|k| k.to_string()).collect();
    Json(json!({
        "method": method.as_str(),
        "path": path,
        "query": uri.query(),
        "headers": header_names,
    }))
    .into_response()
}

/// Raw HTTP/1.1 upstream answering every request with a genuinely chunked
/// `body`, so the proxy sees `Transfer-Encoding: chunked` on the wire.
pub async fn chunked_upstream(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind chunked upstream");
    let addr = listener.local_addr().expect("chunked upstream addr");

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n{:x}\r\n{body}\r\n0\r\n\r\n",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.ok();
                stream.shutdown().await.ok();
            });
        }
    });

    addr
}

/// Routes for the test domain, all pointing at `registry`.
pub fn test_config(registry: &MockRegistry) -> Config {
    let upstream = registry.url();
    let mut config = Config::default();
    config.proxy.custom_domain = "example.test".to_string();
    config.proxy.default_routes = false;
    config.proxy.routes = vec![
        RouteSpec::new(DOCKER_HOST, upstream.clone(), true),
        RouteSpec::new(QUAY_HOST, upstream.clone(), false),
        RouteSpec::new(AUTH_HOST, upstream.clone(), true),
        RouteSpec::new(format!("{AUTH_HOST}/token"), format!("{upstream}/token"), true),
        RouteSpec::new(DEAD_HOST, "http://127.0.0.1:9", false),
    ];
    config.timeouts.connect_secs = 2;
    config.timeouts.read_secs = 5;
    config.timeouts.total_secs = 5;
    config
}

pub fn test_server(config: Config) -> TestServer {
    let state = AppState::from_config(config).expect("Failed to build app state");
    TestServer::new(build_router(Arc::new(state))).expect("Failed to create test server")
}

/// Request for `path` addressed to virtual host `host`.
pub fn request(server: &TestServer, method: Method, host: &str, path: &str) -> TestRequest {
    server.method(method, path).add_header(
        header::HOST,
        HeaderValue::from_str(host).expect("valid host header"),
    )
}

pub fn get(server: &TestServer, host: &str, path: &str) -> TestRequest {
    request(server, Method::GET, host, path)
}

pub fn bearer_token(exp: i64) -> String {
    #[derive(serde::Serialize)]
    struct Claims {
        sub: &'static str,
        exp: i64,
    }
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &Claims { sub: "puller", exp },
        &jsonwebtoken::EncodingKey::from_secret(b"mock"),
    )
    .expect("encode token")
}
