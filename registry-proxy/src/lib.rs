//! # Registry Proxy
//!
//! A host-based reverse proxy for container registries. The inbound `Host`
//! picks an upstream registry (`docker.<domain>` → Docker Hub,
//! `quay.<domain>` → quay.io, ...); the request is rewritten to what that
//! upstream expects, forwarded, and the response is rewritten so registry
//! clients keep talking to the proxy during the token handshake.
//!
//! ## Key Modules
//!
//! - [`routes`]: virtual host → upstream lookup
//! - [`rewrite`]: header filtering, `library/` namespace rules, realm substitution
//! - [`upstream`]: pooled outbound client with timeouts and egress proxy
//! - [`token`]: `/v2/auth` and `/token` exchange
//! - [`challenge`]: `WWW-Authenticate` parsing and the proxy's own 401
//! - [`jwt`]: bearer expiry inspection (not an authentication check)
//! - [`proxy`]: the per-request pipeline tying the above together
//!
//! The proxy is stateless between requests; shared state is read-only.

pub mod challenge;
pub mod cli;
pub mod config;
pub mod error;
pub mod jwt;
pub mod proxy;
pub mod rewrite;
pub mod routes;
pub mod server;
pub mod state;
pub mod token;
pub mod types;
pub mod ui;
pub mod upstream;

pub use config::Config;
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use routes::{RouteEntry, RouteTable};
pub use server::{build_router, run_server, run_server_with_shutdown};
pub use state::AppState;
pub use types::{ProxyRequest, UpstreamResponse};
pub use upstream::{UpstreamClient, UpstreamConfig};
