//! # Application State
//!
//! [`AppState`] is built once at startup and handed to every handler behind
//! an `Arc`. Everything in it is read-only after construction, so handlers
//! share it without locking.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use registry_proxy::{AppState, Config};
//!
//! let state = Arc::new(AppState::from_config(Config::default())?);
//! assert!(!state.routes.is_empty());
//! # Ok::<(), registry_proxy::AppError>(())
//! ```

use crate::config::Config;
use crate::rewrite::RequestRewriter;
use crate::routes::RouteTable;
use crate::upstream::{UpstreamClient, UpstreamConfig};
use crate::AppResult;
use std::sync::Arc;

/// Shared, immutable per-process state.
///
/// # Fields
///
/// * `config` - Resolved configuration
/// * `routes` - Virtual host → upstream table
/// * `upstream` - Pooled client for registry and token servers
/// * `rewriter` - Header and namespace policies for inbound requests
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub routes: Arc<RouteTable>,
    pub upstream: Arc<UpstreamClient>,
    pub rewriter: RequestRewriter,
}

impl AppState {
    pub fn from_config(config: Config) -> AppResult<Self> {
        let routes = RouteTable::from_config(&config.proxy)?;
        let upstream = UpstreamClient::new(UpstreamConfig::from_config(&config))?;
        let rewriter = RequestRewriter::new(config.proxy.header_policy, config.proxy.namespace_policy);

        Ok(Self {
            config: Arc::new(config),
            routes: Arc::new(routes),
            upstream: Arc::new(upstream),
            rewriter,
        })
    }

    /// Scheme registry clients use to reach this proxy.
    pub fn scheme(&self) -> &'static str {
        self.config.proxy.profile.scheme()
    }
}
