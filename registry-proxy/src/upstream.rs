use crate::config::Config;
use crate::types::{ProxyRequest, UpstreamResponse};
use crate::{AppError, AppResult};
use axum::http::HeaderMap;
use reqwest::{redirect, Client, Proxy};
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for outbound registry calls.
///
/// # Fields
///
/// * `connect_timeout` - Limit for establishing the TCP/TLS connection
/// * `read_timeout` - Limit between successive reads of a response
/// * `total_timeout` - Limit for one whole exchange, body included
/// * `proxy_url` - Optional egress proxy (`http`, `https`, `socks5`, `socks5h`)
/// * `max_redirects` - Upstream redirects followed before giving up
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use registry_proxy::upstream::UpstreamConfig;
///
/// let config = UpstreamConfig {
///     proxy_url: Some("socks5h://127.0.0.1:1080".to_string()),
///     ..UpstreamConfig::default()
/// };
/// assert_eq!(config.connect_timeout, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub total_timeout: Duration,
    pub proxy_url: Option<String>,
    pub max_redirects: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(300),
            total_timeout: Duration::from_secs(300),
            proxy_url: None,
            max_redirects: 10,
        }
    }
}

impl UpstreamConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: config.timeouts.connect(),
            read_timeout: config.timeouts.read(),
            total_timeout: config.timeouts.total(),
            proxy_url: config.proxy.proxy_url.clone(),
            ..Self::default()
        }
    }
}

/// Pooled HTTP client for upstream registries and token servers.
///
/// One instance is shared by every request handler. Responses are read fully
/// into memory before they are returned; nothing is streamed through.
///
/// # Features
///
/// - **Timeouts**: connect, read and total limits on every call
/// - **Egress proxy**: optional SOCKS or HTTP proxy for all upstream traffic
/// - **Redirects**: upstream redirects (blob storage, CDN) are followed
/// - **Error handling**: network failures become [`AppError::Network`]
///
/// # Examples
///
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use axum::http::HeaderMap;
/// use registry_proxy::upstream::{UpstreamClient, UpstreamConfig};
///
/// let client = UpstreamClient::new(UpstreamConfig::default())?;
/// let probe = client.get("https://quay.io/v2/", HeaderMap::new()).await?;
/// println!("quay.io answered {}", probe.status);
/// # Ok(())
/// # }
/// ```
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    /// Create a new upstream client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the proxy URL is rejected, or
    /// [`AppError::Internal`] if the underlying HTTP client cannot be built.
    pub fn new(config: UpstreamConfig) -> AppResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .timeout(config.total_timeout)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .user_agent(concat!("registry-proxy/", env!("CARGO_PKG_VERSION")));

        builder = match &config.proxy_url {
            Some(url) => {
                let proxy = Proxy::all(url.as_str())
                    .map_err(|e| AppError::Config(format!("invalid proxy_url '{url}': {e}")))?;
                info!(proxy = %url, "Routing upstream traffic through egress proxy");
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {e}")))?;

        debug!(
            connect = ?config.connect_timeout,
            read = ?config.read_timeout,
            total = ?config.total_timeout,
            "Upstream client ready"
        );
        Ok(Self { client })
    }

    /// Replay `req` against `url` with its (already rewritten) method,
    /// headers and body.
    pub async fn forward(&self, req: &ProxyRequest, url: &str) -> AppResult<UpstreamResponse> {
        debug!(method = %req.method, url = %url, "Forwarding request upstream");

        let mut builder = self
            .client
            .request(req.method.clone(), url)
            .headers(req.headers.clone());
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }

        let response = builder.send().await.map_err(|e| AppError::network(url, e))?;
        Self::collect(url, response).await
    }

    /// Plain GET used for `/v2/` probes and token fetches.
    pub async fn get(&self, url: &str, headers: HeaderMap) -> AppResult<UpstreamResponse> {
        debug!(url = %url, "Fetching from upstream");

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| AppError::network(url, e))?;
        Self::collect(url, response).await
    }

    async fn collect(url: &str, response: reqwest::Response) -> AppResult<UpstreamResponse> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| AppError::network(url, e))?;

        debug!(url = %url, status = %status, bytes = body.len(), "Upstream responded");
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_follows_timeouts_section() {
        let mut config = Config::default();
        config.timeouts.connect_secs = 5;
        config.timeouts.read_secs = 7;
        config.timeouts.total_secs = 9;
        config.proxy.proxy_url = Some("http://egress.internal:3128".to_string());

        let upstream = UpstreamConfig::from_config(&config);
        assert_eq!(upstream.connect_timeout, Duration::from_secs(5));
        assert_eq!(upstream.read_timeout, Duration::from_secs(7));
        assert_eq!(upstream.total_timeout, Duration::from_secs(9));
        assert_eq!(upstream.proxy_url.as_deref(), Some("http://egress.internal:3128"));
        assert_eq!(upstream.max_redirects, 10);
    }

    #[test]
    fn builds_with_socks_proxy() {
        let client = UpstreamClient::new(UpstreamConfig {
            proxy_url: Some("socks5h://127.0.0.1:1080".to_string()),
            ..UpstreamConfig::default()
        });
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = UpstreamClient::new(UpstreamConfig {
            connect_timeout: Duration::from_secs(2),
            ..UpstreamConfig::default()
        })
        .unwrap();
        let err = client
            .get(&format!("http://{addr}/v2/"), HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Network { .. }));
        assert_eq!(err.client_message(), "upstream request failed");
    }
}
