//! # Configuration Management
//!
//! Configuration is resolved once at startup and is immutable afterwards.
//! Sources are layered, later ones winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. An optional JSON file ([`Config::load_or_default`])
//! 3. Environment variables ([`Config::apply_env`]): `CUSTOM_DOMAIN`,
//!    `PROXY_URL`, `MODE` / `PROFILE`, `HEADER_POLICY`, `NAMESPACE_POLICY`,
//!    `CHALLENGE_POLICY`
//! 4. Command line flags (see `cli`)
//!
//! ```rust,no_run
//! # use registry_proxy::config::Config;
//! let mut config = Config::load_or_default("registry-proxy.json")?;
//! config.apply_env()?;
//! config.validate()?;
//! # Ok::<(), registry_proxy::AppError>(())
//! ```

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default upstream for unqualified Docker Hub traffic.
pub const DOCKER_HUB: &str = "https://registry-1.docker.io";

/// Docker Hub's token issuer.
pub const DOCKER_AUTH: &str = "https://auth.docker.io";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
    pub timeouts: TimeoutConfig,
    pub ui: UiConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `service` value advertised in synthesized challenges
    pub service_name: String,
    /// Upper bound for buffered request bodies
    pub max_request_body_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            service_name: "registry-proxy".to_string(),
            max_request_body_mb: 1024,
        }
    }
}

/// Routing and rewriting policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Base domain the built-in virtual hosts are derived from
    pub custom_domain: String,
    pub profile: Profile,
    /// Egress proxy for upstream calls (`http://`, `https://`, `socks5://`, `socks5h://`)
    pub proxy_url: Option<String>,
    pub header_policy: HeaderPolicy,
    pub namespace_policy: NamespacePolicy,
    pub challenge_policy: ChallengePolicy,
    /// Upstream for unmapped hosts under the debug profile
    pub debug_upstream: String,
    /// Include the built-in `docker.<domain>`, `quay.<domain>`, ... routes
    pub default_routes: bool,
    /// Additional routes; an entry for an existing host replaces it
    pub routes: Vec<RouteSpec>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            custom_domain: "example.com".to_string(),
            profile: Profile::Production,
            proxy_url: None,
            header_policy: HeaderPolicy::AllowList,
            namespace_policy: NamespacePolicy::Rewrite,
            challenge_policy: ChallengePolicy::Synthesize,
            debug_upstream: DOCKER_HUB.to_string(),
            default_routes: true,
            routes: Vec::new(),
        }
    }
}

/// One virtual host → upstream mapping as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub host: String,
    pub upstream: String,
    /// Apply Docker Hub's implicit `library/` namespace rules
    #[serde(default)]
    pub docker_hub: bool,
}

impl RouteSpec {
    pub fn new(host: impl Into<String>, upstream: impl Into<String>, docker_hub: bool) -> Self {
        Self {
            host: host.into(),
            upstream: upstream.into(),
            docker_hub,
        }
    }
}

/// Outbound timeouts in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub read_secs: u64,
    pub total_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 60,
            read_secs: 300,
            total_secs: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn total(&self) -> Duration {
        Duration::from_secs(self.total_secs)
    }
}

/// Help page and static asset settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub static_dir: PathBuf,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("static"),
        }
    }
}

/// Deployment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Production,
    Staging,
    Debug,
}

impl Profile {
    /// Scheme clients see the proxy under, used in synthesized realms.
    pub fn scheme(self) -> &'static str {
        match self {
            Profile::Debug => "http",
            Profile::Production | Profile::Staging => "https",
        }
    }

    /// Whether unmapped hosts go to `debug_upstream` instead of a 404.
    pub fn falls_back_to_debug_upstream(self) -> bool {
        self == Profile::Debug
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Profile::Production),
            "staging" => Ok(Profile::Staging),
            "debug" | "dev" => Ok(Profile::Debug),
            other => Err(format!(
                "unknown profile '{other}' (expected production, staging or debug)"
            )),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Profile::Production => "production",
            Profile::Staging => "staging",
            Profile::Debug => "debug",
        })
    }
}

/// Which inbound headers reach the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Forward only a fixed set of registry-relevant headers
    AllowList,
    /// Forward everything except proxy infrastructure headers
    DenyList,
}

impl FromStr for HeaderPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "allow_list" | "allow" => Ok(HeaderPolicy::AllowList),
            "deny_list" | "deny" => Ok(HeaderPolicy::DenyList),
            other => Err(format!("unknown header policy '{other}'")),
        }
    }
}

/// How unqualified Docker Hub repository paths are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespacePolicy {
    /// Rewrite `/v2/<name>/...` to `/v2/library/<name>/...` before forwarding
    Rewrite,
    /// Answer with a 301 to the `library/` path
    Redirect,
}

impl FromStr for NamespacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rewrite" => Ok(NamespacePolicy::Rewrite),
            "redirect" => Ok(NamespacePolicy::Redirect),
            other => Err(format!("unknown namespace policy '{other}'")),
        }
    }
}

/// What a 401 from upstream on a `/v2/` path turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePolicy {
    /// Replace it with a challenge pointing at this proxy's `/v2/auth`
    Synthesize,
    /// Relay it with the realm host swapped for the matching virtual host
    RewriteRealm,
}

impl FromStr for ChallengePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "synthesize" => Ok(ChallengePolicy::Synthesize),
            "rewrite_realm" => Ok(ChallengePolicy::RewriteRealm),
            other => Err(format!("unknown challenge policy '{other}'")),
        }
    }
}

const PROXY_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

impl Config {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Load configuration from a JSON file, or defaults if it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay settings from the process environment.
    pub fn apply_env(&mut self) -> AppResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay settings read through `lookup`. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(domain) = get("CUSTOM_DOMAIN") {
            self.proxy.custom_domain = domain.trim().to_string();
        }
        if let Some(proxy_url) = get("PROXY_URL") {
            self.proxy.proxy_url = Some(proxy_url.trim().to_string());
        }
        if let Some(profile) = get("MODE").or_else(|| get("PROFILE")) {
            self.proxy.profile = profile.parse().map_err(AppError::Config)?;
        }
        if let Some(policy) = get("HEADER_POLICY") {
            self.proxy.header_policy = policy.parse().map_err(AppError::Config)?;
        }
        if let Some(policy) = get("NAMESPACE_POLICY") {
            self.proxy.namespace_policy = policy.parse().map_err(AppError::Config)?;
        }
        if let Some(policy) = get("CHALLENGE_POLICY") {
            self.proxy.challenge_policy = policy.parse().map_err(AppError::Config)?;
        }
        Ok(())
    }

    /// Reject settings that would only fail later, per request.
    pub fn validate(&self) -> AppResult<()> {
        if self.proxy.custom_domain.trim().is_empty() {
            return Err(AppError::Config("custom_domain cannot be empty".to_string()));
        }

        if let Some(proxy_url) = &self.proxy.proxy_url {
            let url = Url::parse(proxy_url)
                .map_err(|e| AppError::Config(format!("invalid proxy_url '{proxy_url}': {e}")))?;
            if !PROXY_SCHEMES.contains(&url.scheme()) {
                return Err(AppError::Config(format!(
                    "unsupported proxy_url scheme '{}' (expected one of {})",
                    url.scheme(),
                    PROXY_SCHEMES.join(", ")
                )));
            }
        }

        Url::parse(&self.proxy.debug_upstream).map_err(|e| {
            AppError::Config(format!(
                "invalid debug_upstream '{}': {e}",
                self.proxy.debug_upstream
            ))
        })?;

        let t = &self.timeouts;
        if t.connect_secs == 0 || t.read_secs == 0 || t.total_secs == 0 {
            return Err(AppError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        if self.server.max_request_body_mb == 0 {
            return Err(AppError::Config(
                "max_request_body_mb must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn max_request_body_bytes(&self) -> usize {
        self.server.max_request_body_mb * 1024 * 1024
    }
}
