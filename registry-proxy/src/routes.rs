//! Virtual host → upstream route table.
//!
//! Built once from [`ProxyConfig`] and shared read-only by every request.
//! Lookups are exact matches on the hostname with the port stripped; there is
//! no wildcard or suffix matching, so an unmapped host is never proxied
//! anywhere unless the debug profile's fallback is enabled.
//!
//! Token endpoints are separate keys of the form `"<host>/token"` whose
//! upstream is the full token URL.

use crate::config::{ProxyConfig, RouteSpec, DOCKER_AUTH, DOCKER_HUB};
use crate::error::{AppError, AppResult};
use indexmap::IndexMap;
use tracing::debug;
use url::Url;

const TOKEN_SUFFIX: &str = "/token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub virtual_host: String,
    pub upstream: Url,
    pub docker_hub: bool,
}

impl RouteEntry {
    fn from_spec(spec: &RouteSpec) -> AppResult<Self> {
        let upstream = Url::parse(&spec.upstream).map_err(|e| {
            AppError::Config(format!(
                "invalid upstream '{}' for host '{}': {e}",
                spec.upstream, spec.host
            ))
        })?;
        if upstream.host_str().is_none() {
            return Err(AppError::Config(format!(
                "upstream '{}' for host '{}' has no host",
                spec.upstream, spec.host
            )));
        }
        Ok(Self {
            virtual_host: normalize_host(&spec.host),
            upstream,
            docker_hub: spec.docker_hub,
        })
    }

    pub fn upstream_host(&self) -> Option<&str> {
        self.upstream.host_str()
    }

    /// Absolute URL for `path` (and optional raw `query`) on this upstream.
    pub fn target(&self, path: &str, query: Option<&str>) -> String {
        let base = self.upstream.as_str().trim_end_matches('/');
        match query {
            Some(q) if !q.is_empty() => format!("{base}{path}?{q}"),
            _ => format!("{base}{path}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: IndexMap<String, RouteEntry>,
    fallback: Option<RouteEntry>,
}

/// Built-in routes for `domain`, in lookup-preference order.
pub fn builtin_routes(domain: &str) -> Vec<RouteSpec> {
    let hub = |prefix: &str| RouteSpec::new(format!("{prefix}.{domain}"), DOCKER_HUB, true);
    let plain = |prefix: &str, upstream: &str| {
        RouteSpec::new(format!("{prefix}.{domain}"), upstream, false)
    };

    vec![
        hub("docker"),
        plain("quay", "https://quay.io"),
        plain("gcr", "https://gcr.io"),
        plain("k8s-gcr", "https://k8s.gcr.io"),
        plain("k8s", "https://registry.k8s.io"),
        plain("ghcr", "https://ghcr.io"),
        plain("cloudsmith", "https://docker.cloudsmith.io"),
        plain("ecr", "https://public.ecr.aws"),
        hub("docker-staging"),
        RouteSpec::new(format!("docker-auth.{domain}"), DOCKER_AUTH, true),
        RouteSpec::new(
            format!("docker-auth.{domain}{TOKEN_SUFFIX}"),
            format!("{DOCKER_AUTH}{TOKEN_SUFFIX}"),
            true,
        ),
    ]
}

impl RouteTable {
    pub fn from_config(config: &ProxyConfig) -> AppResult<Self> {
        let mut specs = if config.default_routes {
            builtin_routes(config.custom_domain.trim())
        } else {
            Vec::new()
        };
        specs.extend(config.routes.iter().cloned());

        let mut entries = IndexMap::with_capacity(specs.len());
        for spec in &specs {
            let entry = RouteEntry::from_spec(spec)?;
            debug!(host = %entry.virtual_host, upstream = %entry.upstream, "Registered route");
            entries.insert(entry.virtual_host.clone(), entry);
        }

        let fallback = if config.profile.falls_back_to_debug_upstream() {
            let upstream = Url::parse(&config.debug_upstream)?;
            let docker_hub = upstream.as_str().trim_end_matches('/') == DOCKER_HUB;
            Some(RouteEntry {
                virtual_host: "*".to_string(),
                upstream,
                docker_hub,
            })
        } else {
            None
        };

        Ok(Self { entries, fallback })
    }

    /// Resolve a `Host` header value to its route.
    pub fn resolve(&self, host: &str) -> AppResult<&RouteEntry> {
        let key = normalize_host(strip_port(host));
        let entry = if key.ends_with(TOKEN_SUFFIX) {
            None
        } else {
            self.entries.get(&key)
        };
        entry
            .or(self.fallback.as_ref())
            .ok_or(AppError::UnknownHost(key))
    }

    /// Fixed token endpoint registered for `host`, if any.
    pub fn token_endpoint(&self, host: &str) -> Option<&RouteEntry> {
        let key = format!("{}{TOKEN_SUFFIX}", normalize_host(strip_port(host)));
        self.entries.get(&key)
    }

    /// Virtual host that fronts `upstream_host`, first configured wins.
    pub fn reverse(&self, upstream_host: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(key, _)| !key.ends_with(TOKEN_SUFFIX))
            .find(|(_, entry)| {
                entry
                    .upstream_host()
                    .is_some_and(|h| h.eq_ignore_ascii_case(upstream_host))
            })
            .map(|(key, _)| key.as_str())
    }

    /// Proxy-facing routes, token keys excluded.
    pub fn virtual_hosts(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries
            .iter()
            .filter(|(key, _)| !key.ends_with(TOKEN_SUFFIX))
            .map(|(_, entry)| entry)
    }

    /// `host → upstream` listing for 404 bodies and the CLI.
    pub fn summary(&self) -> IndexMap<String, String> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.upstream.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Strip a trailing `:port`, leaving bracketed IPv6 literals intact.
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}
