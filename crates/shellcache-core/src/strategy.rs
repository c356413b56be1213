//! Fetch interception strategies.
//!
//! A strategy decides the ordering between cache lookup and live network
//! fetch for an intercepted GET request. The strategy is fixed per manager
//! configuration, not per request; the only per-request routing is the
//! optional revalidate path prefix handled by
//! [`CacheConfig::strategy_for`](crate::config::CacheConfig::strategy_for).

use serde::{Deserialize, Serialize};

/// How an intercepted GET request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategy {
    /// Return the cached entry when present; otherwise fetch live without
    /// storing the result.
    #[default]
    CacheFirst,
    /// Fetch live first and write cacheable results back; fall back to the
    /// cached entry when the network is unreachable.
    NetworkFirst,
    /// Return the cached entry immediately and refresh it in the background;
    /// on a cache miss, wait for the live fetch.
    StaleWhileRevalidate,
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::CacheFirst => write!(f, "cache-first"),
            FetchStrategy::NetworkFirst => write!(f, "network-first"),
            FetchStrategy::StaleWhileRevalidate => write!(f, "stale-while-revalidate"),
        }
    }
}
