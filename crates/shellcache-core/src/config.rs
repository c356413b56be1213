//! Cache manager configuration.
//!
//! The configuration carries everything that was a compiled-in constant in a
//! hand-written service worker: the version tag, the bucket name prefix, the
//! app-shell manifest, and the fetch strategy selection. It is injected at
//! manager construction, so tests and multi-tenant hosts can run several
//! independent managers side by side.
//!
//! Configuration is stored at `~/.config/shellcache/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::manifest::ShellManifest;
use crate::strategy::FetchStrategy;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

fn default_bucket_prefix() -> String {
    APP_NAME.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Opaque version tag. Bumping it is the only supported mechanism to
    /// force clients to discard previously cached content.
    pub version: String,

    /// Prefix for the bucket name; the full name is `{prefix}-{version}`.
    #[serde(default = "default_bucket_prefix")]
    pub bucket_prefix: String,

    /// Origin the app shell is served from. Leading-slash manifest entries
    /// and intercepted request paths are resolved against it.
    pub base_url: Url,

    /// URLs that must be present in the current bucket after install.
    #[serde(default)]
    pub shell_manifest: ShellManifest,

    /// Strategy applied to requests outside the revalidate prefix.
    #[serde(default)]
    pub default_strategy: FetchStrategy,

    /// Path prefix (e.g. `/api/`) whose requests get stale-while-revalidate
    /// regardless of the default strategy.
    #[serde(default)]
    pub revalidate_prefix: Option<String>,
}

impl CacheConfig {
    pub fn new(version: impl Into<String>, base_url: Url) -> Self {
        Self {
            version: version.into(),
            bucket_prefix: default_bucket_prefix(),
            base_url,
            shell_manifest: ShellManifest::default(),
            default_strategy: FetchStrategy::default(),
            revalidate_prefix: None,
        }
    }

    /// Name of the bucket this configuration considers current.
    pub fn bucket_name(&self) -> String {
        format!("{}-{}", self.bucket_prefix, self.version)
    }

    /// Strategy for a request path: the revalidate prefix wins, everything
    /// else gets the default strategy.
    pub fn strategy_for(&self, path: &str) -> FetchStrategy {
        match self.revalidate_prefix {
            Some(ref prefix) if path.starts_with(prefix.as_str()) => {
                FetchStrategy::StaleWhileRevalidate
            }
            _ => self.default_strategy,
        }
    }

    pub fn load(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory the disk-backed store persists buckets under.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(&self.bucket_prefix))
    }
}
