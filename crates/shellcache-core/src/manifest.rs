//! App-shell manifest handling.
//!
//! The manifest is the ordered list of URLs that must be present in the
//! current bucket immediately after install. Entries are either local paths
//! (leading slash, resolved against the configured base origin) or absolute
//! URLs. Cross-origin entries are fetched in no-CORS mode and stored as
//! opaque snapshots; same-origin entries are fetched normally and verified.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::fetch::{FetchError, FetchMode};

/// Ordered list of app-shell URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShellManifest(Vec<String>);

impl ShellManifest {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn urls(&self) -> &[String] {
        &self.0
    }

    /// Resolve every entry against the base origin, classifying each as
    /// same-origin or cross-origin. Order is preserved. A malformed entry
    /// fails the whole resolution.
    pub fn resolve(&self, base: &Url) -> Result<Vec<ShellEntry>, FetchError> {
        self.0
            .iter()
            .map(|raw| ShellEntry::resolve(raw, base))
            .collect()
    }
}

impl<S: Into<String>> From<Vec<S>> for ShellManifest {
    fn from(urls: Vec<S>) -> Self {
        Self(urls.into_iter().map(Into::into).collect())
    }
}

/// A single resolved manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellEntry {
    /// Absolute URL to fetch and to use as the cache key.
    pub url: Url,
    /// Whether the entry lives on a different origin than the app shell.
    pub cross_origin: bool,
}

impl ShellEntry {
    fn resolve(raw: &str, base: &Url) -> Result<Self, FetchError> {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                base.join(raw).map_err(|e| FetchError::InvalidUrl {
                    url: raw.to_string(),
                    reason: e.to_string(),
                })?
            }
            Err(e) => {
                return Err(FetchError::InvalidUrl {
                    url: raw.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let cross_origin = url.origin() != base.origin();
        Ok(Self { url, cross_origin })
    }

    /// Request mode for this entry: cross-origin entries can only be stored
    /// opaquely, same-origin entries are verified.
    pub fn fetch_mode(&self) -> FetchMode {
        if self.cross_origin {
            FetchMode::NoCors
        } else {
            FetchMode::Cors
        }
    }
}
