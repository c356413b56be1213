//! Disk persistence for bucket storage.
//!
//! Each bucket is stored as one pretty-printed JSON file named after the
//! bucket under the cache directory. Persistence is best-effort: the host
//! adapter persists after lifecycle operations and loads at startup; the
//! in-memory storage never blocks on the disk.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{CacheStorage, StoredResponse};

fn bucket_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{}.json", name))
}

impl CacheStorage {
    /// Load every bucket file found under `dir`. Files that fail to parse
    /// are skipped with a warning - a corrupt snapshot must not prevent the
    /// manager from starting.
    pub async fn load_from_dir(dir: &Path) -> Result<Self> {
        let storage = Self::new();
        if !dir.exists() {
            return Ok(storage);
        }

        let mut buckets = storage.buckets.write().await;
        for dir_entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read cache directory {}", dir.display()))?
        {
            let path = dir_entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let contents = match std::fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    warn!(bucket = name, error = %e, "Failed to read bucket file");
                    continue;
                }
            };
            match serde_json::from_str::<HashMap<String, StoredResponse>>(&contents) {
                Ok(entries) => {
                    debug!(bucket = name, entries = entries.len(), "Loaded bucket from disk");
                    buckets.insert(name.to_string(), entries);
                }
                Err(e) => {
                    warn!(bucket = name, error = %e, "Failed to parse bucket file, skipping");
                }
            }
        }
        drop(buckets);

        Ok(storage)
    }

    /// Write every bucket to its file and remove files for buckets that no
    /// longer exist, so the directory mirrors the in-memory state.
    pub async fn persist_to_dir(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;

        let buckets = self.buckets.read().await;

        for (name, entries) in buckets.iter() {
            let contents = serde_json::to_string_pretty(entries)
                .with_context(|| format!("Failed to serialize bucket {}", name))?;
            std::fs::write(bucket_path(dir, name), contents)
                .with_context(|| format!("Failed to write bucket file for {}", name))?;
        }

        for dir_entry in std::fs::read_dir(dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let stale = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|name| !buckets.contains_key(name));
            if stale {
                debug!(path = %path.display(), "Removing stale bucket file");
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove stale bucket file");
                }
            }
        }

        Ok(())
    }
}
