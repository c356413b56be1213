//! Versioned bucket storage for response snapshots.
//!
//! A bucket maps request URLs to [`StoredResponse`] snapshots. Exactly one
//! bucket is current at any time (its name embeds the configured version
//! tag); activation deletes the rest. Individual bucket operations are
//! atomic, but read-then-write sequences across them are not: concurrent
//! interception tasks race, and the last writer wins.

pub mod disk;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::fetch::FetchedResponse;

/// Immutable snapshot of a response as it existed at write time.
/// Overwritten wholesale on re-fetch, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    pub url: String,
    /// HTTP status; 0 for opaque snapshots, whose status is unobservable.
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub opaque: bool,
    pub cached_at: DateTime<Utc>,
}

impl StoredResponse {
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Covers clock skew as well
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

impl From<&FetchedResponse> for StoredResponse {
    fn from(response: &FetchedResponse) -> Self {
        Self {
            url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            opaque: response.opaque,
            cached_at: Utc::now(),
        }
    }
}

type Bucket = HashMap<String, StoredResponse>;

/// Named buckets of stored responses, shared by all interception tasks.
#[derive(Debug, Default)]
pub struct CacheStorage {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a bucket exists, creating it empty if needed.
    pub async fn open(&self, name: &str) {
        self.buckets
            .write()
            .await
            .entry(name.to_string())
            .or_default();
    }

    pub async fn has(&self, name: &str) -> bool {
        self.buckets.read().await.contains_key(name)
    }

    pub async fn bucket_names(&self) -> Vec<String> {
        self.buckets.read().await.keys().cloned().collect()
    }

    /// Delete a bucket wholesale. Returns whether it existed.
    pub async fn delete_bucket(&self, name: &str) -> bool {
        self.buckets.write().await.remove(name).is_some()
    }

    /// Store one snapshot, creating the bucket if needed. Overwrites any
    /// previous entry for the same URL.
    pub async fn put(&self, bucket: &str, entry: StoredResponse) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(entry.url.clone(), entry);
    }

    /// Commit a batch of snapshots under a single write lock, so readers
    /// observe either none or all of them.
    pub async fn put_all(&self, bucket: &str, entries: Vec<StoredResponse>) {
        let mut buckets = self.buckets.write().await;
        let bucket = buckets.entry(bucket.to_string()).or_default();
        for entry in entries {
            bucket.insert(entry.url.clone(), entry);
        }
    }

    pub async fn get(&self, bucket: &str, url: &str) -> Option<StoredResponse> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|bucket| bucket.get(url))
            .cloned()
    }

    /// URLs stored in a bucket.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|bucket| bucket.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn len(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}
