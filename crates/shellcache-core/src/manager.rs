//! The offline cache manager.
//!
//! One manager owns one versioned bucket generation: `on_install` populates
//! the current bucket from the shell manifest, `on_activate` deletes every
//! other generation, and `on_fetch` answers intercepted GET requests through
//! the configured strategy. The host runtime that triggers these lifecycle
//! methods (and that claims clients after activation) lives outside the
//! core; it observes the manager through the [`CacheEvent`] channel handed
//! out at construction.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::fetch::{FetchError, FetchMode, FetchRequest, Fetcher, FetchedResponse};
use crate::store::{CacheStorage, StoredResponse};
use crate::strategy::FetchStrategy;

// ============================================================================
// Constants
// ============================================================================

/// Maximum concurrent install fetches.
/// Bounds parallelism while still filling the shell bucket quickly on a
/// typical manifest of a dozen entries.
const MAX_CONCURRENT_INSTALL_FETCHES: usize = 8;

// ============================================================================
// Events
// ============================================================================

/// Lifecycle and diagnostic events, the machine-readable counterpart of a
/// service worker's console logging. Background revalidation completion is
/// only observable here.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// Install committed the whole manifest batch into the current bucket.
    Installed { bucket: String, entries: usize },
    /// Install failed; nothing was written.
    InstallFailed { bucket: String, error: String },
    /// Activation finished; the host should claim its clients now.
    Activated {
        bucket: String,
        deleted: Vec<String>,
    },
    /// A background revalidation overwrote the entry for this URL.
    Revalidated { url: String },
    /// A background revalidation produced nothing cacheable.
    RevalidationFailed { url: String, error: String },
    /// A live fetch failed and the cached entry was served instead.
    NetworkFallback { url: String },
}

// ============================================================================
// Responses
// ============================================================================

/// What an intercepted request resolves to.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: String,
    /// HTTP status; 0 for opaque responses.
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub opaque: bool,
    /// Whether this response was served from the bucket.
    pub from_cache: bool,
}

impl FetchResponse {
    fn from_store(entry: StoredResponse) -> Self {
        Self {
            url: entry.url,
            status: entry.status,
            headers: entry.headers,
            body: entry.body,
            opaque: entry.opaque,
            from_cache: true,
        }
    }

    fn from_network(response: FetchedResponse) -> Self {
        Self {
            url: response.url,
            status: response.status,
            headers: response.headers,
            body: response.body,
            opaque: response.opaque,
            from_cache: false,
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Offline cache manager for one configured version generation.
pub struct OfflineCacheManager {
    config: CacheConfig,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    events: mpsc::UnboundedSender<CacheEvent>,
}

impl OfflineCacheManager {
    /// Create a manager over fresh in-memory storage.
    pub fn new(
        config: CacheConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<CacheEvent>) {
        Self::with_storage(config, Arc::new(CacheStorage::new()), fetcher)
    }

    /// Create a manager over existing storage (e.g. loaded from disk).
    pub fn with_storage(
        config: CacheConfig,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<CacheEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                storage,
                fetcher,
                events,
            },
            event_rx,
        )
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    /// Name of the bucket this manager considers current.
    pub fn bucket_name(&self) -> String {
        self.config.bucket_name()
    }

    fn emit(&self, event: CacheEvent) {
        let _ = self.events.send(event);
    }

    /// Request mode for a live fetch of this URL: same-origin requests are
    /// verified, cross-origin requests can only be stored opaquely.
    fn mode_for(&self, request: &FetchRequest) -> FetchMode {
        if request.url.origin() == self.config.base_url.origin() {
            FetchMode::Cors
        } else {
            FetchMode::NoCors
        }
    }

    // ========================================================================
    // Lifecycle: install
    // ========================================================================

    /// Fetch the whole shell manifest into the current bucket.
    ///
    /// The batch is staged and committed only when every fetch succeeded:
    /// on any failure nothing is written and the error is returned, leaving
    /// the previous generation in place (the host platform owns install
    /// retries). Returns the number of entries committed.
    pub async fn on_install(&self) -> Result<usize> {
        let bucket = self.bucket_name();
        let entries = self.config.shell_manifest.resolve(&self.config.base_url)?;

        info!(bucket = %bucket, count = entries.len(), "Installing app shell");
        self.storage.open(&bucket).await;

        let fetched: Vec<Result<StoredResponse, FetchError>> = stream::iter(entries)
            .map(|entry| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    let request = FetchRequest::get(entry.url.clone());
                    let response = fetcher.fetch(&request, entry.fetch_mode()).await?;
                    if !response.is_cacheable() {
                        return Err(FetchError::Status {
                            status: response.status,
                            url: entry.url.to_string(),
                        });
                    }
                    Ok(StoredResponse::from(&response))
                }
            })
            .buffer_unordered(MAX_CONCURRENT_INSTALL_FETCHES)
            .collect()
            .await;

        let mut staged = Vec::with_capacity(fetched.len());
        for result in fetched {
            match result {
                Ok(snapshot) => staged.push(snapshot),
                Err(e) => {
                    error!(bucket = %bucket, error = %e, "App shell install failed");
                    self.emit(CacheEvent::InstallFailed {
                        bucket,
                        error: e.to_string(),
                    });
                    return Err(e.into());
                }
            }
        }

        let count = staged.len();
        self.storage.put_all(&bucket, staged).await;
        info!(bucket = %bucket, entries = count, "App shell installed");
        self.emit(CacheEvent::Installed {
            bucket,
            entries: count,
        });
        Ok(count)
    }

    // ========================================================================
    // Lifecycle: activate
    // ========================================================================

    /// Delete every bucket that does not match the current version.
    ///
    /// Returns the deleted bucket names. After this completes the current
    /// bucket is the only generation left; the `Activated` event tells the
    /// host to claim its clients so open pages route through this manager
    /// without a reload.
    pub async fn on_activate(&self) -> Vec<String> {
        let current = self.bucket_name();
        self.storage.open(&current).await;

        let mut deleted = Vec::new();
        for name in self.storage.bucket_names().await {
            if name == current {
                continue;
            }
            if self.storage.delete_bucket(&name).await {
                info!(bucket = %name, "Deleted stale cache bucket");
                deleted.push(name);
            }
        }

        self.emit(CacheEvent::Activated {
            bucket: current,
            deleted: deleted.clone(),
        });
        deleted
    }

    // ========================================================================
    // Fetch interception
    // ========================================================================

    /// Answer an intercepted request.
    ///
    /// Non-GET requests are never intercepted and resolve to `Ok(None)`:
    /// the host performs its own network fetch and this manager touches
    /// neither the bucket nor the network. GET requests resolve through the
    /// configured strategy; an `Err` means the request failed and no cached
    /// entry could stand in, which the host surfaces as its offline error.
    pub async fn on_fetch(&self, request: &FetchRequest) -> Result<Option<FetchResponse>> {
        if !request.is_get() {
            debug!(method = %request.method, url = %request.url, "Passing through non-GET request");
            return Ok(None);
        }

        let strategy = self.config.strategy_for(request.url.path());
        let response = match strategy {
            FetchStrategy::CacheFirst => self.cache_first(request).await?,
            FetchStrategy::NetworkFirst => self.network_first(request).await?,
            FetchStrategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await?,
        };
        Ok(Some(response))
    }

    /// Bucket hit wins outright; a miss is fetched live and returned
    /// without being stored.
    async fn cache_first(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let bucket = self.bucket_name();
        if let Some(entry) = self.storage.get(&bucket, request.url.as_str()).await {
            debug!(url = %request.url, "Cache hit");
            return Ok(FetchResponse::from_store(entry));
        }

        debug!(url = %request.url, "Cache miss, fetching live");
        let response = self.fetcher.fetch(request, self.mode_for(request)).await?;
        Ok(FetchResponse::from_network(response))
    }

    /// Live fetch first; cacheable results are written back before being
    /// returned. A transport failure falls back to the bucket, and a miss
    /// there propagates the failure to the host.
    async fn network_first(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let bucket = self.bucket_name();
        match self.fetcher.fetch(request, self.mode_for(request)).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.storage.put(&bucket, StoredResponse::from(&response)).await;
                }
                Ok(FetchResponse::from_network(response))
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Live fetch failed, falling back to cache");
                match self.storage.get(&bucket, request.url.as_str()).await {
                    Some(entry) => {
                        self.emit(CacheEvent::NetworkFallback {
                            url: request.url.to_string(),
                        });
                        Ok(FetchResponse::from_store(entry))
                    }
                    None => Err(e.into()),
                }
            }
        }
    }

    /// Bucket hit is returned immediately while a background task refreshes
    /// the entry; a miss awaits the live fetch and stores a cacheable
    /// result.
    async fn stale_while_revalidate(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let bucket = self.bucket_name();
        match self.storage.get(&bucket, request.url.as_str()).await {
            Some(entry) => {
                debug!(url = %request.url, "Serving stale entry, revalidating in background");
                self.spawn_revalidation(request.clone());
                Ok(FetchResponse::from_store(entry))
            }
            None => {
                let response = self.fetcher.fetch(request, self.mode_for(request)).await?;
                if response.is_cacheable() {
                    self.storage.put(&bucket, StoredResponse::from(&response)).await;
                }
                Ok(FetchResponse::from_network(response))
            }
        }
    }

    /// Fire-and-forget refresh of one entry. The caller is never blocked on
    /// the write; completion is reported on the event channel.
    fn spawn_revalidation(&self, request: FetchRequest) {
        let fetcher = Arc::clone(&self.fetcher);
        let storage = Arc::clone(&self.storage);
        let bucket = self.bucket_name();
        let mode = self.mode_for(&request);
        let events = self.events.clone();

        tokio::spawn(async move {
            match fetcher.fetch(&request, mode).await {
                Ok(response) if response.is_cacheable() => {
                    storage.put(&bucket, StoredResponse::from(&response)).await;
                    debug!(url = %request.url, "Revalidated cache entry");
                    let _ = events.send(CacheEvent::Revalidated {
                        url: request.url.to_string(),
                    });
                }
                Ok(response) => {
                    debug!(url = %request.url, status = response.status, "Revalidation response not cacheable");
                    let _ = events.send(CacheEvent::RevalidationFailed {
                        url: request.url.to_string(),
                        error: format!("status {}", response.status),
                    });
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Background revalidation failed");
                    let _ = events.send(CacheEvent::RevalidationFailed {
                        url: request.url.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use url::Url;

    use crate::manifest::ShellManifest;

    /// Scriptable fetcher: per-URL bodies and statuses, per-URL or global
    /// transport failures, and a record of every fetch issued.
    #[derive(Default)]
    struct StubFetcher {
        bodies: Mutex<HashMap<String, Vec<u8>>>,
        statuses: Mutex<HashMap<String, u16>>,
        unreachable: Mutex<HashSet<String>>,
        offline: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn set_body(&self, url: &str, body: &[u8]) {
            self.bodies.lock().unwrap().insert(url.to_string(), body.to_vec());
        }

        fn set_status(&self, url: &str, status: u16) {
            self.statuses.lock().unwrap().insert(url.to_string(), status);
        }

        fn set_unreachable(&self, url: &str) {
            self.unreachable.lock().unwrap().insert(url.to_string());
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn calls_for(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| u.as_str() == url).count()
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(
            &self,
            request: &FetchRequest,
            mode: FetchMode,
        ) -> Result<FetchedResponse, FetchError> {
            let url = request.url.to_string();
            self.calls.lock().unwrap().push(url.clone());

            if self.offline.load(Ordering::SeqCst)
                || self.unreachable.lock().unwrap().contains(&url)
            {
                return Err(FetchError::Network(format!("connection refused: {}", url)));
            }

            let body = self
                .bodies
                .lock()
                .unwrap()
                .get(&url)
                .cloned()
                .unwrap_or_else(|| b"ok".to_vec());

            match mode {
                FetchMode::NoCors => Ok(FetchedResponse {
                    url,
                    status: 0,
                    headers: HashMap::new(),
                    body,
                    opaque: true,
                }),
                FetchMode::Cors => {
                    let status = self.statuses.lock().unwrap().get(&url).copied().unwrap_or(200);
                    Ok(FetchedResponse {
                        url,
                        status,
                        headers: HashMap::new(),
                        body,
                        opaque: false,
                    })
                }
            }
        }
    }

    const BASE: &str = "https://app.example.com";

    fn config(version: &str) -> CacheConfig {
        let mut cfg = CacheConfig::new(version, Url::parse(BASE).unwrap());
        cfg.bucket_prefix = "cache".to_string();
        cfg
    }

    fn get(url: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_install_populates_every_manifest_url() {
        let fetcher = StubFetcher::new();
        let mut cfg = config("v1");
        cfg.shell_manifest =
            ShellManifest::from(vec!["/", "/login", "https://cdn.tailwindcss.com"]);
        let (manager, mut events) = OfflineCacheManager::new(cfg, fetcher);

        let installed = manager.on_install().await.unwrap();
        assert_eq!(installed, 3);

        let storage = manager.storage();
        for url in [
            "https://app.example.com/",
            "https://app.example.com/login",
            "https://cdn.tailwindcss.com/",
        ] {
            assert!(
                storage.get("cache-v1", url).await.is_some(),
                "missing entry for {}",
                url
            );
        }

        match events.try_recv().unwrap() {
            CacheEvent::Installed { bucket, entries } => {
                assert_eq!(bucket, "cache-v1");
                assert_eq!(entries, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_install_stores_cross_origin_entries_opaquely() {
        let fetcher = StubFetcher::new();
        fetcher.set_status("https://cdn.tailwindcss.com/", 500);

        let mut cfg = config("v1");
        cfg.shell_manifest = ShellManifest::from(vec!["https://cdn.tailwindcss.com"]);
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher);

        // The 500 is invisible in no-CORS mode: the fetch resolved, so the
        // opaque snapshot is stored regardless.
        manager.on_install().await.unwrap();

        let entry = manager
            .storage()
            .get("cache-v1", "https://cdn.tailwindcss.com/")
            .await
            .unwrap();
        assert!(entry.opaque);
        assert_eq!(entry.status, 0);
    }

    #[tokio::test]
    async fn test_install_failure_writes_nothing() {
        let fetcher = StubFetcher::new();
        fetcher.set_unreachable("https://app.example.com/login");

        let mut cfg = config("v1");
        cfg.shell_manifest = ShellManifest::from(vec!["/", "/login"]);
        let (manager, mut events) = OfflineCacheManager::new(cfg, fetcher);

        assert!(manager.on_install().await.is_err());
        assert_eq!(manager.storage().len("cache-v1").await, 0);

        match events.try_recv().unwrap() {
            CacheEvent::InstallFailed { bucket, .. } => assert_eq!(bucket, "cache-v1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_install_fails_on_verified_error_status() {
        let fetcher = StubFetcher::new();
        fetcher.set_status("https://app.example.com/login", 404);

        let mut cfg = config("v1");
        cfg.shell_manifest = ShellManifest::from(vec!["/", "/login"]);
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher);

        assert!(manager.on_install().await.is_err());
        assert_eq!(manager.storage().len("cache-v1").await, 0);
    }

    #[tokio::test]
    async fn test_reinstall_same_version_is_idempotent() {
        let fetcher = StubFetcher::new();
        let mut cfg = config("v1");
        cfg.shell_manifest = ShellManifest::from(vec!["/", "/login"]);
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher);

        manager.on_install().await.unwrap();
        manager.on_install().await.unwrap();

        assert_eq!(manager.storage().bucket_names().await, vec!["cache-v1"]);
        assert_eq!(manager.storage().len("cache-v1").await, 2);
    }

    #[tokio::test]
    async fn test_activation_deletes_old_generations() {
        let fetcher = StubFetcher::new();
        let storage = Arc::new(CacheStorage::new());

        let mut v1 = config("v1");
        v1.shell_manifest = ShellManifest::from(vec!["/"]);
        let (old, _old_events) =
            OfflineCacheManager::with_storage(v1, Arc::clone(&storage), fetcher.clone());
        old.on_install().await.unwrap();

        let mut v2 = config("v2");
        v2.shell_manifest = ShellManifest::from(vec!["/"]);
        let (new, mut events) =
            OfflineCacheManager::with_storage(v2, Arc::clone(&storage), fetcher);
        new.on_install().await.unwrap();

        let deleted = new.on_activate().await;
        assert_eq!(deleted, vec!["cache-v1"]);
        assert!(!storage.has("cache-v1").await);
        assert!(storage.has("cache-v2").await);

        // Skip the install event, then check activation reported the GC
        assert!(matches!(events.try_recv().unwrap(), CacheEvent::Installed { .. }));
        match events.try_recv().unwrap() {
            CacheEvent::Activated { bucket, deleted } => {
                assert_eq!(bucket, "cache-v2");
                assert_eq!(deleted, vec!["cache-v1"]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_version_bump_scenario() {
        // manifest = ["/", "/login"], v1 installed; bump to v2 with the same
        // manifest; after install+activate only cache-v2 remains, with both
        // paths present.
        let fetcher = StubFetcher::new();
        let storage = Arc::new(CacheStorage::new());

        let mut v1 = config("v1");
        v1.shell_manifest = ShellManifest::from(vec!["/", "/login"]);
        let (old, _old_events) =
            OfflineCacheManager::with_storage(v1, Arc::clone(&storage), fetcher.clone());
        old.on_install().await.unwrap();
        assert_eq!(storage.len("cache-v1").await, 2);

        let mut v2 = config("v2");
        v2.shell_manifest = ShellManifest::from(vec!["/", "/login"]);
        let (new, _events) =
            OfflineCacheManager::with_storage(v2, Arc::clone(&storage), fetcher);
        new.on_install().await.unwrap();
        new.on_activate().await;

        assert_eq!(storage.bucket_names().await, vec!["cache-v2"]);
        for url in ["https://app.example.com/", "https://app.example.com/login"] {
            assert!(storage.get("cache-v2", url).await.is_some());
        }
    }

    #[tokio::test]
    async fn test_cache_first_hit_never_touches_network() {
        let fetcher = StubFetcher::new();
        let mut cfg = config("v1");
        cfg.shell_manifest = ShellManifest::from(vec!["/"]);
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher.clone());
        manager.on_install().await.unwrap();

        let calls_after_install = fetcher.total_calls();
        let response = manager
            .on_fetch(&get("https://app.example.com/"))
            .await
            .unwrap()
            .unwrap();

        assert!(response.from_cache);
        assert_eq!(response.body, b"ok");
        assert_eq!(fetcher.total_calls(), calls_after_install);
        // The only fetch ever issued for this URL was the install one
        assert_eq!(fetcher.calls_for("https://app.example.com/"), 1);
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_without_storing() {
        let fetcher = StubFetcher::new();
        fetcher.set_body("https://app.example.com/uncached", b"live");
        let (manager, _events) = OfflineCacheManager::new(config("v1"), fetcher.clone());

        let response = manager
            .on_fetch(&get("https://app.example.com/uncached"))
            .await
            .unwrap()
            .unwrap();

        assert!(!response.from_cache);
        assert_eq!(response.body, b"live");
        assert!(manager
            .storage()
            .get("cache-v1", "https://app.example.com/uncached")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_network_first_updates_entry_when_online() {
        let fetcher = StubFetcher::new();
        fetcher.set_body("https://app.example.com/data", b"old");

        let mut cfg = config("v1");
        cfg.shell_manifest = ShellManifest::from(vec!["/data"]);
        cfg.default_strategy = FetchStrategy::NetworkFirst;
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher.clone());
        manager.on_install().await.unwrap();

        fetcher.set_body("https://app.example.com/data", b"new");
        let response = manager
            .on_fetch(&get("https://app.example.com/data"))
            .await
            .unwrap()
            .unwrap();

        assert!(!response.from_cache);
        assert_eq!(response.body, b"new");

        let entry = manager
            .storage()
            .get("cache-v1", "https://app.example.com/data")
            .await
            .unwrap();
        assert_eq!(entry.body, b"new");
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache_offline() {
        let fetcher = StubFetcher::new();
        fetcher.set_body("https://app.example.com/data", b"cached");

        let mut cfg = config("v1");
        cfg.shell_manifest = ShellManifest::from(vec!["/data"]);
        cfg.default_strategy = FetchStrategy::NetworkFirst;
        let (manager, mut events) = OfflineCacheManager::new(cfg, fetcher.clone());
        manager.on_install().await.unwrap();
        let _ = events.try_recv();

        fetcher.go_offline();
        let response = manager
            .on_fetch(&get("https://app.example.com/data"))
            .await
            .unwrap()
            .unwrap();

        assert!(response.from_cache);
        assert_eq!(response.body, b"cached");
        assert!(matches!(
            events.try_recv().unwrap(),
            CacheEvent::NetworkFallback { .. }
        ));
    }

    #[tokio::test]
    async fn test_network_first_error_status_is_returned_unstored() {
        let fetcher = StubFetcher::new();
        fetcher.set_status("https://app.example.com/data", 500);

        let mut cfg = config("v1");
        cfg.default_strategy = FetchStrategy::NetworkFirst;
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher);

        let response = manager
            .on_fetch(&get("https://app.example.com/data"))
            .await
            .unwrap()
            .unwrap();

        // The error response reaches the caller but is never cached
        assert_eq!(response.status, 500);
        assert!(manager
            .storage()
            .get("cache-v1", "https://app.example.com/data")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_network_first_offline_without_entry_propagates() {
        let fetcher = StubFetcher::new();
        fetcher.go_offline();

        let mut cfg = config("v1");
        cfg.default_strategy = FetchStrategy::NetworkFirst;
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher);

        let result = manager.on_fetch(&get("https://app.example.com/missing")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_serves_stale_then_updates() {
        let fetcher = StubFetcher::new();
        let mut cfg = config("v3");
        cfg.revalidate_prefix = Some("/api/".to_string());
        let (manager, mut events) = OfflineCacheManager::new(cfg, fetcher.clone());

        let url = "https://app.example.com/api/orcamentos";
        let stale = StoredResponse {
            url: url.to_string(),
            status: 200,
            headers: HashMap::new(),
            body: b"stale".to_vec(),
            opaque: false,
            cached_at: chrono::Utc::now(),
        };
        manager.storage().put("cache-v3", stale).await;
        fetcher.set_body(url, b"fresh");

        let first = manager.on_fetch(&get(url)).await.unwrap().unwrap();
        assert!(first.from_cache);
        assert_eq!(first.body, b"stale");

        // The refresh is fire-and-forget; its completion is only observable
        // on the event channel.
        match events.recv().await.unwrap() {
            CacheEvent::Revalidated { url: revalidated } => assert_eq!(revalidated, url),
            other => panic!("unexpected event: {:?}", other),
        }

        let second = manager.on_fetch(&get(url)).await.unwrap().unwrap();
        assert!(second.from_cache);
        assert_eq!(second.body, b"fresh");
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_miss_waits_and_stores() {
        let fetcher = StubFetcher::new();
        fetcher.set_body("https://app.example.com/api/orcamentos", b"fresh");

        let mut cfg = config("v3");
        cfg.revalidate_prefix = Some("/api/".to_string());
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher);

        let response = manager
            .on_fetch(&get("https://app.example.com/api/orcamentos"))
            .await
            .unwrap()
            .unwrap();

        assert!(!response.from_cache);
        assert_eq!(response.body, b"fresh");
        assert!(manager
            .storage()
            .get("cache-v3", "https://app.example.com/api/orcamentos")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_revalidation_keeps_stale_entry() {
        let fetcher = StubFetcher::new();
        let url = "https://app.example.com/api/orcamentos";
        fetcher.set_unreachable(url);

        let mut cfg = config("v3");
        cfg.revalidate_prefix = Some("/api/".to_string());
        let (manager, mut events) = OfflineCacheManager::new(cfg, fetcher);

        let stale = StoredResponse {
            url: url.to_string(),
            status: 200,
            headers: HashMap::new(),
            body: b"stale".to_vec(),
            opaque: false,
            cached_at: chrono::Utc::now(),
        };
        manager.storage().put("cache-v3", stale).await;

        let response = manager.on_fetch(&get(url)).await.unwrap().unwrap();
        assert_eq!(response.body, b"stale");

        assert!(matches!(
            events.recv().await.unwrap(),
            CacheEvent::RevalidationFailed { .. }
        ));
        let entry = manager.storage().get("cache-v3", url).await.unwrap();
        assert_eq!(entry.body, b"stale");
    }

    #[tokio::test]
    async fn test_non_get_requests_are_never_intercepted() {
        let fetcher = StubFetcher::new();
        let mut cfg = config("v3");
        cfg.revalidate_prefix = Some("/api/".to_string());
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher.clone());

        let request = FetchRequest::new(
            "POST",
            Url::parse("https://app.example.com/api/orcamentos").unwrap(),
        );
        let response = manager.on_fetch(&request).await.unwrap();

        assert!(response.is_none());
        assert_eq!(fetcher.total_calls(), 0);
        assert!(manager.storage().bucket_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_network_first_stores_opaque_cross_origin_results() {
        let fetcher = StubFetcher::new();
        let mut cfg = config("v1");
        cfg.default_strategy = FetchStrategy::NetworkFirst;
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher.clone());

        let response = manager
            .on_fetch(&get("https://cdn.tailwindcss.com/"))
            .await
            .unwrap()
            .unwrap();

        assert!(response.opaque);
        let entry = manager
            .storage()
            .get("cache-v1", "https://cdn.tailwindcss.com/")
            .await
            .unwrap();
        assert!(entry.opaque);
        assert_eq!(entry.status, 0);
    }

    #[tokio::test]
    async fn test_revalidation_only_applies_inside_prefix() {
        let fetcher = StubFetcher::new();
        let mut cfg = config("v3");
        cfg.revalidate_prefix = Some("/api/".to_string());
        cfg.shell_manifest = ShellManifest::from(vec!["/login"]);
        let (manager, _events) = OfflineCacheManager::new(cfg, fetcher.clone());
        manager.on_install().await.unwrap();

        let calls_after_install = fetcher.total_calls();
        let response = manager
            .on_fetch(&get("https://app.example.com/login"))
            .await
            .unwrap()
            .unwrap();

        // Outside the prefix the default cache-first applies: a hit spawns
        // no background refresh.
        assert!(response.from_cache);
        assert_eq!(fetcher.total_calls(), calls_after_install);
    }
}
