//! shellcache - offline app-shell cache CLI.
//!
//! This binary is the host adapter around the core cache manager: it loads
//! the injected configuration, wires the live HTTP fetcher and the
//! disk-backed bucket store together, and drives the manager's lifecycle
//! (install, activate, fetch) from the command line.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use shellcache_core::{
    CacheConfig, CacheEvent, CacheStorage, FetchRequest, FetchStrategy, HttpFetcher,
    OfflineCacheManager,
};

// ============================================================================
// Constants
// ============================================================================

/// How long `get` waits for a background revalidation before persisting.
/// 2s comfortably covers an API round trip without hanging the CLI when the
/// refresh target is unreachable.
const REVALIDATION_SETTLE_MS: u64 = 2000;

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Offline app-shell cache: install, activate, and fetch through cache strategies")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/shellcache/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the shell manifest into the current cache bucket
    Install,
    /// Delete stale cache buckets and claim the current generation
    Activate,
    /// Fetch a URL (or app-relative path) through the configured strategy
    Get { url: String },
    /// Show buckets, entries, and entry ages
    Status,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => CacheConfig::default_path()?,
    };
    let config = CacheConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!(version = %config.version, bucket = %config.bucket_name(), "shellcache starting");

    let cache_dir = config.cache_dir()?;
    let storage = Arc::new(
        CacheStorage::load_from_dir(&cache_dir)
            .await
            .context("Failed to load cache buckets from disk")?,
    );

    let fetcher = Arc::new(HttpFetcher::new()?);
    let (manager, events) = OfflineCacheManager::with_storage(config, Arc::clone(&storage), fetcher);

    let mut wait_for_revalidation = false;
    match cli.command {
        Command::Install => {
            let installed = manager.on_install().await?;
            println!(
                "Installed {} shell entries into {}",
                installed,
                manager.bucket_name()
            );
        }
        Command::Activate => {
            let deleted = manager.on_activate().await;
            if deleted.is_empty() {
                println!("{} is current; no stale buckets", manager.bucket_name());
            } else {
                println!(
                    "{} is current; deleted {}",
                    manager.bucket_name(),
                    deleted.join(", ")
                );
            }
        }
        Command::Get { url } => {
            let url = resolve_url(&url, manager.config().base_url.clone())?;
            let strategy = manager.config().strategy_for(url.path());
            let response = manager
                .on_fetch(&FetchRequest::get(url.clone()))
                .await?
                .context("GET requests are always intercepted")?;

            let source = if response.from_cache { "cache" } else { "network" };
            let status = if response.opaque {
                "opaque".to_string()
            } else {
                response.status.to_string()
            };
            eprintln!("{} {} ({}, {})", status, url, source, strategy);
            io::stdout().write_all(&response.body)?;

            // A cache hit under stale-while-revalidate has a refresh in
            // flight; give it a moment so the persisted store carries it.
            wait_for_revalidation =
                response.from_cache && strategy == FetchStrategy::StaleWhileRevalidate;
        }
        Command::Status => {
            print_status(&manager).await;
        }
    }

    settle_events(events, wait_for_revalidation).await;

    storage
        .persist_to_dir(&cache_dir)
        .await
        .context("Failed to persist cache buckets to disk")?;

    Ok(())
}

/// Resolve a CLI argument into an absolute URL: app-relative paths join the
/// configured base origin, anything else must parse as absolute.
fn resolve_url(raw: &str, base: Url) -> Result<Url> {
    if raw.starts_with('/') {
        base.join(raw)
            .with_context(|| format!("Cannot resolve {} against {}", raw, base))
    } else {
        Url::parse(raw).with_context(|| format!("Invalid URL: {}", raw))
    }
}

async fn print_status(manager: &OfflineCacheManager) {
    let storage = manager.storage();
    let current = manager.bucket_name();

    let mut names = storage.bucket_names().await;
    names.sort();
    if names.is_empty() {
        println!("No cache buckets (run `shellcache install`)");
        return;
    }

    for name in names {
        let marker = if name == current { " (current)" } else { " (stale)" };
        println!("{}{} - {} entries", name, marker, storage.len(&name).await);

        let mut keys = storage.keys(&name).await;
        keys.sort();
        for key in keys {
            if let Some(entry) = storage.get(&name, &key).await {
                let status = if entry.opaque {
                    "opaque".to_string()
                } else {
                    entry.status.to_string()
                };
                println!("  {}  {}  {}", key, status, entry.age_display());
            }
        }
    }
}

/// Drain pending manager events, optionally waiting for one in-flight
/// background revalidation first.
async fn settle_events(mut events: mpsc::UnboundedReceiver<CacheEvent>, wait: bool) {
    if wait {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(REVALIDATION_SETTLE_MS), events.recv()).await
        {
            log_event(&event);
        }
    }
    while let Ok(event) = events.try_recv() {
        log_event(&event);
    }
}

fn log_event(event: &CacheEvent) {
    match event {
        CacheEvent::Installed { bucket, entries } => {
            debug!(bucket = %bucket, entries = entries, "Install event")
        }
        CacheEvent::InstallFailed { bucket, error } => {
            warn!(bucket = %bucket, error = %error, "Install failed")
        }
        CacheEvent::Activated { bucket, deleted } => {
            debug!(bucket = %bucket, deleted = deleted.len(), "Activation event")
        }
        CacheEvent::Revalidated { url } => info!(url = %url, "Revalidated cache entry"),
        CacheEvent::RevalidationFailed { url, error } => {
            warn!(url = %url, error = %error, "Revalidation failed")
        }
        CacheEvent::NetworkFallback { url } => info!(url = %url, "Served cached fallback"),
    }
}
