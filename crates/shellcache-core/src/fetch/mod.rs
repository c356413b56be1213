//! Network fetch layer.
//!
//! This module defines the [`Fetcher`] seam the cache manager issues live
//! requests through, together with the request/response snapshot types. The
//! production implementation is [`HttpFetcher`]; tests substitute their own
//! scriptable fetchers.

pub mod client;
pub mod error;

pub use client::HttpFetcher;
pub use error::FetchError;

use std::collections::HashMap;

use async_trait::async_trait;
use url::Url;

/// Request mode for an outgoing fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Ordinary same-origin request; status and headers are observable and a
    /// non-success status is a verifiable failure.
    Cors,
    /// Cross-origin request without CORS verification. The result is opaque:
    /// status and headers cannot be inspected, and the only observable
    /// failure signal is the transport rejecting outright. Opaque results
    /// are therefore treated as cacheable successes unconditionally.
    NoCors,
}

/// An intercepted (or install-time) request, identified by method and URL.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: Url,
}

impl FetchRequest {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into(),
            url,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// Snapshot of a live network response.
///
/// For opaque results `status` is 0 and `headers` is empty; the body is kept
/// so the snapshot can be replayed, but nothing about it is verified.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub opaque: bool,
}

impl FetchedResponse {
    /// Whether this result may be written to the cache: a verified success,
    /// or an opaque result, whose status is unobservable.
    pub fn is_cacheable(&self) -> bool {
        self.opaque || (200..300).contains(&self.status)
    }
}

/// The live-network seam.
///
/// Only GET requests ever reach a fetcher: non-GET requests are passed
/// through unintercepted by the manager, and install fetches are GETs by
/// construction. An `Err` means the transport rejected the request outright
/// (the fetch-promise-rejected signal); an HTTP error status is an `Ok`
/// response with that status.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &FetchRequest,
        mode: FetchMode,
    ) -> Result<FetchedResponse, FetchError>;
}
