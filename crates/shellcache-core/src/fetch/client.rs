//! HTTP fetcher backed by reqwest.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{FetchError, FetchMode, FetchRequest, FetchedResponse, Fetcher};

/// HTTP request timeout in seconds.
/// 30s allows for slow shell resources while failing fast enough that a dead
/// network degrades to the cache fallback promptly.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Live HTTP fetcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        mode: FetchMode,
    ) -> Result<FetchedResponse, FetchError> {
        debug!(url = %request.url, ?mode, "Live fetch");

        // Only GETs are ever routed here; see the trait contract.
        let response = self.client.get(request.url.as_str()).send().await?;
        let url = request.url.to_string();

        match mode {
            FetchMode::Cors => {
                let status = response.status().as_u16();
                let headers: HashMap<String, String> = response
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .to_str()
                            .ok()
                            .map(|v| (name.as_str().to_string(), v.to_string()))
                    })
                    .collect();
                let body = response.bytes().await?.to_vec();

                Ok(FetchedResponse {
                    url,
                    status,
                    headers,
                    body,
                    opaque: false,
                })
            }
            FetchMode::NoCors => {
                // The transport answered, so the fetch resolves; status and
                // headers are withheld from the caller. The body is kept so
                // the snapshot can be replayed.
                let body = response.bytes().await?.to_vec();

                Ok(FetchedResponse {
                    url,
                    status: 0,
                    headers: HashMap::new(),
                    body,
                    opaque: true,
                })
            }
        }
    }
}
