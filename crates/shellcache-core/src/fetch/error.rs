use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The request never produced a response (DNS failure, refused
    /// connection, timeout). This is the only error kind the fallback
    /// strategies recover from.
    #[error("network error: {0}")]
    Network(String),

    /// A verified fetch answered with a non-success status during install.
    #[error("unexpected status {status} fetching {url}")]
    Status { status: u16, url: String },

    /// A manifest entry could not be resolved to an absolute URL.
    #[error("invalid shell URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}
