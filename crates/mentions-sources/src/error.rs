use mentions_core::{FetchError, Platform};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by {host} (retry after {retry_after_secs}s)")]
    RateLimited { host: String, retry_after_secs: u64 },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

impl SourceError {
    /// Convert into the adapter-seam error, tagging the platform.
    #[must_use]
    pub fn into_fetch_error(self, platform: Platform) -> FetchError {
        FetchError::Upstream {
            platform,
            reason: self.to_string(),
        }
    }
}
