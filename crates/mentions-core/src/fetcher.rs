use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::{Monitor, Platform, RawPost};

/// Normalized search request sent to a platform adapter.
///
/// Terms are trimmed, lower-cased, de-duplicated and sorted, so two monitors
/// watching the same words produce equal queries (and equal cache keys).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformQuery {
    pub platform: Platform,
    pub terms: Vec<String>,
    pub limit: usize,
}

impl PlatformQuery {
    #[must_use]
    pub fn new<I, S>(platform: Platform, terms: I, limit: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        Self {
            platform,
            terms,
            limit,
        }
    }

    /// Query covering a monitor's company name and keywords.
    #[must_use]
    pub fn for_monitor(monitor: &Monitor, platform: Platform, limit: usize) -> Self {
        let company = std::iter::once(monitor.company_name.as_str());
        let keywords = monitor.keywords.iter().map(String::as_str);
        Self::new(platform, company.chain(keywords), limit)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream error from {platform}: {reason}")]
    Upstream { platform: Platform, reason: String },

    #[error("fetch from {platform} timed out after {secs}s")]
    Timeout { platform: Platform, secs: u64 },

    #[error("no adapter registered for {0}")]
    Unsupported(Platform),
}

/// Adapter returning candidate posts from one platform.
#[async_trait]
pub trait PlatformFetcher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Search the platform for posts mentioning any of the query terms.
    async fn fetch(&self, query: &PlatformQuery) -> Result<Vec<RawPost>, FetchError>;
}
