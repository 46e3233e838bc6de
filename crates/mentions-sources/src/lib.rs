//! Platform adapters that turn a [`PlatformQuery`] into candidate posts.
//!
//! Each adapter implements [`PlatformFetcher`]; the scan pipeline looks
//! adapters up through a [`FetcherRegistry`] and treats a missing adapter
//! like any other per-platform failure.

pub mod client;
pub mod error;
pub mod hacker_news;
pub mod reddit;
pub(crate) mod retry;

use std::collections::HashMap;
use std::sync::Arc;

use mentions_core::{FetchError, Platform, PlatformFetcher, PlatformQuery, RawPost};

pub use client::{HttpSettings, JsonClient};
pub use error::SourceError;
pub use hacker_news::HackerNewsFetcher;
pub use reddit::RedditFetcher;

/// Base URLs for the HTTP-backed adapters. Overridden in tests.
#[derive(Debug, Clone)]
pub struct SourceEndpoints {
    pub hacker_news: String,
    pub reddit: String,
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        Self {
            hacker_news: hacker_news::DEFAULT_BASE_URL.to_owned(),
            reddit: reddit::DEFAULT_BASE_URL.to_owned(),
        }
    }
}

/// Lookup table from platform to adapter.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<Platform, Arc<dyn PlatformFetcher>>,
}

impl FetcherRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `fetcher` under its own platform, replacing any previous adapter.
    pub fn register(&mut self, fetcher: Arc<dyn PlatformFetcher>) {
        self.fetchers.insert(fetcher.platform(), fetcher);
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformFetcher>> {
        self.fetchers.get(&platform).cloned()
    }

    #[must_use]
    pub fn supports(&self, platform: Platform) -> bool {
        self.fetchers.contains_key(&platform)
    }

    /// Platforms with a registered adapter, in catalog order.
    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.fetchers.contains_key(p))
            .collect()
    }

    /// Dispatch `query` to the adapter for `query.platform`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Unsupported`] when no adapter is registered, or
    /// whatever the adapter itself returns.
    pub async fn fetch(&self, query: &PlatformQuery) -> Result<Vec<RawPost>, FetchError> {
        let fetcher = self
            .get(query.platform)
            .ok_or(FetchError::Unsupported(query.platform))?;
        fetcher.fetch(query).await
    }
}

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

/// Registry with every built-in HTTP adapter.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the HTTP client cannot be built.
pub fn default_registry(
    settings: &HttpSettings,
    endpoints: &SourceEndpoints,
) -> Result<FetcherRegistry, SourceError> {
    let client = JsonClient::new(settings)?;
    let mut registry = FetcherRegistry::new();
    registry.register(Arc::new(HackerNewsFetcher::new(
        client.clone(),
        endpoints.hacker_news.clone(),
    )));
    registry.register(Arc::new(RedditFetcher::new(
        client,
        endpoints.reddit.clone(),
    )));
    Ok(registry)
}
