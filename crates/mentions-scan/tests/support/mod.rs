#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mentions_cache::QueryCache;
use mentions_core::{
    AuthorSignals, Engagement, FetchError, Monitor, Platform, PlatformFetcher, PlatformQuery,
    RawPost,
};
use mentions_gate::{AiBudget, RateGate, RateLimits};
use mentions_scan::{InMemoryStore, ScanScheduler, ScanSettings, ScanStore};
use mentions_signals::LexiconAnalyzer;
use mentions_sources::FetcherRegistry;
use uuid::Uuid;

pub enum Behavior {
    Posts(Vec<RawPost>),
    Fail(&'static str),
    Hang,
}

pub struct StubFetcher {
    platform: Platform,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new(platform: Platform, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            platform,
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformFetcher for StubFetcher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self, _query: &PlatformQuery) -> Result<Vec<RawPost>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Posts(posts) => Ok(posts.clone()),
            Behavior::Fail(reason) => Err(FetchError::Upstream {
                platform: self.platform,
                reason: (*reason).to_owned(),
            }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

pub fn post(platform: Platform, url: &str, title: &str) -> RawPost {
    RawPost {
        url: url.to_owned(),
        title: title.to_owned(),
        body: String::new(),
        author: Some("someone".to_owned()),
        platform,
        posted_at: None,
        engagement: Engagement {
            upvotes: 12,
            comments: 3,
            shares: 0,
        },
        author_signals: AuthorSignals::default(),
    }
}

pub fn monitor(user_id: &str, company: &str, platforms: Vec<Platform>) -> Monitor {
    Monitor {
        id: Uuid::new_v4(),
        user_id: user_id.to_owned(),
        name: format!("{company} watch"),
        company_name: company.to_owned(),
        keywords: vec![],
        platforms,
        is_active: true,
        schedule: None,
        is_scanning: false,
        last_manual_scan_at: None,
        last_checked_at: None,
        new_match_count: 0,
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub scheduler: Arc<ScanScheduler>,
}

pub fn settings() -> ScanSettings {
    ScanSettings {
        fetch_timeout: Duration::from_millis(200),
        ..ScanSettings::default()
    }
}

pub fn harness(fetchers: &[Arc<StubFetcher>]) -> Harness {
    harness_with(fetchers, RateLimits::default(), settings())
}

pub fn harness_with(
    fetchers: &[Arc<StubFetcher>],
    limits: RateLimits,
    settings: ScanSettings,
) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let mut registry = FetcherRegistry::new();
    for fetcher in fetchers {
        registry.register(Arc::clone(fetcher) as Arc<dyn PlatformFetcher>);
    }
    let scheduler = ScanScheduler::new(
        Arc::clone(&store) as Arc<dyn ScanStore>,
        registry,
        QueryCache::new(100),
        Arc::new(RateGate::new(None, limits)),
        Arc::new(AiBudget::new(None, chrono_tz::UTC)),
        Arc::new(LexiconAnalyzer::new()),
        settings,
    );
    Harness {
        store,
        scheduler: Arc::new(scheduler),
    }
}
