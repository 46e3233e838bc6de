//! Scan admission and the fetch → match → score → persist pipeline.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures::{stream, FutureExt, StreamExt};
use mentions_cache::QueryCache;
use mentions_core::{
    FetchError, Monitor, Platform, PlanTier, PlatformQuery, RawPost, ScanTrigger, SourceCategory,
};
use mentions_db::{NewAiUsage, NewResult};
use mentions_gate::{AiBudget, GateError, OperationClass, RateGate};
use mentions_signals::{
    classify, engagement_score, estimate_tokens, matches, score_lead, AnalysisInput, Analyzer,
    ConversationCategory,
};
use mentions_sources::FetcherRegistry;
use serde::Serialize;
use uuid::Uuid;

use crate::eligibility::{check_eligibility, cooldown_remaining};
use crate::error::{ScanError, ScanRejection};
use crate::store::ScanStore;

/// Tunables for one scheduler instance.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Concurrent platform fetches within one scan.
    pub platform_concurrency: usize,
    /// Upper bound on a single platform fetch, cache miss included.
    pub fetch_timeout: StdDuration,
    pub results_per_platform: usize,
    pub ai_max_per_scan: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            platform_concurrency: 3,
            fetch_timeout: StdDuration::from_secs(20),
            results_per_platform: 50,
            ai_max_per_scan: 10,
        }
    }
}

impl ScanSettings {
    #[must_use]
    pub fn from_app_config(config: &mentions_core::AppConfig) -> Self {
        Self {
            platform_concurrency: config.scan_platform_concurrency.max(1),
            fetch_timeout: StdDuration::from_secs(config.fetch_timeout_secs),
            ai_max_per_scan: config.ai_max_per_scan,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub monitor_id: Uuid,
    pub trigger: ScanTrigger,
    /// Caller's user id; a monitor owned by someone else is reported as not found.
    pub requested_by: Option<String>,
    /// Restrict the scan to these platforms (cron ticks pass their category).
    pub platforms: Option<Vec<Platform>>,
}

impl ScanRequest {
    #[must_use]
    pub fn manual(monitor_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            monitor_id,
            trigger: ScanTrigger::Manual,
            requested_by: Some(user_id.into()),
            platforms: None,
        }
    }

    #[must_use]
    pub fn cron(monitor_id: Uuid, category: SourceCategory) -> Self {
        Self {
            monitor_id,
            trigger: ScanTrigger::Cron,
            requested_by: None,
            platforms: Some(category.platforms()),
        }
    }
}

/// An accepted scan. The monitor's `is_scanning` flag is held until the job
/// is executed or released.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub monitor: Monitor,
    pub tier: PlanTier,
    pub trigger: ScanTrigger,
    pub platforms: Vec<Platform>,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformFailure {
    pub platform: Platform,
    pub reason: String,
}

/// Summary of one executed scan.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub monitor_id: Uuid,
    pub trigger: Option<ScanTrigger>,
    pub platforms_scanned: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub matched: usize,
    pub new_results: usize,
    pub duplicates: usize,
    pub failed_platforms: Vec<PlatformFailure>,
    pub persistence_error: Option<String>,
    pub ai_analyzed: usize,
    pub ai_budget_exhausted: bool,
    pub panicked: bool,
}

/// Read-only scan state for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStatus {
    pub is_scanning: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_manual_scan_at: Option<DateTime<Utc>>,
    pub new_match_count: i32,
    pub can_scan: bool,
    pub cooldown_remaining: Option<Duration>,
}

struct InsertedResult {
    id: i64,
    post: RawPost,
}

pub struct ScanScheduler {
    store: Arc<dyn ScanStore>,
    fetchers: FetcherRegistry,
    cache: QueryCache<Vec<RawPost>>,
    rate_gate: Arc<RateGate>,
    ai_budget: Arc<AiBudget>,
    analyzer: Arc<dyn Analyzer>,
    settings: ScanSettings,
}

impl ScanScheduler {
    #[must_use]
    pub fn new(
        store: Arc<dyn ScanStore>,
        fetchers: FetcherRegistry,
        cache: QueryCache<Vec<RawPost>>,
        rate_gate: Arc<RateGate>,
        ai_budget: Arc<AiBudget>,
        analyzer: Arc<dyn Analyzer>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            store,
            fetchers,
            cache,
            rate_gate,
            ai_budget,
            analyzer,
            settings,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ScanStore> {
        &self.store
    }

    async fn load_owned_monitor(
        &self,
        monitor_id: Uuid,
        requested_by: Option<&str>,
    ) -> Result<Monitor, ScanRejection> {
        let monitor = self
            .store
            .get_monitor(monitor_id)
            .await?
            .ok_or(ScanRejection::MonitorNotFound)?;
        if requested_by.is_some_and(|user| user != monitor.user_id) {
            return Err(ScanRejection::MonitorNotFound);
        }
        Ok(monitor)
    }

    async fn plan_for(&self, user_id: &str) -> Result<PlanTier, ScanRejection> {
        Ok(self.store.get_user_plan(user_id).await?.unwrap_or_else(|| {
            tracing::debug!(user_id, "no plan on record; treating as free");
            PlanTier::Free
        }))
    }

    /// Run admission for `req` and claim the monitor.
    ///
    /// # Errors
    ///
    /// Returns the first failed eligibility rule,
    /// [`ScanRejection::NothingToScan`] when the plan cap and platform filter
    /// leave no platform, [`ScanRejection::RateLimited`] for a manual request
    /// over the write limit, or
    /// [`ScanRejection::ScanInProgress`] if another request won the claim.
    pub async fn request_scan(
        &self,
        req: &ScanRequest,
        now: DateTime<Utc>,
    ) -> Result<ScanJob, ScanRejection> {
        let monitor = self
            .load_owned_monitor(req.monitor_id, req.requested_by.as_deref())
            .await?;
        let tier = self.plan_for(&monitor.user_id).await?;

        check_eligibility(&monitor, req.trigger, tier, now)?;

        let platforms = select_platforms(&monitor, tier, req.platforms.as_deref());
        if platforms.is_empty() {
            return Err(ScanRejection::NothingToScan);
        }

        if req.trigger == ScanTrigger::Manual {
            let decision = self
                .rate_gate
                .check_at(&monitor.user_id, OperationClass::Write, now)
                .await;
            if !decision.allowed {
                return Err(ScanRejection::RateLimited {
                    retry_after_secs: decision.retry_after_secs,
                });
            }
        }

        if !self.store.try_claim_scan(monitor.id).await? {
            return Err(ScanRejection::ScanInProgress);
        }

        tracing::debug!(
            monitor_id = %monitor.id,
            trigger = %req.trigger,
            platforms = platforms.len(),
            "scan accepted"
        );
        Ok(ScanJob {
            monitor,
            tier,
            trigger: req.trigger,
            platforms,
            accepted_at: now,
        })
    }

    /// Give back the claim on a job that will not run.
    pub async fn release(&self, job: &ScanJob) {
        if let Err(e) = self.store.release_scan(job.monitor.id).await {
            tracing::error!(monitor_id = %job.monitor.id, error = %e, "failed to release scan claim");
        }
    }

    /// Current scan state for `monitor_id`, as seen by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanRejection::MonitorNotFound`] for unknown or foreign
    /// monitors, or [`ScanRejection::Store`] on store failure.
    pub async fn scan_status(
        &self,
        monitor_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ScanStatus, ScanRejection> {
        let monitor = self.load_owned_monitor(monitor_id, Some(user_id)).await?;
        let tier = self.plan_for(&monitor.user_id).await?;
        let can_scan = check_eligibility(&monitor, ScanTrigger::Manual, tier, now).is_ok();
        Ok(ScanStatus {
            is_scanning: monitor.is_scanning,
            last_checked_at: monitor.last_checked_at,
            last_manual_scan_at: monitor.last_manual_scan_at,
            new_match_count: monitor.new_match_count,
            can_scan,
            cooldown_remaining: cooldown_remaining(&monitor, tier, now).map(|(d, _)| d),
        })
    }

    /// Active monitors watching at least one platform of `category`.
    ///
    /// # Errors
    ///
    /// Returns the store error if the listing fails.
    pub async fn monitors_for_category(
        &self,
        category: SourceCategory,
    ) -> Result<Vec<Monitor>, mentions_db::DbError> {
        self.store
            .list_monitors_for_platforms(&category.platforms())
            .await
    }

    /// Execute a claimed job. The claim is always released and the monitor's
    /// statistics updated, even if the pipeline panics.
    pub async fn execute_scan(&self, job: ScanJob) -> ScanReport {
        let monitor_id = job.monitor.id;
        let outcome = AssertUnwindSafe(self.run_pipeline(&job))
            .catch_unwind()
            .await;

        let (mut report, inserted) = match outcome {
            Ok(done) => done,
            Err(_) => {
                tracing::error!(monitor_id = %monitor_id, "scan pipeline panicked");
                let report = ScanReport {
                    monitor_id,
                    trigger: Some(job.trigger),
                    panicked: true,
                    ..ScanReport::default()
                };
                (report, Vec::new())
            }
        };

        let finished_at = Utc::now();
        let manual_at = (job.trigger == ScanTrigger::Manual).then_some(finished_at);
        let new_matches = i32::try_from(report.new_results).unwrap_or(i32::MAX);
        if let Err(e) = self
            .store
            .finish_scan(monitor_id, finished_at, manual_at, new_matches)
            .await
        {
            tracing::error!(monitor_id = %monitor_id, error = %e, "failed to record scan completion");
        }

        if !inserted.is_empty() && job.tier.limits().ai_features {
            self.dispatch_ai(&job, &inserted, &mut report).await;
        }

        tracing::info!(
            monitor_id = %monitor_id,
            trigger = %job.trigger,
            new_results = report.new_results,
            matched = report.matched,
            failed_platforms = report.failed_platforms.len(),
            "scan finished"
        );
        report
    }

    async fn fetch_platform(
        &self,
        monitor: &Monitor,
        platform: Platform,
    ) -> Result<(Vec<RawPost>, bool), FetchError> {
        let query = PlatformQuery::for_monitor(monitor, platform, self.settings.results_per_platform);
        let timeout = self.settings.fetch_timeout;
        let fetchers = &self.fetchers;
        let q = &query;
        self.cache
            .cached_query(
                platform.as_str(),
                &query,
                platform.category().cache_ttl(),
                || async move {
                    match tokio::time::timeout(timeout, fetchers.fetch(q)).await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Timeout {
                            platform,
                            secs: timeout.as_secs(),
                        }),
                    }
                },
            )
            .await
    }

    async fn run_pipeline(&self, job: &ScanJob) -> (ScanReport, Vec<InsertedResult>) {
        let monitor = &job.monitor;
        let mut report = ScanReport {
            monitor_id: monitor.id,
            trigger: Some(job.trigger),
            platforms_scanned: job.platforms.len(),
            ..ScanReport::default()
        };

        let mut fetched: Vec<(Platform, Result<(Vec<RawPost>, bool), FetchError>)> =
            stream::iter(job.platforms.iter().copied())
                .map(|platform| async move { (platform, self.fetch_platform(monitor, platform).await) })
                .buffer_unordered(self.settings.platform_concurrency.max(1))
                .collect()
                .await;
        fetched.sort_by_key(|(p, _)| job.platforms.iter().position(|q| q == p));

        let mut posts = Vec::new();
        for (platform, result) in fetched {
            match result {
                Ok((platform_posts, cache_hit)) => {
                    tracing::debug!(
                        monitor_id = %monitor.id,
                        platform = %platform,
                        cache_hit,
                        posts = platform_posts.len(),
                        "platform fetched"
                    );
                    if cache_hit {
                        report.cache_hits += 1;
                    }
                    posts.extend(platform_posts);
                }
                Err(e) => {
                    let err = ScanError::UpstreamFetchFailed {
                        platform,
                        reason: e.to_string(),
                    };
                    tracing::warn!(monitor_id = %monitor.id, platform = %platform, error = %err, "platform skipped");
                    report.failed_platforms.push(PlatformFailure {
                        platform,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report.fetched = posts.len();

        let scored_at = Utc::now();
        let mut seen_urls = HashSet::new();
        let mut inserted = Vec::new();
        for post in posts {
            if !seen_urls.insert(post.url.clone()) {
                continue;
            }
            let outcome = matches(&post, monitor);
            if !outcome.matches {
                continue;
            }
            report.matched += 1;

            let row = build_result(monitor.id, &post, outcome.matched_terms, scored_at);
            match self.store.insert_result(&row).await {
                Ok(Some(id)) => {
                    report.new_results += 1;
                    inserted.push(InsertedResult { id, post });
                }
                Ok(None) => report.duplicates += 1,
                Err(e) => {
                    let err = ScanError::PersistenceFailed(e);
                    tracing::error!(monitor_id = %monitor.id, error = %err, "aborting scan");
                    report.persistence_error = Some(err.to_string());
                    break;
                }
            }
        }

        (report, inserted)
    }

    async fn dispatch_ai(&self, job: &ScanJob, inserted: &[InsertedResult], report: &mut ScanReport) {
        let monitor = &job.monitor;
        for item in inserted.iter().take(self.settings.ai_max_per_scan) {
            let input = AnalysisInput {
                platform: item.post.platform,
                company_name: monitor.company_name.clone(),
                title: item.post.title.clone(),
                body: item.post.body.clone(),
            };
            let reservation = match self
                .ai_budget
                .reserve(&monitor.user_id, job.tier, estimate_tokens(&input), Utc::now())
                .await
            {
                Ok(reservation) => reservation,
                Err(GateError::BudgetExceeded { used, limit, .. }) => {
                    tracing::info!(monitor_id = %monitor.id, user_id = %monitor.user_id, used, limit, "AI budget exhausted; skipping analysis");
                    report.ai_budget_exhausted = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(monitor_id = %monitor.id, error = %e, "AI budget check failed");
                    break;
                }
            };

            let analysis = match self.analyzer.analyze(&input).await {
                Ok(analysis) => analysis,
                Err(e) => {
                    self.ai_budget.settle(reservation, 0).await;
                    tracing::warn!(monitor_id = %monitor.id, result_id = item.id, error = %e, "AI analysis failed");
                    continue;
                }
            };
            self.ai_budget
                .settle(reservation, analysis.usage.tokens)
                .await;

            let usage = NewAiUsage {
                user_id: monitor.user_id.clone(),
                monitor_id: Some(monitor.id),
                result_id: Some(item.id),
                operation: self.analyzer.operation().to_owned(),
                tokens: i64::try_from(analysis.usage.tokens).unwrap_or(i64::MAX),
                cost_usd: analysis.usage.cost_usd,
            };
            if let Err(e) = self.store.record_ai_usage(&usage).await {
                tracing::error!(monitor_id = %monitor.id, result_id = item.id, error = %e, "failed to record AI usage");
            }

            match self
                .store
                .apply_enrichment(
                    item.id,
                    analysis.sentiment.as_str(),
                    analysis.category.as_str(),
                    analysis.summary.as_deref(),
                )
                .await
            {
                Ok(true) => report.ai_analyzed += 1,
                Ok(false) => {
                    tracing::debug!(result_id = item.id, "result already enriched");
                }
                Err(e) => {
                    tracing::error!(result_id = item.id, error = %e, "failed to store enrichment");
                }
            }
        }
    }
}

/// The monitor's configured platforms, de-duplicated, capped at the plan's
/// allowance, then narrowed to `only` when given.
fn select_platforms(monitor: &Monitor, tier: PlanTier, only: Option<&[Platform]>) -> Vec<Platform> {
    let mut seen = HashSet::new();
    monitor
        .platforms
        .iter()
        .copied()
        .filter(|p| seen.insert(*p))
        .take(tier.limits().platforms_allowed)
        .filter(|p| only.is_none_or(|only| only.contains(p)))
        .collect()
}

fn build_result(
    monitor_id: Uuid,
    post: &RawPost,
    matched_terms: Vec<String>,
    scored_at: DateTime<Utc>,
) -> NewResult {
    let category: ConversationCategory = classify(&post.title, &post.body);
    let lead = score_lead(post, category, &post.author_signals, scored_at);
    NewResult {
        monitor_id,
        source_url: post.url.clone(),
        title: post.title.clone(),
        content: post.body.clone(),
        author: post.author.clone(),
        platform: post.platform.as_str().to_owned(),
        posted_at: post.posted_at,
        engagement_score: i32::from(engagement_score(&post.engagement)),
        lead_score: i32::from(lead.total),
        lead_factors: serde_json::to_value(lead.factors).unwrap_or_default(),
        matched_terms,
        sentiment: None,
        conversation_category: category.as_str().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(platforms: Vec<Platform>) -> Monitor {
        Monitor {
            id: Uuid::new_v4(),
            user_id: "u".to_owned(),
            name: "m".to_owned(),
            company_name: "Acme".to_owned(),
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

    #[test]
    fn free_plan_covers_first_three_platforms() {
        let m = monitor(vec![
            Platform::Reddit,
            Platform::HackerNews,
            Platform::Reddit,
            Platform::G2,
            Platform::DevTo,
        ]);
        assert_eq!(
            select_platforms(&m, PlanTier::Free, None),
            vec![Platform::Reddit, Platform::HackerNews, Platform::G2]
        );
    }

    #[test]
    fn category_filter_applies_after_plan_cap() {
        let m = monitor(vec![
            Platform::G2,
            Platform::DevTo,
            Platform::GitHub,
            Platform::Reddit,
        ]);
        let high = SourceCategory::HighActivity.platforms();
        assert!(select_platforms(&m, PlanTier::Free, Some(&high)).is_empty());
        assert_eq!(
            select_platforms(&m, PlanTier::Team, Some(&high)),
            vec![Platform::Reddit]
        );
    }

    #[test]
    fn result_row_carries_scores_and_category() {
        let post = RawPost {
            url: "https://example.com/1".to_owned(),
            title: "Looking for an alternative to Acme".to_owned(),
            body: String::new(),
            author: Some("a".to_owned()),
            platform: Platform::Reddit,
            posted_at: None,
            engagement: mentions_core::Engagement::default(),
            author_signals: mentions_core::AuthorSignals::default(),
        };
        let row = build_result(Uuid::nil(), &post, vec!["Acme".to_owned()], Utc::now());
        assert_eq!(row.conversation_category, "solution_request");
        assert!(row.lead_score > 0 && row.lead_score <= 100);
        assert_eq!(row.platform, "reddit");
        assert!(row.sentiment.is_none());
        assert!(row.lead_factors.get("intent").is_some());
    }
}
