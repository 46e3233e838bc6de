mod support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use mentions_core::{Platform, PlanTier, ScanTrigger, SourceCategory};
use mentions_gate::RateLimits;
use mentions_scan::{ScanRejection, ScanRequest};

use support::{harness, harness_with, monitor, post, settings, Behavior, StubFetcher};

fn acme_posts() -> Vec<mentions_core::RawPost> {
    vec![
        post(Platform::Reddit, "https://reddit.com/r/saas/1", "Acme launches v2"),
        post(Platform::Reddit, "https://reddit.com/r/pets/2", "cats and dogs"),
    ]
}

#[tokio::test]
async fn acme_scan_inserts_only_the_matching_post() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Posts(acme_posts()));
    let h = harness(&[Arc::clone(&reddit)]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;

    let job = h
        .scheduler
        .request_scan(&ScanRequest::manual(m.id, "u1"), Utc::now())
        .await
        .unwrap();
    let report = h.scheduler.execute_scan(job).await;

    assert_eq!(report.fetched, 2);
    assert_eq!(report.matched, 1);
    assert_eq!(report.new_results, 1);
    let results = h.store.results().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].row.title, "Acme launches v2");
    assert_eq!(results[0].row.matched_terms, vec!["Acme".to_owned()]);

    let after = h.store.monitor(m.id).await.unwrap();
    assert_eq!(after.new_match_count, 1);
    assert!(!after.is_scanning);
    assert!(after.last_checked_at.is_some());
    assert!(after.last_manual_scan_at.is_some());
}

#[tokio::test]
async fn rescanning_does_not_duplicate_results() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Posts(acme_posts()));
    let h = harness(&[reddit]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;

    for _ in 0..2 {
        let job = h
            .scheduler
            .request_scan(&ScanRequest::cron(m.id, SourceCategory::HighActivity), Utc::now())
            .await
            .unwrap();
        h.scheduler.execute_scan(job).await;
    }

    assert_eq!(h.store.results().await.len(), 1);
    let after = h.store.monitor(m.id).await.unwrap();
    assert_eq!(after.new_match_count, 1);
    assert!(after.last_manual_scan_at.is_none(), "cron scans leave the manual timestamp alone");
}

#[tokio::test]
async fn concurrent_requests_yield_one_claim() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Posts(vec![]));
    let h = harness(&[reddit]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let scheduler = Arc::clone(&h.scheduler);
        let id = m.id;
        handles.push(tokio::spawn(async move {
            scheduler
                .request_scan(&ScanRequest::cron(id, SourceCategory::HighActivity), Utc::now())
                .await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(ScanRejection::ScanInProgress) => {}
            Err(other) => panic!("unexpected rejection: {other}"),
        }
    }
    assert_eq!(accepted, 1);
    assert!(h.store.monitor(m.id).await.unwrap().is_scanning);
}

#[tokio::test]
async fn free_plan_cooldown_blocks_second_manual_scan() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Posts(vec![]));
    let h = harness(&[reddit]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;
    h.store.set_plan("u1", PlanTier::Free).await;

    let job = h
        .scheduler
        .request_scan(&ScanRequest::manual(m.id, "u1"), Utc::now())
        .await
        .unwrap();
    h.scheduler.execute_scan(job).await;

    let later = Utc::now() + Duration::hours(1);
    match h
        .scheduler
        .request_scan(&ScanRequest::manual(m.id, "u1"), later)
        .await
    {
        Err(ScanRejection::CooldownActive { remaining, .. }) => {
            assert!(remaining <= Duration::hours(23));
            assert!(remaining > Duration::hours(23) - Duration::minutes(1));
        }
        other => panic!("expected CooldownActive, got {other:?}"),
    }

    // Cron scans are not subject to the cooldown.
    assert!(h
        .scheduler
        .request_scan(&ScanRequest::cron(m.id, SourceCategory::HighActivity), later)
        .await
        .is_ok());
}

#[tokio::test]
async fn one_failing_platform_does_not_abort_the_scan() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Fail("503 from upstream"));
    let hn = StubFetcher::new(
        Platform::HackerNews,
        Behavior::Posts(vec![post(
            Platform::HackerNews,
            "https://news.ycombinator.com/item?id=1",
            "Show HN: Acme",
        )]),
    );
    let h = harness(&[reddit, hn]);
    let m = monitor(
        "u1",
        "Acme",
        vec![Platform::Reddit, Platform::HackerNews, Platform::Lobsters],
    );
    h.store.insert_monitor(m.clone()).await;

    let job = h
        .scheduler
        .request_scan(&ScanRequest::manual(m.id, "u1"), Utc::now())
        .await
        .unwrap();
    let report = h.scheduler.execute_scan(job).await;

    assert_eq!(report.new_results, 1);
    let failed: Vec<Platform> = report.failed_platforms.iter().map(|f| f.platform).collect();
    assert_eq!(failed, vec![Platform::Reddit, Platform::Lobsters]);
    assert!(report.failed_platforms[1].reason.contains("no adapter"));
}

#[tokio::test]
async fn hung_platform_times_out() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Hang);
    let h = harness(&[reddit]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;

    let job = h
        .scheduler
        .request_scan(&ScanRequest::manual(m.id, "u1"), Utc::now())
        .await
        .unwrap();
    let report = h.scheduler.execute_scan(job).await;

    assert_eq!(report.failed_platforms.len(), 1);
    assert!(report.failed_platforms[0].reason.contains("timed out"));
    assert!(!h.store.monitor(m.id).await.unwrap().is_scanning);
}

#[tokio::test]
async fn persistence_failure_still_clears_scanning_flag() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Posts(acme_posts()));
    let h = harness(&[reddit]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;
    h.store.fail_writes(true);

    let job = h
        .scheduler
        .request_scan(&ScanRequest::manual(m.id, "u1"), Utc::now())
        .await
        .unwrap();
    let report = h.scheduler.execute_scan(job).await;

    assert!(report.persistence_error.is_some());
    assert_eq!(report.new_results, 0);
    let after = h.store.monitor(m.id).await.unwrap();
    assert!(!after.is_scanning);
    assert!(after.last_checked_at.is_some());
    assert_eq!(after.new_match_count, 0);
}

#[tokio::test]
async fn monitors_with_equal_terms_share_one_upstream_call() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Posts(acme_posts()));
    let h = harness(&[Arc::clone(&reddit)]);
    let a = monitor("u1", "Acme", vec![Platform::Reddit]);
    let b = monitor("u2", "ACME", vec![Platform::Reddit]);
    h.store.insert_monitor(a.clone()).await;
    h.store.insert_monitor(b.clone()).await;

    let job = h
        .scheduler
        .request_scan(&ScanRequest::manual(a.id, "u1"), Utc::now())
        .await
        .unwrap();
    let first = h.scheduler.execute_scan(job).await;
    let job = h
        .scheduler
        .request_scan(&ScanRequest::manual(b.id, "u2"), Utc::now())
        .await
        .unwrap();
    let second = h.scheduler.execute_scan(job).await;

    assert_eq!(reddit.calls(), 1);
    assert_eq!((first.cache_hits, second.cache_hits), (0, 1));
    assert_eq!(second.new_results, 1, "results are per monitor");
}

#[tokio::test]
async fn foreign_or_unknown_monitor_is_not_found() {
    let h = harness(&[]);
    let m = monitor("owner", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;

    let foreign = h
        .scheduler
        .request_scan(&ScanRequest::manual(m.id, "intruder"), Utc::now())
        .await;
    assert!(matches!(foreign, Err(ScanRejection::MonitorNotFound)));

    let unknown = h
        .scheduler
        .request_scan(&ScanRequest::manual(uuid::Uuid::new_v4(), "owner"), Utc::now())
        .await;
    assert!(matches!(unknown, Err(ScanRejection::MonitorNotFound)));
    assert!(!h.store.monitor(m.id).await.unwrap().is_scanning);
}

#[tokio::test]
async fn manual_requests_are_rate_limited_per_user() {
    let limits = RateLimits {
        write: 1,
        ..RateLimits::default()
    };
    let h = harness_with(&[], limits, settings());
    let a = monitor("u1", "Acme", vec![Platform::Reddit]);
    let b = monitor("u1", "Globex", vec![Platform::Reddit]);
    h.store.insert_monitor(a.clone()).await;
    h.store.insert_monitor(b.clone()).await;
    h.store.set_plan("u1", PlanTier::Team).await;

    let now = Utc::now();
    assert!(h
        .scheduler
        .request_scan(&ScanRequest::manual(a.id, "u1"), now)
        .await
        .is_ok());
    match h
        .scheduler
        .request_scan(&ScanRequest::manual(b.id, "u1"), now)
        .await
    {
        Err(ScanRejection::RateLimited { retry_after_secs }) => {
            assert!((1..=60).contains(&retry_after_secs));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert!(!h.store.monitor(b.id).await.unwrap().is_scanning);
}

#[tokio::test]
async fn paid_plans_get_ai_enrichment_once() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Posts(acme_posts()));
    let h = harness(&[reddit]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;
    h.store.set_plan("u1", PlanTier::Pro).await;

    let job = h
        .scheduler
        .request_scan(&ScanRequest::manual(m.id, "u1"), Utc::now())
        .await
        .unwrap();
    let report = h.scheduler.execute_scan(job).await;

    assert_eq!(report.ai_analyzed, 1);
    assert!(!report.ai_budget_exhausted);
    let results = h.store.results().await;
    assert!(results[0].ai_analyzed_at.is_some());
    assert!(results[0].row.sentiment.is_some());
    let usage = h.store.usage().await;
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].usage.operation, "lexicon_analysis");
    assert_eq!(usage[0].usage.result_id, Some(results[0].id));
}

#[tokio::test]
async fn free_plan_skips_ai() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Posts(acme_posts()));
    let h = harness(&[reddit]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;

    let job = h
        .scheduler
        .request_scan(&ScanRequest::manual(m.id, "u1"), Utc::now())
        .await
        .unwrap();
    let report = h.scheduler.execute_scan(job).await;

    assert_eq!(report.ai_analyzed, 0);
    assert!(h.store.usage().await.is_empty());
    assert!(h.store.results().await[0].row.sentiment.is_none());
}

#[tokio::test]
async fn status_reports_cooldown_and_scan_state() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Posts(acme_posts()));
    let h = harness(&[reddit]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;

    let fresh = h.scheduler.scan_status(m.id, "u1", Utc::now()).await.unwrap();
    assert!(fresh.can_scan);
    assert!(fresh.cooldown_remaining.is_none());

    let job = h
        .scheduler
        .request_scan(&ScanRequest::manual(m.id, "u1"), Utc::now())
        .await
        .unwrap();
    assert_eq!(job.trigger, ScanTrigger::Manual);
    let during = h.scheduler.scan_status(m.id, "u1", Utc::now()).await.unwrap();
    assert!(during.is_scanning);
    assert!(!during.can_scan);

    h.scheduler.execute_scan(job).await;
    let after = h.scheduler.scan_status(m.id, "u1", Utc::now()).await.unwrap();
    assert!(!after.is_scanning);
    assert!(!after.can_scan);
    assert_eq!(after.new_match_count, 1);
    assert!(after.cooldown_remaining.is_some());
}

#[tokio::test]
async fn cron_request_with_no_covered_platforms_leaves_monitor_untouched() {
    let h = harness(&[]);
    let m = monitor(
        "u1",
        "Acme",
        vec![Platform::G2, Platform::DevTo, Platform::GitHub, Platform::Reddit],
    );
    h.store.insert_monitor(m.clone()).await;
    h.store.set_plan("u1", PlanTier::Free).await;

    let rejected = h
        .scheduler
        .request_scan(&ScanRequest::cron(m.id, SourceCategory::HighActivity), Utc::now())
        .await;
    assert!(matches!(rejected, Err(ScanRejection::NothingToScan)));

    let after = h.store.monitor(m.id).await.unwrap();
    assert!(!after.is_scanning);
    assert!(after.last_checked_at.is_none());
}
