mod support;

use std::sync::Arc;
use std::time::Duration;

use mentions_core::{Platform, PlanTier, SourceCategory};
use mentions_gate::RateLimits;
use mentions_scan::{
    enqueue_category, ScanRejection, ScanRequest, ScanSettings, ScanWorkerPool, Submission,
};

use support::{harness, harness_with, monitor, post, Behavior, StubFetcher};

#[tokio::test]
async fn pool_runs_submitted_scans_before_shutdown_returns() {
    let reddit = StubFetcher::new(
        Platform::Reddit,
        Behavior::Posts(vec![post(Platform::Reddit, "https://reddit.com/1", "Acme rocks")]),
    );
    let h = harness(&[reddit]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;

    let (queue, pool) = ScanWorkerPool::spawn(Arc::clone(&h.scheduler), 2, 8);
    let accepted = queue.submit(ScanRequest::manual(m.id, "u1")).await.unwrap();
    assert_eq!(accepted, m.id);

    // Still claimed while queued or running.
    let again = queue.submit(ScanRequest::manual(m.id, "u1")).await;
    assert!(matches!(
        again,
        Err(ScanRejection::ScanInProgress | ScanRejection::CooldownActive { .. })
    ));

    pool.shutdown().await;

    let after = h.store.monitor(m.id).await.unwrap();
    assert!(!after.is_scanning);
    assert_eq!(after.new_match_count, 1);
    assert_eq!(h.store.results().await.len(), 1);
}

#[tokio::test]
async fn full_queue_rejects_and_releases_the_claim() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Hang);
    let h = harness_with(
        &[reddit],
        RateLimits::default(),
        ScanSettings {
            fetch_timeout: Duration::from_millis(300),
            ..ScanSettings::default()
        },
    );
    let monitors: Vec<_> = (0..4)
        .map(|i| monitor(&format!("u{i}"), "Acme", vec![Platform::Reddit]))
        .collect();
    for m in &monitors {
        h.store.insert_monitor(m.clone()).await;
    }

    let (queue, pool) = ScanWorkerPool::spawn(Arc::clone(&h.scheduler), 1, 1);

    // First job runs, second waits for the only worker, third fills the queue.
    for (i, m) in monitors.iter().take(3).enumerate() {
        queue
            .submit(ScanRequest::manual(m.id, format!("u{i}")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let overflow = &monitors[3];
    let rejected = queue.submit(ScanRequest::manual(overflow.id, "u3")).await;
    assert!(matches!(rejected, Err(ScanRejection::QueueUnavailable)));
    assert!(!h.store.monitor(overflow.id).await.unwrap().is_scanning);

    pool.shutdown().await;
    for m in monitors.iter().take(3) {
        let after = h.store.monitor(m.id).await.unwrap();
        assert!(!after.is_scanning);
        assert!(after.last_checked_at.is_some());
    }
}

#[tokio::test]
async fn cron_fan_out_targets_monitors_in_the_category() {
    let reddit = StubFetcher::new(
        Platform::Reddit,
        Behavior::Posts(vec![post(Platform::Reddit, "https://reddit.com/1", "Acme rocks")]),
    );
    let g2 = StubFetcher::new(Platform::G2, Behavior::Posts(vec![]));
    let h = harness(&[Arc::clone(&reddit), Arc::clone(&g2)]);

    let social = monitor("u1", "Acme", vec![Platform::Reddit, Platform::G2]);
    let reviews_only = monitor("u2", "Acme", vec![Platform::G2]);
    let busy = mentions_core::Monitor {
        is_scanning: true,
        ..monitor("u3", "Acme", vec![Platform::Reddit])
    };
    let paused = mentions_core::Monitor {
        is_active: false,
        ..monitor("u4", "Acme", vec![Platform::Reddit])
    };
    for m in [&social, &reviews_only, &busy, &paused] {
        h.store.insert_monitor(m.clone()).await;
    }

    let (queue, pool) = ScanWorkerPool::spawn(Arc::clone(&h.scheduler), 2, 16);
    let summary = enqueue_category(&queue, SourceCategory::HighActivity)
        .await
        .unwrap();
    pool.shutdown().await;

    assert_eq!(summary.considered, 2);
    assert_eq!(summary.enqueued, 1);
    assert_eq!(summary.deferred, 1, "the busy monitor waits for its current scan");
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(g2.calls(), 0, "cron scans stay within the category");
    assert_eq!(reddit.calls(), 1);
    assert!(h
        .store
        .monitor(reviews_only.id)
        .await
        .unwrap()
        .last_checked_at
        .is_none());
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test]
async fn colliding_category_ticks_scan_both_categories() {
    // The high-activity fetch runs until the fetch timeout, so the standard
    // tick arrives while the monitor is still claimed.
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Hang);
    let devto = StubFetcher::new(Platform::DevTo, Behavior::Posts(vec![]));
    let h = harness(&[Arc::clone(&reddit), Arc::clone(&devto)]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit, Platform::DevTo]);
    h.store.insert_monitor(m.clone()).await;

    let (queue, pool) = ScanWorkerPool::spawn(Arc::clone(&h.scheduler), 2, 8);
    let high = enqueue_category(&queue, SourceCategory::HighActivity)
        .await
        .unwrap();
    let standard = enqueue_category(&queue, SourceCategory::Standard)
        .await
        .unwrap();
    assert_eq!(high.enqueued, 1);
    assert_eq!((standard.enqueued, standard.deferred), (0, 1));
    assert_eq!(
        queue.deferred_platforms(m.id),
        Some(SourceCategory::Standard.platforms())
    );

    wait_until("the deferred standard scan", || devto.calls() == 1).await;
    pool.shutdown().await;

    assert_eq!(reddit.calls(), 1);
    assert_eq!(devto.calls(), 1);
    assert!(queue.deferred_platforms(m.id).is_none());
    assert!(!h.store.monitor(m.id).await.unwrap().is_scanning);
}

#[tokio::test]
async fn manual_collision_is_not_deferred() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Hang);
    let h = harness(&[reddit]);
    let m = monitor("u1", "Acme", vec![Platform::Reddit]);
    h.store.insert_monitor(m.clone()).await;

    let (queue, pool) = ScanWorkerPool::spawn(Arc::clone(&h.scheduler), 1, 4);
    assert_eq!(
        queue
            .submit_or_defer(ScanRequest::cron(m.id, SourceCategory::HighActivity))
            .await
            .unwrap(),
        Submission::Enqueued(m.id)
    );
    let manual = queue.submit_or_defer(ScanRequest::manual(m.id, "u1")).await;
    assert!(matches!(manual, Err(ScanRejection::ScanInProgress)));
    assert!(queue.deferred_platforms(m.id).is_none());
    pool.shutdown().await;
}

#[tokio::test]
async fn cron_tick_skips_monitors_the_plan_leaves_empty() {
    let reddit = StubFetcher::new(Platform::Reddit, Behavior::Posts(vec![]));
    let h = harness(&[Arc::clone(&reddit)]);
    // Free covers the first three platforms, none of them high-activity.
    let m = monitor(
        "u1",
        "Acme",
        vec![Platform::G2, Platform::DevTo, Platform::GitHub, Platform::Reddit],
    );
    h.store.insert_monitor(m.clone()).await;
    h.store.set_plan("u1", PlanTier::Free).await;

    let (queue, pool) = ScanWorkerPool::spawn(Arc::clone(&h.scheduler), 1, 4);
    let summary = enqueue_category(&queue, SourceCategory::HighActivity)
        .await
        .unwrap();
    pool.shutdown().await;

    assert_eq!((summary.considered, summary.enqueued, summary.skipped), (1, 0, 1));
    assert_eq!(reddit.calls(), 0);
    let after = h.store.monitor(m.id).await.unwrap();
    assert!(!after.is_scanning);
    assert!(after.last_checked_at.is_none());
}
