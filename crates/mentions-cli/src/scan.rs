//! Scan command handlers.
//!
//! `run` executes one scan in the foreground; `cron` performs a single
//! category tick through a short-lived worker pool.

use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use mentions_cache::QueryCache;
use mentions_core::{AppConfig, Platform, ScanTrigger, SourceCategory};
use mentions_gate::{AiBudget, CounterStore, PgCounterStore, RateGate, RateLimits};
use mentions_scan::{
    ceil_secs, PgStore, ScanRequest, ScanScheduler, ScanSettings, ScanStore, ScanWorkerPool,
};
use mentions_signals::LexiconAnalyzer;
use mentions_sources::{default_registry, HttpSettings, SourceEndpoints};
use uuid::Uuid;

/// Sub-commands available under `scan`.
#[derive(Debug, Subcommand)]
pub enum ScanCommands {
    /// Scan one monitor now and print the report as JSON
    Run {
        monitor_id: Uuid,

        /// Treat the run as a scheduled scan (no manual cooldown)
        #[arg(long)]
        cron: bool,

        /// Restrict the scan to these platforms
        #[arg(long = "platform")]
        platforms: Vec<Platform>,
    },
    /// Enqueue and run one scheduled tick for a source category
    Cron { category: SourceCategory },
    /// Show scan state for a monitor
    Status {
        monitor_id: Uuid,

        /// Owner of the monitor
        #[arg(long)]
        user: String,
    },
}

pub(crate) fn build_scheduler(
    pool: &sqlx::PgPool,
    config: &AppConfig,
) -> anyhow::Result<(Arc<ScanScheduler>, QueryCache<Vec<mentions_core::RawPost>>)> {
    let counters: Arc<dyn CounterStore> = Arc::new(PgCounterStore::new(pool.clone()));
    let cache = QueryCache::new(config.cache_capacity);
    let fetchers = default_registry(
        &HttpSettings::from_app_config(config),
        &SourceEndpoints::default(),
    )?;
    let scheduler = ScanScheduler::new(
        Arc::new(PgStore::new(pool.clone())) as Arc<dyn ScanStore>,
        fetchers,
        cache.clone(),
        Arc::new(RateGate::new(
            Some(Arc::clone(&counters)),
            RateLimits::default(),
        )),
        Arc::new(AiBudget::new(Some(counters), config.budget_timezone)),
        Arc::new(LexiconAnalyzer::new()),
        ScanSettings::from_app_config(config),
    );
    Ok((Arc::new(scheduler), cache))
}

pub(crate) async fn run(
    pool: sqlx::PgPool,
    config: &AppConfig,
    command: ScanCommands,
) -> anyhow::Result<()> {
    let (scheduler, cache) = build_scheduler(&pool, config)?;
    let result = match command {
        ScanCommands::Run {
            monitor_id,
            cron,
            platforms,
        } => run_one(&scheduler, monitor_id, cron, platforms).await,
        ScanCommands::Cron { category } => run_cron_tick(scheduler, config, category).await,
        ScanCommands::Status { monitor_id, user } => {
            let status = scheduler
                .scan_status(monitor_id, &user, Utc::now())
                .await
                .map_err(|e| anyhow::anyhow!("status for monitor {monitor_id}: {e}"))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "isScanning": status.is_scanning,
                    "lastCheckedAt": status.last_checked_at,
                    "lastManualScanAt": status.last_manual_scan_at,
                    "newMatchCount": status.new_match_count,
                    "canScan": status.can_scan,
                    "cooldownRemaining": status.cooldown_remaining.map(ceil_secs),
                }))?
            );
            Ok(())
        }
    };
    cache.shutdown();
    result
}

fn operator_request(monitor_id: Uuid, cron: bool, platforms: Vec<Platform>) -> ScanRequest {
    ScanRequest {
        monitor_id,
        trigger: if cron {
            ScanTrigger::Cron
        } else {
            ScanTrigger::Manual
        },
        requested_by: None,
        platforms: if platforms.is_empty() {
            None
        } else {
            Some(platforms)
        },
    }
}

async fn run_one(
    scheduler: &ScanScheduler,
    monitor_id: Uuid,
    cron: bool,
    platforms: Vec<Platform>,
) -> anyhow::Result<()> {
    let request = operator_request(monitor_id, cron, platforms);
    let job = scheduler
        .request_scan(&request, Utc::now())
        .await
        .map_err(|e| anyhow::anyhow!("scan of monitor {monitor_id} rejected: {e}"))?;

    let report = scheduler.execute_scan(job).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(err) = &report.persistence_error {
        anyhow::bail!("scan results were not saved: {err}");
    }
    Ok(())
}

async fn run_cron_tick(
    scheduler: Arc<ScanScheduler>,
    config: &AppConfig,
    category: SourceCategory,
) -> anyhow::Result<()> {
    let (queue, workers) =
        ScanWorkerPool::spawn(scheduler, config.scan_workers, config.scan_queue_capacity);
    let summary = mentions_scan::enqueue_category(&queue, category).await;
    drop(queue);
    workers.shutdown().await;

    let summary = summary?;
    tracing::info!(
        category = category.as_str(),
        enqueued = summary.enqueued,
        "cron tick finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_request_defaults_to_manual_without_owner() {
        let id = Uuid::new_v4();
        let req = operator_request(id, false, Vec::new());
        assert_eq!(req.monitor_id, id);
        assert_eq!(req.trigger, ScanTrigger::Manual);
        assert!(req.requested_by.is_none());
        assert!(req.platforms.is_none());
    }

    #[test]
    fn operator_request_keeps_platform_filter() {
        let req = operator_request(Uuid::new_v4(), true, vec![Platform::Reddit]);
        assert_eq!(req.trigger, ScanTrigger::Cron);
        assert_eq!(req.platforms, Some(vec![Platform::Reddit]));
    }
}
