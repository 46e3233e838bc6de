mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use mentions_cache::QueryCache;
use mentions_gate::{AiBudget, CounterStore, PgCounterStore, RateGate, RateLimits};
use mentions_scan::{
    AlertStore, BudgetAlertEvaluator, HttpNotifier, Notifier, PgStore, ScanScheduler,
    ScanSettings, ScanStore, ScanWorkerPool,
};
use mentions_signals::LexiconAnalyzer;
use mentions_sources::{default_registry, HttpSettings, SourceEndpoints};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(mentions_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = mentions_db::PoolConfig::from_app_config(&config);
    let pool = mentions_db::connect_pool(&config.database_url, pool_config).await?;
    mentions_db::run_migrations(&pool).await?;

    let stale_before = Utc::now()
        - Duration::seconds(i64::try_from(config.stale_scan_secs).unwrap_or(i64::MAX));
    let released = mentions_db::release_stale_scans(&pool, stale_before).await?;
    if released > 0 {
        tracing::warn!(released, "released scans left claimed by a previous run");
    }

    let cache = QueryCache::new(config.cache_capacity);
    cache.spawn_sweeper(StdDuration::from_secs(config.cache_sweep_secs.max(1)));

    let store = Arc::new(PgStore::new(pool.clone()));
    let counters: Arc<dyn CounterStore> = Arc::new(PgCounterStore::new(pool.clone()));
    let rate_gate = Arc::new(RateGate::new(
        Some(Arc::clone(&counters)),
        RateLimits::default(),
    ));
    let ai_budget = Arc::new(AiBudget::new(Some(counters), config.budget_timezone));
    let fetchers = default_registry(
        &HttpSettings::from_app_config(&config),
        &SourceEndpoints::default(),
    )?;

    let scan_scheduler = Arc::new(ScanScheduler::new(
        Arc::clone(&store) as Arc<dyn ScanStore>,
        fetchers,
        cache.clone(),
        Arc::clone(&rate_gate),
        ai_budget,
        Arc::new(LexiconAnalyzer::new()),
        ScanSettings::from_app_config(&config),
    ));
    let (queue, workers) = ScanWorkerPool::spawn(
        scan_scheduler,
        config.scan_workers,
        config.scan_queue_capacity,
    );

    let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::from_app_config(&config)?);
    let evaluator = Arc::new(BudgetAlertEvaluator::new(
        store as Arc<dyn AlertStore>,
        notifier,
        config.budget_timezone,
    ));
    let mut jobs = scheduler::build_scheduler(queue.clone(), evaluator).await?;

    let auth = AuthState::from_env(matches!(
        config.env,
        mentions_core::Environment::Development
    ))?;
    let app = build_app(
        AppState {
            queue,
            pool: Some(pool),
        },
        auth,
        rate_gate,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = jobs.shutdown().await {
        tracing::warn!(error = %e, "scheduler shutdown failed");
    }
    workers.shutdown().await;
    cache.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
