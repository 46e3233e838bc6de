//! Budget alert command handlers.

use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use mentions_core::AppConfig;
use mentions_scan::{AlertStore, BudgetAlertEvaluator, HttpNotifier, Notifier, PgStore};

/// Sub-commands available under `budgets`.
#[derive(Debug, Subcommand)]
pub enum BudgetCommands {
    /// Evaluate every active budget alert once and send notifications
    Evaluate,
}

pub(crate) async fn run(
    pool: sqlx::PgPool,
    config: &AppConfig,
    command: BudgetCommands,
) -> anyhow::Result<()> {
    match command {
        BudgetCommands::Evaluate => {
            let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::from_app_config(config)?);
            let evaluator = BudgetAlertEvaluator::new(
                Arc::new(PgStore::new(pool)) as Arc<dyn AlertStore>,
                notifier,
                config.budget_timezone,
            );
            let summary = evaluator.evaluate_all(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            // Deliveries run on spawned tasks bounded by the HTTP timeout.
            if summary.deliveries > 0 {
                tokio::time::sleep(std::time::Duration::from_secs(config.fetch_timeout_secs))
                    .await;
            }
            Ok(())
        }
    }
}
