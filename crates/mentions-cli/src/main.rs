mod budgets;
mod scan;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::budgets::BudgetCommands;
use crate::scan::ScanCommands;

#[derive(Debug, Parser)]
#[command(name = "mentions-cli")]
#[command(about = "Mentions monitoring command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run, enqueue, and inspect monitor scans
    Scan {
        #[command(subcommand)]
        command: ScanCommands,
    },
    /// Budget alert evaluation
    Budgets {
        #[command(subcommand)]
        command: BudgetCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Clear scan flags left set by a crashed process
    ReleaseStale {
        /// Release scans claimed longer ago than this many seconds
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("mentions-cli ready; run with --help to list commands");
        return Ok(());
    };

    let config = mentions_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let pool_config = mentions_db::PoolConfig::from_app_config(&config);
    let pool = mentions_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => run_db(&pool, &config, command).await,
        Commands::Scan { command } => scan::run(pool, &config, command).await,
        Commands::Budgets { command } => budgets::run(pool, &config, command).await,
    }
}

async fn run_db(
    pool: &sqlx::PgPool,
    config: &mentions_core::AppConfig,
    command: DbCommands,
) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            mentions_db::health_check(pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            mentions_db::run_migrations(pool).await?;
            println!("migrations applied");
        }
        DbCommands::ReleaseStale { older_than_secs } => {
            let secs = older_than_secs.unwrap_or(config.stale_scan_secs);
            let cutoff = chrono::Utc::now()
                - chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX));
            let released = mentions_db::release_stale_scans(pool, cutoff).await?;
            println!("released {released} stale scan(s)");
        }
    }
    Ok(())
}
