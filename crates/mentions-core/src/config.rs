use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing is decoupled from the process environment so it can be tested with
/// a plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("MENTIONS_ENV", "development"));

    let bind_addr = or_default("MENTIONS_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("MENTIONS_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("MENTIONS_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("MENTIONS_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("MENTIONS_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("MENTIONS_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let fetch_timeout_secs = parse_u64("MENTIONS_FETCH_TIMEOUT_SECS", "20")?;
    let fetch_user_agent = or_default(
        "MENTIONS_FETCH_USER_AGENT",
        "mentions/0.1 (social-listening)",
    );
    let fetch_max_retries = parse_u32("MENTIONS_FETCH_MAX_RETRIES", "2")?;
    let fetch_retry_backoff_base_ms = parse_u64("MENTIONS_FETCH_RETRY_BACKOFF_BASE_MS", "500")?;

    let scan_workers = parse_usize("MENTIONS_SCAN_WORKERS", "4")?;
    let scan_platform_concurrency = parse_usize("MENTIONS_SCAN_PLATFORM_CONCURRENCY", "3")?;
    let scan_queue_capacity = parse_usize("MENTIONS_SCAN_QUEUE_CAPACITY", "256")?;
    let stale_scan_secs = parse_u64("MENTIONS_STALE_SCAN_SECS", "1800")?;
    if scan_workers == 0 {
        return Err(invalid("MENTIONS_SCAN_WORKERS", "must be at least 1".into()));
    }

    let cache_capacity = parse_usize("MENTIONS_CACHE_CAPACITY", "1000")?;
    let cache_sweep_secs = parse_u64("MENTIONS_CACHE_SWEEP_SECS", "60")?;

    let tz_raw = or_default("MENTIONS_BUDGET_TIMEZONE", "UTC");
    let budget_timezone = tz_raw
        .parse::<chrono_tz::Tz>()
        .map_err(|e| invalid("MENTIONS_BUDGET_TIMEZONE", e.to_string()))?;
    let ai_max_per_scan = parse_usize("MENTIONS_AI_MAX_PER_SCAN", "10")?;

    let email_api_url = lookup("MENTIONS_EMAIL_API_URL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let email_api_key = lookup("MENTIONS_EMAIL_API_KEY").ok();

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        fetch_timeout_secs,
        fetch_user_agent,
        fetch_max_retries,
        fetch_retry_backoff_base_ms,
        scan_workers,
        scan_platform_concurrency,
        scan_queue_capacity,
        stale_scan_secs,
        cache_capacity,
        cache_sweep_secs,
        budget_timezone,
        ai_max_per_scan,
        email_api_url,
        email_api_key,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
