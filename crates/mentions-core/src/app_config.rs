use std::net::SocketAddr;

use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub fetch_user_agent: String,
    pub fetch_max_retries: u32,
    pub fetch_retry_backoff_base_ms: u64,
    pub scan_workers: usize,
    pub scan_platform_concurrency: usize,
    pub scan_queue_capacity: usize,
    /// Scans claimed longer ago than this are released at startup.
    pub stale_scan_secs: u64,
    pub cache_capacity: usize,
    pub cache_sweep_secs: u64,
    /// Fixed reference timezone for AI budget resets and alert periods.
    pub budget_timezone: Tz,
    pub ai_max_per_scan: usize,
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("fetch_user_agent", &self.fetch_user_agent)
            .field("fetch_max_retries", &self.fetch_max_retries)
            .field(
                "fetch_retry_backoff_base_ms",
                &self.fetch_retry_backoff_base_ms,
            )
            .field("scan_workers", &self.scan_workers)
            .field("scan_platform_concurrency", &self.scan_platform_concurrency)
            .field("scan_queue_capacity", &self.scan_queue_capacity)
            .field("stale_scan_secs", &self.stale_scan_secs)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_sweep_secs", &self.cache_sweep_secs)
            .field("budget_timezone", &self.budget_timezone)
            .field("ai_max_per_scan", &self.ai_max_per_scan)
            .field("email_api_url", &self.email_api_url)
            .field(
                "email_api_key",
                &self.email_api_key.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}
