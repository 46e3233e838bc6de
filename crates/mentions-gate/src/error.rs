use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::rate::OperationClass;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("{class} rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited {
        class: OperationClass,
        retry_after_secs: u64,
    },

    #[error("daily AI budget exceeded ({used}/{limit} tokens); resets at {resets_at}")]
    BudgetExceeded {
        used: u64,
        limit: u64,
        resets_at: DateTime<Utc>,
    },

    #[error("counter store error: {0}")]
    Store(String),
}

impl From<mentions_db::DbError> for GateError {
    fn from(e: mentions_db::DbError) -> Self {
        GateError::Store(e.to_string())
    }
}
