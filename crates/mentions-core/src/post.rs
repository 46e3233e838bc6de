use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Platform;

/// Raw engagement counters as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub upvotes: i64,
    pub comments: i64,
    pub shares: i64,
}

/// What the platform tells us about the post's author.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSignals {
    pub karma: Option<i64>,
    pub account_age_days: Option<i64>,
    pub verified: bool,
}

/// A candidate post returned by a platform adapter. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    pub url: String,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub platform: Platform,
    pub posted_at: Option<DateTime<Utc>>,
    pub engagement: Engagement,
    pub author_signals: AuthorSignals,
}

impl RawPost {
    /// Title and body joined for text analysis.
    #[must_use]
    pub fn text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.body)
        }
    }
}
