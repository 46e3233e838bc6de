use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// External platform a monitor can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Reddit,
    HackerNews,
    Lobsters,
    Bluesky,
    DevTo,
    GitHub,
    ProductHunt,
    YouTube,
    IndieHackers,
    G2,
    Capterra,
    Trustpilot,
}

impl Platform {
    pub const ALL: [Platform; 12] = [
        Platform::Reddit,
        Platform::HackerNews,
        Platform::Lobsters,
        Platform::Bluesky,
        Platform::DevTo,
        Platform::GitHub,
        Platform::ProductHunt,
        Platform::YouTube,
        Platform::IndieHackers,
        Platform::G2,
        Platform::Capterra,
        Platform::Trustpilot,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Platform::Reddit => "reddit",
            Platform::HackerNews => "hackernews",
            Platform::Lobsters => "lobsters",
            Platform::Bluesky => "bluesky",
            Platform::DevTo => "devto",
            Platform::GitHub => "github",
            Platform::ProductHunt => "producthunt",
            Platform::YouTube => "youtube",
            Platform::IndieHackers => "indiehackers",
            Platform::G2 => "g2",
            Platform::Capterra => "capterra",
            Platform::Trustpilot => "trustpilot",
        }
    }

    /// Activity class of the platform; drives cache TTL and cron cadence.
    #[must_use]
    pub const fn category(self) -> SourceCategory {
        match self {
            Platform::Reddit | Platform::HackerNews | Platform::Lobsters | Platform::Bluesky => {
                SourceCategory::HighActivity
            }
            Platform::DevTo
            | Platform::GitHub
            | Platform::ProductHunt
            | Platform::YouTube
            | Platform::IndieHackers => SourceCategory::Standard,
            Platform::G2 | Platform::Capterra | Platform::Trustpilot => SourceCategory::Reviews,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == needle)
            .ok_or_else(|| CoreError::InvalidPlatform(s.to_string()))
    }
}

/// Grouping of platforms by how quickly new content appears on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceCategory {
    HighActivity,
    Standard,
    Reviews,
}

impl SourceCategory {
    pub const ALL: [SourceCategory; 3] = [
        SourceCategory::HighActivity,
        SourceCategory::Standard,
        SourceCategory::Reviews,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceCategory::HighActivity => "high-activity",
            SourceCategory::Standard => "standard",
            SourceCategory::Reviews => "reviews",
        }
    }

    /// How long a fetched result set for this category stays fresh in the query cache.
    #[must_use]
    pub const fn cache_ttl(self) -> Duration {
        match self {
            SourceCategory::HighActivity => Duration::from_secs(10 * 60),
            SourceCategory::Standard => Duration::from_secs(30 * 60),
            SourceCategory::Reviews => Duration::from_secs(6 * 60 * 60),
        }
    }

    /// Default cron expression (six-field, seconds first) for scheduled scans.
    ///
    /// The defaults never fire in the same minute, so one category's tick
    /// does not find the monitor still claimed by another's.
    #[must_use]
    pub const fn default_cron(self) -> &'static str {
        match self {
            SourceCategory::HighActivity => "0 */30 * * * *",
            SourceCategory::Standard => "0 5 * * * *",
            SourceCategory::Reviews => "0 15 */6 * * *",
        }
    }

    /// Environment variable that overrides [`SourceCategory::default_cron`].
    #[must_use]
    pub const fn cron_env_var(self) -> &'static str {
        match self {
            SourceCategory::HighActivity => "MENTIONS_CRON_HIGH_ACTIVITY",
            SourceCategory::Standard => "MENTIONS_CRON_STANDARD",
            SourceCategory::Reviews => "MENTIONS_CRON_REVIEWS",
        }
    }

    #[must_use]
    pub fn platforms(self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| p.category() == self)
            .collect()
    }
}

impl std::fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| CoreError::InvalidSourceCategory(s.to_string()))
    }
}
