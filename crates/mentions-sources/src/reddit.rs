//! Reddit adapter using the public `search.json` listing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mentions_core::{
    AuthorSignals, Engagement, FetchError, Platform, PlatformFetcher, PlatformQuery, RawPost,
};
use serde::Deserialize;

use crate::client::JsonClient;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const PERMALINK_HOST: &str = "https://www.reddit.com";

/// Reddit search listing wrapper.
#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    title: Option<String>,
    selftext: Option<String>,
    permalink: Option<String>,
    author: Option<String>,
    created_utc: Option<f64>,
    score: Option<i64>,
    num_comments: Option<i64>,
    num_crossposts: Option<i64>,
}

impl PostData {
    fn into_post(self) -> Option<RawPost> {
        let permalink = self.permalink?;
        #[allow(clippy::cast_possible_truncation)]
        let posted_at = self
            .created_utc
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts as i64, 0));
        Some(RawPost {
            url: format!("{PERMALINK_HOST}{permalink}"),
            title: self.title.unwrap_or_default(),
            body: self.selftext.unwrap_or_default(),
            author: self.author.filter(|a| a != "[deleted]"),
            platform: Platform::Reddit,
            posted_at,
            engagement: Engagement {
                upvotes: self.score.unwrap_or(0),
                comments: self.num_comments.unwrap_or(0),
                shares: self.num_crossposts.unwrap_or(0),
            },
            author_signals: AuthorSignals::default(),
        })
    }
}

/// Build a single OR query quoting every term: `"acme" OR "widgets"`.
pub(crate) fn build_search_query(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

pub struct RedditFetcher {
    client: JsonClient,
    base_url: String,
}

impl RedditFetcher {
    #[must_use]
    pub fn new(client: JsonClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl PlatformFetcher for RedditFetcher {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    async fn fetch(&self, query: &PlatformQuery) -> Result<Vec<RawPost>, FetchError> {
        if query.terms.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/search.json", self.base_url);
        let params = [
            ("q", build_search_query(&query.terms)),
            ("sort", "new".to_owned()),
            ("type", "link".to_owned()),
            ("limit", query.limit.to_string()),
        ];
        let listing: Listing = self
            .client
            .get_json(&url, &params)
            .await
            .map_err(|e| e.into_fetch_error(Platform::Reddit))?;

        let posts: Vec<RawPost> = listing
            .data
            .children
            .into_iter()
            .filter_map(|c| c.data.into_post())
            .collect();

        tracing::debug!(posts = posts.len(), "collected Reddit posts");
        Ok(posts)
    }
}
