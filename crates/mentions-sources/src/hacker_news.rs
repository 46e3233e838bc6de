//! Hacker News adapter backed by the Algolia search API.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mentions_core::{
    AuthorSignals, Engagement, FetchError, Platform, PlatformFetcher, PlatformQuery, RawPost,
};
use serde::Deserialize;

use crate::client::{strip_html, JsonClient};

pub const DEFAULT_BASE_URL: &str = "https://hn.algolia.com/api/v1";
const ITEM_URL_PREFIX: &str = "https://news.ycombinator.com/item?id=";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    story_title: Option<String>,
    story_text: Option<String>,
    comment_text: Option<String>,
    author: Option<String>,
    created_at_i: Option<i64>,
    points: Option<i64>,
    num_comments: Option<i64>,
}

impl Hit {
    fn into_post(self) -> RawPost {
        let title = self
            .title
            .or(self.story_title)
            .unwrap_or_default();
        let body = self
            .story_text
            .or(self.comment_text)
            .map(|t| strip_html(&t))
            .unwrap_or_default();
        RawPost {
            url: format!("{ITEM_URL_PREFIX}{}", self.object_id),
            title,
            body,
            author: self.author,
            platform: Platform::HackerNews,
            posted_at: self
                .created_at_i
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
            engagement: Engagement {
                upvotes: self.points.unwrap_or(0),
                comments: self.num_comments.unwrap_or(0),
                shares: 0,
            },
            author_signals: AuthorSignals::default(),
        }
    }
}

/// Searches stories and comments, newest first, one request per term.
pub struct HackerNewsFetcher {
    client: JsonClient,
    base_url: String,
}

impl HackerNewsFetcher {
    #[must_use]
    pub fn new(client: JsonClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl PlatformFetcher for HackerNewsFetcher {
    fn platform(&self) -> Platform {
        Platform::HackerNews
    }

    async fn fetch(&self, query: &PlatformQuery) -> Result<Vec<RawPost>, FetchError> {
        let url = format!("{}/search_by_date", self.base_url);
        let mut seen = HashSet::new();
        let mut posts = Vec::new();

        for term in &query.terms {
            let params = [
                ("query", format!("\"{term}\"")),
                ("tags", "(story,comment)".to_owned()),
                ("hitsPerPage", query.limit.to_string()),
            ];
            let response: SearchResponse = self
                .client
                .get_json(&url, &params)
                .await
                .map_err(|e| e.into_fetch_error(Platform::HackerNews))?;

            for hit in response.hits {
                let post = hit.into_post();
                if seen.insert(post.url.clone()) {
                    posts.push(post);
                }
            }
        }

        tracing::debug!(
            terms = query.terms.len(),
            posts = posts.len(),
            "collected Hacker News posts"
        );
        Ok(posts)
    }
}
