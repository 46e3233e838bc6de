//! Buying-intent lead scoring.
//!
//! The score is a plain sum of five independently capped factors:
//!
//! | factor         | max |
//! |----------------|-----|
//! | intent         | 40  |
//! | engagement     | 20  |
//! | recency        | 15  |
//! | author quality | 15  |
//! | category       | 10  |
//!
//! Recency is measured against the `now` passed in, so a stored score never
//! drifts after it is computed.

use chrono::{DateTime, Utc};
use mentions_core::{AuthorSignals, RawPost};
use serde::{Deserialize, Serialize};

use crate::category::ConversationCategory;
use crate::engagement::engagement_score;
use crate::matcher::MatchText;

pub const MAX_INTENT: u8 = 40;
pub const MAX_ENGAGEMENT: u8 = 20;
pub const MAX_RECENCY: u8 = 15;
pub const MAX_AUTHOR_QUALITY: u8 = 15;
pub const MAX_CATEGORY: u8 = 10;

/// Intent phrases and the points each contributes.
const INTENT_PHRASES: &[(&str, u8)] = &[
    ("willing to pay", 20),
    ("budget for", 15),
    ("looking for", 15),
    ("alternative to", 15),
    ("alternatives to", 15),
    ("switching from", 15),
    ("replacement for", 15),
    ("need a tool", 15),
    ("recommend", 10),
    ("any suggestions", 10),
    ("what do you use", 10),
    ("pricing", 8),
    ("free trial", 8),
    ("demo", 8),
    ("migrate", 6),
    ("evaluating", 6),
    ("best", 4),
];

/// Per-factor breakdown; stored alongside the total for explainability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFactors {
    pub intent: u8,
    pub engagement: u8,
    pub recency: u8,
    pub author_quality: u8,
    pub category: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadScore {
    pub total: u8,
    pub factors: LeadFactors,
}

fn intent_factor(post: &RawPost) -> u8 {
    let text = MatchText::new(&post.text());
    let sum: u32 = INTENT_PHRASES
        .iter()
        .filter(|(phrase, _)| text.contains_term(phrase))
        .map(|(_, points)| u32::from(*points))
        .sum();
    clamp_u8(sum, MAX_INTENT)
}

fn engagement_factor(post: &RawPost) -> u8 {
    engagement_score(&post.engagement) / 5
}

fn recency_factor(posted_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u8 {
    let Some(posted_at) = posted_at else {
        return 5;
    };
    match (now - posted_at).num_hours().max(0) {
        0..=6 => 15,
        7..=24 => 12,
        25..=72 => 8,
        73..=168 => 4,
        _ => 1,
    }
}

fn author_quality_factor(author: &AuthorSignals) -> u8 {
    let karma = match author.karma {
        Some(k) if k >= 10_000 => 7,
        Some(k) if k >= 1_000 => 5,
        Some(k) if k >= 100 => 3,
        Some(_) => 0,
        None => 2,
    };
    let age = match author.account_age_days {
        Some(d) if d >= 365 => 5,
        Some(d) if d >= 90 => 3,
        Some(d) if d >= 30 => 1,
        Some(_) => 0,
        None => 1,
    };
    let verified = if author.verified { 3 } else { 0 };
    clamp_u8(karma + age + verified, MAX_AUTHOR_QUALITY)
}

const fn category_factor(category: ConversationCategory) -> u8 {
    match category {
        ConversationCategory::SolutionRequest => 10,
        ConversationCategory::Comparison => 8,
        ConversationCategory::PainPoint => 7,
        ConversationCategory::Question => 5,
        ConversationCategory::Feedback => 3,
        ConversationCategory::Announcement => 2,
        ConversationCategory::Discussion => 1,
    }
}

fn clamp_u8(value: u32, max: u8) -> u8 {
    u8::try_from(value.min(u32::from(max))).unwrap_or(max)
}

/// Score `post` for buying intent as of `now`.
#[must_use]
pub fn score_lead(
    post: &RawPost,
    category: ConversationCategory,
    author: &AuthorSignals,
    now: DateTime<Utc>,
) -> LeadScore {
    let factors = LeadFactors {
        intent: intent_factor(post),
        engagement: engagement_factor(post).min(MAX_ENGAGEMENT),
        recency: recency_factor(post.posted_at, now).min(MAX_RECENCY),
        author_quality: author_quality_factor(author),
        category: category_factor(category).min(MAX_CATEGORY),
    };
    let total = factors.intent
        + factors.engagement
        + factors.recency
        + factors.author_quality
        + factors.category;
    LeadScore { total, factors }
}
