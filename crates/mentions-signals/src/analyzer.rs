//! AI analysis seam and the local lexicon analyzer.
//!
//! The scan pipeline reserves [`estimate_tokens`] against the user's daily
//! budget before calling [`Analyzer::analyze`], then records the reported
//! [`AiUsage`] in the cost ledger.

use async_trait::async_trait;
use mentions_core::Platform;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::category::{classify, ConversationCategory};
use crate::sentiment::{lexicon_score, Sentiment};

/// Fixed prompt overhead added to every estimate.
const PROMPT_OVERHEAD_TOKENS: u64 = 200;
/// Expected completion size.
const COMPLETION_TOKENS: u64 = 150;
const SUMMARY_MAX_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    #[error("invalid analyzer response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub platform: Platform,
    pub company_name: String,
    pub title: String,
    pub body: String,
}

/// Tokens consumed and their cost in USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiUsage {
    pub tokens: u64,
    pub cost_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub sentiment: Sentiment,
    pub category: ConversationCategory,
    pub summary: Option<String>,
    pub usage: AiUsage,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Operation name recorded in the cost ledger.
    fn operation(&self) -> &'static str;

    async fn analyze(&self, input: &AnalysisInput) -> Result<Analysis, AnalyzeError>;
}

/// Rough token count for budget reservation: four characters per token plus
/// fixed prompt and completion allowances.
#[must_use]
pub fn estimate_tokens(input: &AnalysisInput) -> u64 {
    let chars = input.title.chars().count() + input.body.chars().count();
    let chars = u64::try_from(chars).unwrap_or(u64::MAX);
    chars.div_ceil(4) + PROMPT_OVERHEAD_TOKENS + COMPLETION_TOKENS
}

/// Local analyzer: lexicon sentiment, rule-based category, and a
/// first-sentence summary.
#[derive(Debug, Clone, Default)]
pub struct LexiconAnalyzer {
    cost_per_1k_tokens: Decimal,
}

impl LexiconAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge `cost` USD per thousand estimated tokens.
    #[must_use]
    pub fn with_cost_per_1k_tokens(mut self, cost: Decimal) -> Self {
        self.cost_per_1k_tokens = cost;
        self
    }
}

fn summarize(title: &str, body: &str) -> Option<String> {
    let source = if body.trim().is_empty() { title } else { body };
    let first = source
        .split_inclusive(['.', '!', '?'])
        .next()
        .unwrap_or(source)
        .trim();
    if first.is_empty() {
        return None;
    }
    let mut summary: String = first.chars().take(SUMMARY_MAX_CHARS).collect();
    if first.chars().count() > SUMMARY_MAX_CHARS {
        summary.push('…');
    }
    Some(summary)
}

#[async_trait]
impl Analyzer for LexiconAnalyzer {
    fn operation(&self) -> &'static str {
        "lexicon_analysis"
    }

    async fn analyze(&self, input: &AnalysisInput) -> Result<Analysis, AnalyzeError> {
        let text = format!("{} {}", input.title, input.body);
        let tokens = estimate_tokens(input);
        let cost_usd = self.cost_per_1k_tokens * Decimal::from(tokens) / Decimal::from(1000);
        Ok(Analysis {
            sentiment: Sentiment::from_score(lexicon_score(&text)),
            category: classify(&input.title, &input.body),
            summary: summarize(&input.title, &input.body),
            usage: AiUsage { tokens, cost_usd },
        })
    }
}
