//! Whole-word content matching of posts against a monitor's terms.

use mentions_core::{Monitor, RawPost};

/// Result of matching one post against one monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matches: bool,
    /// Configured terms (company name first, then keywords) found in the post.
    pub matched_terms: Vec<String>,
}

/// Lower-case `input` and replace every non-alphanumeric run with one space.
pub(crate) fn normalize_text_for_match(input: &str) -> String {
    input
        .chars()
        .flat_map(char::to_lowercase)
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized phrase variants for a configured term.
///
/// `Arnie's` yields both `arnie s` (as it tokenizes in text) and `arnies`.
fn term_variants(term: &str) -> Vec<String> {
    let mut variants = vec![
        normalize_text_for_match(term),
        normalize_text_for_match(&term.replace(['\'', '\u{2019}'], "")),
    ];
    variants.retain(|v| !v.is_empty());
    variants.dedup();
    variants
}

/// Pre-normalized text for repeated whole-word lookups.
pub struct MatchText {
    padded: String,
}

impl MatchText {
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            padded: format!(" {} ", normalize_text_for_match(text)),
        }
    }

    /// Returns `true` if `term` occurs as a whole word or whole phrase.
    #[must_use]
    pub fn contains_term(&self, term: &str) -> bool {
        term_variants(term)
            .iter()
            .any(|v| self.padded.contains(&format!(" {v} ")))
    }

    /// Returns `true` if the text opens with `term` as a whole word or phrase.
    #[must_use]
    pub fn starts_with_term(&self, term: &str) -> bool {
        term_variants(term)
            .iter()
            .any(|v| self.padded.starts_with(&format!(" {v} ")))
    }
}

/// Decide whether `post` mentions the monitor's company name or any keyword.
///
/// Matching is case-insensitive on word boundaries: keyword `cat` matches
/// "I have a cat" but not "catalyst". Blank terms are ignored.
#[must_use]
pub fn matches(post: &RawPost, monitor: &Monitor) -> MatchOutcome {
    let text = MatchText::new(&post.text());
    let candidates = std::iter::once(&monitor.company_name).chain(monitor.keywords.iter());

    let mut matched_terms: Vec<String> = Vec::new();
    for term in candidates {
        let trimmed = term.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matched_terms.iter().any(|t| t.eq_ignore_ascii_case(trimmed)) {
            continue;
        }
        if text.contains_term(trimmed) {
            matched_terms.push(trimmed.to_owned());
        }
    }

    MatchOutcome {
        matches: !matched_terms.is_empty(),
        matched_terms,
    }
}
