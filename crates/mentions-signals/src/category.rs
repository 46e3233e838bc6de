//! Rule-based conversation category classifier.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::matcher::MatchText;

/// What kind of conversation a post is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationCategory {
    SolutionRequest,
    PainPoint,
    Comparison,
    Question,
    Feedback,
    Announcement,
    Discussion,
}

impl ConversationCategory {
    pub const ALL: [ConversationCategory; 7] = [
        ConversationCategory::SolutionRequest,
        ConversationCategory::PainPoint,
        ConversationCategory::Comparison,
        ConversationCategory::Question,
        ConversationCategory::Feedback,
        ConversationCategory::Announcement,
        ConversationCategory::Discussion,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ConversationCategory::SolutionRequest => "solution_request",
            ConversationCategory::PainPoint => "pain_point",
            ConversationCategory::Comparison => "comparison",
            ConversationCategory::Question => "question",
            ConversationCategory::Feedback => "feedback",
            ConversationCategory::Announcement => "announcement",
            ConversationCategory::Discussion => "discussion",
        }
    }
}

impl std::fmt::Display for ConversationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown conversation category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for ConversationCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConversationCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| UnknownCategory(s.to_owned()))
    }
}

const SOLUTION_REQUEST: &[&str] = &[
    "looking for",
    "recommend",
    "recommendations",
    "any suggestions",
    "suggestions for",
    "alternative to",
    "alternatives to",
    "what do you use",
    "what tool",
    "which tool",
    "need a tool",
    "best tool",
    "best way to",
    "switching from",
    "replacement for",
];

const COMPARISON: &[&str] = &[
    "vs",
    "versus",
    "compared to",
    "comparison",
    "better than",
    "worse than",
    "or should i",
];

const PAIN_POINT: &[&str] = &[
    "frustrated",
    "frustrating",
    "annoying",
    "hate",
    "broken",
    "doesn t work",
    "does not work",
    "struggling",
    "too expensive",
    "nightmare",
    "fed up",
    "buggy",
    "waste of",
];

const ANNOUNCEMENT: &[&str] = &[
    "launches",
    "launched",
    "announcing",
    "introducing",
    "released",
    "release",
    "now available",
    "show hn",
];

const FEEDBACK: &[&str] = &[
    "review",
    "my experience",
    "been using",
    "i switched",
    "i love",
    "impressed",
    "disappointed",
];

const QUESTION_OPENERS: &[&str] = &["how", "what", "why", "is there", "does anyone", "can i", "ask hn"];

/// Classify a post from its title and body.
///
/// Rules are tried in priority order: purchase-intent phrasing wins over
/// comparisons, complaints, launches and reviews; a question mark or
/// question opener without stronger signals gives [`ConversationCategory::Question`].
#[must_use]
pub fn classify(title: &str, body: &str) -> ConversationCategory {
    let joined = format!("{title} {body}");
    let text = MatchText::new(&joined);
    let any = |phrases: &[&str]| phrases.iter().any(|p| text.contains_term(p));

    if any(SOLUTION_REQUEST) {
        ConversationCategory::SolutionRequest
    } else if any(COMPARISON) {
        ConversationCategory::Comparison
    } else if any(PAIN_POINT) {
        ConversationCategory::PainPoint
    } else if joined.contains('?') || starts_with_opener(title) {
        ConversationCategory::Question
    } else if any(ANNOUNCEMENT) {
        ConversationCategory::Announcement
    } else if any(FEEDBACK) {
        ConversationCategory::Feedback
    } else {
        ConversationCategory::Discussion
    }
}

fn starts_with_opener(title: &str) -> bool {
    let head = MatchText::new(title.split(['.', '!', '\n']).next().unwrap_or_default());
    QUESTION_OPENERS.iter().any(|o| head.starts_with_term(o))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_intent_is_solution_request() {
        assert_eq!(
            classify("Looking for an alternative to Acme", ""),
            ConversationCategory::SolutionRequest
        );
    }

    #[test]
    fn versus_is_comparison() {
        assert_eq!(
            classify("Acme vs Globex for small teams", ""),
            ConversationCategory::Comparison
        );
    }

    #[test]
    fn complaint_is_pain_point() {
        assert_eq!(
            classify("Acme sync is broken again", "so frustrating"),
            ConversationCategory::PainPoint
        );
    }

    #[test]
    fn question_mark_is_question() {
        assert_eq!(
            classify("Does Acme support SSO?", ""),
            ConversationCategory::Question
        );
    }

    #[test]
    fn launch_is_announcement() {
        assert_eq!(
            classify("Acme launches v2", ""),
            ConversationCategory::Announcement
        );
    }

    #[test]
    fn plain_text_is_discussion() {
        assert_eq!(
            classify("cats and dogs", ""),
            ConversationCategory::Discussion
        );
    }

    #[test]
    fn category_parses_from_stored_name() {
        for c in ConversationCategory::ALL {
            assert_eq!(c.as_str().parse::<ConversationCategory>().unwrap(), c);
        }
    }
}
