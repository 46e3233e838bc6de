//! Lexicon sentiment scorer for brand mentions.

use serde::{Deserialize, Serialize};

/// Word weights. Keys are lowercase single words; the final score is clamped
/// to `[-1.0, 1.0]`.
pub(crate) const LEXICON: &[(&str, f32)] = &[
    // Positive signals
    ("great", 0.4),
    ("good", 0.3),
    ("excellent", 0.5),
    ("love", 0.5),
    ("loved", 0.5),
    ("best", 0.5),
    ("recommend", 0.4),
    ("reliable", 0.4),
    ("fast", 0.3),
    ("easy", 0.3),
    ("intuitive", 0.4),
    ("helpful", 0.4),
    ("awesome", 0.5),
    ("amazing", 0.5),
    ("impressed", 0.4),
    ("solid", 0.3),
    ("smooth", 0.3),
    ("worth", 0.3),
    ("thanks", 0.2),
    ("happy", 0.4),
    // Negative signals
    ("bad", -0.4),
    ("terrible", -0.6),
    ("awful", -0.6),
    ("worst", -0.6),
    ("hate", -0.6),
    ("broken", -0.5),
    ("buggy", -0.5),
    ("slow", -0.3),
    ("expensive", -0.3),
    ("overpriced", -0.5),
    ("outage", -0.5),
    ("down", -0.2),
    ("failed", -0.4),
    ("failure", -0.4),
    ("problem", -0.3),
    ("issue", -0.2),
    ("frustrating", -0.5),
    ("disappointed", -0.5),
    ("scam", -0.7),
    ("refund", -0.4),
];

/// Score a text string using the lexicon.
///
/// Splits text into lowercase words, sums matching weights, and clamps the
/// result to `[-1.0, 1.0]`. Returns `0.0` for empty or unknown text.
#[must_use]
pub fn lexicon_score(text: &str) -> f32 {
    let mut score = 0.0_f32;
    for word in text.split_whitespace() {
        let w = word
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_lowercase();
        if let Some(&(_, weight)) = LEXICON.iter().find(|(lex, _)| *lex == w) {
            score += weight;
        }
    }
    score.clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Scores within ±0.2 are neutral.
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score >= 0.2 {
            Sentiment::Positive
        } else if score <= -0.2 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
