//! Post-level signals: content matching, conversation category, engagement,
//! lead score, sentiment, and the AI analysis seam.

pub mod analyzer;
pub mod category;
pub mod engagement;
pub mod lead_score;
pub mod matcher;
pub mod sentiment;

pub use analyzer::{
    estimate_tokens, AiUsage, Analysis, AnalysisInput, AnalyzeError, Analyzer, LexiconAnalyzer,
};
pub use category::{classify, ConversationCategory};
pub use engagement::engagement_score;
pub use lead_score::{score_lead, LeadFactors, LeadScore};
pub use matcher::{matches, MatchOutcome};
pub use sentiment::{lexicon_score, Sentiment};
