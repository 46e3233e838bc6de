use mentions_core::Engagement;

/// Upper bound of [`engagement_score`].
pub const MAX_ENGAGEMENT_SCORE: u8 = 100;

/// Log-scaled 0–100 engagement score.
///
/// Comments weigh twice an upvote and shares three times; a weighted total of
/// 10 000 or more saturates at 100. Negative counters count as zero.
#[must_use]
pub fn engagement_score(engagement: &Engagement) -> u8 {
    let weighted = engagement
        .upvotes
        .max(0)
        .saturating_add(engagement.comments.max(0).saturating_mul(2))
        .saturating_add(engagement.shares.max(0).saturating_mul(3));
    #[allow(clippy::cast_precision_loss)]
    let scaled = 25.0 * (1.0 + weighted as f64).log10();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = scaled.round().clamp(0.0, f64::from(MAX_ENGAGEMENT_SCORE)) as u8;
    score
}
