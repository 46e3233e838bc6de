//! Read access to billing-owned user fields.

use mentions_core::PlanTier;
use sqlx::PgPool;

use crate::DbError;

/// Return the user's current plan tier, or `None` if the user is unknown.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::InvalidColumn`] if the stored tier is not recognised.
pub async fn get_user_plan(pool: &PgPool, user_id: &str) -> Result<Option<PlanTier>, DbError> {
    let tier: Option<String> = sqlx::query_scalar("SELECT plan_tier FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    tier.map(|t| {
        t.parse::<PlanTier>().map_err(|e| DbError::InvalidColumn {
            column: "plan_tier",
            reason: e.to_string(),
        })
    })
    .transpose()
}
