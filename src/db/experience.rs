//! Mascot experience store — atomic increments with a derived level.
//!
//! One row per user, 1:1 with the user's mascot. The level is never stored
//! independently: every experience mutation recomputes it in the same
//! statement, so `level == experience / 100 + 1` holds at all times.

use anyhow::Result;
use sqlx::PgConnection;

use super::{Database, MascotExperience};

/// Derived level for a cumulative experience total: one level per 100
/// experience, starting at level 1.
pub fn level_for(experience: i64) -> i64 {
    experience / 100 + 1
}

/// Add `amount` experience (caller guarantees a positive amount) and return
/// the new `(experience, level)` pair, or `None` when the user has no mascot
/// row. Mascot absence is a valid business state; callers skip the award
/// silently rather than treating it as a failure.
///
/// The increment is a single UPDATE, so it is atomic on its own; callers
/// that need atomicity with counter state hold those row locks first and
/// run this on the same transaction as the last step.
pub async fn add_experience(
    conn: &mut PgConnection,
    user_id: i64,
    amount: i64,
) -> Result<Option<(i64, i64)>> {
    debug_assert!(amount > 0, "experience amounts are strictly positive");
    let row = sqlx::query_as::<_, (i64, i64)>(
        "UPDATE mascot_experience
         SET experience = experience + $2,
             level = (experience + $2) / 100 + 1,
             updated_at = NOW()
         WHERE user_id = $1
         RETURNING experience, level",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

impl Database {
    /// Seed the 1:1 experience row for a newly created mascot. Idempotent.
    pub async fn create_mascot(&self, user_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO mascot_experience (user_id) VALUES ($1)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Read a user's experience row, if their mascot exists.
    pub async fn get_experience(&self, user_id: i64) -> Result<Option<MascotExperience>> {
        let row = sqlx::query_as::<_, MascotExperience>(
            "SELECT user_id, experience, level, updated_at
             FROM mascot_experience WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }
}
