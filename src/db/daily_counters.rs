//! Daily reward counters — get-or-create under lock, in-place eligibility.
//!
//! One row per (user, day), created lazily on the first reward-eligible event
//! of the day. [`get_or_create_locked`] acquires the row under `FOR UPDATE`;
//! the lock then covers the whole read–decide–mutate–persist sequence, so no
//! two concurrent requests can both observe "not yet awarded". Mutators run
//! on the fetched struct and never re-fetch; [`persist`] writes the struct
//! back in a single UPDATE while the lock is still held.
//!
//! The uniqueness constraint on (user_id, day) is the source of truth for
//! creation races: a losing insert means a winning creator already exists,
//! so the loser re-issues the locking read instead of failing.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use sqlx::PgConnection;

use super::{ChallengeCategory, DailyCounter, RewardTier};
use crate::FRIEND_ACTIVE_DAILY_QUOTA;

const COLUMNS: &str = "id, user_id, day, attended, streak_bonus, \
     challenge_exercise, challenge_study, challenge_diet, challenge_hobby, \
     friend_active_count, friend_passive_count";

/// Attempts before declaring the get-or-create race unresolvable.
const GET_OR_CREATE_ATTEMPTS: u32 = 3;

/// Fetch the (user, day) counter row under `FOR UPDATE`, inserting a fresh
/// zero-valued row if none exists. Runs on the caller's transaction; the
/// returned row stays locked until that transaction ends.
pub async fn get_or_create_locked(
    conn: &mut PgConnection,
    user_id: i64,
    day: NaiveDate,
) -> Result<DailyCounter> {
    for attempt in 0..GET_OR_CREATE_ATTEMPTS {
        let existing = sqlx::query_as::<_, DailyCounter>(&format!(
            "SELECT {COLUMNS} FROM daily_counters WHERE user_id = $1 AND day = $2 FOR UPDATE"
        ))
        .bind(user_id)
        .bind(day)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(row) = existing {
            return Ok(row);
        }

        // ON CONFLICT DO NOTHING keeps a lost race from aborting the caller's
        // transaction; the winner holds the row lock until it commits, and the
        // next locking read blocks on it and then sees the committed row.
        let inserted = sqlx::query_as::<_, DailyCounter>(&format!(
            "INSERT INTO daily_counters (user_id, day) VALUES ($1, $2)
             ON CONFLICT (user_id, day) DO NOTHING
             RETURNING {COLUMNS}"
        ))
        .bind(user_id)
        .bind(day)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(row) = inserted {
            return Ok(row);
        }
        tracing::debug!(user_id, %day, attempt, "daily counter insert raced, re-reading");
    }
    bail!("daily counter get-or-create exhausted retries for user {user_id} on {day}")
}

/// Write all flags and counts back in one UPDATE. Must be called while the
/// lock from [`get_or_create_locked`] is held.
pub async fn persist(conn: &mut PgConnection, counter: &DailyCounter) -> Result<()> {
    sqlx::query(
        "UPDATE daily_counters
         SET attended = $2, streak_bonus = $3,
             challenge_exercise = $4, challenge_study = $5,
             challenge_diet = $6, challenge_hobby = $7,
             friend_active_count = $8, friend_passive_count = $9
         WHERE id = $1",
    )
    .bind(counter.id)
    .bind(counter.attended)
    .bind(counter.streak_bonus)
    .bind(counter.challenge_exercise)
    .bind(counter.challenge_study)
    .bind(counter.challenge_diet)
    .bind(counter.challenge_hobby)
    .bind(counter.friend_active_count)
    .bind(counter.friend_passive_count)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Consecutive attended days ending at `through` (inclusive). A gap day
/// resets the streak to zero. The scan is bounded to the most recent 60
/// attended rows; the streak bonus only needs to distinguish "≥ 7".
pub async fn current_streak(
    conn: &mut PgConnection,
    user_id: i64,
    through: NaiveDate,
) -> Result<i64> {
    let days: Vec<NaiveDate> = sqlx::query_scalar(
        "SELECT day FROM daily_counters
         WHERE user_id = $1 AND attended AND day <= $2
         ORDER BY day DESC LIMIT 60",
    )
    .bind(user_id)
    .bind(through)
    .fetch_all(&mut *conn)
    .await?;

    let mut streak = 0i64;
    let mut expected = through;
    for day in days {
        if day != expected {
            break;
        }
        streak += 1;
        match expected.pred_opt() {
            Some(prev) => expected = prev,
            None => break,
        }
    }
    Ok(streak)
}

impl DailyCounter {
    /// Set the attendance flag. Returns false when already set today.
    pub fn mark_attendance(&mut self) -> bool {
        if self.attended {
            return false;
        }
        self.attended = true;
        true
    }

    /// Set the streak bonus flag. Returns false when already set today.
    /// The streak-length precondition is the orchestrator's to check.
    pub fn mark_streak_bonus(&mut self) -> bool {
        if self.streak_bonus {
            return false;
        }
        self.streak_bonus = true;
        true
    }

    /// Set the flag for one challenge category. Returns false when already
    /// set today; other categories are unaffected.
    pub fn mark_challenge(&mut self, category: ChallengeCategory) -> bool {
        let flag = match category {
            ChallengeCategory::Exercise => &mut self.challenge_exercise,
            ChallengeCategory::Study => &mut self.challenge_study,
            ChallengeCategory::Diet => &mut self.challenge_diet,
            ChallengeCategory::Hobby => &mut self.challenge_hobby,
        };
        if *flag {
            return false;
        }
        *flag = true;
        true
    }

    /// Count a sender-side friend interaction and return its tier: full
    /// value for the first [`FRIEND_ACTIVE_DAILY_QUOTA`] of the day, reduced
    /// afterwards.
    pub fn increment_friend_active(&mut self) -> RewardTier {
        let tier = if self.friend_active_count < FRIEND_ACTIVE_DAILY_QUOTA {
            RewardTier::Full
        } else {
            RewardTier::Reduced
        };
        self.friend_active_count += 1;
        tier
    }

    /// Count a receiver-side friend interaction. Always eligible.
    pub fn increment_friend_passive(&mut self) {
        self.friend_passive_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(day: NaiveDate) -> DailyCounter {
        DailyCounter {
            id: 1,
            user_id: 42,
            day,
            attended: false,
            streak_bonus: false,
            challenge_exercise: false,
            challenge_study: false,
            challenge_diet: false,
            challenge_hobby: false,
            friend_active_count: 0,
            friend_passive_count: 0,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn attendance_marks_exactly_once() {
        let mut c = blank(today());
        assert!(c.mark_attendance());
        assert!(!c.mark_attendance());
        assert!(c.attended);
    }

    #[test]
    fn challenge_flags_are_independent_per_category() {
        let mut c = blank(today());
        assert!(c.mark_challenge(ChallengeCategory::Exercise));
        assert!(!c.mark_challenge(ChallengeCategory::Exercise));
        assert!(c.mark_challenge(ChallengeCategory::Study));
        assert!(c.mark_challenge(ChallengeCategory::Diet));
        assert!(c.mark_challenge(ChallengeCategory::Hobby));
        assert!(!c.mark_challenge(ChallengeCategory::Hobby));
    }

    #[test]
    fn friend_active_tiers_switch_at_quota() {
        let mut c = blank(today());
        for _ in 0..FRIEND_ACTIVE_DAILY_QUOTA {
            assert_eq!(c.increment_friend_active(), RewardTier::Full);
        }
        assert_eq!(c.increment_friend_active(), RewardTier::Reduced);
        assert_eq!(c.increment_friend_active(), RewardTier::Reduced);
        assert_eq!(c.friend_active_count, FRIEND_ACTIVE_DAILY_QUOTA + 2);
    }
}
