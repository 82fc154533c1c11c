//! Pairwise interaction throttle — canonical pair state and directed daily
//! counts for the reciprocal "like" action.
//!
//! Two users exchanging likes concurrently must never deadlock. The
//! `pair_states` row is keyed by the canonical (low, high) ordering, so both
//! directions of a concurrent exchange lock the same row in the same global
//! order. The per-direction daily rows are distinct by key and need no
//! additional ordering.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use sqlx::PgConnection;

use super::{Database, PairDailyCounter, PairState, RewardTier};
use crate::LIKE_DAILY_CAP;

const GET_OR_CREATE_ATTEMPTS: u32 = 3;

/// Canonical ordering for an unordered user pair: `(low, high)` with
/// `low < high`, regardless of argument order. Must be applied before any
/// pair lock is taken. Callers guarantee `a != b`.
pub fn canonical_pair(a: i64, b: i64) -> (i64, i64) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Remaining full-allowance interactions given today's directed count:
/// `cap - count`, clamped to zero.
pub fn remaining_from_count(count: i64) -> i64 {
    (LIKE_DAILY_CAP - count).max(0)
}

/// Lock the canonical pair row, creating it if this is the pair's first-ever
/// throttled interaction. Same conflict policy as the daily counters: a lost
/// insert race re-issues the locking read.
pub async fn lock_or_create_pair_state(
    conn: &mut PgConnection,
    user_low: i64,
    user_high: i64,
) -> Result<PairState> {
    debug_assert!(user_low < user_high, "pair must be canonicalized first");
    for attempt in 0..GET_OR_CREATE_ATTEMPTS {
        let existing = sqlx::query_as::<_, PairState>(
            "SELECT id, user_low, user_high, last_sender FROM pair_states
             WHERE user_low = $1 AND user_high = $2 FOR UPDATE",
        )
        .bind(user_low)
        .bind(user_high)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(row) = existing {
            return Ok(row);
        }

        let inserted = sqlx::query_as::<_, PairState>(
            "INSERT INTO pair_states (user_low, user_high, last_sender)
             VALUES ($1, $2, $1)
             ON CONFLICT (user_low, user_high) DO NOTHING
             RETURNING id, user_low, user_high, last_sender",
        )
        .bind(user_low)
        .bind(user_high)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(row) = inserted {
            return Ok(row);
        }
        tracing::debug!(user_low, user_high, attempt, "pair state insert raced, re-reading");
    }
    bail!("pair state get-or-create exhausted retries for ({user_low}, {user_high})")
}

/// Lock the directed (sender, receiver, day) counter row, creating a
/// zero-count row on first use.
pub async fn lock_or_create_pair_daily(
    conn: &mut PgConnection,
    sender_id: i64,
    receiver_id: i64,
    day: NaiveDate,
) -> Result<PairDailyCounter> {
    for attempt in 0..GET_OR_CREATE_ATTEMPTS {
        let existing = sqlx::query_as::<_, PairDailyCounter>(
            "SELECT id, sender_id, receiver_id, day, count FROM pair_daily_counters
             WHERE sender_id = $1 AND receiver_id = $2 AND day = $3 FOR UPDATE",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(day)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(row) = existing {
            return Ok(row);
        }

        let inserted = sqlx::query_as::<_, PairDailyCounter>(
            "INSERT INTO pair_daily_counters (sender_id, receiver_id, day)
             VALUES ($1, $2, $3)
             ON CONFLICT (sender_id, receiver_id, day) DO NOTHING
             RETURNING id, sender_id, receiver_id, day, count",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(day)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(row) = inserted {
            return Ok(row);
        }
        tracing::debug!(sender_id, receiver_id, attempt, "pair daily insert raced, re-reading");
    }
    bail!("pair daily get-or-create exhausted retries for ({sender_id} -> {receiver_id})")
}

/// Record one sender→receiver interaction for `day` and return its tier:
/// the first same-direction interaction of the day is full-value, repeats
/// are reduced. Locks the canonical pair row first (deadlock avoidance),
/// then the directed daily row. Runs on the caller's transaction.
pub async fn record_interaction(
    conn: &mut PgConnection,
    sender_id: i64,
    receiver_id: i64,
    day: NaiveDate,
) -> Result<RewardTier> {
    let (low, high) = canonical_pair(sender_id, receiver_id);
    let state = lock_or_create_pair_state(&mut *conn, low, high).await?;
    sqlx::query("UPDATE pair_states SET last_sender = $2, updated_at = NOW() WHERE id = $1")
        .bind(state.id)
        .bind(sender_id)
        .execute(&mut *conn)
        .await?;

    let daily = lock_or_create_pair_daily(&mut *conn, sender_id, receiver_id, day).await?;
    let tier = if daily.count == 0 {
        RewardTier::Full
    } else {
        RewardTier::Reduced
    };
    sqlx::query("UPDATE pair_daily_counters SET count = count + 1 WHERE id = $1")
        .bind(daily.id)
        .execute(&mut *conn)
        .await?;
    Ok(tier)
}

impl Database {
    /// Remaining full-allowance likes from `sender_id` toward `receiver_id`
    /// on `day`, clamped to zero. Read-only, no locking.
    pub async fn remaining_likes(
        &self,
        sender_id: i64,
        receiver_id: i64,
        day: NaiveDate,
    ) -> Result<i64> {
        let count: Option<i32> = sqlx::query_scalar(
            "SELECT count FROM pair_daily_counters
             WHERE sender_id = $1 AND receiver_id = $2 AND day = $3",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(day)
        .fetch_optional(self.pool())
        .await?;
        Ok(remaining_from_count(count.unwrap_or(0) as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_is_symmetric_and_ordered() {
        assert_eq!(canonical_pair(3, 9), (3, 9));
        assert_eq!(canonical_pair(9, 3), (3, 9));
        assert_eq!(canonical_pair(1, 2), canonical_pair(2, 1));
    }

    #[test]
    fn remaining_allowance_clamps_to_zero() {
        assert_eq!(remaining_from_count(0), LIKE_DAILY_CAP);
        assert_eq!(remaining_from_count(LIKE_DAILY_CAP), 0);
        assert_eq!(remaining_from_count(LIKE_DAILY_CAP + 5), 0);
    }
}
