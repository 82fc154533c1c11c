//! Point transaction ledger — append-under-lock with balance snapshots.
//!
//! Rows are immutable once written; refunds are new rows, never edits. Each
//! append takes a per-user transaction-scoped advisory lock, reads the
//! latest row's balance (absence means balance 0), applies the signed
//! amount, and stores the resulting balance on the new row.
//!
//! The lock must be on the user, not the latest row: a waiter blocked on the
//! winner's row lock re-reads its statement snapshot after the winner
//! commits and would compute the balance from the stale latest row, breaking
//! the `balance_after` chain. The advisory lock is keyed on user_id and
//! released automatically at commit or rollback.

use anyhow::Result;
use sqlx::PgConnection;

use super::{Database, PointKind, PointStats, PointTransaction};

const COLUMNS: &str =
    "id, user_id, amount, kind, ref_id, ref_type, description, balance_after, created_at";

/// Result of an append attempt. A rejected spend is a business outcome, not
/// an error; the ledger is left untouched.
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    Appended(PointTransaction),
    InsufficientBalance { balance: i64 },
}

/// Append a ledger row for `magnitude` points of `kind`, computing the
/// balance snapshot under a per-user advisory lock. Returns
/// [`AppendOutcome::InsufficientBalance`] (and inserts nothing) when the
/// signed amount would drive the balance negative.
///
/// Runs on the caller's transaction so the insert commits or rolls back
/// together with the counter mutation that earned it; the advisory lock is
/// held until that transaction ends, linearizing all appends for the user.
pub async fn append(
    conn: &mut PgConnection,
    user_id: i64,
    magnitude: i64,
    kind: PointKind,
    reference: Option<(i64, &str)>,
    description: &str,
) -> Result<AppendOutcome> {
    debug_assert!(magnitude > 0, "ledger magnitudes are strictly positive");
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    // Fresh statement snapshot after the lock: any prior appender held the
    // lock until commit, so its row is visible here.
    let latest: Option<i64> = sqlx::query_scalar(
        "SELECT balance_after FROM point_transactions
         WHERE user_id = $1 ORDER BY id DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let balance = latest.unwrap_or(0);
    let next = balance + kind.signed(magnitude);
    if next < 0 {
        tracing::debug!(user_id, balance, magnitude, "spend rejected, insufficient balance");
        return Ok(AppendOutcome::InsufficientBalance { balance });
    }

    let (ref_id, ref_type) = match reference {
        Some((id, ty)) => (Some(id), Some(ty)),
        None => (None, None),
    };
    let row = sqlx::query_as::<_, PointTransaction>(&format!(
        "INSERT INTO point_transactions
             (user_id, amount, kind, ref_id, ref_type, description, balance_after)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {COLUMNS}"
    ))
    .bind(user_id)
    .bind(magnitude)
    .bind(kind)
    .bind(ref_id)
    .bind(ref_type)
    .bind(description)
    .bind(next)
    .fetch_one(&mut *conn)
    .await?;
    Ok(AppendOutcome::Appended(row))
}

impl Database {
    /// Current balance: the latest row's snapshot, or 0 with no history.
    /// Read-only, no locking.
    pub async fn balance(&self, user_id: i64) -> Result<i64> {
        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT balance_after FROM point_transactions
             WHERE user_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(latest.unwrap_or(0))
    }

    /// Transaction history, newest first.
    pub async fn point_history(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PointTransaction>> {
        let rows = sqlx::query_as::<_, PointTransaction>(&format!(
            "SELECT {COLUMNS} FROM point_transactions
             WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Lifetime earned/spent totals for a user.
    pub async fn point_stats(&self, user_id: i64) -> Result<PointStats> {
        let stats = sqlx::query_as::<_, PointStats>(
            "SELECT
                 COALESCE(SUM(amount) FILTER (WHERE kind IN ('earn', 'refund', 'bonus')), 0)::BIGINT AS earned,
                 COALESCE(SUM(amount) FILTER (WHERE kind = 'spend'), 0)::BIGINT AS spent
             FROM point_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(stats)
    }
}
