//! # Database — PostgreSQL Ledger Storage
//!
//! Async storage layer for the reward ledger via `sqlx::PgPool`.
//!
//! ## Schema
//!
//! - `mascot_experience`: per-user cumulative experience and derived level
//! - `daily_counters`: one row per (user, day) of eligibility flags/counts
//! - `point_transactions`: append-only point ledger with balance snapshots
//! - `pair_states`: one row per unordered user pair (canonical ordering)
//! - `pair_daily_counters`: per (directed pair, day) like counts
//!
//! ## Module structure
//!
//! - [`daily_counters`] — get-or-create-under-lock and in-place eligibility
//! - [`experience`] — atomic experience increments with derived level
//! - [`points`] — append-under-lock ledger plus read paths
//! - [`pairs`] — canonical pair ordering and the like throttle rows
//!
//! ## Locking convention
//!
//! Operations that participate in an award decision take `&mut PgConnection`
//! and run inside the caller's transaction; the row locks they acquire are
//! held until that transaction commits. Read-only queries are methods on
//! [`Database`] and go straight to the pool.

pub mod daily_counters;
pub mod experience;
pub mod pairs;
pub mod points;

pub use experience::level_for;
pub use pairs::{canonical_pair, remaining_from_count};
pub use points::AppendOutcome;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

/// Embedded schema migrations, applied in order by [`Database::run_migrations`].
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_ledger.sql",
    include_str!("../../migrations/001_create_ledger.sql"),
)];

// ── Mascot experience ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MascotExperience {
    pub user_id: i64,
    pub experience: i64,
    pub level: i64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

// ── Daily counters ──────────────────────────────────────────────

/// One user's reward-eligibility state for one calendar day.
///
/// Fetched under `FOR UPDATE` by [`daily_counters::get_or_create_locked`],
/// mutated in place, and written back by [`daily_counters::persist`] while
/// the lock is still held. Flags only transition false→true; counts only
/// grow. A new day gets a fresh row, the old row is never reset.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyCounter {
    pub id: i64,
    pub user_id: i64,
    pub day: NaiveDate,
    pub attended: bool,
    pub streak_bonus: bool,
    pub challenge_exercise: bool,
    pub challenge_study: bool,
    pub challenge_diet: bool,
    pub challenge_hobby: bool,
    pub friend_active_count: i32,
    pub friend_passive_count: i32,
}

/// Challenge categories, one one-shot daily flag each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeCategory {
    Exercise,
    Study,
    Diet,
    Hobby,
}

impl ChallengeCategory {
    pub const ALL: [ChallengeCategory; 4] = [
        ChallengeCategory::Exercise,
        ChallengeCategory::Study,
        ChallengeCategory::Diet,
        ChallengeCategory::Hobby,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeCategory::Exercise => "exercise",
            ChallengeCategory::Study => "study",
            ChallengeCategory::Diet => "diet",
            ChallengeCategory::Hobby => "hobby",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

/// Reward tier for a repeatable action: full value until the daily quota is
/// spent, reduced afterwards. Never a hard block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardTier {
    Full,
    Reduced,
}

// ── Point ledger ────────────────────────────────────────────────

/// Transaction kind; determines the sign applied to the stored magnitude.
/// Stored in the plain TEXT `kind` column, not a Postgres enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Earn,
    Spend,
    Refund,
    Bonus,
}

impl PointKind {
    /// Signed delta this kind applies to the running balance.
    pub fn signed(&self, magnitude: i64) -> i64 {
        match self {
            PointKind::Spend => -magnitude,
            PointKind::Earn | PointKind::Refund | PointKind::Bonus => magnitude,
        }
    }
}

/// An immutable ledger row. `balance_after` is the running balance snapshot,
/// so "current balance" never requires summation.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PointTransaction {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub kind: PointKind,
    pub ref_id: Option<i64>,
    pub ref_type: Option<String>,
    pub description: String,
    pub balance_after: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Earned/spent totals per user, for the stats read path.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PointStats {
    pub earned: i64,
    pub spent: i64,
}

// ── Pairwise throttle ───────────────────────────────────────────

/// One row per unordered user pair. `user_low < user_high` always holds;
/// that ordering is what makes concurrent reciprocal interactions acquire
/// the lock in the same global order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PairState {
    pub id: i64,
    pub user_low: i64,
    pub user_high: i64,
    pub last_sender: i64,
}

/// Per (directed sender→receiver pair, day) like count.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PairDailyCounter {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub day: NaiveDate,
    pub count: i32,
}

// ── Database struct and connection ──────────────────────────────

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// Manually parses the URL so that usernames carrying a pooler suffix
    /// (e.g. `user.project-ref`) survive — sqlx's built-in parser strips it.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = url::Url::parse(database_url).context("invalid database URL")?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username)
            .statement_cache_capacity(0);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply all embedded schema migrations, in order. Idempotent.
    pub async fn run_migrations(&self) -> Result<()> {
        for (name, sql) in MIGRATIONS {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration {name} failed"))?;
            tracing::debug!(migration = name, "applied");
        }
        Ok(())
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
