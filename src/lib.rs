//! # Clover — Daily Reward & Interaction Throttle Ledger
//!
//! Grants experience and points for user actions (attendance, streak bonuses,
//! friend interactions, challenge completions) exactly once per eligible unit
//! of time, under concurrent requests, backed by PostgreSQL row locks.
//!
//! ## Layers
//!
//! - [`clock`] — single-timezone day-key resolution; every daily counter is
//!   partitioned by the date this clock reports.
//! - [`db`] — the storage layer: locked daily counters, the mascot experience
//!   store, the append-only point ledger, and the pairwise like throttle.
//! - [`rewards`] — the orchestrator: one transaction per triggering event,
//!   lock → decide → mutate → credit → commit.
//!
//! Correctness comes entirely from the database's pessimistic row locks; the
//! crate holds no process-wide mutable state, so it is safe to run multiple
//! instances against the same database.

pub mod clock;
pub mod db;
pub mod rewards;

// ── Reward amount table ─────────────────────────────────────────
//
// The orchestrator enforces these atomically per locked counter row.

/// Experience for the daily attendance check-in (one-shot per day).
pub const ATTENDANCE_EXP: i64 = 10;

/// Points for the daily attendance check-in, ledgered even when the user has
/// no mascot to receive the experience.
pub const ATTENDANCE_POINTS: i64 = 10;

/// Bonus experience once the attendance streak reaches [`STREAK_LENGTH`].
pub const STREAK_BONUS_EXP: i64 = 50;

/// Consecutive attended days required for the streak bonus.
pub const STREAK_LENGTH: i64 = 7;

/// Sender-side experience for a friend interaction within the daily quota.
pub const FRIEND_ACTIVE_FULL_EXP: i64 = 5;

/// Sender-side experience once the daily quota is exhausted.
pub const FRIEND_ACTIVE_REDUCED_EXP: i64 = 1;

/// Full-value sender-side friend interactions per day.
pub const FRIEND_ACTIVE_DAILY_QUOTA: i32 = 3;

/// Receiver-side experience for a friend interaction (always eligible).
pub const FRIEND_PASSIVE_EXP: i64 = 2;

/// Experience for completing a challenge category (one-shot per category per day).
pub const CHALLENGE_EXP: i64 = 15;

/// Experience for the first like per directed pair per day.
pub const LIKE_FULL_EXP: i64 = 3;

/// Experience for repeat same-direction likes on the same day.
pub const LIKE_REDUCED_EXP: i64 = 1;

/// Daily cap used by remaining-allowance queries for the like throttle.
pub const LIKE_DAILY_CAP: i64 = 3;
