//! Reward orchestration — turns triggering events into locked, atomic
//! ledger mutations.
//!
//! Every operation runs in exactly one transaction shaped as
//! lock → decide → mutate → credit → persist → commit, so a counter mark
//! and its experience/point credit either both land or both roll back.
//! Business-expected outcomes (already awarded, reduced tier, insufficient
//! balance, missing mascot) are typed values, never errors; only true faults
//! (connection loss, retry exhaustion, impossible states) propagate as `Err`.

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::DayClock;
use crate::db::{
    daily_counters, experience, pairs, points, AppendOutcome, ChallengeCategory, Database,
    PointKind, PointTransaction, RewardTier,
};
use crate::{
    ATTENDANCE_EXP, ATTENDANCE_POINTS, CHALLENGE_EXP, FRIEND_ACTIVE_FULL_EXP,
    FRIEND_ACTIVE_REDUCED_EXP, FRIEND_PASSIVE_EXP, LIKE_FULL_EXP, LIKE_REDUCED_EXP,
    STREAK_BONUS_EXP, STREAK_LENGTH,
};

/// Reward category attached to award results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardCategory {
    Attendance,
    StreakBonus,
    FriendActive,
    FriendPassive,
    Challenge,
    Like,
}

/// Tri-state result of one eligibility evaluation.
///
/// `SkippedNoMascot` is deliberately distinct from `NotEligible`: the
/// eligibility flag was consumed but the user had no mascot to receive the
/// experience. The experience is lost, not deferred — a retry after mascot
/// creation returns `NotEligible` rather than re-awarding.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AwardOutcome {
    Awarded {
        category: RewardCategory,
        exp: i64,
        points: i64,
        total_experience: i64,
        level: i64,
    },
    NotEligible,
    SkippedNoMascot {
        category: RewardCategory,
        points: i64,
    },
}

impl AwardOutcome {
    pub fn is_awarded(&self) -> bool {
        matches!(self, AwardOutcome::Awarded { .. })
    }
}

/// Result of a daily check-in: the attendance one-shot plus the streak bonus,
/// both evaluated under the same counter lock. `streak_days` counts the
/// consecutive attended days ending today.
#[derive(Debug, Clone, Serialize)]
pub struct CheckInAward {
    pub attendance: AwardOutcome,
    pub streak: AwardOutcome,
    pub streak_days: i64,
}

/// Result of a friend interaction: a tiered sender-side award and a fixed
/// receiver-side award.
#[derive(Debug, Clone, Serialize)]
pub struct FriendInteractionAward {
    pub active: AwardOutcome,
    pub passive: AwardOutcome,
}

/// Result of a like: the throttle tier this call landed in and the sender's
/// award.
#[derive(Debug, Clone, Serialize)]
pub struct LikeAward {
    pub tier: RewardTier,
    pub outcome: AwardOutcome,
}

/// Result of a point spend. Insufficient balance is a business outcome the
/// trigger source surfaces to its caller, not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SpendOutcome {
    Spent(PointTransaction),
    InsufficientBalance { balance: i64, requested: i64 },
}

/// The use-case layer over the ledger tables. Cheap to clone; all state
/// lives in the database.
#[derive(Clone)]
pub struct RewardService {
    db: Database,
    clock: DayClock,
}

impl RewardService {
    pub fn new(db: Database, clock: DayClock) -> Self {
        RewardService { db, clock }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Process a daily attendance check-in.
    ///
    /// Attendance earns points even when the user has no mascot — the point
    /// entry is the durable record of the award — and the flag is marked
    /// regardless, so a retry after mascot creation does not re-award.
    pub async fn check_in(&self, user_id: i64) -> Result<CheckInAward> {
        let day = self.clock.today();
        let mut tx = self.db.pool().begin().await?;
        let mut counter = daily_counters::get_or_create_locked(&mut tx, user_id, day).await?;

        let attendance = if counter.mark_attendance() {
            match points::append(
                &mut tx,
                user_id,
                ATTENDANCE_POINTS,
                PointKind::Earn,
                Some((counter.id, "attendance")),
                "daily attendance",
            )
            .await?
            {
                AppendOutcome::Appended(_) => {}
                AppendOutcome::InsufficientBalance { .. } => {
                    bail!("earn rejected for insufficient balance; ledger state is corrupt")
                }
            }
            self.credit(&mut tx, user_id, RewardCategory::Attendance, ATTENDANCE_EXP, ATTENDANCE_POINTS)
                .await?
        } else {
            AwardOutcome::NotEligible
        };

        // The streak includes today once attendance is marked, whether it was
        // marked by this call or an earlier one.
        let streak_days = match day.pred_opt() {
            Some(prev) => daily_counters::current_streak(&mut tx, user_id, prev).await? + 1,
            None => 1,
        };
        let streak = if streak_days >= STREAK_LENGTH && counter.mark_streak_bonus() {
            self.credit(&mut tx, user_id, RewardCategory::StreakBonus, STREAK_BONUS_EXP, 0)
                .await?
        } else {
            AwardOutcome::NotEligible
        };

        daily_counters::persist(&mut tx, &counter).await?;
        tx.commit().await?;
        info!(
            user_id,
            %day,
            attendance_awarded = attendance.is_awarded(),
            streak_days,
            "check-in processed"
        );
        Ok(CheckInAward { attendance, streak, streak_days })
    }

    /// Mark one challenge category completed for today (one-shot per
    /// category per day).
    pub async fn complete_challenge(
        &self,
        user_id: i64,
        category: ChallengeCategory,
    ) -> Result<AwardOutcome> {
        let day = self.clock.today();
        let mut tx = self.db.pool().begin().await?;
        let mut counter = daily_counters::get_or_create_locked(&mut tx, user_id, day).await?;

        let outcome = if counter.mark_challenge(category) {
            self.credit(&mut tx, user_id, RewardCategory::Challenge, CHALLENGE_EXP, 0)
                .await?
        } else {
            AwardOutcome::NotEligible
        };

        daily_counters::persist(&mut tx, &counter).await?;
        tx.commit().await?;
        debug!(user_id, %day, category = category.as_str(), awarded = outcome.is_awarded(), "challenge completion processed");
        Ok(outcome)
    }

    /// Process a friend interaction: the sender earns a tiered active award,
    /// the receiver a fixed passive award, each against its own locked
    /// counter row.
    pub async fn friend_interaction(
        &self,
        sender_id: i64,
        receiver_id: i64,
    ) -> Result<FriendInteractionAward> {
        if sender_id == receiver_id {
            bail!("friend interaction requires two distinct users, got {sender_id}");
        }
        let day = self.clock.today();
        let mut tx = self.db.pool().begin().await?;

        // Lock the two counter rows in ascending user-id order so concurrent
        // reciprocal interactions cannot deadlock.
        let (mut sender_counter, mut receiver_counter) = if sender_id < receiver_id {
            let s = daily_counters::get_or_create_locked(&mut tx, sender_id, day).await?;
            let r = daily_counters::get_or_create_locked(&mut tx, receiver_id, day).await?;
            (s, r)
        } else {
            let r = daily_counters::get_or_create_locked(&mut tx, receiver_id, day).await?;
            let s = daily_counters::get_or_create_locked(&mut tx, sender_id, day).await?;
            (s, r)
        };

        let tier = sender_counter.increment_friend_active();
        let active_exp = match tier {
            RewardTier::Full => FRIEND_ACTIVE_FULL_EXP,
            RewardTier::Reduced => FRIEND_ACTIVE_REDUCED_EXP,
        };
        let active = self
            .credit(&mut tx, sender_id, RewardCategory::FriendActive, active_exp, 0)
            .await?;

        receiver_counter.increment_friend_passive();
        let passive = self
            .credit(&mut tx, receiver_id, RewardCategory::FriendPassive, FRIEND_PASSIVE_EXP, 0)
            .await?;

        daily_counters::persist(&mut tx, &sender_counter).await?;
        daily_counters::persist(&mut tx, &receiver_counter).await?;
        tx.commit().await?;
        debug!(sender_id, receiver_id, %day, ?tier, "friend interaction processed");
        Ok(FriendInteractionAward { active, passive })
    }

    /// Record a like through the pairwise throttle. The first like per
    /// direction per day is full-value; repeats are reduced, never blocked.
    pub async fn record_like(&self, sender_id: i64, receiver_id: i64) -> Result<LikeAward> {
        if sender_id == receiver_id {
            bail!("like requires two distinct users, got {sender_id}");
        }
        let day = self.clock.today();
        let mut tx = self.db.pool().begin().await?;

        let tier = pairs::record_interaction(&mut tx, sender_id, receiver_id, day).await?;
        let exp = match tier {
            RewardTier::Full => LIKE_FULL_EXP,
            RewardTier::Reduced => LIKE_REDUCED_EXP,
        };
        let outcome = self
            .credit(&mut tx, sender_id, RewardCategory::Like, exp, 0)
            .await?;

        tx.commit().await?;
        debug!(sender_id, receiver_id, %day, ?tier, "like processed");
        Ok(LikeAward { tier, outcome })
    }

    /// Spend points from a user's balance. A shortfall leaves the ledger
    /// untouched and reports the current balance.
    pub async fn spend_points(
        &self,
        user_id: i64,
        amount: i64,
        reference: Option<(i64, &str)>,
        description: &str,
    ) -> Result<SpendOutcome> {
        if amount <= 0 {
            bail!("spend amount must be positive, got {amount}");
        }
        let mut tx = self.db.pool().begin().await?;
        match points::append(&mut tx, user_id, amount, PointKind::Spend, reference, description)
            .await?
        {
            AppendOutcome::Appended(row) => {
                tx.commit().await?;
                info!(user_id, amount, balance = row.balance_after, "points spent");
                Ok(SpendOutcome::Spent(row))
            }
            AppendOutcome::InsufficientBalance { balance } => {
                tx.rollback().await?;
                Ok(SpendOutcome::InsufficientBalance { balance, requested: amount })
            }
        }
    }

    /// Remaining full-allowance likes from `sender_id` toward `receiver_id`
    /// today.
    pub async fn remaining_likes(&self, sender_id: i64, receiver_id: i64) -> Result<i64> {
        self.db
            .remaining_likes(sender_id, receiver_id, self.clock.today())
            .await
    }

    /// Credit experience for one decided-eligible award. Returns the
    /// tri-state outcome: `SkippedNoMascot` when the user has no mascot row
    /// (the eligibility mutation stands either way).
    async fn credit(
        &self,
        conn: &mut sqlx::PgConnection,
        user_id: i64,
        category: RewardCategory,
        exp: i64,
        points: i64,
    ) -> Result<AwardOutcome> {
        match experience::add_experience(conn, user_id, exp).await? {
            Some((total_experience, level)) => Ok(AwardOutcome::Awarded {
                category,
                exp,
                points,
                total_experience,
                level,
            }),
            None => {
                debug!(user_id, ?category, "no mascot, experience skipped");
                Ok(AwardOutcome::SkippedNoMascot { category, points })
            }
        }
    }
}
