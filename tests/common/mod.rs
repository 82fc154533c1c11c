//! Shared test helpers for integration tests.

#![allow(dead_code)]

use clover::clock::DayClock;
use clover::db::Database;
use clover::rewards::RewardService;
use tokio::sync::OnceCell;

/// One-time schema initialization, shared by all tests in the binary.
static SCHEMA_INIT: OnceCell<()> = OnceCell::const_new();

/// Returns the test database URL from the `TEST_DATABASE_URL` environment
/// variable. Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// Connect to the test database, ensure the schema exists (migrations run
/// once per test binary), and truncate all tables for isolation.
///
/// Truncation means tests sharing the database must run single-threaded:
///   cargo test --test ledger_integration -- --test-threads=1
pub async fn setup_test_db() -> Database {
    let db = Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    SCHEMA_INIT
        .get_or_init(|| async {
            db.run_migrations().await.expect("migrations failed");
        })
        .await;
    truncate_all_tables(db.pool()).await;
    db
}

/// A reward service over the test database with the clock pinned to `day`.
pub async fn service_on_day(day: chrono::NaiveDate) -> RewardService {
    let db = setup_test_db().await;
    RewardService::new(db, DayClock::pinned(day))
}

/// A reward service sharing `db` (no truncation) pinned to `day`, for
/// multi-day sequences within one test.
pub fn service_for(db: &Database, day: chrono::NaiveDate) -> RewardService {
    RewardService::new(db.clone(), DayClock::pinned(day))
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql(
        "TRUNCATE TABLE pair_daily_counters, pair_states, point_transactions,
                        daily_counters, mascot_experience CASCADE",
    )
    .execute(pool)
    .await
    .unwrap();
}

/// An arbitrary fixed day for tests that don't cross day boundaries.
pub fn some_day() -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}
