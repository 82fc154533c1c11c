//! Property-based tests for the ledger's pure primitives.
//!
//! No database or network access required; these always run. Each property
//! is named `prop_<function>_<invariant>`.
//!
//! ```bash
//! cargo test --test property_tests
//! PROPTEST_CASES=10000 cargo test --test property_tests
//! ```

use proptest::prelude::*;

use clover::db::{canonical_pair, level_for, remaining_from_count, PointKind};
use clover::LIKE_DAILY_CAP;

proptest! {
    /// canonical_pair is symmetric: both argument orders name the same row.
    #[test]
    fn prop_canonical_pair_symmetric(a in 0i64..1_000_000, b in 0i64..1_000_000) {
        prop_assume!(a != b);
        prop_assert_eq!(canonical_pair(a, b), canonical_pair(b, a));
    }

    /// canonical_pair orders strictly and preserves both members.
    #[test]
    fn prop_canonical_pair_ordered(a in 0i64..1_000_000, b in 0i64..1_000_000) {
        prop_assume!(a != b);
        let (low, high) = canonical_pair(a, b);
        prop_assert!(low < high);
        prop_assert!((low == a && high == b) || (low == b && high == a));
    }

    /// The derived level brackets its experience: level L covers
    /// [(L-1)*100, L*100).
    #[test]
    fn prop_level_brackets_experience(exp in 0i64..100_000_000) {
        let level = level_for(exp);
        prop_assert!(level >= 1);
        prop_assert!((level - 1) * 100 <= exp);
        prop_assert!(exp < level * 100);
    }

    /// Adding experience never lowers the level.
    #[test]
    fn prop_level_monotonic(exp in 0i64..100_000_000, gain in 1i64..10_000) {
        prop_assert!(level_for(exp + gain) >= level_for(exp));
    }

    /// Remaining allowance is clamped to [0, cap] for any observed count.
    #[test]
    fn prop_remaining_allowance_clamped(count in 0i64..1_000_000) {
        let remaining = remaining_from_count(count);
        prop_assert!((0..=LIKE_DAILY_CAP).contains(&remaining));
        prop_assert_eq!(remaining == 0, count >= LIKE_DAILY_CAP);
    }

    /// Spends subtract, every other kind adds, magnitude preserved.
    #[test]
    fn prop_point_kind_sign(magnitude in 1i64..1_000_000) {
        prop_assert_eq!(PointKind::Spend.signed(magnitude), -magnitude);
        for kind in [PointKind::Earn, PointKind::Refund, PointKind::Bonus] {
            prop_assert_eq!(kind.signed(magnitude), magnitude);
        }
    }
}

#[test]
fn level_reference_vector() {
    // The canonical formula checkpoints: 0→1, 99→1, 100→2, 250→3.
    assert_eq!(level_for(0), 1);
    assert_eq!(level_for(99), 1);
    assert_eq!(level_for(100), 2);
    assert_eq!(level_for(250), 3);
}
