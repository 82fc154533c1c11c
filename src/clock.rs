//! Day-key resolution in a single fixed civil timezone.
//!
//! Every daily counter lookup and creation must go through one clock so that
//! concurrent requests near a day boundary agree on the partition key. The
//! deployment runs on a single civil calendar (UTC+09:00); the caller's
//! locale is irrelevant.

use chrono::{FixedOffset, NaiveDate, Utc};

/// Civil timezone offset of the deployment, in hours east of UTC.
pub const CIVIL_OFFSET_HOURS: i32 = 9;

/// Resolves "today" for daily counter partitioning.
#[derive(Debug, Clone, Copy)]
pub struct DayClock(Source);

#[derive(Debug, Clone, Copy)]
enum Source {
    Wall(FixedOffset),
    Pinned(NaiveDate),
}

impl DayClock {
    pub fn new(offset: FixedOffset) -> Self {
        DayClock(Source::Wall(offset))
    }

    /// A clock pinned to a specific day. Used by tests and backfill tooling;
    /// production callers use [`DayClock::default`].
    pub fn pinned(day: NaiveDate) -> Self {
        DayClock(Source::Pinned(day))
    }

    /// The current date in the fixed civil timezone.
    pub fn today(&self) -> NaiveDate {
        match self.0 {
            Source::Wall(offset) => Utc::now().with_timezone(&offset).date_naive(),
            Source::Pinned(day) => day,
        }
    }
}

impl Default for DayClock {
    fn default() -> Self {
        let offset = FixedOffset::east_opt(CIVIL_OFFSET_HOURS * 3600)
            .expect("civil offset within valid range");
        DayClock::new(offset)
    }
}
