//! Wall clock used for cooldown checks

use chrono::{NaiveDateTime, Utc};

/// Source of the current time.
///
/// Timestamps are naive UTC so writes and comparisons agree no matter
/// which zone the process runs in.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}
