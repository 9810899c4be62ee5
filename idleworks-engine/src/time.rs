//! Engine clock primitives.
//!
//! The engine never reads a wall clock. Drivers pass one `Timestamp` down
//! through every call tree so tick and reconciliation agree on "now".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::time::Duration;

use crate::numbers::saturating_u128_to_u64;

/// Milliseconds on a monotonic engine clock.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, zero when `earlier` lies in the future.
    #[must_use]
    pub const fn saturating_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// Advance by `by`, saturating at the end of the clock.
    #[must_use]
    pub fn saturating_add(self, by: Duration) -> Self {
        Self(self.0.saturating_add(saturating_u128_to_u64(by.as_millis())))
    }

    /// Step back by `by`, saturating at zero.
    #[must_use]
    pub fn saturating_sub(self, by: Duration) -> Self {
        Self(self.0.saturating_sub(saturating_u128_to_u64(by.as_millis())))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{}ms", self.0)
    }
}

/// Whole intervals contained in `elapsed`.
#[must_use]
pub fn whole_intervals(elapsed: Duration, interval: Duration) -> u64 {
    let step = interval.as_millis();
    if step == 0 {
        return 0;
    }
    saturating_u128_to_u64(elapsed.as_millis() / step)
}

/// `interval * count` without overflow panics.
#[must_use]
pub fn interval_span(interval: Duration, count: u64) -> Duration {
    let millis = interval.as_millis().saturating_mul(u128::from(count));
    Duration::from_millis(saturating_u128_to_u64(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_saturates_for_future_reference() {
        let early = Timestamp::from_secs(10);
        let late = Timestamp::from_secs(15);
        assert_eq!(late.saturating_since(early), Duration::from_secs(5));
        assert_eq!(early.saturating_since(late), Duration::ZERO);
    }

    #[test]
    fn whole_intervals_floors() {
        assert_eq!(
            whole_intervals(Duration::from_millis(7_250), Duration::from_secs(1)),
            7
        );
        assert_eq!(whole_intervals(Duration::from_secs(5), Duration::ZERO), 0);
    }

    #[test]
    fn interval_span_multiplies() {
        assert_eq!(
            interval_span(Duration::from_secs(60), 720),
            Duration::from_secs(43_200)
        );
    }

    #[test]
    fn timestamp_serializes_as_plain_millis() {
        let json = serde_json::to_string(&Timestamp::from_millis(1_500)).unwrap();
        assert_eq!(json, "1500");
    }
}
