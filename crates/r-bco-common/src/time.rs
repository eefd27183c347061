//! ---
//! bco_section: "01-core-functionality"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Shared primitives and utilities for the continuity engine."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of "now" for every engine component. Nothing in the engine reads the
/// wall clock directly.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Shared handle passed to engine components.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock implementation used by the daemon and CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Move the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        let mut current = self.current.lock();
        *current += to_chrono(step);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.current.lock() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

/// Convert a std duration into a chrono delta, clamping to roughly a century.
pub fn to_chrono(duration: Duration) -> chrono::Duration {
    let clamped = duration.min(Duration::from_secs(u64::from(u32::MAX)));
    chrono::Duration::from_std(clamped).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Elapsed time between two instants; zero when `later` precedes `earlier`.
pub fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or_default()
}

/// Convert a duration into milliseconds, saturating at `u64::MAX`.
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap()
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(epoch());
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now(), epoch() + chrono::Duration::milliseconds(1500));
    }

    #[test]
    fn elapsed_is_zero_for_reversed_instants() {
        let later = epoch() + chrono::Duration::seconds(5);
        assert_eq!(elapsed_between(epoch(), later), Duration::from_secs(5));
        assert_eq!(elapsed_between(later, epoch()), Duration::ZERO);
    }

    #[test]
    fn millis_saturate() {
        assert_eq!(duration_to_millis(Duration::from_millis(42)), 42);
        assert_eq!(duration_to_millis(Duration::MAX), u64::MAX);
    }
}
