//! Time and identifier source.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, DurationRound, Utc};
use uuid::Uuid;

/// Supplies timestamps and opaque identifiers to the services.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// A fresh random identifier (at least 96 bits of entropy).
    fn new_id(&self) -> String;
}

/// Wall-clock backed [`Clock`].
///
/// Timestamps are truncated to microseconds and never repeat or go backwards
/// for a given instance: a reading that does not advance past the previous one
/// is bumped by one microsecond.
#[derive(Debug)]
pub struct SystemClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { last: Mutex::new(None) }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = Duration::microseconds(1);
        let wall = Utc::now();
        let wall = wall.duration_trunc(tick).unwrap_or(wall);

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = match *last {
            Some(prev) if wall <= prev => prev + tick,
            _ => wall,
        };
        *last = Some(now);
        now
    }

    fn new_id(&self) -> String {
        // v4 UUIDs carry 122 random bits from the OS CSPRNG.
        Uuid::new_v4().simple().to_string()
    }
}
