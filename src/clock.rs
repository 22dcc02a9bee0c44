//! Write timestamps. Replicas resolve conflicting writes to the same key by keeping the one with
//! the latest timestamp, so every router should stamp from a clock that has been corrected for
//! local skew.

use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Milliseconds since the unix epoch.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WriteTimestamp(i64);

impl WriteTimestamp {
    pub fn from_millis(millis: i64) -> Self {
        WriteTimestamp(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for WriteTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

pub trait TimestampSource: Send + Sync {
    fn now(&self) -> WriteTimestamp;
}

/// Wall clock plus a correction offset. The offset is owned by whatever process syncs us against
/// a network time source; until it reports, the correction is zero.
#[derive(Default)]
pub struct SkewCorrectedClock {
    correction_millis: AtomicI64,
}

impl SkewCorrectedClock {
    pub fn new() -> Self {
        SkewCorrectedClock {
            correction_millis: AtomicI64::new(0),
        }
    }

    pub fn set_correction(&self, correction: chrono::Duration) {
        self.correction_millis
            .store(correction.num_milliseconds(), Ordering::Release);
    }

    pub fn correction(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.correction_millis.load(Ordering::Acquire))
    }
}

impl TimestampSource for SkewCorrectedClock {
    fn now(&self) -> WriteTimestamp {
        let local = Utc::now().timestamp_millis();
        WriteTimestamp::from_millis(local + self.correction_millis.load(Ordering::Acquire))
    }
}
