//! Wall-clock time as stored in snapshots and credential grants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Milliseconds since the Unix epoch.
///
/// Serialized as a bare integer so persisted records stay flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalTime {
    /// Milliseconds since the Unix epoch
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// Create a time from epoch milliseconds
    pub const fn from_millis(ts_ms: u64) -> Self {
        Self { ts_ms }
    }

    /// Create a time from epoch seconds
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            ts_ms: secs.saturating_mul(1000),
        }
    }

    /// Epoch seconds, truncated
    pub const fn as_secs(&self) -> u64 {
        self.ts_ms / 1000
    }

    /// This time moved forward by `duration`, saturating at the end of time
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Self {
            ts_ms: self.ts_ms.saturating_add(duration_ms(duration)),
        }
    }

    /// This time moved back by `duration`, saturating at the epoch
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        Self {
            ts_ms: self.ts_ms.saturating_sub(duration_ms(duration)),
        }
    }

    /// Time left until `later`, zero if `later` has already passed
    pub fn until(&self, later: PhysicalTime) -> Duration {
        Duration::from_millis(later.ts_ms.saturating_sub(self.ts_ms))
    }
}

impl fmt::Display for PhysicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.ts_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_saturates() {
        let t = PhysicalTime::from_secs(10);
        assert_eq!(t.saturating_sub(Duration::from_secs(60)).ts_ms, 0);
        assert_eq!(
            PhysicalTime::from_millis(u64::MAX)
                .saturating_add(Duration::from_secs(1))
                .ts_ms,
            u64::MAX
        );
        assert_eq!(t.until(PhysicalTime::from_secs(4)), Duration::ZERO);
        assert_eq!(t.until(PhysicalTime::from_secs(12)), Duration::from_secs(2));
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&PhysicalTime::from_millis(1234)).unwrap();
        assert_eq!(json, "1234");
    }
}
