//! Time constants and wall-clock representation.

/// Nanoseconds per second
pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Nanoseconds per millisecond
pub const NS_PER_MS: u64 = 1_000_000;

/// Nanoseconds per microsecond
pub const NS_PER_US: u64 = 1_000;

static_assertions::const_assert_eq!(NS_PER_SEC, 1_000 * NS_PER_MS);
static_assertions::const_assert_eq!(NS_PER_MS, 1_000 * NS_PER_US);

/// Wall-clock time (seconds and nanoseconds since the Unix epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WallTime {
    /// Whole seconds since the epoch
    pub secs: u64,
    /// Sub-second nanoseconds (0-999_999_999)
    pub nanos: u32,
}

impl WallTime {
    /// Build from nanoseconds since the epoch
    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self {
            secs: nanos / NS_PER_SEC,
            nanos: (nanos % NS_PER_SEC) as u32,
        }
    }

    /// Total nanoseconds since the epoch (saturating)
    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.secs
            .saturating_mul(NS_PER_SEC)
            .saturating_add(self.nanos as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_time_split() {
        let t = WallTime::from_nanos(3 * NS_PER_SEC + 250);
        assert_eq!(t.secs, 3);
        assert_eq!(t.nanos, 250);
        assert_eq!(t.as_nanos(), 3 * NS_PER_SEC + 250);
    }
}
