//! Absolute real-time deadlines.

use std::fmt;
use std::time::Duration;

/// Nanoseconds in one second.
pub const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A point on the real-time clock: whole seconds plus nanoseconds since
/// the Unix epoch.
///
/// The nanosecond field is always in `[0, 1e9)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timespec {
    secs: i64,
    nanos: u32,
}

impl Timespec {
    /// The Unix epoch.
    pub const ZERO: Self = Self { secs: 0, nanos: 0 };

    /// The latest representable instant.
    pub const MAX: Self = Self {
        secs: i64::MAX,
        nanos: NANOS_PER_SEC - 1,
    };

    /// Creates a timespec, carrying excess nanoseconds into seconds.
    #[must_use]
    pub const fn new(secs: i64, nanos: u32) -> Self {
        let carry = (nanos / NANOS_PER_SEC) as i64;
        Self {
            secs: secs.saturating_add(carry),
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    /// Returns the whole seconds.
    #[must_use]
    pub const fn secs(self) -> i64 {
        self.secs
    }

    /// Returns the sub-second nanoseconds.
    #[must_use]
    pub const fn nanos(self) -> u32 {
        self.nanos
    }

    /// Computes the absolute deadline `timeout` after `self`.
    ///
    /// Seconds and nanoseconds are added componentwise; a nanosecond sum
    /// of one billion or more carries one second. Saturates at
    /// [`Timespec::MAX`] instead of wrapping.
    #[must_use]
    pub fn deadline_after(self, timeout: Duration) -> Self {
        let add_secs = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
        let mut secs = self.secs.saturating_add(add_secs);
        // Both operands are below 1e9, so at most one carry.
        let mut nanos = self.nanos + timeout.subsec_nanos();
        if nanos >= NANOS_PER_SEC {
            nanos -= NANOS_PER_SEC;
            if secs == i64::MAX {
                return Self::MAX;
            }
            secs += 1;
        }
        Self { secs, nanos }
    }

    /// Returns how far `self` lies after `earlier`, or zero if it does not.
    #[must_use]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        if self <= earlier {
            return Duration::ZERO;
        }
        let (secs, nanos) = if self.nanos >= earlier.nanos {
            (self.secs - earlier.secs, self.nanos - earlier.nanos)
        } else {
            (
                self.secs - earlier.secs - 1,
                self.nanos + NANOS_PER_SEC - earlier.nanos,
            )
        };
        Duration::new(u64::try_from(secs).unwrap_or(u64::MAX), nanos)
    }

    /// Converts to the platform `timespec`, saturating at `time_t::MAX`.
    #[must_use]
    pub fn to_libc(self) -> libc::timespec {
        let tv_sec = libc::time_t::try_from(self.secs).unwrap_or(if self.secs < 0 {
            libc::time_t::MIN
        } else {
            libc::time_t::MAX
        });
        libc::timespec {
            tv_sec,
            // Always below 1e9, which fits every platform's tv_nsec.
            tv_nsec: self.nanos as _,
        }
    }

    /// Converts from the platform `timespec`.
    ///
    /// Out-of-range nanoseconds are normalized the same way as [`Timespec::new`].
    #[must_use]
    pub fn from_libc(ts: libc::timespec) -> Self {
        let nanos = u32::try_from(ts.tv_nsec).unwrap_or(0);
        Self::new(i64::from(ts.tv_sec), nanos)
    }
}

impl fmt::Display for Timespec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}
