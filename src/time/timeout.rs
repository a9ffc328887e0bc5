//! The three wait modes.

use std::fmt;
use std::time::Duration;

use super::deadline::NANOS_PER_SEC;
use crate::error::{Error, Operation, Result};

/// How long a wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Timeout {
    /// Block until a permit is available. Never times out.
    #[default]
    Infinite,
    /// Take a permit if one is available, otherwise fail at once.
    Immediate,
    /// Block until a permit is available or the duration, measured on the
    /// real-time clock from the moment of the call, elapses.
    After(Duration),
}

impl Timeout {
    /// Maps a floating-point timeout in seconds onto a wait mode.
    ///
    /// Negative (including `-inf`) blocks indefinitely, zero (either sign)
    /// polls, and a positive value is a relative deadline. `+inf` also
    /// blocks indefinitely. The fractional part is truncated to whole
    /// nanoseconds.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `secs` is NaN.
    pub fn from_secs_f64(secs: f64) -> Result<Self> {
        if secs.is_nan() {
            return Err(Error::invalid_argument(
                Operation::Wait,
                "timeout is not a number",
            ));
        }
        if secs < 0.0 || secs == f64::INFINITY {
            return Ok(Self::Infinite);
        }
        if secs == 0.0 {
            return Ok(Self::Immediate);
        }
        let whole = secs.trunc();
        // Float-to-int casts saturate; anything past u64::MAX seconds is
        // beyond any clock anyway.
        let whole_secs = whole as u64;
        let frac_nanos = (((secs - whole) * f64::from(NANOS_PER_SEC)) as u32).min(NANOS_PER_SEC - 1);
        Ok(Self::After(Duration::new(whole_secs, frac_nanos)))
    }

    /// Returns the timeout as floating-point seconds, using the same sign
    /// convention as [`Timeout::from_secs_f64`].
    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        match self {
            Self::Infinite => -1.0,
            Self::Immediate => 0.0,
            Self::After(d) => d.as_secs_f64(),
        }
    }

    /// Returns true if the wait never suspends.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }

    /// Returns the relative duration of a timed wait.
    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        match self {
            Self::After(d) => Some(*d),
            Self::Infinite | Self::Immediate => None,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::After(d)
    }
}

impl From<Option<Duration>> for Timeout {
    /// `None` blocks indefinitely.
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Self::Infinite, Self::After)
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => f.write_str("infinite"),
            Self::Immediate => f.write_str("immediate"),
            Self::After(d) => write!(f, "{d:?}"),
        }
    }
}
