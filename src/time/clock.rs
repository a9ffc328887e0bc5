//! Real-time clock sources for timed waits.
//!
//! Timed waits read "now" through the [`RealtimeClock`] trait, so the
//! deadline computation can run against either the system clock
//! (production) or a fixed, settable clock (tests).

#![allow(unsafe_code)]

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::deadline::Timespec;
use crate::error::{Error, Operation, Result};

/// Time source abstraction for reading the current real time.
///
/// Implementations must report time on the same scale as
/// `CLOCK_REALTIME`, since the resulting deadline is handed to
/// `sem_timedwait`.
pub trait RealtimeClock: Send + Sync {
    /// Returns the current time.
    ///
    /// # Errors
    ///
    /// `ClockUnavailable` if the time source cannot be read.
    fn now(&self) -> Result<Timespec>;

    /// Returns the absolute deadline `timeout` from now.
    ///
    /// # Errors
    ///
    /// `ClockUnavailable` if the time source cannot be read.
    fn deadline_after(&self, timeout: Duration) -> Result<Timespec> {
        Ok(self.now()?.deadline_after(timeout))
    }
}

impl<C: RealtimeClock + ?Sized> RealtimeClock for &C {
    fn now(&self) -> Result<Timespec> {
        (**self).now()
    }
}

/// The system's `CLOCK_REALTIME`.
///
/// Subject to clock adjustments, which is what `sem_timedwait` measures
/// its deadline against.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl RealtimeClock for SystemClock {
    fn now(&self) -> Result<Timespec> {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
        if rc != 0 {
            return Err(Error::last_os_error(Operation::Clock));
        }
        Ok(Timespec::from_libc(ts))
    }
}

/// A clock that only moves when told to.
///
/// Useful for checking deadline arithmetic against known "now" values,
/// and for simulating a failing time source.
///
/// # Example
///
/// ```
/// use procsem::time::{FixedClock, RealtimeClock, Timespec};
///
/// let clock = FixedClock::new(Timespec::new(100, 900_000_000));
/// assert_eq!(clock.now().unwrap(), Timespec::new(100, 900_000_000));
///
/// clock.advance_nanos(200_000_000);
/// assert_eq!(clock.now().unwrap(), Timespec::new(101, 100_000_000));
/// ```
#[derive(Debug, Default)]
pub struct FixedClock {
    state: Mutex<FixedState>,
}

#[derive(Debug, Default)]
struct FixedState {
    now: Timespec,
    failure: Option<i32>,
}

impl FixedClock {
    /// Creates a clock reading `now`.
    #[must_use]
    pub fn new(now: Timespec) -> Self {
        Self {
            state: Mutex::new(FixedState { now, failure: None }),
        }
    }

    /// Creates a clock starting at the current system time.
    ///
    /// # Errors
    ///
    /// `ClockUnavailable` if the system clock cannot be read.
    pub fn starting_now() -> Result<Self> {
        Ok(Self::new(SystemClock.now()?))
    }

    /// Sets the current time.
    pub fn set(&self, now: Timespec) {
        self.lock().now = now;
    }

    /// Advances time by the given number of nanoseconds.
    pub fn advance_nanos(&self, nanos: u64) {
        let mut state = self.lock();
        state.now = state.now.deadline_after(Duration::from_nanos(nanos));
    }

    /// Makes every subsequent [`RealtimeClock::now`] fail with `errno`.
    ///
    /// `None` restores normal operation.
    pub fn fail_with(&self, errno: Option<i32>) {
        self.lock().failure = errno;
    }

    fn lock(&self) -> MutexGuard<'_, FixedState> {
        // The state is plain data; a panic elsewhere cannot leave it torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RealtimeClock for FixedClock {
    fn now(&self) -> Result<Timespec> {
        let state = self.lock();
        match state.failure {
            Some(errno) => Err(Error::from_errno(Operation::Clock, errno)),
            None => Ok(state.now),
        }
    }
}
