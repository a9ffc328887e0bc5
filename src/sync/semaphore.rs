//! Unnamed POSIX semaphores placed in caller-owned memory.
//!
//! A [`RawSemaphore`] is a view of a `sem_t` record living at an address
//! the caller supplies, typically inside an anonymous `MAP_SHARED`
//! mapping that several processes inherit. This module never allocates,
//! maps or frees that memory; it only initializes, operates on and
//! destroys the record in place.
//!
//! # Lifecycle
//!
//! - [`RawSemaphore::init_at`] exactly once per region, before anything else
//! - [`RawSemaphore::attach`] from any other view of the same memory
//! - [`RawSemaphore::post`], [`RawSemaphore::wait`], [`RawSemaphore::value`]
//!   from any number of threads or processes
//! - [`RawSemaphore::destroy`] exactly once, when nobody is blocked
//!
//! # Example
//!
//! ```
//! use procsem::sync::{RawSemaphore, Sharing};
//! use procsem::time::Timeout;
//! use std::mem::MaybeUninit;
//!
//! let mut backing = MaybeUninit::<libc::sem_t>::uninit();
//! let addr = backing.as_mut_ptr().cast::<u8>();
//!
//! // SAFETY: `backing` is large enough, aligned, and outlives `sem`.
//! let sem = unsafe { RawSemaphore::init_at(addr, RawSemaphore::size(), Sharing::Thread, 1) }?;
//! sem.wait(Timeout::Infinite)?;
//! assert!(sem.wait(Timeout::Immediate).unwrap_err().is_would_block());
//! sem.post()?;
//! assert_eq!(sem.value()?, 1);
//!
//! // SAFETY: nothing is blocked on `sem` and it is not used afterwards.
//! unsafe { sem.destroy() }?;
//! # Ok::<(), procsem::Error>(())
//! ```
//!
//! # Fairness
//!
//! When several parties are blocked, which one a post wakes is up to the
//! platform. No FIFO order is promised.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;
use std::mem;

use crate::error::{Error, Operation, Result};
use crate::time::{RealtimeClock, SystemClock, Timeout};
use crate::tracing_compat::{debug, trace};

/// Whether a semaphore may be used across process boundaries.
///
/// Fixed at initialization. Using a thread-only semaphore from another
/// process is undefined at the OS level and is not detected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Sharing {
    /// Only threads of the initializing process may use it.
    Thread,
    /// Any process that maps the backing memory may use it.
    #[default]
    Process,
}

impl Sharing {
    /// Maps the C-style `pshared` flag: zero is thread-only, anything else
    /// is process-shared.
    #[must_use]
    pub const fn from_pshared(pshared: i32) -> Self {
        if pshared == 0 {
            Self::Thread
        } else {
            Self::Process
        }
    }

    /// Returns the `pshared` argument `sem_init` expects.
    #[must_use]
    pub const fn pshared(self) -> libc::c_int {
        match self {
            Self::Thread => 0,
            Self::Process => 1,
        }
    }
}

impl From<bool> for Sharing {
    fn from(process_shared: bool) -> Self {
        if process_shared {
            Self::Process
        } else {
            Self::Thread
        }
    }
}

/// A counting semaphore record at a fixed, caller-owned address.
///
/// Only ever handled by reference; there is no way to construct or move
/// one by value. The counter is updated atomically by the OS across all
/// threads and processes that see the memory; no extra locking is added.
#[repr(transparent)]
pub struct RawSemaphore {
    inner: UnsafeCell<libc::sem_t>,
}

// SAFETY: every operation on a `sem_t` is thread-safe; the OS serializes
// updates to the counter.
unsafe impl Sync for RawSemaphore {}

impl RawSemaphore {
    /// Returns the number of bytes a semaphore record occupies.
    ///
    /// Platform dependent. Query it before reserving backing memory.
    #[must_use]
    pub const fn size() -> usize {
        mem::size_of::<libc::sem_t>()
    }

    /// Returns the alignment a semaphore record's address must have.
    #[must_use]
    pub const fn align() -> usize {
        mem::align_of::<libc::sem_t>()
    }

    /// Returns the largest permit count the platform supports.
    #[must_use]
    pub fn value_max() -> u32 {
        // SAFETY: sysconf has no memory-safety preconditions.
        let max = unsafe { libc::sysconf(libc::_SC_SEM_VALUE_MAX) };
        u32::try_from(max)
            .ok()
            .filter(|&max| max > 0)
            .unwrap_or(i32::MAX.unsigned_abs())
    }

    /// Computes the address of a record placed `offset` bytes into a
    /// caller-owned region of `len` bytes starting at `base`.
    ///
    /// Nothing is read or written.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the record would not fit inside the region or
    /// the resulting address is misaligned.
    pub fn slot(base: *mut u8, len: usize, offset: usize) -> Result<*mut u8> {
        if base.is_null() {
            return Err(Error::invalid_argument(Operation::Init, "region base is null"));
        }
        let end = offset.checked_add(Self::size());
        if end.map_or(true, |end| end > len) {
            return Err(Error::invalid_argument(
                Operation::Init,
                format!(
                    "record at offset {offset} ({} bytes) overruns region of {len} bytes",
                    Self::size()
                ),
            ));
        }
        let addr = base.wrapping_add(offset);
        check_aligned(addr, Operation::Init)?;
        Ok(addr)
    }

    /// Initializes a semaphore record at `addr` holding `initial` permits.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: `addr` is null or misaligned, `len` is smaller
    ///   than [`RawSemaphore::size`], or `initial` exceeds
    ///   [`RawSemaphore::value_max`]. Memory is not touched.
    /// - `ResourceExhausted`: the kernel refused to set up a shared semaphore.
    ///
    /// # Safety
    ///
    /// - `addr..addr + len` must be valid for writes and stay mapped at the
    ///   same address for `'a`.
    /// - The record must not already hold a live semaphore, and nothing may
    ///   operate on it concurrently with this call.
    /// - [`RawSemaphore::destroy`] must run before the memory is reused.
    pub unsafe fn init_at<'a>(
        addr: *mut u8,
        len: usize,
        sharing: Sharing,
        initial: u32,
    ) -> Result<&'a Self> {
        check_aligned(addr, Operation::Init)?;
        if len < Self::size() {
            return Err(Error::invalid_argument(
                Operation::Init,
                format!(
                    "region of {len} bytes is smaller than a semaphore record ({} bytes)",
                    Self::size()
                ),
            ));
        }
        let max = Self::value_max();
        if initial > max {
            return Err(Error::invalid_argument(
                Operation::Init,
                format!("initial value {initial} exceeds maximum {max}"),
            ));
        }

        let sem = addr.cast::<libc::sem_t>();
        // SAFETY: the caller guarantees `addr` is valid, writable and
        // aligned for a `sem_t`; checked above as far as possible.
        let rc = unsafe { libc::sem_init(sem, sharing.pshared(), initial as libc::c_uint) };
        if rc != 0 {
            let err = Error::last_os_error(Operation::Init);
            debug!(addr = ?addr, error = %err, "sem_init failed");
            return Err(err);
        }
        debug!(addr = ?addr, sharing = ?sharing, initial, "semaphore initialized");
        // SAFETY: `RawSemaphore` is a transparent wrapper around the
        // `sem_t` just initialized at `addr`.
        Ok(unsafe { &*addr.cast::<Self>() })
    }

    /// Borrows a semaphore record that was initialized elsewhere, for
    /// example by another process through the same shared mapping.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `addr` is null or misaligned.
    ///
    /// # Safety
    ///
    /// `addr` must hold a semaphore initialized with [`RawSemaphore::init_at`]
    /// (or `sem_init`) and not yet destroyed, and must stay mapped at the
    /// same address for `'a`.
    pub unsafe fn attach<'a>(addr: *mut u8) -> Result<&'a Self> {
        check_aligned(addr, Operation::Attach)?;
        // SAFETY: guaranteed by the caller.
        Ok(unsafe { &*addr.cast::<Self>() })
    }

    /// Returns the address of the underlying `sem_t`.
    #[must_use]
    pub fn as_ptr(&self) -> *mut libc::sem_t {
        self.inner.get()
    }

    /// Releases whatever the OS associated with this semaphore.
    ///
    /// The memory stays where it is, but holds no semaphore afterwards.
    ///
    /// # Errors
    ///
    /// `Busy` if the platform notices a blocked waiter and refuses.
    /// Platforms are not required to notice.
    ///
    /// # Safety
    ///
    /// No thread or process may be blocked on, or later use, this
    /// semaphore (through this reference or any other view of the memory)
    /// unless it is initialized again.
    pub unsafe fn destroy(&self) -> Result<()> {
        // SAFETY: the record is initialized; the caller guarantees it is idle.
        let rc = unsafe { libc::sem_destroy(self.as_ptr()) };
        if rc != 0 {
            return Err(Error::last_os_error(Operation::Destroy));
        }
        debug!(addr = ?self.as_ptr(), "semaphore destroyed");
        Ok(())
    }

    /// Returns a snapshot of the permit count.
    ///
    /// Only a hint: another party may change the count before the caller
    /// looks at it. Fine for diagnostics, wrong for mutual exclusion.
    /// Platforms that report blocked waiters as a negative count read as 0.
    ///
    /// # Errors
    ///
    /// Whatever `sem_getvalue` reports.
    pub fn value(&self) -> Result<u32> {
        let mut sval: libc::c_int = 0;
        // SAFETY: the record is initialized and `sval` is writable.
        let rc = unsafe { libc::sem_getvalue(self.as_ptr(), &mut sval) };
        if rc != 0 {
            return Err(Error::last_os_error(Operation::GetValue));
        }
        Ok(u32::try_from(sval).unwrap_or(0))
    }

    /// Adds one permit, waking one blocked waiter if there is any.
    ///
    /// # Errors
    ///
    /// `Overflow` if the count is already at the platform maximum. The
    /// count is unchanged in that case.
    pub fn post(&self) -> Result<()> {
        // SAFETY: the record is initialized.
        let rc = unsafe { libc::sem_post(self.as_ptr()) };
        if rc != 0 {
            return Err(Error::last_os_error(Operation::Post));
        }
        trace!(addr = ?self.as_ptr(), "semaphore posted");
        Ok(())
    }

    /// Takes one permit, blocking as `timeout` allows.
    ///
    /// | `timeout` | behavior |
    /// |---|---|
    /// | `Infinite` | block until a permit is available |
    /// | `Immediate` | take a permit or fail with `WouldBlock`; never blocks |
    /// | `After(d)` | block until a permit is available or `d` elapses on the real-time clock |
    ///
    /// # Errors
    ///
    /// `WouldBlock`, `TimedOut`, `Interrupted` (a signal arrived first;
    /// the caller decides whether to retry), `ClockUnavailable`, or any
    /// other OS error as `SystemError`.
    pub fn wait(&self, timeout: Timeout) -> Result<()> {
        self.wait_with_clock(timeout, &SystemClock)
    }

    /// Same as [`RawSemaphore::wait`], reading "now" for a timed wait from
    /// `clock` instead of the system clock.
    ///
    /// A deadline that has already passed is still handed to the OS,
    /// which reports a timeout straight away.
    ///
    /// # Errors
    ///
    /// As [`RawSemaphore::wait`]. If `clock` fails the wait is not
    /// attempted.
    pub fn wait_with_clock<C>(&self, timeout: Timeout, clock: &C) -> Result<()>
    where
        C: RealtimeClock + ?Sized,
    {
        let sem = self.as_ptr();
        let rc = match timeout {
            Timeout::Infinite => {
                trace!(addr = ?sem, "blocking wait");
                // SAFETY: the record is initialized.
                unsafe { libc::sem_wait(sem) }
            }
            // SAFETY: the record is initialized.
            Timeout::Immediate => unsafe { libc::sem_trywait(sem) },
            Timeout::After(duration) => {
                let deadline = clock.deadline_after(duration)?;
                trace!(addr = ?sem, timeout = ?duration, deadline = %deadline, "timed wait");
                let abs = deadline.to_libc();
                // SAFETY: the record is initialized and `abs` is a valid timespec.
                unsafe { libc::sem_timedwait(sem, &abs) }
            }
        };
        if rc != 0 {
            let err = Error::last_os_error(Operation::Wait);
            trace!(addr = ?sem, mode = %timeout, error = %err, "wait failed");
            return Err(err);
        }
        Ok(())
    }

    /// Takes a permit only if one is available right now.
    ///
    /// # Errors
    ///
    /// `WouldBlock` if the count is zero.
    pub fn try_wait(&self) -> Result<()> {
        self.wait(Timeout::Immediate)
    }

    /// [`RawSemaphore::wait`] with the timeout given as floating-point
    /// seconds: negative blocks, zero polls, positive is a deadline.
    ///
    /// # Errors
    ///
    /// As [`RawSemaphore::wait`], plus `InvalidArgument` for NaN.
    pub fn wait_secs_f64(&self, secs: f64) -> Result<()> {
        self.wait(Timeout::from_secs_f64(secs)?)
    }
}

impl fmt::Debug for RawSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RawSemaphore");
        d.field("addr", &self.as_ptr());
        match self.value() {
            Ok(value) => d.field("value", &value),
            Err(_) => d.field("value", &"<unavailable>"),
        };
        d.finish()
    }
}

fn check_aligned(addr: *mut u8, op: Operation) -> Result<()> {
    if addr.is_null() {
        return Err(Error::invalid_argument(op, "semaphore address is null"));
    }
    if (addr as usize) % RawSemaphore::align() != 0 {
        return Err(Error::invalid_argument(
            op,
            format!(
                "address {addr:p} is not aligned to {} bytes",
                RawSemaphore::align()
            ),
        ));
    }
    Ok(())
}
