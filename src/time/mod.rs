//! Time primitives for semaphore waits.
//!
//! This module provides the pieces a timed wait needs:
//! - [`Timeout`]: The three wait modes (block, poll, relative deadline)
//! - [`Timespec`]: An absolute point on the real-time clock
//! - [`RealtimeClock`]: The time source a timed wait reads "now" from
//!
//! # Absolute Deadlines
//!
//! `sem_timedwait` only understands an absolute deadline on
//! `CLOCK_REALTIME`, so a relative timeout is turned into one by reading
//! the clock and adding the timeout componentwise:
//!
//! ```
//! use procsem::time::{Timespec, Timeout};
//! use std::time::Duration;
//!
//! let now = Timespec::new(100, 900_000_000);
//! let deadline = now.deadline_after(Duration::from_millis(200));
//! assert_eq!(deadline, Timespec::new(101, 100_000_000));
//!
//! // Negative means block forever, zero means poll.
//! assert_eq!(Timeout::from_secs_f64(-1.0).unwrap(), Timeout::Infinite);
//! assert_eq!(Timeout::from_secs_f64(0.0).unwrap(), Timeout::Immediate);
//! ```

mod clock;
mod deadline;
mod timeout;

pub use clock::{FixedClock, RealtimeClock, SystemClock};
pub use deadline::{Timespec, NANOS_PER_SEC};
pub use timeout::Timeout;
