//! Counting semaphores shared between threads and processes.
//!
//! # Primitives
//!
//! - [`RawSemaphore`]: An unnamed POSIX semaphore living in caller-owned memory
//! - [`Sharing`]: Whether the semaphore may cross process boundaries
//!
//! # Memory Ownership
//!
//! The semaphore record is never allocated here. Callers reserve
//! [`RawSemaphore::size`] bytes, aligned to [`RawSemaphore::align`], in
//! memory every participant can reach (an anonymous `MAP_SHARED` mapping
//! inherited across `fork`, for instance) and hand its address to
//! [`RawSemaphore::init_at`]. Unmapping that memory while the semaphore is
//! live is the caller's responsibility to avoid.
//!
//! # Wait Modes
//!
//! Every wait takes a [`Timeout`](crate::time::Timeout):
//!
//! - **Infinite**: block until a permit is available
//! - **Immediate**: poll; fail with `WouldBlock` if no permit is available
//! - **After(d)**: block until a permit arrives or `d` passes on the
//!   real-time clock, then fail with `TimedOut`

mod semaphore;

pub use semaphore::{RawSemaphore, Sharing};
