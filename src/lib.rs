//! procsem: unnamed POSIX counting semaphores in caller-owned memory.
//!
//! # Overview
//!
//! procsem lets cooperating processes (and threads) coordinate through a
//! counting semaphore whose storage lives in memory the caller provides,
//! typically an anonymous shared mapping inherited across `fork`. The
//! crate never owns that memory; it initializes, operates on and tears
//! down the semaphore record in place.
//!
//! # Core Guarantees
//!
//! - **Atomic counter**: post and wait are atomic across all processes sharing the record
//! - **Three wait modes**: block, poll, or block until a real-time deadline
//! - **Explicit errors**: every failure is returned as a value, never left in ambient state
//! - **No hidden retries**: an interrupted wait reports `Interrupted` to the caller
//!
//! # Module Structure
//!
//! - [`sync`]: The semaphore adapter ([`RawSemaphore`])
//! - [`time`]: Wait modes, absolute deadlines and clock sources
//! - [`error`]: Error types
//! - [`config`]: Semaphore configuration with environment overrides
//! - [`ffi`]: C ABI
//! - [`tracing_compat`]: Structured logging facade
//!
//! # Example
//!
//! ```
//! use procsem::{RawSemaphore, Sharing, Timeout};
//! use std::mem::MaybeUninit;
//!
//! let mut backing = MaybeUninit::<libc::sem_t>::uninit();
//! // SAFETY: `backing` is sized and aligned for a semaphore and outlives `sem`.
//! let sem = unsafe {
//!     RawSemaphore::init_at(backing.as_mut_ptr().cast(), RawSemaphore::size(), Sharing::Thread, 0)
//! }?;
//!
//! sem.post()?;
//! sem.wait(Timeout::Infinite)?;
//! let err = sem.wait_secs_f64(0.01).unwrap_err();
//! assert!(err.is_timeout());
//!
//! // SAFETY: idle and never used again.
//! unsafe { sem.destroy() }?;
//! # Ok::<(), procsem::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

#[cfg(not(unix))]
compile_error!("procsem requires a Unix platform with POSIX unnamed semaphores");

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "tvos", target_os = "watchos"))]
compile_error!("unnamed POSIX semaphores (sem_init) are not supported on Apple platforms");

pub mod config;
pub mod error;
pub mod ffi;
pub mod sync;
pub mod time;
pub mod tracing_compat;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenient access to core types
pub use config::{ConfigError, SemaphoreConfig};
pub use error::{Error, ErrorKind, Operation, Recoverability, RecoveryAction, Result, ResultExt};
pub use sync::{RawSemaphore, Sharing};
pub use time::{RealtimeClock, SystemClock, Timeout, Timespec};
