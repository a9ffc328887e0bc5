#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use procsem::{RawSemaphore, Sharing};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::io;
use std::ptr;
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();
static FORK_LOCK: Mutex<()> = Mutex::new(());

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED5EED;

const PROPTEST_SEED_ENV: &str = "PROCSEM_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    // Honor existing PROPTEST_RNG_SEED, otherwise apply our own.
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }

    // If CI is set and no explicit seed is provided, use a fixed seed.
    if std::env::var("CI").is_ok() {
        return Some(DEFAULT_PROPTEST_SEED);
    }

    None
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// An anonymous `MAP_SHARED | MAP_ANONYMOUS` mapping.
///
/// Children created with `fork` see the same physical pages, so a
/// semaphore placed here is shared with them.
pub struct SharedRegion {
    base: *mut u8,
    len: usize,
}

// SAFETY: the mapping is plain shared memory; all access goes through
// raw pointers and the semaphore API.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Maps `len` bytes of zeroed shared memory.
    pub fn new(len: usize) -> io::Result<Self> {
        // SAFETY: anonymous mapping with no fixed address.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            base: base.cast(),
            len,
        })
    }

    /// Maps one page.
    pub fn page() -> Self {
        Self::new(4096).expect("mmap shared page")
    }

    pub fn base(&self) -> *mut u8 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Address of the `index`-th semaphore record in the region.
    pub fn slot(&self, index: usize) -> *mut u8 {
        RawSemaphore::slot(self.base, self.len, index * RawSemaphore::size())
            .expect("slot inside region")
    }

    /// Initializes the `index`-th record.
    pub fn init(&self, index: usize, sharing: Sharing, initial: u32) -> &RawSemaphore {
        // SAFETY: the slot lies inside the mapping, which outlives the borrow.
        unsafe { RawSemaphore::init_at(self.slot(index), RawSemaphore::size(), sharing, initial) }
            .expect("sem_init")
    }

    /// Views the `index`-th record, initialized earlier.
    pub fn attach(&self, index: usize) -> &RawSemaphore {
        // SAFETY: the caller initialized this slot; the mapping outlives the borrow.
        unsafe { RawSemaphore::attach(self.slot(index)) }.expect("attach")
    }

    /// A `u32` cell stored at byte `offset`, visible to forked children.
    pub fn word(&self, offset: usize) -> &std::sync::atomic::AtomicU32 {
        assert!(offset + 4 <= self.len && offset % 4 == 0);
        // SAFETY: in bounds, aligned, and the mapping outlives the borrow.
        unsafe { &*self.base.add(offset).cast() }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: unmapping the region created in `new`.
        unsafe { libc::munmap(self.base.cast(), self.len) };
    }
}

/// Serializes tests that fork, so no two children are in flight at once.
pub fn fork_lock() -> MutexGuard<'static, ()> {
    FORK_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A forked child process.
pub struct Child {
    pid: libc::pid_t,
}

impl Child {
    /// Forks and runs `body` in the child, which exits with the returned code.
    ///
    /// `body` must not allocate, log, or panic: other test threads may have
    /// held locks at the moment of the fork.
    pub fn spawn(body: impl FnOnce() -> i32) -> Self {
        // SAFETY: the child runs `body` and leaves through `_exit`.
        let pid = unsafe { libc::fork() };
        assert!(pid >= 0, "fork failed: {}", io::Error::last_os_error());
        if pid == 0 {
            let code = body();
            // SAFETY: skip destructors and atexit handlers in the child.
            unsafe { libc::_exit(code) };
        }
        Self { pid }
    }

    /// Waits for the child and returns its exit code.
    pub fn join(self) -> i32 {
        let mut status = 0;
        // SAFETY: `pid` is our child.
        let rc = unsafe { libc::waitpid(self.pid, &mut status, 0) };
        assert_eq!(rc, self.pid, "waitpid: {}", io::Error::last_os_error());
        assert!(libc::WIFEXITED(status), "child did not exit normally: {status:#x}");
        libc::WEXITSTATUS(status)
    }
}

/// Measures how long `f` takes.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
