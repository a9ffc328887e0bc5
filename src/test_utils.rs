//! Test utilities for procsem.
//!
//! This module provides shared helpers for unit tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Process-local backing memory for thread-only semaphores

#![allow(unsafe_code)]

use crate::error::Result;
use crate::sync::{RawSemaphore, Sharing};
use std::mem::MaybeUninit;
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
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

/// Acquire the global environment lock for tests that mutate env vars.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Heap memory for one semaphore record, usable by threads of this process.
///
/// Boxed so the record never moves once initialized.
pub(crate) struct LocalBacking {
    record: Box<MaybeUninit<libc::sem_t>>,
}

impl LocalBacking {
    pub(crate) fn new() -> Self {
        Self {
            record: Box::new(MaybeUninit::uninit()),
        }
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.record.as_mut_ptr().cast()
    }

    /// Initializes a semaphore in this backing.
    ///
    /// Callers must destroy it before the backing is dropped.
    pub(crate) fn init(&mut self, sharing: Sharing, initial: u32) -> Result<&RawSemaphore> {
        let addr = self.as_mut_ptr();
        // SAFETY: the box is sized and aligned for a `sem_t` and the
        // returned borrow keeps it alive and unmoved.
        unsafe { RawSemaphore::init_at(addr, RawSemaphore::size(), sharing, initial) }
    }
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
