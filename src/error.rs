//! Error types and error handling strategy for procsem.
//!
//! Every semaphore operation returns its outcome directly as a
//! [`Result`]. Nothing is reported through ambient state: the platform
//! error code that the OS leaves in `errno` is captured at the failure
//! site and carried inside the [`Error`] value, together with the
//! platform's error text.
//!
//! # Error Kinds
//!
//! - **Setup**: `InvalidArgument`, `ResourceExhausted`, `Busy`
//! - **Waiting**: `WouldBlock`, `TimedOut`, `Interrupted`, `ClockUnavailable`
//! - **Counter**: `Overflow`
//! - **Other**: `SystemError` for any errno without a dedicated kind
//!
//! # Recovery Classification
//!
//! All errors can be classified by [`Recoverability`]. Nothing in this
//! crate retries on its own; the classification exists so that callers
//! holding an overall deadline can decide whether to call again.

use core::fmt;
use std::io;
use std::sync::Arc;

/// The operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `sem_init` or the checks that precede it.
    Init,
    /// Borrowing a record initialized elsewhere.
    Attach,
    /// `sem_destroy`.
    Destroy,
    /// `sem_getvalue`.
    GetValue,
    /// `sem_post`.
    Post,
    /// `sem_wait`, `sem_trywait` or `sem_timedwait`.
    Wait,
    /// Reading the real-time clock for a timed wait.
    Clock,
}

impl Operation {
    /// Returns the name of the OS call behind this operation.
    #[must_use]
    pub const fn syscall(&self) -> &'static str {
        match self {
            Self::Init => "sem_init",
            Self::Attach => "attach",
            Self::Destroy => "sem_destroy",
            Self::GetValue => "sem_getvalue",
            Self::Post => "sem_post",
            Self::Wait => "sem_wait",
            Self::Clock => "clock_gettime",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.syscall())
    }
}

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Setup ===
    /// Bad address, size, alignment, timeout or initial value.
    InvalidArgument,
    /// The kernel could not allocate what a shared semaphore needs.
    ResourceExhausted,
    /// Destroy refused because a waiter is still blocked.
    Busy,

    // === Waiting ===
    /// Poll found no permit.
    WouldBlock,
    /// The deadline of a timed wait elapsed with no permit.
    TimedOut,
    /// An asynchronous signal interrupted the wait.
    Interrupted,
    /// The real-time clock could not be read.
    ClockUnavailable,

    // === Counter ===
    /// Posting would exceed the platform's maximum permit value.
    Overflow,

    // === Other ===
    /// Any other OS failure.
    SystemError,
}

impl ErrorKind {
    /// Classifies a raw `errno` value reported by `op`.
    ///
    /// The same code can mean different things for different calls:
    /// `EAGAIN` is "no permit" for a poll but "out of resources" for init.
    #[must_use]
    pub const fn from_errno(op: Operation, errno: i32) -> Self {
        match (op, errno) {
            (Operation::Clock, _) => Self::ClockUnavailable,
            (_, libc::EINTR) => Self::Interrupted,
            (Operation::Wait, libc::EAGAIN) => Self::WouldBlock,
            (Operation::Wait, libc::ETIMEDOUT) => Self::TimedOut,
            (Operation::Init, libc::ENOSPC | libc::ENOMEM | libc::EAGAIN) => {
                Self::ResourceExhausted
            }
            (Operation::Destroy, libc::EBUSY) => Self::Busy,
            (Operation::Post, libc::EOVERFLOW) => Self::Overflow,
            (_, libc::EINVAL) => Self::InvalidArgument,
            _ => Self::SystemError,
        }
    }

    /// Returns the canonical `errno` for this kind.
    ///
    /// Used when an error did not originate from the OS (for example a
    /// rejected alignment) but still has to be reported through `errno`.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument => libc::EINVAL,
            Self::ResourceExhausted => libc::ENOSPC,
            Self::Busy => libc::EBUSY,
            Self::WouldBlock => libc::EAGAIN,
            Self::TimedOut => libc::ETIMEDOUT,
            Self::Interrupted => libc::EINTR,
            Self::ClockUnavailable => libc::EINVAL,
            Self::Overflow => libc::EOVERFLOW,
            Self::SystemError => libc::EIO,
        }
    }

    /// Returns the recoverability classification for this error kind.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            Self::WouldBlock | Self::Interrupted | Self::Busy => Recoverability::Transient,

            Self::InvalidArgument | Self::Overflow => Recoverability::Permanent,

            // Depends on the caller's remaining budget or on system state.
            Self::TimedOut
            | Self::ResourceExhausted
            | Self::ClockUnavailable
            | Self::SystemError => Recoverability::Unknown,
        }
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.recoverability(), Recoverability::Transient)
    }

    /// Returns the recommended recovery action for this error kind.
    #[must_use]
    pub const fn recovery_action(&self) -> RecoveryAction {
        match self {
            // Recompute a shorter timeout from the overall budget and call again.
            Self::Interrupted => RecoveryAction::RetryWithRemainingBudget,
            Self::WouldBlock | Self::Busy => RecoveryAction::RetryLater,
            Self::InvalidArgument
            | Self::ResourceExhausted
            | Self::TimedOut
            | Self::ClockUnavailable
            | Self::Overflow
            | Self::SystemError => RecoveryAction::Propagate,
        }
    }

    const fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::InvalidArgument => io::ErrorKind::InvalidInput,
            Self::WouldBlock => io::ErrorKind::WouldBlock,
            Self::TimedOut => io::ErrorKind::TimedOut,
            Self::Interrupted => io::ErrorKind::Interrupted,
            Self::ResourceExhausted
            | Self::Busy
            | Self::ClockUnavailable
            | Self::Overflow
            | Self::SystemError => io::ErrorKind::Other,
        }
    }
}

/// Classification of error recoverability for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Recoverability depends on context and cannot be determined
    /// from the error kind alone.
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this error should never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// Recommended recovery action for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryAction {
    /// Call again with whatever is left of the caller's deadline.
    RetryWithRemainingBudget,
    /// Call again once the contending party has made progress.
    RetryLater,
    /// Propagate the error to the caller without retry.
    Propagate,
}

/// The main error type for procsem operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    operation: Option<Operation>,
    raw_os_error: Option<i32>,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            operation: None,
            raw_os_error: None,
            message: None,
            source: None,
        }
    }

    /// Builds an error from an `errno` value reported by `op`.
    ///
    /// The platform's error text becomes the message.
    #[must_use]
    pub fn from_errno(op: Operation, errno: i32) -> Self {
        let os = io::Error::from_raw_os_error(errno);
        Self {
            kind: ErrorKind::from_errno(op, errno),
            operation: Some(op),
            raw_os_error: Some(errno),
            message: Some(os.to_string()),
            source: None,
        }
    }

    /// Captures the calling thread's current `errno` for `op`.
    ///
    /// Must be called immediately after the failing OS call.
    #[must_use]
    pub fn last_os_error(op: Operation) -> Self {
        let errno = io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EIO);
        Self::from_errno(op, errno)
    }

    /// Creates an invalid-argument error for `op`.
    #[must_use]
    pub fn invalid_argument(op: Operation, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument)
            .with_operation(op)
            .with_message(detail)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the operation that failed, if known.
    #[must_use]
    pub const fn operation(&self) -> Option<Operation> {
        self.operation
    }

    /// Returns the platform error code, if the OS reported one.
    #[must_use]
    pub const fn raw_os_error(&self) -> Option<i32> {
        self.raw_os_error
    }

    /// Returns the `errno` to report for this error.
    ///
    /// The OS code when there is one, the kind's canonical code otherwise.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self.raw_os_error {
            Some(code) => code,
            None => self.kind.errno(),
        }
    }

    /// Returns true if a timed wait ran out.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::TimedOut)
    }

    /// Returns true if a poll found no permit.
    #[must_use]
    pub const fn is_would_block(&self) -> bool {
        matches!(self.kind, ErrorKind::WouldBlock)
    }

    /// Returns true if a signal interrupted the wait.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.kind, ErrorKind::Interrupted)
    }

    /// Records the operation that failed.
    #[must_use]
    pub fn with_operation(mut self, op: Operation) -> Self {
        self.operation = Some(op);
        self
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns the recommended recovery action for this error.
    #[must_use]
    pub const fn recovery_action(&self) -> RecoveryAction {
        self.kind.recovery_action()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(op) = &self.operation {
            write!(f, " in {op}")?;
        }
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err.raw_os_error {
            Some(code) => Self::from_raw_os_error(code),
            None => Self::new(err.kind.io_kind(), err),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for procsem operations.
pub type Result<T> = core::result::Result<T, Error>;
