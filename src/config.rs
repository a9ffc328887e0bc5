//! Semaphore configuration with environment overrides.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set via builder methods (`initial_value(1)`)
//! 2. **Environment variables**: values from `PROCSEM_*` env vars
//! 3. **Defaults**: built-in defaults from [`SemaphoreConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `PROCSEM_SHARED` | `bool` | `sharing` |
//! | `PROCSEM_INITIAL_VALUE` | `u32` | `initial_value` |
//! | `PROCSEM_WAIT_TIMEOUT` | `f64` seconds | `wait_timeout` (negative blocks, zero polls) |

#![allow(unsafe_code)]

use crate::error::{Error, Operation, Result};
use crate::sync::{RawSemaphore, Sharing};
use crate::time::Timeout;

/// Environment variable name for the process-shared flag.
pub const ENV_SHARED: &str = "PROCSEM_SHARED";
/// Environment variable name for the initial permit count.
pub const ENV_INITIAL_VALUE: &str = "PROCSEM_INITIAL_VALUE";
/// Environment variable name for the default wait timeout in seconds.
pub const ENV_WAIT_TIMEOUT: &str = "PROCSEM_WAIT_TIMEOUT";

/// Errors produced while building or validating a [`SemaphoreConfig`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable is set but cannot be parsed.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// What the variable should contain.
        expected: &'static str,
        /// The value found.
        value: String,
    },

    /// The initial permit count is above the platform maximum.
    #[error("initial value {value} exceeds platform maximum {max}")]
    InitialValueTooLarge {
        /// The requested count.
        value: u32,
        /// The platform maximum.
        max: u32,
    },
}

/// Settings for initializing a semaphore and waiting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreConfig {
    /// Whether other processes may use the semaphore.
    pub sharing: Sharing,
    /// Permits available right after initialization.
    pub initial_value: u32,
    /// Timeout used by [`SemaphoreConfig::wait`].
    pub wait_timeout: Timeout,
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self {
            sharing: Sharing::Process,
            initial_value: 0,
            wait_timeout: Timeout::Infinite,
        }
    }
}

impl SemaphoreConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the default configuration with environment overrides applied.
    ///
    /// # Errors
    ///
    /// A [`ConfigError`] if a variable is set but unparseable, or the
    /// result fails [`SemaphoreConfig::validate`].
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the sharing mode.
    #[must_use]
    pub const fn sharing(mut self, sharing: Sharing) -> Self {
        self.sharing = sharing;
        self
    }

    /// Sets the initial permit count.
    #[must_use]
    pub const fn initial_value(mut self, value: u32) -> Self {
        self.initial_value = value;
        self
    }

    /// Sets the default wait timeout.
    #[must_use]
    pub const fn wait_timeout(mut self, timeout: Timeout) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Checks the configuration against platform limits.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InitialValueTooLarge`] if the initial value exceeds
    /// [`RawSemaphore::value_max`].
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let max = RawSemaphore::value_max();
        if self.initial_value > max {
            return Err(ConfigError::InitialValueTooLarge {
                value: self.initial_value,
                max,
            });
        }
        Ok(())
    }

    /// Applies `PROCSEM_*` environment variable overrides.
    ///
    /// Only variables that are set in the environment are applied.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidEnv`] if a variable is set but contains an
    /// unparseable value. Fields are left as they were in that case.
    pub fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        let mut next = *self;
        if let Some(val) = read_env(ENV_SHARED) {
            next.sharing = Sharing::from(parse_bool(ENV_SHARED, &val)?);
        }
        if let Some(val) = read_env(ENV_INITIAL_VALUE) {
            next.initial_value = parse_u32(ENV_INITIAL_VALUE, &val)?;
        }
        if let Some(val) = read_env(ENV_WAIT_TIMEOUT) {
            next.wait_timeout = parse_timeout(ENV_WAIT_TIMEOUT, &val)?;
        }
        *self = next;
        Ok(())
    }

    /// Initializes a semaphore at `addr` with this configuration.
    ///
    /// # Errors
    ///
    /// As [`RawSemaphore::init_at`]. A configuration that fails
    /// [`SemaphoreConfig::validate`] is reported as `InvalidArgument`.
    ///
    /// # Safety
    ///
    /// Same contract as [`RawSemaphore::init_at`].
    pub unsafe fn init_at<'a>(&self, addr: *mut u8, len: usize) -> Result<&'a RawSemaphore> {
        if let Err(err) = self.validate() {
            return Err(Error::invalid_argument(Operation::Init, err.to_string()).with_source(err));
        }
        // SAFETY: forwarded from the caller.
        unsafe { RawSemaphore::init_at(addr, len, self.sharing, self.initial_value) }
    }

    /// Waits on `sem` with the configured timeout.
    ///
    /// # Errors
    ///
    /// As [`RawSemaphore::wait`].
    pub fn wait(&self, sem: &RawSemaphore) -> Result<()> {
        sem.wait(self.wait_timeout)
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn invalid(var: &'static str, expected: &'static str, val: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        var,
        expected,
        value: val.to_string(),
    }
}

fn parse_u32(var: &'static str, val: &str) -> std::result::Result<u32, ConfigError> {
    val.trim()
        .parse::<u32>()
        .map_err(|_| invalid(var, "unsigned 32-bit integer", val))
}

fn parse_bool(var: &'static str, val: &str) -> std::result::Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, "bool (true/false/1/0/yes/no)", val)),
    }
}

fn parse_timeout(var: &'static str, val: &str) -> std::result::Result<Timeout, ConfigError> {
    let secs = val
        .trim()
        .parse::<f64>()
        .map_err(|_| invalid(var, "seconds as a number", val))?;
    Timeout::from_secs_f64(secs).map_err(|_| invalid(var, "seconds as a number", val))
}
