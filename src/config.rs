//! Request-scoped configuration.
//!
//! Nothing here is process-global: an [`Options`] value is built once per
//! invocation and handed to [`Database`](crate::Database), which threads it
//! to the lock manager and store.

use crate::error::{Error, Result};
use std::time::Duration;

/// Environment variable overriding the lock staleness timeout (milliseconds).
pub const ENV_LOCK_STALE_MS: &str = "SDB_LOCK_STALE_MS";
/// Environment variable overriding the retry backoff base (milliseconds).
pub const ENV_LOCK_RETRY_MS: &str = "SDB_LOCK_RETRY_MS";
/// Environment variable overriding the total wait budget (milliseconds).
pub const ENV_LOCK_WAIT_MS: &str = "SDB_LOCK_WAIT_MS";

pub const DEFAULT_LOCK_STALE_MS: u64 = 120_000;
pub const DEFAULT_LOCK_RETRY_MS: u64 = 50;

/// Timing knobs for [`LockManager`](crate::LockManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Age beyond which a held lock is presumed abandoned.
    pub stale_timeout: Duration,
    /// Base delay between attempts. Each wait adds uniform jitter of the
    /// same magnitude.
    pub retry_delay: Duration,
    /// Total time `acquire` may spend before failing.
    pub wait_budget: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        let stale = Duration::from_millis(DEFAULT_LOCK_STALE_MS);
        Self {
            stale_timeout: stale,
            retry_delay: Duration::from_millis(DEFAULT_LOCK_RETRY_MS),
            wait_budget: stale,
        }
    }
}

impl LockConfig {
    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_wait_budget(mut self, budget: Duration) -> Self {
        self.wait_budget = budget;
        self
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LockConfig::from_env`] over an arbitrary lookup function.
    ///
    /// When only the staleness timeout is overridden, the wait budget
    /// follows it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let stale_timeout =
            millis_var(&lookup, ENV_LOCK_STALE_MS)?.unwrap_or(defaults.stale_timeout);
        let retry_delay = millis_var(&lookup, ENV_LOCK_RETRY_MS)?.unwrap_or(defaults.retry_delay);
        let wait_budget = millis_var(&lookup, ENV_LOCK_WAIT_MS)?.unwrap_or(stale_timeout);
        Ok(Self {
            stale_timeout,
            retry_delay,
            wait_budget,
        })
    }
}

fn millis_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|_| {
            Error::invalid_input(
                "lock timing",
                format!("{key} must be a non-negative integer of milliseconds, got {raw:?}"),
            )
        })
}

/// Per-invocation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Emit lock state transitions and per-operation detail at `debug` level.
    pub debug: bool,
    pub lock: LockConfig,
}

impl Options {
    /// Options with lock timings taken from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            debug: false,
            lock: LockConfig::from_env()?,
        })
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }
}
