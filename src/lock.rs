//! Cross-process advisory lock backed by a lock file.
//!
//! The presence of `.sdb.lock` in the database folder *is* the lock. It is
//! created with create-if-absent semantics and holds a small JSON document
//! describing the holder:
//!
//! ```text
//! {"pid":4182,"timestamp":"2026-10-18T09:15:02.123Z","operation":"add"}
//! ```
//!
//! A lock older than the staleness timeout, or one whose content cannot be
//! parsed, is presumed abandoned by a crashed writer and reclaimed.

use crate::clock::{Clock, to_delta};
use crate::config::LockConfig;
use crate::error::{Error, Result};
use crate::paths::{DatabasePaths, LOCK_FILE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Content of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID of the holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub timestamp: DateTime<Utc>,
    /// Name of the operation holding the lock (`add`, `gc`, ...).
    pub operation: String,
}

/// States of the acquisition loop.
#[derive(Debug)]
enum AcquireState {
    /// Look at what is on disk.
    Probe,
    /// No lock file seen; try to create ours.
    TryCreate,
    /// Someone else holds the lock (holder unknown if creation lost a race).
    Contended(Option<LockInfo>),
    /// The lock on disk is abandoned; `raw` is what we judged.
    Stale {
        raw: Vec<u8>,
        holder: Option<LockInfo>,
    },
    /// Wait before probing again.
    Retry,
}

/// Acquires and releases the database lock with bounded, jittered retry.
pub struct LockManager {
    config: LockConfig,
    clock: Arc<dyn Clock>,
    debug: bool,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("config", &self.config)
            .field("debug", &self.debug)
            .finish()
    }
}

impl LockManager {
    pub fn new(config: LockConfig, clock: Arc<dyn Clock>) -> Self {
        LockManager {
            config,
            clock,
            debug: false,
        }
    }

    /// Log every state transition at `debug` level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Block until the lock is held or the wait budget runs out.
    ///
    /// # Errors
    ///
    /// [`Error::LockFailed`] when the budget is exhausted (carrying the
    /// conflicting holder if it could be read) or when the lock file cannot
    /// be read or reclaimed. [`Error::OperationFailed`] when creating the
    /// lock file fails for any reason other than contention.
    pub fn acquire(&self, paths: &DatabasePaths, operation: &str) -> Result<LockGuard> {
        let path = paths.lock();
        let started = self.clock.now();
        let deadline = started
            .checked_add_signed(to_delta(self.config.wait_budget))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut last_holder: Option<LockInfo> = None;
        let mut state = AcquireState::Probe;

        loop {
            if self.debug {
                log::debug!("sdb: lock {} [{operation}]: {state:?}", path.display());
            }

            state = match state {
                AcquireState::Probe => self.probe(path)?,

                AcquireState::TryCreate => {
                    let info = LockInfo {
                        pid: std::process::id(),
                        timestamp: self.clock.now(),
                        operation: operation.to_string(),
                    };
                    match publish(path, &info) {
                        Ok(()) => {
                            log::debug!(
                                "sdb: acquired lock {} for {operation}",
                                path.display()
                            );
                            return Ok(LockGuard {
                                path: path.to_path_buf(),
                                info,
                                released: false,
                            });
                        }
                        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                            AcquireState::Contended(None)
                        }
                        Err(e) => return Err(Error::io("create lock file", path, e)),
                    }
                }

                AcquireState::Stale { raw, holder } => {
                    match &holder {
                        Some(info) => log::warn!(
                            "sdb: reclaiming stale lock {} held by pid {} ({}) since {}",
                            path.display(),
                            info.pid,
                            info.operation,
                            info.timestamp
                        ),
                        None => log::warn!(
                            "sdb: reclaiming unreadable lock file {}",
                            path.display()
                        ),
                    }
                    reclaim(path, &raw)?;
                    AcquireState::Probe
                }

                AcquireState::Contended(holder) => {
                    if holder.is_some() {
                        last_holder = holder;
                    }
                    if self.clock.now() >= deadline {
                        return Err(Error::LockFailed {
                            path: path.to_path_buf(),
                            reason: format!(
                                "timed out after {}ms waiting for another writer",
                                self.config.wait_budget.as_millis()
                            ),
                            holder: last_holder,
                        });
                    }
                    AcquireState::Retry
                }

                AcquireState::Retry => {
                    let remaining = (deadline - self.clock.now())
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    let wait = self.backoff().min(remaining.max(Duration::from_millis(1)));
                    self.clock.sleep(wait);
                    AcquireState::Probe
                }
            };
        }
    }

    fn probe(&self, path: &Path) -> Result<AcquireState> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(AcquireState::TryCreate),
            Err(e) => {
                return Err(Error::LockFailed {
                    path: path.to_path_buf(),
                    reason: format!("cannot read lock file: {e}"),
                    holder: None,
                });
            }
        };

        let Ok(info) = serde_json::from_slice::<LockInfo>(&raw) else {
            return Ok(AcquireState::Stale { raw, holder: None });
        };

        let stale_after = to_delta(self.config.stale_timeout);
        let age = self.clock.now() - info.timestamp;
        // A clock jump must not pin a lock forever.
        let future_dated = -age > stale_after;
        if future_dated {
            log::warn!(
                "sdb: lock {} is dated {} in the future; treating it as abandoned",
                path.display(),
                info.timestamp
            );
        }
        if age > stale_after || future_dated {
            Ok(AcquireState::Stale {
                raw,
                holder: Some(info),
            })
        } else {
            Ok(AcquireState::Contended(Some(info)))
        }
    }

    /// Base delay plus uniform jitter in `[0, base]`.
    fn backoff(&self) -> Duration {
        let base = self.config.retry_delay;
        let base_us = base.as_micros();
        if base_us == 0 {
            return Duration::from_millis(1);
        }
        let roll = uuid::Uuid::new_v4().as_u128() % (base_us + 1);
        base + Duration::from_micros(roll as u64)
    }

    /// Acquire, run `f`, and release on every exit path.
    ///
    /// Errors raised by `f` are returned after the lock is released.
    pub fn with_lock<T>(
        &self,
        paths: &DatabasePaths,
        operation: &str,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let guard = self.acquire(paths, operation)?;
        let result = f();
        guard.release();
        result
    }
}

/// Remove the lock file if present. Never fails.
pub fn release(paths: &DatabasePaths) {
    remove_quietly(paths.lock());
}

/// Read the current lock holder, if any.
///
/// Returns `Ok(None)` when no lock file exists or when it cannot be parsed.
pub fn read_lock_info(paths: &DatabasePaths) -> Result<Option<LockInfo>> {
    match fs::read(paths.lock()) {
        Ok(raw) => Ok(serde_json::from_slice(&raw).ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io("read lock file", paths.lock(), e)),
    }
}

/// A held lock. Released on [`LockGuard::release`] or drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl LockGuard {
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release now. Best-effort: errors are logged, never returned.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // If our lock was reclaimed as stale, the file now belongs to
        // someone else and must stay.
        if let Ok(raw) = fs::read(&self.path) {
            if let Ok(current) = serde_json::from_slice::<LockInfo>(&raw) {
                if current != self.info {
                    log::warn!(
                        "sdb: lock {} was taken over by pid {} ({}); leaving it in place",
                        self.path.display(),
                        current.pid,
                        current.operation
                    );
                    return;
                }
            }
        }
        remove_quietly(&self.path);
        log::debug!("sdb: released lock {}", self.path.display());
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Create the lock file with its full content in one step.
///
/// The content is staged in a private file and hard-linked into place, so
/// the lock never appears half-written to a concurrent prober. Filesystems
/// without hard links fall back to an exclusive create followed by a write.
fn publish(path: &Path, info: &LockInfo) -> io::Result<()> {
    let body = serde_json::to_vec(info).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let staging = path.with_file_name(format!(
        "{LOCK_FILE}.{}.{:08x}.tmp",
        info.pid,
        uuid::Uuid::new_v4().as_u128() as u32
    ));
    write_new(&staging, &body)?;
    let linked = fs::hard_link(&staging, path);
    remove_quietly(&staging);

    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(_) => write_new(path, &body),
    }
}

fn write_new(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(body)?;
    file.sync_data()
}

/// Remove an abandoned lock, but only if it still holds what we judged.
///
/// The lock is first renamed to a private name, which takes it atomically.
/// If what we took is no longer the judged content, another process has
/// reclaimed it and published its own lock in the meantime; that one is put
/// back with a no-clobber link. Should a third writer have published in the
/// gap, the taken lock is discarded and its owner's guard will leave the new
/// one alone on release.
fn reclaim(path: &Path, judged: &[u8]) -> Result<()> {
    let taken = path.with_file_name(format!(
        "{LOCK_FILE}.{}.{:08x}.stale",
        std::process::id(),
        uuid::Uuid::new_v4().as_u128() as u32
    ));
    match fs::rename(path, &taken) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(Error::LockFailed {
                path: path.to_path_buf(),
                reason: format!("cannot take abandoned lock file: {e}"),
                holder: serde_json::from_slice(judged).ok(),
            });
        }
    }

    let current = fs::read(&taken);
    if !matches!(&current, Ok(bytes) if bytes == judged) {
        match fs::hard_link(&taken, path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                log::warn!(
                    "sdb: lock {} was republished while being reclaimed; dropping the displaced copy",
                    path.display()
                );
            }
            Err(_) => {
                // No hard links here; a rename may clobber but is the best left.
                if let Err(e) = fs::rename(&taken, path) {
                    log::warn!("sdb: failed to restore lock {}: {e}", path.display());
                }
                return Ok(());
            }
        }
    }
    remove_quietly(&taken);
    Ok(())
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("sdb: failed to remove {}: {e}", path.display()),
    }
}
