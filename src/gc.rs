//! Permanent pruning of the deleted log.

use crate::record::Record;
use crate::time::cutoff;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Which deleted records to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prune {
    /// Every record with a valid `_deletedAt`, regardless of age.
    All,
    /// Records whose `_deletedAt` is at or before `now - age`.
    OlderThan(Duration),
}

/// Options for a GC run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcOptions {
    pub prune: Prune,
    /// Compute and report without writing.
    pub dry_run: bool,
}

impl GcOptions {
    pub fn older_than(age: Duration) -> Self {
        GcOptions {
            prune: Prune::OlderThan(age),
            dry_run: false,
        }
    }

    pub fn all() -> Self {
        GcOptions {
            prune: Prune::All,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Counts reported by a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcReport {
    pub total: usize,
    pub removed: usize,
    pub remaining: usize,
    /// Entries kept because `_deletedAt` was missing or unparseable.
    pub skipped_invalid: usize,
    /// `None` when pruning everything.
    pub cutoff: Option<DateTime<Utc>>,
    pub dry_run: bool,
}

/// Surviving records plus the report describing what was pruned.
#[derive(Debug, Clone)]
pub struct Sweep {
    pub survivors: Vec<Record>,
    pub report: GcReport,
}

/// Decide which deleted records survive.
///
/// A record without a valid `_deletedAt` is never removed, under either
/// prune mode; it is kept and counted in `skipped_invalid`. Survivors keep
/// their original order.
pub fn sweep(deleted: Vec<Record>, prune: Prune, now: DateTime<Utc>) -> Sweep {
    let total = deleted.len();
    let cutoff = match prune {
        Prune::All => None,
        Prune::OlderThan(age) => Some(cutoff(now, age)),
    };

    let mut survivors = Vec::with_capacity(total);
    let mut skipped_invalid = 0;

    for record in deleted {
        let Some(deleted_at) = record.deleted_at() else {
            log::warn!(
                "sdb: gc keeping deleted record {} with missing or invalid _deletedAt",
                record.id().unwrap_or("<no id>")
            );
            skipped_invalid += 1;
            survivors.push(record);
            continue;
        };
        let expired = cutoff.is_none_or(|cutoff| deleted_at <= cutoff);
        if !expired {
            survivors.push(record);
        }
    }

    let remaining = survivors.len();
    Sweep {
        survivors,
        report: GcReport {
            total,
            removed: total - remaining,
            remaining,
            skipped_invalid,
            cutoff,
            dry_run: false,
        },
    }
}
