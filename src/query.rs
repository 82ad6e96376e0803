//! Filtering, time windows, merging, sorting, and limiting over loaded
//! records.
//!
//! Stages always run in the same order: content filter, time windows,
//! optional merge of deleted records, sort, limit. Options are parsed from
//! raw strings up front so bad input fails before any file is read.

use crate::error::{Error, Result};
use crate::filter::{self, Filter};
use crate::record::{CREATED_AT, DELETED_AT, ID, Record, TIMESTAMP_FIELDS, UPDATED_AT};
use crate::time::{cutoff, parse_duration};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// A normalized sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: Direction,
}

impl SortSpec {
    /// Parse `field`, `field:asc`, `field:desc`, or `-field`.
    ///
    /// `created`, `updated`, `deleted` and `id` (with or without the
    /// `At` suffix) are aliases for the reserved fields.
    ///
    /// ```
    /// use sdb::query::{Direction, SortSpec};
    ///
    /// let spec = SortSpec::parse("created:desc").unwrap();
    /// assert_eq!(spec.field, "_createdAt");
    /// assert_eq!(spec.direction, Direction::Descending);
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (field, direction) = if let Some(field) = input.strip_prefix('-') {
            (field, Direction::Descending)
        } else if let Some((field, dir)) = input.rsplit_once(':') {
            let direction = match dir.trim().to_ascii_lowercase().as_str() {
                "asc" | "ascending" => Direction::Ascending,
                "desc" | "descending" => Direction::Descending,
                other => {
                    return Err(Error::invalid_input(
                        "order",
                        format!("unknown sort direction {other:?}, expected asc or desc"),
                    ));
                }
            };
            (field, direction)
        } else {
            (input, Direction::Ascending)
        };

        let field = field.trim();
        if field.is_empty() {
            return Err(Error::invalid_input("order", "sort field must not be empty"));
        }
        Ok(SortSpec {
            field: normalize_field(field).to_string(),
            direction,
        })
    }
}

/// Map user-facing aliases onto stored field names.
pub fn normalize_field(field: &str) -> &str {
    match field {
        "id" => ID,
        "created" | "createdAt" => CREATED_AT,
        "updated" | "updatedAt" => UPDATED_AT,
        "deleted" | "deletedAt" => DELETED_AT,
        other => other,
    }
}

/// Parse a limit string: decimal digits only, no sign.
pub fn parse_limit(input: &str) -> Result<usize> {
    let trimmed = input.trim();
    let invalid = || {
        Error::invalid_input(
            "limit",
            format!("expected a non-negative integer, got {trimmed:?}"),
        )
    };
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    trimmed.parse::<usize>().map_err(|_| invalid())
}

/// "Within the last N" windows for each timestamp field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindows {
    pub created: Option<Duration>,
    pub updated: Option<Duration>,
    /// Only meaningful for deleted records.
    pub deleted: Option<Duration>,
}

/// Everything a list or count needs besides the records themselves.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub filter: Option<Filter>,
    pub windows: TimeWindows,
    pub include_deleted: bool,
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, expression: &str) -> Result<Self> {
        self.filter = Some(filter::compile(expression)?);
        Ok(self)
    }

    pub fn created_within(mut self, window: &str) -> Result<Self> {
        self.windows.created = Some(parse_duration("window", window)?);
        Ok(self)
    }

    pub fn updated_within(mut self, window: &str) -> Result<Self> {
        self.windows.updated = Some(parse_duration("window", window)?);
        Ok(self)
    }

    pub fn deleted_within(mut self, window: &str) -> Result<Self> {
        self.windows.deleted = Some(parse_duration("window", window)?);
        Ok(self)
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    pub fn sort(mut self, order: &str) -> Result<Self> {
        self.sort = Some(SortSpec::parse(order)?);
        Ok(self)
    }

    pub fn limit(mut self, limit: &str) -> Result<Self> {
        self.limit = Some(parse_limit(limit)?);
        Ok(self)
    }

    /// Whether the deleted log needs loading to answer this query.
    pub fn needs_deleted(&self) -> bool {
        self.include_deleted
    }
}

/// Run the full pipeline.
///
/// `active` and `deleted` are the loaded logs in file order. An active
/// record that already carries `_deletedAt` (written by older versions that
/// soft-deleted in place) is treated as deleted.
pub fn run(
    active: Vec<Record>,
    deleted: Vec<Record>,
    options: &QueryOptions,
    now: DateTime<Utc>,
) -> Vec<Record> {
    let mut results = select(active, deleted, options, now);
    if let Some(spec) = &options.sort {
        sort_records(&mut results, spec);
    }
    if let Some(limit) = options.limit {
        results.truncate(limit);
    }
    results
}

/// Filter, window, and merge stages only. Used where order and limit are
/// irrelevant (counting).
pub fn select(
    active: Vec<Record>,
    deleted: Vec<Record>,
    options: &QueryOptions,
    now: DateTime<Utc>,
) -> Vec<Record> {
    let (live, legacy): (Vec<Record>, Vec<Record>) =
        active.into_iter().partition(|r| !r.is_deleted());

    let keep = |record: &Record, is_deleted: bool| {
        options.filter.as_ref().is_none_or(|f| f.matches(record))
            && within_windows(record, &options.windows, is_deleted, now)
    };

    let mut results: Vec<Record> = live.into_iter().filter(|r| keep(r, false)).collect();

    if options.include_deleted {
        let mut seen: HashSet<String> = results
            .iter()
            .filter_map(|r| r.id().map(str::to_string))
            .collect();
        for record in deleted.into_iter().chain(legacy) {
            if !keep(&record, true) {
                continue;
            }
            if let Some(id) = record.id() {
                if !seen.insert(id.to_string()) {
                    continue;
                }
            }
            results.push(record);
        }
    }

    results
}

fn within_windows(
    record: &Record,
    windows: &TimeWindows,
    is_deleted: bool,
    now: DateTime<Utc>,
) -> bool {
    let inside = |field: &str, window: Option<Duration>| match window {
        None => true,
        Some(window) => record
            .timestamp(field)
            .is_some_and(|t| t >= cutoff(now, window)),
    };
    inside(CREATED_AT, windows.created)
        && inside(UPDATED_AT, windows.updated)
        && (!is_deleted || inside(DELETED_AT, windows.deleted))
}

/// Stable sort by `spec`; ties keep their original relative order in both
/// directions, and missing values always sort last.
pub fn sort_records(records: &mut Vec<Record>, spec: &SortSpec) {
    let is_timestamp = TIMESTAMP_FIELDS.contains(&spec.field.as_str());
    let mut indexed: Vec<(usize, Record)> =
        std::mem::take(records).into_iter().enumerate().collect();

    indexed.sort_by(|(ia, a), (ib, b)| {
        let ord = if is_timestamp {
            compare_present(
                a.timestamp(&spec.field),
                b.timestamp(&spec.field),
                spec.direction,
                Ord::cmp,
            )
        } else {
            compare_present(
                sort_value(a.lookup(&spec.field)),
                sort_value(b.lookup(&spec.field)),
                spec.direction,
                compare_values,
            )
        };
        ord.then(ia.cmp(ib))
    });

    records.extend(indexed.into_iter().map(|(_, r)| r));
}

fn sort_value(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Order two optional keys: present before missing, then by `cmp` in the
/// requested direction.
fn compare_present<T>(
    a: Option<T>,
    b: Option<T>,
    direction: Direction,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            Direction::Ascending => cmp(&a, &b),
            Direction::Descending => cmp(&b, &a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Numbers numerically, booleans false < true, strings and compound values
/// as text. Values of different JSON types order by type first:
/// number < boolean < string < array < object.
fn compare_values(a: &&Value, b: &&Value) -> Ordering {
    match (*a, *b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => compare_text(x, y),
        (a, b) if type_rank(a) == type_rank(b) => compare_text(&a.to_string(), &b.to_string()),
        (a, b) => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) => 0,
        Value::Bool(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        // Filtered out before comparison; sorts last regardless.
        Value::Null => 5,
    }
}

/// Case-insensitive comparison, lowercase first on ties, then raw order.
///
/// Approximates a locale collation for the common Latin-script case.
fn compare_text(a: &str, b: &str) -> Ordering {
    let folded = a.to_lowercase().cmp(&b.to_lowercase());
    if folded != Ordering::Equal {
        return folded;
    }
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca != cb {
            return match (ca.is_lowercase(), cb.is_lowercase()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => ca.cmp(&cb),
            };
        }
    }
    a.len().cmp(&b.len())
}
