#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sdb::{Database, FakeClock, LockConfig, Options, Record, SequentialIdGen};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

/// 2026-01-01T00:00:00Z
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

/// `epoch() + ms`
pub fn at_ms(ms: i64) -> DateTime<Utc> {
    epoch() + chrono::TimeDelta::milliseconds(ms)
}

pub fn ts(time: DateTime<Utc>) -> String {
    sdb::time::format_timestamp(time)
}

pub fn record(id: &str, fields: Value) -> Record {
    let mut record = Record::new().with(sdb::ID, id);
    if let Value::Object(map) = fields {
        for (k, v) in map {
            record.insert(k, v);
        }
    }
    record
}

/// A record with both timestamps set to `time`.
pub fn stamped(id: &str, time: DateTime<Utc>, fields: Value) -> Record {
    record(id, fields)
        .with(sdb::CREATED_AT, ts(time))
        .with(sdb::UPDATED_AT, ts(time))
}

pub fn deleted(id: &str, deleted_at: DateTime<Utc>) -> Record {
    stamped(id, epoch(), json!({})).with(sdb::DELETED_AT, ts(deleted_at))
}

pub fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id().unwrap_or("")).collect()
}

pub fn fast_locks() -> LockConfig {
    LockConfig::default()
        .with_stale_timeout(Duration::from_secs(60))
        .with_retry_delay(Duration::from_millis(5))
        .with_wait_budget(Duration::from_secs(2))
}

pub fn todo_schema() -> Value {
    json!({
        "type": "object",
        "required": ["title"],
        "properties": {
            "title": {"type": "string"},
            "status": {"type": "string", "enum": ["pending", "done"], "default": "pending"},
            "priority": {"type": "integer"},
            "tags": {"type": "array"}
        }
    })
}

/// An initialized database with a fake clock and predictable ids.
pub fn test_db(dir: &Path) -> (Database, FakeClock) {
    let clock = FakeClock::new(epoch());
    let db = Database::builder(dir.join("db"))
        .options(Options::default().with_lock(fast_locks()))
        .clock(clock.clone())
        .id_gen(SequentialIdGen::default())
        .open()
        .unwrap();
    db.init(todo_schema(), false).unwrap();
    (db, clock)
}

pub fn fields(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("fields must be an object"),
    }
}
