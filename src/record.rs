use crate::time::parse_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix reserved for system-managed fields.
pub const RESERVED_SIGIL: char = '_';

/// Unique, immutable record identifier.
pub const ID: &str = "_id";
/// Creation time, immutable.
pub const CREATED_AT: &str = "_createdAt";
/// Time of the last mutation.
pub const UPDATED_AT: &str = "_updatedAt";
/// Present only on soft-deleted records.
pub const DELETED_AT: &str = "_deletedAt";

/// Fields that hold timestamps and therefore sort chronologically.
pub const TIMESTAMP_FIELDS: [&str; 3] = [CREATED_AT, UPDATED_AT, DELETED_AT];

/// Whether `name` falls in the reserved namespace.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_SIGIL)
}

/// One stored record: an open map of fields plus the reserved `_` fields.
///
/// Serialized as a single JSON object per line. The map is kept as-is so
/// unknown fields survive a load/rewrite cycle untouched.
///
/// # Examples
///
/// ```
/// use sdb::Record;
/// use serde_json::json;
///
/// let record: Record = serde_json::from_value(json!({
///     "_id": "rec-1",
///     "_createdAt": "2026-01-01T00:00:00.000Z",
///     "title": "Buy milk",
/// }))
/// .unwrap();
/// assert_eq!(record.id(), Some("rec-1"));
/// assert!(!record.is_deleted());
/// assert_eq!(record.user_fields().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(Map::new())
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Record(fields)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Look up a dotted path (`address.city`) through nested objects.
    ///
    /// A top-level field whose name itself contains a dot wins over the
    /// nested interpretation.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(path) {
            return Some(value);
        }
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get(ID).and_then(Value::as_str)
    }

    /// Parsed value of a timestamp field; `None` if missing or unparseable.
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.0.get(field).and_then(parse_timestamp)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(CREATED_AT)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(UPDATED_AT)
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(DELETED_AT)
    }

    /// Whether the record carries a `_deletedAt` marker, valid or not.
    pub fn is_deleted(&self) -> bool {
        self.0.contains_key(DELETED_AT)
    }

    /// The record without any reserved fields.
    pub fn user_fields(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| !is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Record(fields)
    }
}
