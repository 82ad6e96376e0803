//! A file-resident JSON record store.
//!
//! A database is a folder:
//!
//! ```text
//! schema.json            validator input
//! data.jsonl             active records, one JSON object per line
//! data.deleted.jsonl     soft-deleted records awaiting hard delete or GC
//! .sdb.lock              present only while a writer holds the lock
//! ```
//!
//! Writers serialize through the lock file; readers never lock and rely on
//! full rewrites being atomic renames.
//!
//! ```no_run
//! use sdb::{Database, DeleteMode, QueryOptions};
//! use serde_json::json;
//!
//! # fn main() -> sdb::Result<()> {
//! let db = Database::open("./tasks")?;
//! db.init(json!({"required": ["title"]}), false)?;
//!
//! let fields = sdb::fields::parse_assignments(["title=Buy milk", "status=pending"])?;
//! let record = db.add(fields)?;
//!
//! let pending = db.list(&QueryOptions::new().filter(r#".status == "pending""#)?)?;
//! assert_eq!(pending.len(), 1);
//!
//! db.delete(record.id().unwrap_or_default(), DeleteMode::Soft)?;
//! # Ok(())
//! # }
//! ```

mod clock;
pub mod codec;
mod config;
mod db;
mod error;
pub mod fields;
pub mod filter;
pub mod gc;
mod id;
pub mod lock;
mod paths;
pub mod query;
mod record;
pub mod schema;
pub mod store;
pub mod time;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    DEFAULT_LOCK_RETRY_MS, DEFAULT_LOCK_STALE_MS, ENV_LOCK_RETRY_MS, ENV_LOCK_STALE_MS,
    ENV_LOCK_WAIT_MS, LockConfig, Options,
};
pub use db::{Database, DatabaseBuilder, DeleteMode, RecordValidation};
pub use error::{Error, ErrorCode, Result};
pub use filter::Filter;
pub use gc::{GcOptions, GcReport, Prune};
pub use id::{IdGen, SequentialIdGen, UuidV7IdGen};
pub use lock::{LockGuard, LockInfo, LockManager};
pub use paths::{DatabasePaths, LogKind};
pub use query::{QueryOptions, SortSpec};
pub use record::{CREATED_AT, DELETED_AT, ID, RESERVED_SIGIL, Record, UPDATED_AT, is_reserved};
pub use schema::{BasicValidator, FieldError, Schema, SchemaValidator, ValidationOutcome};
