//! Operation facade: the entry points a command-line front end calls.

use crate::clock::{Clock, SystemClock};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::fields::check_field_name;
use crate::gc::{self, GcOptions, GcReport};
use crate::id::{IdGen, UuidV7IdGen};
use crate::lock::LockManager;
use crate::paths::{DatabasePaths, LogKind};
use crate::query::{self, QueryOptions};
use crate::record::{CREATED_AT, DELETED_AT, ID, Record, UPDATED_AT};
use crate::schema::{BasicValidator, Schema, SchemaValidator, ValidationOutcome};
use crate::store;
use crate::time::format_timestamp;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How `delete` removes a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Move the record to the deleted log, stamping `_deletedAt`.
    Soft,
    /// Remove the record from whichever log holds it, permanently.
    Hard,
}

/// Validation result for one stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordValidation {
    pub id: Option<String>,
    pub outcome: ValidationOutcome,
}

/// Builder for a [`Database`] handle.
pub struct DatabaseBuilder {
    folder: PathBuf,
    options: Options,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
    validator: Arc<dyn SchemaValidator>,
}

impl DatabaseBuilder {
    fn new(folder: &Path) -> Self {
        DatabaseBuilder {
            folder: folder.to_path_buf(),
            options: Options::default(),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7IdGen),
            validator: Arc::new(BasicValidator),
        }
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn id_gen(mut self, ids: impl IdGen + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Resolve paths and build the handle. Touches nothing on disk.
    pub fn open(self) -> Result<Database> {
        let paths = DatabasePaths::resolve(&self.folder)?;
        let locks = LockManager::new(self.options.lock, Arc::clone(&self.clock))
            .with_debug(self.options.debug);
        Ok(Database {
            paths,
            options: self.options,
            clock: self.clock,
            ids: self.ids,
            validator: self.validator,
            locks,
        })
    }
}

/// A handle on one database folder.
///
/// Holds no record state between calls: every operation reads the logs
/// fresh from disk. Mutating operations run under the folder lock; reads
/// never lock.
pub struct Database {
    paths: DatabasePaths,
    options: Options,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
    validator: Arc<dyn SchemaValidator>,
    locks: LockManager,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("paths", &self.paths)
            .field("options", &self.options)
            .finish()
    }
}

impl Database {
    pub fn builder(folder: impl AsRef<Path>) -> DatabaseBuilder {
        DatabaseBuilder::new(folder.as_ref())
    }

    /// Open with defaults, taking lock timings from the environment.
    pub fn open(folder: impl AsRef<Path>) -> Result<Self> {
        Self::builder(folder).options(Options::from_env()?).open()
    }

    pub fn paths(&self) -> &DatabasePaths {
        &self.paths
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Run `f` while holding the folder lock; the lock is released on every
    /// exit path.
    pub fn with_lock<T>(&self, operation: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.locks.with_lock(&self.paths, operation, f)
    }

    /// Create the database: schema plus empty logs.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyExists`] if a schema is present and `force` is false.
    /// With `force`, the schema is replaced and both logs are emptied.
    pub fn init(&self, schema: Value, force: bool) -> Result<()> {
        let schema = Schema::from_value(schema)?;
        schema.check_definition()?;

        let folder = self.paths.folder();
        fs::create_dir_all(folder).map_err(|e| Error::io("create database folder", folder, e))?;

        self.with_lock("init", || {
            if !force && self.paths.schema().exists() {
                return Err(Error::AlreadyExists {
                    folder: folder.to_path_buf(),
                });
            }
            store::write_schema(&self.paths, &schema)?;
            if force || !self.paths.active().exists() {
                store::write_full(&self.paths, LogKind::Active, &[])?;
            }
            if force || !self.paths.deleted().exists() {
                store::write_full(&self.paths, LogKind::Deleted, &[])?;
            }
            log::info!("sdb: initialized database at {}", folder.display());
            Ok(())
        })
    }

    /// Read the schema document.
    pub fn schema(&self) -> Result<Schema> {
        store::read_schema(&self.paths)
    }

    /// Create a record from user fields and return it as stored.
    pub fn add(&self, fields: Map<String, Value>) -> Result<Record> {
        check_user_fields(&fields)?;
        store::ensure_exists(&self.paths)?;

        self.with_lock("add", || {
            let schema = store::read_schema(&self.paths)?;
            let mut fields = fields;
            schema.apply_defaults(&mut fields);
            self.check_valid(&schema, None, &Value::Object(fields.clone()))?;

            let mut records = store::load_active(&self.paths)?;
            let id = self.ids.next_id();
            let now = format_timestamp(self.clock.now());

            let mut map = Map::new();
            map.insert(ID.to_string(), Value::String(id));
            map.extend(fields);
            map.insert(CREATED_AT.to_string(), Value::String(now.clone()));
            map.insert(UPDATED_AT.to_string(), Value::String(now));
            let record = Record::from_map(map);

            records.push(record.clone());
            store::write_full(&self.paths, LogKind::Active, &records)?;
            self.trace(format_args!("added {}", record.id().unwrap_or_default()));
            Ok(record)
        })
    }

    /// Merge `fields` into an active record and bump `_updatedAt`.
    pub fn update(&self, id: &str, fields: Map<String, Value>) -> Result<Record> {
        check_id(id)?;
        check_user_fields(&fields)?;
        store::ensure_exists(&self.paths)?;

        self.with_lock("update", || {
            let schema = store::read_schema(&self.paths)?;
            let mut records = store::load_active(&self.paths)?;
            let pos = position_live(&records, id).ok_or_else(|| Error::record_not_found(id))?;

            let mut updated = records[pos].clone();
            for (name, value) in fields {
                updated.insert(name, value);
            }
            self.check_valid(&schema, Some(id), &Schema::user_view(&updated))?;
            updated.insert(UPDATED_AT, Value::String(format_timestamp(self.clock.now())));

            records[pos] = updated.clone();
            store::write_full(&self.paths, LogKind::Active, &records)?;
            self.trace(format_args!("updated {id}"));
            Ok(updated)
        })
    }

    /// Soft- or hard-delete a record, returning what was removed.
    pub fn delete(&self, id: &str, mode: DeleteMode) -> Result<Record> {
        check_id(id)?;
        store::ensure_exists(&self.paths)?;

        match mode {
            DeleteMode::Soft => self.with_lock("delete", || self.soft_delete(id)),
            DeleteMode::Hard => self.with_lock("delete --hard", || self.hard_delete(id)),
        }
    }

    fn soft_delete(&self, id: &str) -> Result<Record> {
        let mut records = store::load_active(&self.paths)?;
        let pos = position_live(&records, id).ok_or_else(|| Error::record_not_found(id))?;

        let now = format_timestamp(self.clock.now());
        let mut record = records.remove(pos);
        record.insert(DELETED_AT, Value::String(now.clone()));
        record.insert(UPDATED_AT, Value::String(now));

        // Deleted copy first: a crash in between leaves the record in both
        // logs (deduplicated on read) rather than in neither.
        store::append_one(&self.paths, &record)?;
        store::write_full(&self.paths, LogKind::Active, &records)?;
        self.trace(format_args!("soft-deleted {id}"));
        Ok(record)
    }

    fn hard_delete(&self, id: &str) -> Result<Record> {
        let mut active = store::load_active(&self.paths)?;
        let mut deleted = store::load_deleted(&self.paths)?;

        let from_active = take_all(&mut active, id);
        let from_deleted = take_all(&mut deleted, id);

        if !from_active.is_empty() {
            store::write_full(&self.paths, LogKind::Active, &active)?;
        }
        if !from_deleted.is_empty() {
            store::write_full(&self.paths, LogKind::Deleted, &deleted)?;
        }

        let removed = from_active
            .into_iter()
            .chain(from_deleted)
            .next()
            .ok_or_else(|| Error::record_not_found(id))?;
        self.trace(format_args!("hard-deleted {id}"));
        Ok(removed)
    }

    /// Fetch one record by id. Deleted records are only returned when
    /// `include_deleted` is set.
    pub fn get(&self, id: &str, include_deleted: bool) -> Result<Record> {
        check_id(id)?;
        store::ensure_exists(&self.paths)?;

        let active = store::load_active(&self.paths)?;
        if let Some(pos) = position_live(&active, id) {
            return Ok(active[pos].clone());
        }
        if include_deleted {
            let deleted = store::load_deleted(&self.paths)?;
            let found = deleted
                .into_iter()
                .chain(active.into_iter().filter(Record::is_deleted))
                .find(|r| r.id() == Some(id));
            if let Some(record) = found {
                return Ok(record);
            }
        }
        Err(Error::record_not_found(id))
    }

    /// Query records. Never locks.
    pub fn list(&self, options: &QueryOptions) -> Result<Vec<Record>> {
        let (active, deleted) = self.load_for(options)?;
        Ok(query::run(active, deleted, options, self.clock.now()))
    }

    /// Count the records a query selects, ignoring sort and limit.
    pub fn count(&self, options: &QueryOptions) -> Result<usize> {
        let (active, deleted) = self.load_for(options)?;
        Ok(query::select(active, deleted, options, self.clock.now()).len())
    }

    fn load_for(&self, options: &QueryOptions) -> Result<(Vec<Record>, Vec<Record>)> {
        store::ensure_exists(&self.paths)?;
        let active = store::load_active(&self.paths)?;
        let deleted = if options.needs_deleted() {
            store::load_deleted(&self.paths)?
        } else {
            Vec::new()
        };
        self.trace(format_args!(
            "loaded {} active, {} deleted",
            active.len(),
            deleted.len()
        ));
        Ok((active, deleted))
    }

    /// Permanently prune the deleted log.
    ///
    /// A dry run reads without locking and never writes.
    pub fn gc(&self, options: GcOptions) -> Result<GcReport> {
        store::ensure_exists(&self.paths)?;

        if options.dry_run {
            let deleted = store::load_deleted(&self.paths)?;
            let mut report = gc::sweep(deleted, options.prune, self.clock.now()).report;
            report.dry_run = true;
            return Ok(report);
        }

        self.with_lock("gc", || {
            let deleted = store::load_deleted(&self.paths)?;
            let sweep = gc::sweep(deleted, options.prune, self.clock.now());
            if sweep.report.removed > 0 {
                store::write_full(&self.paths, LogKind::Deleted, &sweep.survivors)?;
            }
            log::info!(
                "sdb: gc removed {} of {} deleted records ({} kept with invalid _deletedAt)",
                sweep.report.removed,
                sweep.report.total,
                sweep.report.skipped_invalid
            );
            Ok(sweep.report)
        })
    }

    /// Re-validate every active record against the current schema.
    pub fn validate(&self) -> Result<Vec<RecordValidation>> {
        let schema = store::read_schema(&self.paths)?;
        let records = store::load_active(&self.paths)?;
        Ok(records
            .iter()
            .filter(|r| !r.is_deleted())
            .map(|r| RecordValidation {
                id: r.id().map(str::to_string),
                outcome: self.validator.validate(&schema, &Schema::user_view(r)),
            })
            .collect())
    }

    fn check_valid(&self, schema: &Schema, id: Option<&str>, data: &Value) -> Result<()> {
        let outcome = self.validator.validate(schema, data);
        if outcome.valid {
            Ok(())
        } else {
            Err(Error::SchemaValidation {
                id: id.map(str::to_string),
                errors: outcome.errors,
            })
        }
    }

    fn trace(&self, args: std::fmt::Arguments<'_>) {
        if self.options.debug {
            log::debug!("sdb: {} {args}", self.paths.folder().display());
        }
    }
}

fn check_user_fields(fields: &Map<String, Value>) -> Result<()> {
    fields.keys().try_for_each(|name| check_field_name(name))
}

fn check_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        Err(Error::invalid_input("id", "record id must not be empty"))
    } else {
        Ok(())
    }
}

fn position_live(records: &[Record], id: &str) -> Option<usize> {
    records
        .iter()
        .position(|r| r.id() == Some(id) && !r.is_deleted())
}

fn take_all(records: &mut Vec<Record>, id: &str) -> Vec<Record> {
    let (taken, kept): (Vec<Record>, Vec<Record>) =
        std::mem::take(records).into_iter().partition(|r| r.id() == Some(id));
    *records = kept;
    taken
}
