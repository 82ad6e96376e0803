use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub const SCHEMA_FILE: &str = "schema.json";
pub const ACTIVE_FILE: &str = "data.jsonl";
pub const DELETED_FILE: &str = "data.deleted.jsonl";
pub const LOCK_FILE: &str = ".sdb.lock";

/// Which of the two record logs an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Active,
    Deleted,
}

/// Canonical locations of every file belonging to one database folder.
///
/// Derived once per invocation and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePaths {
    folder: PathBuf,
    schema: PathBuf,
    active: PathBuf,
    deleted: PathBuf,
    lock: PathBuf,
    active_tmp: PathBuf,
    deleted_tmp: PathBuf,
}

impl DatabasePaths {
    /// Resolve a folder argument to absolute paths.
    ///
    /// An existing folder is canonicalized (symlinks resolved). A folder
    /// that does not exist yet is made absolute against the current
    /// directory so `init` can create it.
    pub fn resolve(folder: impl AsRef<Path>) -> Result<Self> {
        let folder = folder.as_ref();
        if folder.as_os_str().is_empty() {
            return Err(Error::invalid_input("path", "database folder must not be empty"));
        }

        let folder = match folder.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) if folder.is_absolute() => folder.to_path_buf(),
            Err(_) => std::env::current_dir()
                .map_err(|e| Error::io("resolve current directory", folder, e))?
                .join(folder),
        };

        Ok(Self::from_canonical(folder))
    }

    fn from_canonical(folder: PathBuf) -> Self {
        DatabasePaths {
            schema: folder.join(SCHEMA_FILE),
            active: folder.join(ACTIVE_FILE),
            deleted: folder.join(DELETED_FILE),
            lock: folder.join(LOCK_FILE),
            active_tmp: folder.join(format!("{ACTIVE_FILE}.tmp")),
            deleted_tmp: folder.join(format!("{DELETED_FILE}.tmp")),
            folder,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn schema(&self) -> &Path {
        &self.schema
    }

    pub fn active(&self) -> &Path {
        &self.active
    }

    pub fn deleted(&self) -> &Path {
        &self.deleted
    }

    pub fn lock(&self) -> &Path {
        &self.lock
    }

    /// The log file for `kind`.
    pub fn log(&self, kind: LogKind) -> &Path {
        match kind {
            LogKind::Active => &self.active,
            LogKind::Deleted => &self.deleted,
        }
    }

    /// The temp file used while atomically rewriting the log for `kind`.
    pub fn tmp(&self, kind: LogKind) -> &Path {
        match kind {
            LogKind::Active => &self.active_tmp,
            LogKind::Deleted => &self.deleted_tmp,
        }
    }
}
