//! Loading and persisting the active and deleted logs.
//!
//! Two write strategies are used. Full rewrites go through a temp file in
//! the same directory followed by a rename, so a concurrent reader sees
//! either the old file or the new one and never a mix. Soft deletes append a
//! single line to the deleted log instead of rewriting it.

use crate::codec::{self, TrailingLine};
use crate::error::{Error, Result};
use crate::paths::{DatabasePaths, LogKind};
use crate::record::Record;
use crate::schema::Schema;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

const TAIL_SCAN_CHUNK: u64 = 8192;

/// Fail with [`Error::NotInitialized`] unless the folder holds a schema.
pub fn ensure_exists(paths: &DatabasePaths) -> Result<()> {
    if paths.schema().is_file() {
        Ok(())
    } else {
        Err(Error::NotInitialized {
            folder: paths.folder().to_path_buf(),
        })
    }
}

/// Load every record in the active log, in file order.
///
/// A missing file is an empty log. Every line must parse.
pub fn load_active(paths: &DatabasePaths) -> Result<Vec<Record>> {
    load(paths, LogKind::Active)
}

/// Load every record in the deleted log, in file order.
///
/// A malformed last line without a trailing newline is an append torn by a
/// crash and is dropped; any other malformed line is an error.
pub fn load_deleted(paths: &DatabasePaths) -> Result<Vec<Record>> {
    load(paths, LogKind::Deleted)
}

pub fn load(paths: &DatabasePaths, kind: LogKind) -> Result<Vec<Record>> {
    let path = paths.log(kind);
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io("read log", path, e)),
    };
    let trailing = match kind {
        LogKind::Active => TrailingLine::Strict,
        LogKind::Deleted => TrailingLine::Tolerant,
    };
    codec::decode_lines(&text, path, trailing)
}

/// Atomically replace the log for `kind` with `records`.
///
/// # Errors
///
/// [`Error::OperationFailed`] if any step fails. The temp file is removed
/// and the original log is left untouched.
pub fn write_full(paths: &DatabasePaths, kind: LogKind, records: &[Record]) -> Result<()> {
    let target = paths.log(kind);
    let body = codec::encode_all(records).map_err(|e| Error::io("encode log", target, e))?;
    write_atomic(target, paths.tmp(kind), body.as_bytes())
}

/// Append one record to the deleted log.
///
/// If the log ends in a torn line left by an earlier crash, that fragment
/// is cut off first so the new line starts on a clean boundary.
pub fn append_one(paths: &DatabasePaths, record: &Record) -> Result<()> {
    let path = paths.deleted();
    let line = codec::encode(record).map_err(|e| Error::io("encode record", path, e))?;

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io("open deleted log", path, e))?;

    repair_torn_tail(&mut file, path).map_err(|e| Error::io("repair deleted log", path, e))?;

    let mut buf = line.into_bytes();
    buf.push(b'\n');
    file.write_all(&buf)
        .and_then(|()| file.sync_data())
        .map_err(|e| Error::io("append to deleted log", path, e))
}

/// Read and parse `schema.json`.
pub fn read_schema(paths: &DatabasePaths) -> Result<Schema> {
    let path = paths.schema();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::NotInitialized {
                folder: paths.folder().to_path_buf(),
            });
        }
        Err(e) => return Err(Error::io("read schema", path, e)),
    };
    let value: Value = serde_json::from_str(&text).map_err(|e| {
        let bad_line = text.lines().nth(e.line().saturating_sub(1)).unwrap_or("");
        Error::MalformedData {
            path: path.to_path_buf(),
            line: e.line(),
            message: e.to_string(),
            snippet: codec::snippet(bad_line),
        }
    })?;
    Schema::from_value(value)
}

/// Atomically write `schema.json`.
pub fn write_schema(paths: &DatabasePaths, schema: &Schema) -> Result<()> {
    let path = paths.schema();
    let json = serde_json::to_string_pretty(schema.as_value()).map_err(|e| {
        Error::io(
            "encode schema",
            path,
            io::Error::new(io::ErrorKind::InvalidData, e),
        )
    })?;
    let tmp = path.with_extension("json.tmp");
    write_atomic(path, &tmp, format!("{json}\n").as_bytes())
}

/// Write `bytes` to `tmp`, sync, then rename over `target`.
fn write_atomic(target: &Path, tmp: &Path, bytes: &[u8]) -> Result<()> {
    let written = (|| -> io::Result<()> {
        let mut file = File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_data()?;
        drop(file);
        fs::rename(tmp, target)
    })();

    written.map_err(|e| {
        if let Err(cleanup) = fs::remove_file(tmp) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                log::warn!("sdb: could not remove temp file {}: {cleanup}", tmp.display());
            }
        }
        Error::io("atomic write", target, e)
    })
}

/// Cut off an unterminated final line unless it is a complete record, in
/// which case only the missing newline is written.
fn repair_torn_tail(file: &mut File, path: &Path) -> io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let start = last_line_start(file, len)?;
    let mut tail = vec![0u8; (len - start) as usize];
    file.seek(SeekFrom::Start(start))?;
    file.read_exact(&mut tail)?;

    if matches!(serde_json::from_slice::<Value>(&tail), Ok(Value::Object(_))) {
        file.write_all(b"\n")?;
    } else {
        log::warn!(
            "sdb: truncating torn line ({} bytes) at end of {}",
            tail.len(),
            path.display()
        );
        file.set_len(start)?;
    }
    Ok(())
}

/// Byte offset where the last line of a file of length `len` begins.
fn last_line_start(file: &mut File, len: u64) -> io::Result<u64> {
    let mut end = len;
    while end > 0 {
        let scan_start = end.saturating_sub(TAIL_SCAN_CHUNK);
        let mut buf = vec![0u8; (end - scan_start) as usize];
        file.seek(SeekFrom::Start(scan_start))?;
        file.read_exact(&mut buf)?;
        if let Some(pos) = buf.iter().rposition(|&b| b == b'\n') {
            return Ok(scan_start + pos as u64 + 1);
        }
        end = scan_start;
    }
    Ok(0)
}
