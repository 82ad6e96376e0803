//! JSON Lines encoding of records.

use crate::error::{Error, Result};
use crate::record::Record;
use serde_json::Value;
use std::io;
use std::path::Path;

const SNIPPET_CHARS: usize = 80;

/// How to treat a final line that is not newline-terminated and does not
/// parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingLine {
    /// Every line must parse.
    Strict,
    /// A malformed, unterminated last line is an append torn by a crash and
    /// is dropped.
    Tolerant,
}

/// Serialize one record as compact JSON, without the trailing newline.
pub fn encode(record: &Record) -> io::Result<String> {
    serde_json::to_string(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Serialize records as a full log body: one line each, newline-terminated.
pub fn encode_all<'a>(records: impl IntoIterator<Item = &'a Record>) -> io::Result<String> {
    let mut out = String::new();
    for record in records {
        out.push_str(&encode(record)?);
        out.push('\n');
    }
    Ok(out)
}

/// Parse a log body into records, preserving line order.
///
/// Blank lines are skipped. `source` is only used to label errors.
pub fn decode_lines(text: &str, source: &Path, trailing: TrailingLine) -> Result<Vec<Record>> {
    let terminated = text.is_empty() || text.ends_with('\n');
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len().saturating_sub(1);
    let mut records = Vec::with_capacity(lines.len());

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.trim().is_empty() {
            continue;
        }

        let failure = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => {
                records.push(Record::from_map(map));
                continue;
            }
            Ok(other) => format!("expected a JSON object, found {}", kind_of(&other)),
            Err(e) => e.to_string(),
        };

        if idx == last && !terminated && trailing == TrailingLine::Tolerant {
            log::warn!(
                "sdb: dropping partially written last line {} of {}",
                idx + 1,
                source.display()
            );
            break;
        }

        return Err(Error::MalformedData {
            path: source.to_path_buf(),
            line: idx + 1,
            message: failure,
            snippet: snippet(line),
        });
    }

    Ok(records)
}

pub(crate) fn snippet(line: &str) -> String {
    let mut chars = line.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
