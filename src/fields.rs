//! Parsing of `name=value` field arguments.

use crate::error::{Error, Result};
use crate::record::is_reserved;
use serde_json::{Map, Value};

/// Parse `name=value` assignments into a field map.
///
/// The value is read as JSON when it parses (`3`, `true`, `["a","b"]`,
/// `"quoted"`) and taken verbatim as a string otherwise. Later assignments
/// to the same name win.
///
/// ```
/// use serde_json::json;
///
/// let fields = sdb::fields::parse_assignments(["title=Buy milk", "priority=2"]).unwrap();
/// assert_eq!(fields["title"], json!("Buy milk"));
/// assert_eq!(fields["priority"], json!(2));
/// ```
pub fn parse_assignments<I, S>(args: I) -> Result<Map<String, Value>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut fields = Map::new();
    for arg in args {
        let arg = arg.as_ref();
        let Some((name, raw)) = arg.split_once('=') else {
            return Err(Error::invalid_input(
                "field",
                format!("expected name=value, got {arg:?}"),
            ));
        };
        let name = name.trim();
        check_field_name(name)?;
        fields.insert(name.to_string(), parse_value(raw));
    }
    Ok(fields)
}

/// Reject empty names and names in the reserved namespace.
pub fn check_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_input("field", "field name must not be empty"));
    }
    if is_reserved(name) {
        return Err(Error::invalid_input(
            "field",
            format!("field {name:?} uses the reserved `_` prefix"),
        ));
    }
    Ok(())
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
