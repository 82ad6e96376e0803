//! A small jq-flavoured filter language over records.
//!
//! ```text
//! .status == "pending" and .priority > 2
//! .tags | contains("urgent") or not .assignee
//! select(.done == false)
//! ```
//!
//! `or` binds loosest, then `and`, then individual terms. Parentheses group.
//! Terms are a comparison (`==`, `!=`, `>`, `<`, `>=`, `<=`), an array
//! membership test (`| contains("x")`), an existence test (`.field`) or its
//! negation (`not .field`). Field paths may be dotted to reach into nested
//! objects.
//!
//! Filters are a best-effort mask: an ordering comparison against a
//! non-numeric value is simply false, never an error.

use crate::error::{Error, Result};
use crate::record::Record;
use regex::Regex;
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::sync::LazyLock;

const FIELD: &str = r"[A-Za-z_$][A-Za-z0-9_$-]*(?:\.[A-Za-z_$][A-Za-z0-9_$-]*)*";

static CONTAINS_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\.({FIELD})\s*\|\s*contains\(\s*(.*?)\s*\)$"))
        .expect("constant regex pattern is valid")
});

static COMPARISON_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\.({FIELD})\s*(==|!=|>=|<=|>|<)\s*(.+)$"))
        .expect("constant regex pattern is valid")
});

static NEGATED_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^not\s+\.({FIELD})$")).expect("constant regex pattern is valid")
});

static EXISTS_TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^\.({FIELD})$")).expect("constant regex pattern is valid"));

/// Comparison operator in a filter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            ">" => CompareOp::Gt,
            "<" => CompareOp::Lt,
            ">=" => CompareOp::Ge,
            "<=" => CompareOp::Le,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Any(Vec<Expr>),
    All(Vec<Expr>),
    Compare {
        field: String,
        op: CompareOp,
        literal: Value,
    },
    Contains {
        field: String,
        needle: String,
    },
    Exists(String),
    Missing(String),
}

impl Expr {
    fn eval(&self, record: &Record) -> bool {
        match self {
            Expr::Any(terms) => terms.iter().any(|t| t.eval(record)),
            Expr::All(terms) => terms.iter().all(|t| t.eval(record)),
            Expr::Compare { field, op, literal } => compare(*op, record.lookup(field), literal),
            Expr::Contains { field, needle } => match record.lookup(field) {
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| item.as_str() == Some(needle.as_str())),
                _ => false,
            },
            Expr::Exists(field) => present(record.lookup(field)),
            Expr::Missing(field) => !present(record.lookup(field)),
        }
    }
}

/// A compiled filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    source: String,
    expr: Option<Expr>,
}

impl Filter {
    /// Whether `record` passes the filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.expr.as_ref().is_none_or(|expr| expr.eval(record))
    }

    /// True for the empty expression, which keeps every record.
    pub fn matches_everything(&self) -> bool {
        self.expr.is_none()
    }

    /// The expression this filter was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Parse an expression into a reusable predicate.
///
/// An optional `select( ... )` wrapper is stripped; an empty expression
/// matches every record.
///
/// # Errors
///
/// [`Error::InvalidFilter`] naming the fragment that could not be parsed.
///
/// # Examples
///
/// ```
/// use sdb::{Record, filter};
///
/// let f = filter::compile(r#".status == "pending" and .priority > 2"#).unwrap();
/// let hit = Record::new().with("status", "pending").with("priority", 3);
/// let miss = Record::new().with("status", "pending").with("priority", "high");
/// assert!(f.matches(&hit));
/// assert!(!f.matches(&miss));
/// ```
pub fn compile(expression: &str) -> Result<Filter> {
    let body = strip_select(expression.trim());
    let expr = if body.is_empty() {
        None
    } else {
        Some(parse_or(body)?)
    };
    Ok(Filter {
        source: expression.to_string(),
        expr,
    })
}

/// Keep only the records matching `expression`, preserving order.
pub fn apply(records: Vec<Record>, expression: &str) -> Result<Vec<Record>> {
    let filter = compile(expression)?;
    if filter.matches_everything() {
        return Ok(records);
    }
    Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
}

fn strip_select(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("select") else {
        return s;
    };
    let rest = rest.trim_start();
    if rest.starts_with('(') && matching_close(rest) == Some(rest.len() - 1) {
        rest[1..rest.len() - 1].trim()
    } else {
        s
    }
}

fn parse_or(s: &str) -> Result<Expr> {
    let mut parts = split_top_level(s, "or")?;
    if parts.len() == 1 {
        return parse_and(parts.remove(0));
    }
    Ok(Expr::Any(parts.into_iter().map(parse_and).collect::<Result<_>>()?))
}

fn parse_and(s: &str) -> Result<Expr> {
    let mut parts = split_top_level(s, "and")?;
    if parts.len() == 1 {
        return parse_term(parts.remove(0));
    }
    Ok(Expr::All(parts.into_iter().map(parse_term).collect::<Result<_>>()?))
}

fn parse_term(s: &str) -> Result<Expr> {
    let term = s.trim();

    if term.starts_with('(') && matching_close(term) == Some(term.len() - 1) {
        let inner = term[1..term.len() - 1].trim();
        if inner.is_empty() {
            return Err(Error::invalid_filter(term, "empty parentheses"));
        }
        return parse_or(inner);
    }

    if let Some(caps) = CONTAINS_TERM.captures(term) {
        let arg = caps[2].trim();
        return match quoted_string(arg) {
            Some(needle) => Ok(Expr::Contains {
                field: caps[1].to_string(),
                needle,
            }),
            None => Err(Error::invalid_filter(
                term,
                "contains() expects a quoted string argument",
            )),
        };
    }

    if let Some(caps) = COMPARISON_TERM.captures(term) {
        let op = CompareOp::parse(&caps[2])
            .ok_or_else(|| Error::invalid_filter(term, "unknown comparison operator"))?;
        let raw = &caps[3];
        if raw.starts_with(['=', '<', '>', '!']) {
            return Err(Error::invalid_filter(term, "unknown comparison operator"));
        }
        return Ok(Expr::Compare {
            field: caps[1].to_string(),
            op,
            literal: parse_literal(raw),
        });
    }

    if let Some(caps) = NEGATED_TERM.captures(term) {
        return Ok(Expr::Missing(caps[1].to_string()));
    }

    if let Some(caps) = EXISTS_TERM.captures(term) {
        return Ok(Expr::Exists(caps[1].to_string()));
    }

    Err(Error::invalid_filter(term, "unrecognized filter syntax"))
}

/// Split on a boolean keyword that sits outside quotes and brackets.
fn split_top_level<'a>(s: &'a str, keyword: &str) -> Result<Vec<&'a str>> {
    let bytes = s.as_bytes();
    let kw = keyword.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'(' | b'[' => depth += 1,
            b')' | b']' => {
                depth -= 1;
                if depth < 0 {
                    return Err(Error::invalid_filter(s, "unbalanced parentheses"));
                }
            }
            _ if depth == 0 && keyword_at(bytes, i, kw) => {
                parts.push(&s[start..i]);
                i += kw.len();
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    if quote.is_some() {
        return Err(Error::invalid_filter(s, "unterminated string literal"));
    }
    if depth != 0 {
        return Err(Error::invalid_filter(s, "unbalanced parentheses"));
    }

    parts.push(&s[start..]);
    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(Error::invalid_filter(
            s,
            format!("missing operand for `{keyword}`"),
        ));
    }
    Ok(parts)
}

/// A keyword stands alone: bounded by whitespace, a bracket, or either end.
fn keyword_at(bytes: &[u8], i: usize, kw: &[u8]) -> bool {
    let end = i + kw.len();
    if end > bytes.len() || &bytes[i..end] != kw {
        return false;
    }
    let before_ok = i == 0 || bytes[i - 1].is_ascii_whitespace() || bytes[i - 1] == b')';
    let after_ok = end == bytes.len() || bytes[end].is_ascii_whitespace() || bytes[end] == b'(';
    before_ok && after_ok
}

/// Index of the bracket closing the `(` at position 0, honoring quotes.
fn matching_close(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn quoted_string(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.len() < 2 {
        return None;
    }
    if raw.starts_with('"') && raw.ends_with('"') {
        let decoded = serde_json::from_str::<String>(raw)
            .unwrap_or_else(|_| raw[1..raw.len() - 1].to_string());
        return Some(decoded);
    }
    if raw.starts_with('\'') && raw.ends_with('\'') {
        return Some(raw[1..raw.len() - 1].replace("\\'", "'"));
    }
    None
}

/// Quoted → string, `true`/`false`/`null`, numbers, else a bare string.
fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    if let Some(s) = quoted_string(raw) {
        return Value::String(s);
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = raw
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
    {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

fn present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}

fn compare(op: CompareOp, actual: Option<&Value>, literal: &Value) -> bool {
    match op {
        CompareOp::Eq => actual.is_some_and(|v| strict_eq(v, literal)),
        CompareOp::Ne => !actual.is_some_and(|v| strict_eq(v, literal)),
        CompareOp::Gt | CompareOp::Lt | CompareOp::Ge | CompareOp::Le => {
            let (Some(a), Some(b)) = (actual.and_then(Value::as_f64), literal.as_f64()) else {
                return false;
            };
            let Some(ord) = a.partial_cmp(&b) else {
                return false;
            };
            match op {
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Ge => ord != Ordering::Less,
                CompareOp::Le => ord != Ordering::Greater,
                CompareOp::Eq | CompareOp::Ne => false,
            }
        }
    }
}

/// Equality of value and type; numbers compare by numeric value.
fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}
