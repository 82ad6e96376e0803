mod common;

use common::{ids, record};
use sdb::{ErrorCode, Record, filter};
use serde_json::json;

fn sample() -> Vec<Record> {
    vec![
        record("a", json!({"status": "pending", "priority": 3, "tags": ["urgent", "home"]})),
        record("b", json!({"status": "done", "priority": 1, "tags": ["work"]})),
        record("c", json!({"status": "pending", "priority": "high", "assignee": null})),
        record("d", json!({"status": "pending", "priority": 5.5, "assignee": "kim", "meta": {"owner": "ops"}})),
    ]
}

fn run(expression: &str) -> Vec<String> {
    filter::apply(sample(), expression)
        .unwrap()
        .iter()
        .map(|r| r.id().unwrap().to_string())
        .collect()
}

#[test]
fn test_empty_expression_keeps_everything() {
    assert_eq!(run(""), vec!["a", "b", "c", "d"]);
    assert_eq!(run("   "), vec!["a", "b", "c", "d"]);
    assert!(filter::compile("").unwrap().matches_everything());
}

#[test]
fn test_equality() {
    assert_eq!(run(r#".status == "pending""#), vec!["a", "c", "d"]);
    assert_eq!(run(r#".status != "pending""#), vec!["b"]);
    assert_eq!(run(".priority == 3"), vec!["a"]);
    assert_eq!(run(".priority == 3.0"), vec!["a"]);
    assert_eq!(run(".assignee == null"), vec!["c"]);
}

#[test]
fn test_single_quotes_are_accepted() {
    assert_eq!(run(".status == 'done'"), vec!["b"]);
}

#[test]
fn test_equality_is_type_strict() {
    // The string "3" is not the number 3.
    assert_eq!(run(r#".priority == "3""#), Vec::<String>::new());
    assert_eq!(run(r#".priority == "high""#), vec!["c"]);
}

#[test]
fn test_ne_matches_missing_fields() {
    assert_eq!(run(r#".assignee != "kim""#), vec!["a", "b", "c"]);
}

#[test]
fn test_ordering_requires_numbers() {
    assert_eq!(run(".priority > 2"), vec!["a", "d"]);
    assert_eq!(run(".priority >= 3"), vec!["a", "d"]);
    assert_eq!(run(".priority < 3"), vec!["b"]);
    assert_eq!(run(".priority <= 1"), vec!["b"]);
    // Non-numeric operands never match and never fail.
    assert_eq!(run(r#".status > "a""#), Vec::<String>::new());
    assert_eq!(run(".missing > 0"), Vec::<String>::new());
}

#[test]
fn test_contains() {
    assert_eq!(run(r#".tags | contains("urgent")"#), vec!["a"]);
    assert_eq!(run(r#".tags|contains("work")"#), vec!["b"]);
    // Exact element match, not substring.
    assert_eq!(run(r#".tags | contains("urg")"#), Vec::<String>::new());
    // Non-array fields never match.
    assert_eq!(run(r#".status | contains("pending")"#), Vec::<String>::new());
}

#[test]
fn test_existence_and_negation() {
    // null counts as absent.
    assert_eq!(run(".assignee"), vec!["d"]);
    assert_eq!(run("not .assignee"), vec!["a", "b", "c"]);
    assert_eq!(run(".tags"), vec!["a", "b"]);
}

#[test]
fn test_and_binds_tighter_than_or() {
    assert_eq!(
        run(r#".status == "done" or .priority > 4 and .assignee"#),
        vec!["b", "d"]
    );
    assert_eq!(
        run(r#"(.status == "done" or .priority > 4) and .assignee"#),
        vec!["d"]
    );
}

#[test]
fn test_select_wrapper_is_stripped() {
    assert_eq!(run(r#"select(.status == "done")"#), vec!["b"]);
    assert_eq!(run(r#"select( .priority > 2 and .tags )"#), vec!["a"]);
}

#[test]
fn test_nested_field_paths() {
    assert_eq!(run(r#".meta.owner == "ops""#), vec!["d"]);
    assert_eq!(run(".meta.owner"), vec!["d"]);
    assert_eq!(run("not .meta.owner"), vec!["a", "b", "c"]);
}

#[test]
fn test_keywords_inside_strings_do_not_split() {
    let records = vec![
        record("x", json!({"title": "salt and pepper"})),
        record("y", json!({"title": "this or that"})),
    ];
    let out = filter::apply(records, r#".title == "salt and pepper""#).unwrap();
    assert_eq!(ids(&out), vec!["x"]);
}

#[test]
fn test_keywords_inside_field_names_do_not_split() {
    let records = vec![record("x", json!({"order": 1, "brand": "acme"}))];
    let out = filter::apply(records, r#".order == 1 and .brand == "acme""#).unwrap();
    assert_eq!(ids(&out), vec!["x"]);
}

#[test]
fn test_filter_preserves_input_order() {
    let out = filter::apply(sample(), r#".status == "pending""#).unwrap();
    assert_eq!(ids(&out), vec!["a", "c", "d"]);
}

#[test]
fn test_compiled_filter_is_reusable() {
    let f = filter::compile(".priority > 2").unwrap();
    let hits = sample().iter().filter(|r| f.matches(r)).count();
    assert_eq!(hits, 2);
    assert_eq!(f.source(), ".priority > 2");
}

#[test]
fn test_invalid_expressions() {
    for bad in [
        "status == 1",
        ".a ==",
        ".a == 1 and",
        "or .a",
        "(.a == 1",
        ".a == 1)",
        r#".a == "open"#,
        "()",
        r#".tags | contains(urgent)"#,
        ".a === 1",
    ] {
        let err = filter::compile(bad).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFilter, "expression: {bad}");
        assert!(err.context().contains_key("fragment"));
    }
}
