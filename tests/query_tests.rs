mod common;

use common::{at_ms, epoch, ids, record, stamped, ts};
use sdb::query::{self, Direction, SortSpec};
use sdb::{ErrorCode, QueryOptions, Record};
use serde_json::json;

const HOUR: i64 = 3_600_000;

fn now() -> chrono::DateTime<chrono::Utc> {
    at_ms(48 * HOUR)
}

fn sorted(records: Vec<Record>, order: &str) -> Vec<Record> {
    let opts = QueryOptions::new().sort(order).unwrap();
    query::run(records, vec![], &opts, now())
}

#[test]
fn test_sort_spec_forms() {
    let spec = SortSpec::parse("priority").unwrap();
    assert_eq!(spec.field, "priority");
    assert_eq!(spec.direction, Direction::Ascending);

    let spec = SortSpec::parse("-updated").unwrap();
    assert_eq!(spec.field, "_updatedAt");
    assert_eq!(spec.direction, Direction::Descending);

    let spec = SortSpec::parse("title:ASC").unwrap();
    assert_eq!(spec.field, "title");
    assert_eq!(spec.direction, Direction::Ascending);

    assert_eq!(SortSpec::parse("id").unwrap().field, "_id");
    assert_eq!(SortSpec::parse("deletedAt:desc").unwrap().field, "_deletedAt");
}

#[test]
fn test_invalid_sort_and_limit() {
    assert_eq!(
        SortSpec::parse("title:sideways").unwrap_err().code(),
        ErrorCode::InvalidInput
    );
    assert_eq!(SortSpec::parse(":desc").unwrap_err().code(), ErrorCode::InvalidInput);
    assert_eq!(SortSpec::parse("").unwrap_err().code(), ErrorCode::InvalidInput);

    for bad in ["-1", "+5", "ten", "1.5", "", "1_000", "0x10"] {
        let err = QueryOptions::new().limit(bad).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput, "limit {bad:?}");
    }
    assert_eq!(QueryOptions::new().limit(" 3 ").unwrap().limit, Some(3));
}

#[test]
fn test_invalid_window() {
    let err = QueryOptions::new().created_within("soon").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);
}

#[test]
fn test_sort_is_stable_in_both_directions() {
    let records = vec![
        record("a", json!({"p": 2})),
        record("b", json!({"p": 1})),
        record("c", json!({"p": 2})),
        record("d", json!({"p": 1})),
    ];

    assert_eq!(ids(&sorted(records.clone(), "p")), vec!["b", "d", "a", "c"]);
    assert_eq!(ids(&sorted(records, "p:desc")), vec!["a", "c", "b", "d"]);
}

#[test]
fn test_missing_values_sort_last_in_both_directions() {
    let records = vec![
        record("none", json!({})),
        record("two", json!({"p": 2})),
        record("null", json!({"p": null})),
        record("one", json!({"p": 1})),
    ];

    assert_eq!(
        ids(&sorted(records.clone(), "p")),
        vec!["one", "two", "none", "null"]
    );
    assert_eq!(ids(&sorted(records, "-p")), vec!["two", "one", "none", "null"]);
}

#[test]
fn test_numbers_sort_numerically() {
    let records = vec![
        record("ten", json!({"n": 10})),
        record("two", json!({"n": 2})),
        record("half", json!({"n": 0.5})),
    ];
    assert_eq!(ids(&sorted(records, "n")), vec!["half", "two", "ten"]);
}

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

#[test]
fn test_mixed_types_sort_the_same_from_any_input_order() {
    let records = vec![
        record("two", json!({"p": 2})),
        record("ten", json!({"p": 10})),
        record("ten-text", json!({"p": "10"})),
        record("yes", json!({"p": true})),
        record("list", json!({"p": [1]})),
        record("none", json!({})),
    ];

    for order in permutations(&records) {
        assert_eq!(
            ids(&sorted(order.clone(), "p")),
            vec!["two", "ten", "yes", "ten-text", "list", "none"],
            "input {:?}",
            ids(&order)
        );
        assert_eq!(
            ids(&sorted(order, "-p")),
            vec!["list", "ten-text", "yes", "ten", "two", "none"]
        );
    }
}

#[test]
fn test_text_sort_ignores_case() {
    let records = vec![
        record("1", json!({"t": "banana"})),
        record("2", json!({"t": "Apple"})),
        record("3", json!({"t": "apple"})),
        record("4", json!({"t": "Cherry"})),
    ];
    assert_eq!(ids(&sorted(records, "t")), vec!["3", "2", "1", "4"]);
}

#[test]
fn test_timestamps_sort_chronologically_not_lexically() {
    // An offset timestamp that is lexically larger but earlier in time.
    let records = vec![
        record("z", json!({"_createdAt": "2026-01-01T05:00:00.000Z"})),
        record("offset", json!({"_createdAt": "2026-01-01T09:00:00.000+06:00"})),
        record("bad", json!({"_createdAt": "yesterday"})),
    ];
    assert_eq!(ids(&sorted(records, "created")), vec!["offset", "z", "bad"]);
}

#[test]
fn test_limit() {
    let records: Vec<Record> = (0..5).map(|i| record(&i.to_string(), json!({"n": i}))).collect();

    let opts = QueryOptions::new().sort("-n").unwrap().limit("2").unwrap();
    let out = query::run(records.clone(), vec![], &opts, now());
    assert_eq!(ids(&out), vec!["4", "3"]);

    let opts = QueryOptions::new().limit("0").unwrap();
    assert!(query::run(records.clone(), vec![], &opts, now()).is_empty());

    let opts = QueryOptions::new().limit("99").unwrap();
    assert_eq!(query::run(records, vec![], &opts, now()).len(), 5);
}

#[test]
fn test_unsorted_results_keep_file_order() {
    let records = vec![
        record("c", json!({})),
        record("a", json!({})),
        record("b", json!({})),
    ];
    let out = query::run(records, vec![], &QueryOptions::new(), now());
    assert_eq!(ids(&out), vec!["c", "a", "b"]);
}

#[test]
fn test_time_windows() {
    let records = vec![
        stamped("fresh", at_ms(47 * HOUR), json!({})),
        stamped("edge", at_ms(24 * HOUR), json!({})),
        stamped("old", at_ms(HOUR), json!({})),
        record("unstamped", json!({})),
    ];

    let opts = QueryOptions::new().created_within("24h").unwrap();
    let out = query::run(records.clone(), vec![], &opts, now());
    assert_eq!(ids(&out), vec!["fresh", "edge"]);

    let opts = QueryOptions::new().updated_within("1h 30m").unwrap();
    let out = query::run(records, vec![], &opts, now());
    assert_eq!(ids(&out), vec!["fresh"]);
}

#[test]
fn test_deleted_window_applies_only_to_deleted_records() {
    let active = vec![stamped("live", epoch(), json!({}))];
    let deleted = vec![
        stamped("recent", epoch(), json!({})).with(sdb::DELETED_AT, ts(at_ms(47 * HOUR))),
        stamped("ancient", epoch(), json!({})).with(sdb::DELETED_AT, ts(at_ms(HOUR))),
    ];

    let opts = QueryOptions::new()
        .include_deleted(true)
        .deleted_within("2h")
        .unwrap();
    let out = query::run(active, deleted, &opts, now());
    assert_eq!(ids(&out), vec!["live", "recent"]);
}

#[test]
fn test_include_deleted_merges_and_dedups() {
    let active = vec![record("a", json!({"v": "live"})), record("b", json!({}))];
    let deleted = vec![
        record("c", json!({})).with(sdb::DELETED_AT, ts(epoch())),
        // A copy of a live record left by an interrupted soft delete.
        record("a", json!({"v": "stale"})).with(sdb::DELETED_AT, ts(epoch())),
        record("c", json!({"dup": true})).with(sdb::DELETED_AT, ts(epoch())),
    ];

    let without = query::run(active.clone(), deleted.clone(), &QueryOptions::new(), now());
    assert_eq!(ids(&without), vec!["a", "b"]);

    let opts = QueryOptions::new().include_deleted(true);
    let with = query::run(active, deleted, &opts, now());
    assert_eq!(ids(&with), vec!["a", "b", "c"]);
    assert_eq!(with[0].get("v"), Some(&json!("live")));
    assert_eq!(with[2].get("dup"), None);
}

#[test]
fn test_active_records_with_deleted_at_are_treated_as_deleted() {
    let active = vec![
        record("live", json!({})),
        record("legacy", json!({})).with(sdb::DELETED_AT, ts(epoch())),
    ];

    let out = query::run(active.clone(), vec![], &QueryOptions::new(), now());
    assert_eq!(ids(&out), vec!["live"]);

    let opts = QueryOptions::new().include_deleted(true);
    let out = query::run(active, vec![], &opts, now());
    assert_eq!(ids(&out), vec!["live", "legacy"]);
}

#[test]
fn test_filter_applies_to_deleted_records_too() {
    let active = vec![record("a", json!({"s": "x"}))];
    let deleted = vec![
        record("b", json!({"s": "x"})).with(sdb::DELETED_AT, ts(epoch())),
        record("c", json!({"s": "y"})).with(sdb::DELETED_AT, ts(epoch())),
    ];
    let opts = QueryOptions::new()
        .filter(r#".s == "x""#)
        .unwrap()
        .include_deleted(true);

    let out = query::run(active, deleted, &opts, now());
    assert_eq!(ids(&out), vec!["a", "b"]);
}

#[test]
fn test_select_ignores_sort_and_limit() {
    let records: Vec<Record> = (0..4).map(|i| record(&i.to_string(), json!({"n": i}))).collect();
    let opts = QueryOptions::new()
        .filter(".n >= 1")
        .unwrap()
        .sort("-n")
        .unwrap()
        .limit("1")
        .unwrap();

    assert_eq!(query::select(records.clone(), vec![], &opts, now()).len(), 3);
    assert_eq!(query::run(records, vec![], &opts, now()).len(), 1);
}
