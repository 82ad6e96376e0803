mod common;

use common::{at_ms, record};
use proptest::prelude::*;
use sdb::codec::{self, TrailingLine};
use sdb::gc::{self, Prune};
use sdb::query::{self, SortSpec};
use sdb::{DatabasePaths, LogKind, Record, store};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-zA-Z0-9 \\n\"\\\\é]{0,12}".prop_map(Value::from),
        proptest::collection::vec(any::<u8>(), 0..4).prop_map(|v| json!(v)),
    ]
}

fn arb_record(i: usize) -> impl Strategy<Value = Record> {
    proptest::collection::btree_map("[a-z]{1,6}", arb_value(), 0..5).prop_map(move |fields| {
        let mut rec = record(&format!("id-{i}"), json!({}));
        for (k, v) in fields {
            rec.insert(k, v);
        }
        rec
    })
}

fn arb_records() -> impl Strategy<Value = Vec<Record>> {
    (0usize..20).prop_flat_map(|n| (0..n).map(arb_record).collect::<Vec<_>>())
}

// Whatever is written comes back unchanged and in order.
proptest! {
    #[test]
    fn prop_write_then_load_is_identity(records in arb_records()) {
        let dir = tempdir().unwrap();
        let paths = DatabasePaths::resolve(dir.path()).unwrap();

        store::write_full(&paths, LogKind::Active, &records).unwrap();
        let loaded = store::load_active(&paths).unwrap();

        prop_assert_eq!(loaded, records);
    }
}

// Chopping bytes off the end of a deleted log never fails to load; it only
// loses the torn record.
proptest! {
    #[test]
    fn prop_torn_deleted_tail_is_tolerated(records in arb_records(), cut in 1usize..40) {
        prop_assume!(!records.is_empty());
        let text = codec::encode_all(&records).unwrap();
        let cut = cut.min(text.len());
        let mut end = text.len() - cut;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let torn = &text[..end];

        let loaded = codec::decode_lines(torn, Path::new("deleted"), TrailingLine::Tolerant).unwrap();

        let complete_lines = torn.matches('\n').count();
        prop_assert!(loaded.len() >= complete_lines);
        prop_assert!(loaded.len() <= complete_lines + 1);
        prop_assert_eq!(&loaded[..], &records[..loaded.len()]);
    }
}

// Sorting is stable: records with equal keys keep their input order.
proptest! {
    #[test]
    fn prop_sort_is_stable(keys in proptest::collection::vec(0u8..4, 0..30), desc in any::<bool>()) {
        let records: Vec<Record> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| record(&format!("{i:03}"), json!({"k": k})))
            .collect();
        let spec = SortSpec::parse(if desc { "k:desc" } else { "k" }).unwrap();

        let mut sorted = records.clone();
        query::sort_records(&mut sorted, &spec);

        for pair in sorted.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let (ka, kb) = (a.get("k").unwrap().as_u64(), b.get("k").unwrap().as_u64());
            if desc {
                prop_assert!(ka >= kb);
            } else {
                prop_assert!(ka <= kb);
            }
            if ka == kb {
                prop_assert!(a.id() < b.id());
            }
        }
    }
}

// GC never removes a record younger than the cutoff and never loses count.
proptest! {
    #[test]
    fn prop_gc_partitions_by_cutoff(
        ages in proptest::collection::vec(0i64..1_000_000, 0..30),
        keep_ms in 0u64..1_000_000,
    ) {
        let now = at_ms(2_000_000);
        let deleted: Vec<Record> = ages
            .iter()
            .enumerate()
            .map(|(i, age)| {
                record(&i.to_string(), json!({}))
                    .with(sdb::DELETED_AT, sdb::time::format_timestamp(at_ms(2_000_000 - age)))
            })
            .collect();

        let sweep = gc::sweep(deleted, Prune::OlderThan(Duration::from_millis(keep_ms)), now);

        prop_assert_eq!(sweep.report.removed + sweep.report.remaining, ages.len());
        let expected_removed = ages.iter().filter(|&&age| age >= keep_ms as i64).count();
        prop_assert_eq!(sweep.report.removed, expected_removed);
    }
}
