use std::collections::HashSet;

use corpus_pairs::shards::round_trip;
use corpus_pairs::{JoinedRecord, Record, SplitRatios, inner_join, split_rows};

fn joined(count: usize) -> Vec<JoinedRecord> {
    (0..count)
        .map(|idx| JoinedRecord {
            url: format!("https://doc/{idx}"),
            timestamp: "2019-04-25T12:57:54Z".to_string(),
            clean: format!("clean {idx}"),
            raw: format!("raw {idx}"),
            doc_id: idx as u64,
        })
        .collect()
}

#[test]
fn partitions_are_disjoint_and_exhaustive_for_many_sizes() {
    for count in [0usize, 1, 2, 3, 7, 10, 99, 1000] {
        let partitions = split_rows(joined(count), SplitRatios::default(), 42).unwrap();
        assert_eq!(partitions.total(), count);
        assert_eq!(partitions.train.len(), count * 6 / 10);
        assert_eq!(partitions.validate.len(), count * 8 / 10 - count * 6 / 10);

        let ids: HashSet<u64> = partitions
            .train
            .iter()
            .chain(&partitions.validate)
            .chain(&partitions.test)
            .map(|row| row.doc_id)
            .collect();
        assert_eq!(ids.len(), count);
    }
}

#[test]
fn split_is_a_pure_function_of_rows_and_seed() {
    let a = split_rows(joined(50), SplitRatios::default(), 42).unwrap();
    let b = split_rows(joined(50), SplitRatios::default(), 42).unwrap();
    let c = split_rows(joined(50), SplitRatios::default(), 43).unwrap();

    assert_eq!(a, b);
    assert_ne!(a.train, c.train);
}

#[test]
fn join_keeps_only_shared_urls_with_side_specific_text() {
    let clean = vec![
        Record::new("A", "clean A", "t1"),
        Record::new("B", "clean B", "t2"),
        Record::new("C", "clean C", "t3"),
    ];
    let raw = vec![
        Record::new("B", "raw B", "x"),
        Record::new("C", "raw C", "x"),
        Record::new("D", "raw D", "x"),
    ];

    let (rows, summary) = inner_join(&clean, &raw);

    let urls: Vec<&str> = rows.iter().map(|row| row.url.as_str()).collect();
    assert_eq!(urls, vec!["B", "C"]);
    assert_eq!(rows[0].clean, "clean B");
    assert_eq!(rows[0].raw, "raw B");
    assert_eq!(rows[1].timestamp, "t3");
    assert_eq!(summary.unmatched_left, 1);
    assert_eq!(summary.unmatched_right, 1);
}

#[test]
fn shard_round_trip_is_identity_for_any_shard_count() {
    let temp = tempfile::tempdir().unwrap();
    let table: Vec<Record> = (0..17)
        .map(|idx| Record::new(&format!("u{idx}"), &format!("text {idx}"), ""))
        .collect();

    for num_shards in [1usize, 2, 5, 17, 40] {
        let root = temp.path().join(format!("n{num_shards}"));
        assert_eq!(round_trip(&table, &root, num_shards, true).unwrap(), table);
    }
}
