use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::info;

use crate::data::{JoinedRecord, Record};

/// Row accounting for one inner join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JoinSummary {
    /// Rows in the clean (left) table.
    pub left_rows: usize,
    /// Rows in the raw (right) table.
    pub right_rows: usize,
    /// Rows emitted by the join.
    pub joined_rows: usize,
    /// Clean rows whose `url` has no raw counterpart.
    pub unmatched_left: usize,
    /// Raw rows whose `url` has no clean counterpart.
    pub unmatched_right: usize,
}

/// Inner-join `clean` and `raw` on `url`.
///
/// Output follows the clean table's row order; a clean row matching several raw
/// rows is emitted once per match, in raw-table order. Rows whose `url` is
/// missing from either side are dropped. `doc_id` is the output row index.
pub fn inner_join(clean: &[Record], raw: &[Record]) -> (Vec<JoinedRecord>, JoinSummary) {
    let mut raw_by_url: IndexMap<&str, Vec<&Record>> = IndexMap::with_capacity(raw.len());
    for record in raw {
        raw_by_url
            .entry(record.url.as_str())
            .or_default()
            .push(record);
    }

    let mut joined = Vec::new();
    let mut unmatched_left = 0usize;
    let mut matched_urls = 0usize;
    for left in clean {
        let Some(matches) = raw_by_url.get(left.url.as_str()) else {
            unmatched_left += 1;
            continue;
        };
        for right in matches {
            joined.push(JoinedRecord {
                url: left.url.clone(),
                timestamp: left.timestamp.clone(),
                clean: left.text.clone(),
                raw: right.text.clone(),
                doc_id: joined.len() as u64,
            });
        }
    }

    let clean_urls: HashSet<&str> = clean.iter().map(|record| record.url.as_str()).collect();
    let mut unmatched_right = 0usize;
    for (url, rows) in &raw_by_url {
        if clean_urls.contains(url) {
            matched_urls += 1;
        } else {
            unmatched_right += rows.len();
        }
    }

    let summary = JoinSummary {
        left_rows: clean.len(),
        right_rows: raw.len(),
        joined_rows: joined.len(),
        unmatched_left,
        unmatched_right,
    };
    info!(
        "[corpus_pairs:join] clean={} raw={} joined={} shared_urls={} dropped_clean={} dropped_raw={}",
        summary.left_rows,
        summary.right_rows,
        summary.joined_rows,
        matched_urls,
        summary.unmatched_left,
        summary.unmatched_right
    );
    (joined, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, text: &str) -> Record {
        Record::new(url, text, &format!("ts-{text}"))
    }

    #[test]
    fn keeps_only_urls_present_on_both_sides() {
        let clean = vec![record("A", "a clean"), record("B", "b clean"), record("C", "c clean")];
        let raw = vec![record("B", "b raw"), record("C", "c raw"), record("D", "d raw")];

        let (joined, summary) = inner_join(&clean, &raw);

        let urls: Vec<&str> = joined.iter().map(|row| row.url.as_str()).collect();
        assert_eq!(urls, vec!["B", "C"]);
        assert_eq!(joined[0].clean, "b clean");
        assert_eq!(joined[0].raw, "b raw");
        assert_eq!(joined[1].clean, "c clean");
        assert_eq!(joined[1].raw, "c raw");
        assert_eq!(summary.unmatched_left, 1);
        assert_eq!(summary.unmatched_right, 1);
    }

    #[test]
    fn timestamp_comes_from_clean_side_and_doc_ids_are_dense() {
        let clean = vec![record("B", "left"), record("A", "other")];
        let raw = vec![record("A", "right-a"), record("B", "right-b")];

        let (joined, _) = inner_join(&clean, &raw);

        assert_eq!(joined[0].url, "B");
        assert_eq!(joined[0].timestamp, "ts-left");
        assert_eq!(joined.iter().map(|r| r.doc_id).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn duplicate_urls_expand_to_every_pairing() {
        let clean = vec![record("A", "c1"), record("A", "c2")];
        let raw = vec![record("A", "r1"), record("A", "r2"), record("Z", "r3")];

        let (joined, summary) = inner_join(&clean, &raw);

        let pairs: Vec<(&str, &str)> = joined
            .iter()
            .map(|row| (row.clean.as_str(), row.raw.as_str()))
            .collect();
        assert_eq!(pairs, vec![("c1", "r1"), ("c1", "r2"), ("c2", "r1"), ("c2", "r2")]);
        assert_eq!(summary.joined_rows, 4);
        assert_eq!(summary.unmatched_right, 1);
    }

    #[test]
    fn disjoint_tables_join_to_nothing() {
        let (joined, summary) = inner_join(&[record("A", "a")], &[record("B", "b")]);
        assert!(joined.is_empty());
        assert_eq!(summary.joined_rows, 0);
    }
}
