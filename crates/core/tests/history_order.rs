use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use unbake_core::decompile::order_history;
use unbake_core::model::HistoryRecord;

fn at(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

fn created_by(records: &[HistoryRecord]) -> Vec<&str> {
    records.iter().map(|r| r.created_by.as_deref().unwrap_or_default()).collect()
}

#[test]
fn orders_by_creation_time() {
    let mut records = vec![
        HistoryRecord::new(at(300), "third"),
        HistoryRecord::new(at(100), "first"),
        HistoryRecord::new(at(200), "second"),
    ];
    order_history(&mut records);
    assert_eq!(created_by(&records), vec!["first", "second", "third"]);
}

#[test]
fn equal_timestamps_keep_input_order() {
    let mut records = vec![
        HistoryRecord::new(at(200), "b1"),
        HistoryRecord::new(at(100), "a"),
        HistoryRecord::new(at(200), "b2"),
        HistoryRecord::new(at(200), "b3"),
    ];
    order_history(&mut records);
    assert_eq!(created_by(&records), vec!["a", "b1", "b2", "b3"]);
}

#[test]
fn records_without_timestamp_sort_first() {
    let mut records = vec![
        HistoryRecord::new(at(100), "dated"),
        HistoryRecord::new(None, "undated"),
    ];
    order_history(&mut records);
    assert_eq!(created_by(&records), vec!["undated", "dated"]);
}

proptest! {
    #[test]
    fn output_is_sorted_and_stable(times in proptest::collection::vec(0i64..20, 0..40)) {
        let mut records: Vec<HistoryRecord> = times
            .iter()
            .enumerate()
            .map(|(idx, secs)| HistoryRecord::new(at(*secs), idx.to_string()))
            .collect();
        order_history(&mut records);

        for pair in records.windows(2) {
            prop_assert!(pair[0].created <= pair[1].created);
            if pair[0].created == pair[1].created {
                let first: usize = pair[0].created_by.as_deref().unwrap_or_default().parse().unwrap();
                let second: usize = pair[1].created_by.as_deref().unwrap_or_default().parse().unwrap();
                prop_assert!(first < second);
            }
        }
    }
}
