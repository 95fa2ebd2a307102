use crate::model::HistoryRecord;

/// Sort history records into build order.
///
/// Stable, keyed only on the creation time, so records sharing a timestamp keep
/// their relative order. Records without a timestamp sort first.
pub fn order_history(records: &mut [HistoryRecord]) {
    records.sort_by_key(|record| record.created);
}
