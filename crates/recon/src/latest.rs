use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::table::RecordTable;

/// Keep, per PROPERTY, only the rows at that property's latest currency
/// timestamp. Ties at the maximum are all kept; input order is preserved.
pub fn latest_per_property(table: &RecordTable) -> RecordTable {
    let mut latest: BTreeMap<&str, NaiveDateTime> = BTreeMap::new();
    for r in table {
        let entry = latest.entry(r.property()).or_insert_with(|| r.tran_date());
        if r.tran_date() > *entry {
            *entry = r.tran_date();
        }
    }

    table.filter(|r| latest.get(r.property()) == Some(&r.tran_date()))
}
