//! Folds group outcomes into the next ledger state and the two downstream sets.
//!
//! Per touched property P:
//! - superseded = contemporary rows of every Supersede group of P
//! - inserted   = rows of every inserting group of P, collapsed to P's latest snapshot
//! - survivors  = (ledger rows of P - superseded) ++ inserted, one row per key
//!
//! Ledger rows of properties absent from the batch are carried verbatim.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDateTime;

use crate::config::{OutboxConfig, ReconConfig};
use crate::error::LedgerError;
use crate::latest::latest_per_property;
use crate::model::{
    Assembly, FeatureType, GroupOutcome, IrreconcilableGroup, PropertyOutbox,
    ReconciliationOutcome,
};
use crate::record::{Record, RecordKey};
use crate::table::RecordTable;

/// Assemble outputs. Fails without producing anything if any group is
/// irreconcilable.
pub fn assemble(
    ledger: &RecordTable,
    outcomes: &[GroupOutcome],
    existing_staging: &RecordTable,
    config: &ReconConfig,
) -> Result<Assembly, LedgerError> {
    let feature_type = ledger.feature_type();
    let blocked = irreconcilable_groups(outcomes);
    if !blocked.is_empty() {
        return Err(LedgerError::Irreconcilable {
            feature_type,
            groups: blocked,
        });
    }

    let decimals = config.geometry.decimals;

    let mut by_property: BTreeMap<&str, Vec<&GroupOutcome>> = BTreeMap::new();
    for g in outcomes {
        by_property.entry(g.property.as_str()).or_default().push(g);
    }

    let mut next: Vec<Record> = Vec::with_capacity(ledger.len());
    let mut accepted: Vec<Record> = Vec::new();

    // Untouched properties: verbatim.
    next.extend(
        ledger
            .iter()
            .filter(|r| !by_property.contains_key(r.property()))
            .map(Record::without_marker),
    );

    for (property, groups) in &by_property {
        let ledger_rows = ledger.for_property(property);

        let mut superseded: Vec<&Record> = Vec::new();
        let mut inserted: Vec<Record> = Vec::new();
        for g in groups {
            if let ReconciliationOutcome::Supersede { superseded: rows, .. } = &g.outcome {
                superseded.extend(rows.iter());
            }
            inserted.extend(g.outcome.inserted().iter().map(Record::without_marker));
        }

        let kept = remove_rows(ledger_rows.records(), &superseded, decimals);
        let inserted = latest_per_property(&RecordTable::from_validated(feature_type, inserted));

        let inserted_count = inserted.len();
        let mut combined = kept;
        combined.extend(inserted.into_records());
        let (survivors, inserted_survivors) = dedup_by_key(combined, inserted_count, decimals);

        next.extend(survivors);
        accepted.extend(inserted_survivors);
    }

    let next_ledger = RecordTable::from_validated(feature_type, next).sorted();
    let accepted = RecordTable::from_validated(feature_type, accepted).sorted();

    let outbox = build_outbox(&accepted, &config.outbox);
    let staging = latest_per_property(&existing_staging.concat(&accepted)).sorted();

    Ok(Assembly {
        next_ledger,
        outbox,
        staging,
    })
}

pub fn irreconcilable_groups(outcomes: &[GroupOutcome]) -> Vec<IrreconcilableGroup> {
    outcomes
        .iter()
        .filter_map(|g| match &g.outcome {
            ReconciliationOutcome::Irreconcilable(group) => Some(group.clone()),
            _ => None,
        })
        .collect()
}

/// Identity of a concrete ledger row: the attribute key plus its currency.
fn row_identity(r: &Record, decimals: u32) -> (RecordKey, NaiveDateTime) {
    (r.key(decimals), r.tran_date())
}

/// Multiset removal: each entry in `remove` deletes at most one matching row.
fn remove_rows(rows: &[Record], remove: &[&Record], decimals: u32) -> Vec<Record> {
    let mut pending: HashMap<(RecordKey, NaiveDateTime), usize> = HashMap::new();
    for r in remove {
        *pending.entry(row_identity(r, decimals)).or_insert(0) += 1;
    }

    rows.iter()
        .filter(|r| match pending.get_mut(&row_identity(r, decimals)) {
            Some(n) if *n > 0 => {
                *n -= 1;
                false
            }
            _ => true,
        })
        .cloned()
        .collect()
}

/// One row per attribute key, keeping the latest currency (first on ties).
///
/// The last `inserted_count` rows of `combined` are the batch rows; returns
/// (all survivors, surviving batch rows).
fn dedup_by_key(
    combined: Vec<Record>,
    inserted_count: usize,
    decimals: u32,
) -> (Vec<Record>, Vec<Record>) {
    let inserted_from = combined.len() - inserted_count;

    let mut winner: HashMap<RecordKey, usize> = HashMap::new();
    for (i, r) in combined.iter().enumerate() {
        let key = r.key(decimals);
        match winner.get(&key) {
            Some(&w) if combined[w].tran_date() >= r.tran_date() => {}
            _ => {
                winner.insert(key, i);
            }
        }
    }
    let keep: BTreeSet<usize> = winner.into_values().collect();

    let mut survivors = Vec::with_capacity(keep.len());
    let mut inserted = Vec::new();
    for (i, r) in combined.into_iter().enumerate() {
        if !keep.contains(&i) {
            continue;
        }
        if i >= inserted_from {
            inserted.push(r.clone());
        }
        survivors.push(r);
    }
    (survivors, inserted)
}

/// Group accepted rows per property, marked and blanked for mirroring.
fn build_outbox(accepted: &RecordTable, config: &OutboxConfig) -> Vec<PropertyOutbox> {
    let feature_type: FeatureType = accepted.feature_type();
    let mut grouped: BTreeMap<&str, Vec<Record>> = BTreeMap::new();
    for r in accepted {
        grouped
            .entry(r.property())
            .or_default()
            .push(mirror_row(r, config));
    }

    grouped
        .into_iter()
        .filter_map(|(property, rows)| {
            let first = rows.first()?.attributes.clone();
            Some(PropertyOutbox {
                property: property.to_string(),
                district: first.district,
                prop_tag: first.prop_tag,
                currency_date: first.date_curr,
                records: RecordTable::from_validated(feature_type, rows),
            })
        })
        .collect()
}

fn mirror_row(r: &Record, config: &OutboxConfig) -> Record {
    let mut out = r.clone();
    let a = &mut out.attributes;
    for field in [
        &mut a.feature_group,
        &mut a.feature,
        &mut a.label,
        &mut a.source,
        &mut a.confidence,
        &mut a.status,
        &mut a.date_insp,
    ] {
        if config.blank_values.iter().any(|v| v.as_str() == field.as_str()) {
            field.clear();
        }
    }
    a.upload = Some(config.upload_marker.clone());
    out
}
