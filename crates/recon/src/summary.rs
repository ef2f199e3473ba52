use std::collections::BTreeSet;

use crate::model::{Assembly, GroupOutcome, OutcomeKind, ReconSummary, ReconciliationOutcome};
use crate::table::RecordTable;

/// Compute summary statistics from group outcomes and the assembled outputs.
pub fn compute_summary(
    ledger: &RecordTable,
    groups: &[GroupOutcome],
    assembly: &Assembly,
) -> ReconSummary {
    let mut s = ReconSummary {
        total_groups: groups.len(),
        ..ReconSummary::default()
    };

    let touched: BTreeSet<&str> = groups.iter().map(|g| g.property.as_str()).collect();
    s.properties_touched = touched.len();
    s.properties_untouched = ledger
        .properties()
        .into_iter()
        .filter(|p| !touched.contains(p))
        .count();
    s.rows_passed_through = ledger.iter().filter(|r| !touched.contains(r.property())).count();

    for g in groups {
        let kind = g.outcome.kind();
        *s.outcome_counts.entry(kind.to_string()).or_insert(0) += 1;

        match kind {
            OutcomeKind::NoChange => s.no_change += 1,
            OutcomeKind::Supersede => s.supersede += 1,
            OutcomeKind::NewInsert => s.new_insert += 1,
            OutcomeKind::NewProperty => s.new_property += 1,
            OutcomeKind::Irreconcilable => s.irreconcilable += 1,
        }

        match &g.outcome {
            ReconciliationOutcome::NoChange { audit: Some(_), .. } => s.audit_flags += 1,
            ReconciliationOutcome::Supersede { superseded, .. } => {
                s.rows_superseded += superseded.len()
            }
            _ => {}
        }
    }

    s.rows_inserted = assembly.outbox.iter().map(|o| o.records.len()).sum();
    s.next_ledger_rows = assembly.next_ledger.len();
    s.staging_rows = assembly.staging.len();
    s
}
