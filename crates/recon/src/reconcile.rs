//! Per-property, per-currency-date decision procedure.
//!
//! For each (PROPERTY, currency date) group of the batch:
//! 1. contemporary = the property's ledger rows inside the window around the date
//! 2. (ledger_only, incoming_only, both) = diff(contemporary, incoming)
//! 3. classify on the counts (see [`classify`])
//!
//! Only a property's latest batch snapshot is reconciled against the ledger.
//! Earlier dates of the same property resolve to an audited NoChange.
//!
//! Classification never falls through to a default action; any combination
//! without a policy becomes [`ReconciliationOutcome::Irreconcilable`].

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::config::ReconConfig;
use crate::model::{
    AuditFlag, GroupCounts, GroupOutcome, IrreconcilableGroup, IrreconcilableReason,
    ReconciliationOutcome,
};
use crate::record::Record;
use crate::table::RecordTable;
use crate::window::TemporalWindow;

/// What a group's counts call for, before rows are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoChange { audit: Option<AuditFlag> },
    /// A later date of the same property in the batch takes precedence.
    Overtaken,
    Supersede,
    NewInsert,
    NewProperty,
    Irreconcilable(IrreconcilableReason),
}

/// Pure classification over a group's counts.
pub fn classify(c: &GroupCounts) -> Decision {
    if c.incoming == 0 {
        return Decision::Irreconcilable(IrreconcilableReason::EmptyGroup);
    }

    if c.overtaken {
        return Decision::Overtaken;
    }

    // Batch older than the ledger.
    if c.ledger_newer > 0 {
        return Decision::Irreconcilable(IrreconcilableReason::LedgerNewerThanBatch);
    }

    if c.contemporary == 0 {
        return match (c.ledger_for_property, c.ledger_has_rows) {
            (0, false) => Decision::NewInsert,
            (0, true) => Decision::NewProperty,
            (_, _) => Decision::Irreconcilable(IrreconcilableReason::HistoryOutsideWindow),
        };
    }

    if c.ledger_only == 0 && c.incoming_only == 0 {
        return Decision::NoChange { audit: None };
    }

    match c.incoming_only.cmp(&c.ledger_only) {
        Ordering::Greater => Decision::Supersede,
        // Equal non-zero counts: the ledger keeps authority.
        Ordering::Less | Ordering::Equal => Decision::NoChange {
            audit: Some(AuditFlag::IncomingMissingObservations {
                ledger_only: c.ledger_only,
                incoming_only: c.incoming_only,
            }),
        },
    }
}

/// Reconcile one group of incoming rows against the property's ledger rows.
///
/// `incoming` must be the batch rows for `property` at `currency`;
/// `ledger_for_property` every ledger row for `property`. `batch_latest` is
/// the latest currency date the batch carries for `property`.
pub fn reconcile_group(
    property: &str,
    currency: NaiveDateTime,
    batch_latest: NaiveDateTime,
    incoming: &[Record],
    ledger_for_property: &[Record],
    ledger_has_rows: bool,
    config: &ReconConfig,
) -> GroupOutcome {
    let window = TemporalWindow::around(currency, &config.window);
    let contemporary: Vec<Record> = ledger_for_property
        .iter()
        .filter(|r| window.contains(r.tran_date()))
        .cloned()
        .collect();

    let diff = crate::diff::diff_records(&contemporary, incoming, config.geometry.decimals);

    let counts = GroupCounts {
        incoming: incoming.len(),
        ledger_for_property: ledger_for_property.len(),
        ledger_has_rows,
        overtaken: currency < batch_latest,
        ledger_newer: ledger_for_property
            .iter()
            .filter(|r| r.tran_date() >= window.end)
            .count(),
        contemporary: contemporary.len(),
        ledger_only: diff.only_left.len(),
        incoming_only: diff.only_right.len(),
        both: diff.both.len(),
    };

    let decision = classify(&counts);
    debug!(
        "{property} @ {currency}: contemporary={} ledger_only={} incoming_only={} both={} -> {decision:?}",
        counts.contemporary, counts.ledger_only, counts.incoming_only, counts.both,
    );

    let outcome = match decision {
        Decision::NoChange { audit } => {
            if let Some(AuditFlag::IncomingMissingObservations { ledger_only, incoming_only }) = audit {
                warn!(
                    "{property} @ {currency}: batch is missing {ledger_only} ledger observation(s) \
                     ({incoming_only} differing incoming); ledger retained"
                );
            }
            ReconciliationOutcome::NoChange {
                retained: contemporary,
                audit,
            }
        }
        Decision::Overtaken => {
            info!("{property} @ {currency}: superseded by {batch_latest} in the same batch");
            ReconciliationOutcome::NoChange {
                retained: contemporary,
                audit: Some(AuditFlag::OvertakenInBatch { latest: batch_latest }),
            }
        }
        Decision::Supersede => ReconciliationOutcome::Supersede {
            superseded: contemporary,
            inserted: incoming.to_vec(),
        },
        Decision::NewInsert => ReconciliationOutcome::NewInsert {
            inserted: incoming.to_vec(),
        },
        Decision::NewProperty => ReconciliationOutcome::NewProperty {
            inserted: incoming.to_vec(),
        },
        Decision::Irreconcilable(reason) => {
            warn!("{property} @ {currency}: irreconcilable ({reason})");
            ReconciliationOutcome::Irreconcilable(IrreconcilableGroup {
                property: property.to_string(),
                currency_date: currency,
                reason,
                ledger_rows: ledger_for_property.len(),
                incoming_rows: incoming.len(),
            })
        }
    };

    GroupOutcome {
        property: property.to_string(),
        currency_date: currency,
        counts,
        outcome,
    }
}

/// Reconcile every (PROPERTY, currency date) group in the batch, in
/// (PROPERTY, date) order.
pub fn reconcile_batch(
    batch: &RecordTable,
    ledger: &RecordTable,
    config: &ReconConfig,
) -> Vec<GroupOutcome> {
    let mut outcomes = Vec::new();
    let ledger_has_rows = !ledger.is_empty();

    for property in batch.properties() {
        let incoming = batch.for_property(property);
        let ledger_for_property = ledger.for_property(property);
        let dates = incoming.currency_dates();
        let Some(&batch_latest) = dates.iter().max() else {
            continue;
        };

        for currency in dates {
            let group: Vec<Record> = incoming
                .iter()
                .filter(|r| r.tran_date() == currency)
                .cloned()
                .collect();
            outcomes.push(reconcile_group(
                property,
                currency,
                batch_latest,
                &group,
                ledger_for_property.records(),
                ledger_has_rows,
                config,
            ));
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeatureType, OutcomeKind};
    use crate::record::fixtures::point;
    use crate::record::parse_currency_date;

    fn counts(
        incoming: usize,
        ledger_for_property: usize,
        contemporary: usize,
        ledger_only: usize,
        incoming_only: usize,
    ) -> GroupCounts {
        GroupCounts {
            incoming,
            ledger_for_property,
            ledger_has_rows: true,
            overtaken: false,
            ledger_newer: 0,
            contemporary,
            ledger_only,
            incoming_only,
            both: contemporary - ledger_only,
        }
    }

    #[test]
    fn classify_identical() {
        assert_eq!(classify(&counts(2, 2, 2, 0, 0)), Decision::NoChange { audit: None });
    }

    #[test]
    fn classify_extends() {
        assert_eq!(classify(&counts(5, 3, 3, 2, 4)), Decision::Supersede);
        assert_eq!(classify(&counts(3, 2, 2, 0, 1)), Decision::Supersede);
    }

    #[test]
    fn classify_subset_keeps_ledger_with_audit() {
        let d = classify(&counts(1, 3, 3, 2, 0));
        assert_eq!(
            d,
            Decision::NoChange {
                audit: Some(AuditFlag::IncomingMissingObservations { ledger_only: 2, incoming_only: 0 })
            }
        );
    }

    #[test]
    fn classify_equal_nonzero_is_audited_no_change() {
        let d = classify(&counts(1, 1, 1, 1, 1));
        assert!(matches!(d, Decision::NoChange { audit: Some(_) }));
    }

    #[test]
    fn classify_new_property_and_bootstrap() {
        let mut c = counts(2, 0, 0, 0, 2);
        assert_eq!(classify(&c), Decision::NewProperty);
        c.ledger_has_rows = false;
        assert_eq!(classify(&c), Decision::NewInsert);
    }

    #[test]
    fn classify_history_outside_window() {
        assert_eq!(
            classify(&counts(2, 4, 0, 0, 2)),
            Decision::Irreconcilable(IrreconcilableReason::HistoryOutsideWindow)
        );
    }

    #[test]
    fn classify_empty_group() {
        assert_eq!(
            classify(&counts(0, 4, 4, 4, 0)),
            Decision::Irreconcilable(IrreconcilableReason::EmptyGroup)
        );
    }

    #[test]
    fn classify_overtaken_before_ledger_checks() {
        let mut c = counts(2, 4, 0, 0, 2);
        c.overtaken = true;
        c.ledger_newer = 3;
        assert_eq!(classify(&c), Decision::Overtaken);
    }

    #[test]
    fn classify_ledger_newer_than_batch() {
        let mut c = counts(2, 2, 1, 0, 1);
        c.ledger_newer = 1;
        assert_eq!(
            classify(&c),
            Decision::Irreconcilable(IrreconcilableReason::LedgerNewerThanBatch)
        );
    }

    #[test]
    fn newer_ledger_row_blocks_stale_group() {
        let config = ReconConfig::default();
        let ledger = vec![
            point("ALPHA", "a", "2021-05-01", 1.0),
            point("ALPHA", "b", "2021-07-01", 2.0),
        ];
        let incoming = vec![
            point("ALPHA", "a", "2021-05-10", 1.0),
            point("ALPHA", "b", "2021-05-10", 2.0),
        ];
        let currency = parse_currency_date("2021-05-10").unwrap();

        let out = reconcile_group("ALPHA", currency, currency, &incoming, &ledger, true, &config);
        assert_eq!(out.counts.ledger_newer, 1);
        match out.outcome {
            ReconciliationOutcome::Irreconcilable(g) => {
                assert_eq!(g.reason, IrreconcilableReason::LedgerNewerThanBatch)
            }
            other => panic!("expected irreconcilable, got {:?}", other.kind()),
        }
    }

    #[test]
    fn earlier_batch_date_defers_to_latest() {
        let config = ReconConfig::default();
        let ledger = RecordTable::new(
            FeatureType::Points,
            vec![point("BETA", "b", "2021-05-20", 2.0)],
        )
        .unwrap();
        let batch = RecordTable::new(
            FeatureType::Points,
            vec![
                point("BETA", "a", "2021-05-01", 1.0),
                point("BETA", "b", "2021-05-20", 2.0),
            ],
        )
        .unwrap();

        let outcomes = reconcile_batch(&batch, &ledger, &config);
        assert_eq!(outcomes.len(), 2);
        let latest = parse_currency_date("2021-05-20").unwrap();
        match &outcomes[0].outcome {
            ReconciliationOutcome::NoChange { audit, .. } => {
                assert_eq!(*audit, Some(AuditFlag::OvertakenInBatch { latest }))
            }
            other => panic!("expected no change, got {:?}", other.kind()),
        }
        assert_eq!(outcomes[1].outcome.kind(), OutcomeKind::NoChange);
    }

    #[test]
    fn group_outside_window_reports_counts() {
        let config = ReconConfig::default();
        let ledger = vec![point("DELTA", "a", "2020-01-01", 1.0)];
        let incoming = vec![point("DELTA", "a", "2021-05-01", 1.0)];
        let currency = parse_currency_date("2021-05-01").unwrap();

        let out = reconcile_group("DELTA", currency, currency, &incoming, &ledger, true, &config);
        match out.outcome {
            ReconciliationOutcome::Irreconcilable(g) => {
                assert_eq!(g.property, "DELTA");
                assert_eq!(g.ledger_rows, 1);
                assert_eq!(g.incoming_rows, 1);
                assert_eq!(g.reason, IrreconcilableReason::HistoryOutsideWindow);
            }
            other => panic!("expected irreconcilable, got {:?}", other.kind()),
        }
    }

    #[test]
    fn batch_splits_by_property_and_date() {
        let batch = RecordTable::new(
            FeatureType::Points,
            vec![
                point("BETA", "a", "2021-05-01", 1.0),
                point("ALPHA", "a", "2021-05-01", 1.0),
                point("BETA", "b", "2021-06-01", 2.0),
            ],
        )
        .unwrap();
        let ledger = RecordTable::empty(FeatureType::Points);

        let outcomes = reconcile_batch(&batch, &ledger, &ReconConfig::default());
        let keys: Vec<_> = outcomes
            .iter()
            .map(|g| (g.property.as_str(), g.currency_date.date().to_string(), g.outcome.kind()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("ALPHA", "2021-05-01".to_string(), OutcomeKind::NewInsert),
                ("BETA", "2021-05-01".to_string(), OutcomeKind::NoChange),
                ("BETA", "2021-06-01".to_string(), OutcomeKind::NewInsert),
            ]
        );
    }
}
