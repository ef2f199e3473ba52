use std::path::PathBuf;

use infraledger_recon::engine::{run, ReconInput};
use infraledger_recon::model::{AuditFlag, IrreconcilableReason, OutcomeKind, ReconciliationOutcome};
use infraledger_recon::store::{self, OutputPaths};
use infraledger_recon::{
    Attributes, FeatureType, Geometry, LedgerError, ReconConfig, Record, RecordTable,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_config() -> ReconConfig {
    let toml = std::fs::read_to_string(fixtures_dir().join("recon.toml")).unwrap();
    ReconConfig::from_toml(&toml).unwrap()
}

fn fixture_input() -> ReconInput {
    let dir = fixtures_dir();
    ReconInput {
        batch: store::read_table(&dir.join("batch_points.geojson"), FeatureType::Points).unwrap(),
        ledger: store::read_table(&dir.join("ledger_points.geojson"), FeatureType::Points).unwrap(),
        staging: RecordTable::empty(FeatureType::Points),
    }
}

fn attrs(property: &str, label: &str, date_curr: &str) -> Attributes {
    Attributes {
        feature_group: "Infrastructure".into(),
        feature: "Paddock".into(),
        label: label.into(),
        property: property.into(),
        district: "Barkly".into(),
        prop_tag: "XX01".into(),
        source: "Imagery".into(),
        confidence: "Medium".into(),
        status: String::new(),
        date_insp: "2021-03-01".into(),
        date_curr: date_curr.into(),
        area_km2: None,
        length_m: None,
        upload: None,
    }
}

fn square(x: f64) -> Geometry {
    Geometry::Polygon(vec![vec![
        vec![x, 0.0],
        vec![x + 1.0, 0.0],
        vec![x + 1.0, 1.0],
        vec![x, 0.0],
    ]])
}

fn polygon(property: &str, label: &str, date_curr: &str, x: f64) -> Record {
    Record::new(attrs(property, label, date_curr), square(x)).unwrap()
}

fn labels(table: &RecordTable, property: &str) -> Vec<String> {
    table
        .for_property(property)
        .iter()
        .map(|r| r.attributes.label.clone())
        .collect()
}

// -------------------------------------------------------------------------
// Fixture scenarios
// -------------------------------------------------------------------------

#[test]
fn changed_single_record_is_audited_no_change() {
    let result = run(&fixture_config(), &fixture_input()).unwrap();
    let alpha = result.groups.iter().find(|g| g.property == "ALPHA").unwrap();

    assert_eq!(alpha.counts.contemporary, 1);
    assert_eq!(alpha.counts.ledger_only, 1);
    assert_eq!(alpha.counts.incoming_only, 1);
    assert_eq!(alpha.counts.both, 0);
    match &alpha.outcome {
        ReconciliationOutcome::NoChange { retained, audit } => {
            assert_eq!(retained.len(), 1);
            assert_eq!(
                *audit,
                Some(AuditFlag::IncomingMissingObservations {
                    ledger_only: 1,
                    incoming_only: 1
                })
            );
        }
        other => panic!("expected audited no change, got {}", other.kind()),
    }

    let kept = result.assembly.next_ledger.for_property("ALPHA");
    assert_eq!(kept.len(), 1);
    assert_eq!(kept.records()[0].attributes.date_curr, "2021-05-01 00:00:00");
}

#[test]
fn larger_batch_supersedes_and_drops_duplicate() {
    let result = run(&fixture_config(), &fixture_input()).unwrap();
    let gamma = result.groups.iter().find(|g| g.property == "GAMMA").unwrap();

    assert_eq!(gamma.counts.both, 1);
    assert_eq!(gamma.counts.ledger_only, 2);
    assert_eq!(gamma.counts.incoming_only, 4);
    assert_eq!(gamma.outcome.kind(), OutcomeKind::Supersede);

    let next = &result.assembly.next_ledger;
    assert_eq!(
        labels(next, "GAMMA"),
        vec!["Bore 1", "Bore 2", "Bore 3", "Bore 4", "Bore 5"]
    );
    assert!(next
        .for_property("GAMMA")
        .iter()
        .all(|r| r.attributes.date_curr == "2021-05-10 00:00:00"));
}

#[test]
fn fixture_summary_and_outbox() {
    let result = run(&fixture_config(), &fixture_input()).unwrap();
    let s = &result.summary;

    assert_eq!(s.total_groups, 2);
    assert_eq!(s.no_change, 1);
    assert_eq!(s.supersede, 1);
    assert_eq!(s.audit_flags, 1);
    assert_eq!(s.properties_untouched, 1);
    assert_eq!(s.rows_passed_through, 2);
    assert_eq!(s.rows_superseded, 3);
    assert_eq!(s.rows_inserted, 5);
    assert_eq!(s.next_ledger_rows, 8);
    assert_eq!(s.staging_rows, 5);

    let outbox = &result.assembly.outbox;
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].property, "GAMMA");
    assert_eq!(outbox[0].prop_tag, "GA01");
    let bore5 = outbox[0]
        .records
        .iter()
        .find(|r| r.attributes.label == "Bore 5")
        .unwrap();
    assert_eq!(bore5.attributes.confidence, "");
    assert_eq!(bore5.attributes.upload.as_deref(), Some("Transition"));
}

#[test]
fn new_property_inserts_both_polygons() {
    let config = ReconConfig::default();
    let input = ReconInput {
        batch: RecordTable::new(
            FeatureType::Polygons,
            vec![
                polygon("BETA", "North", "2021-05-01", 0.0),
                polygon("BETA", "South", "2021-05-01", 5.0),
            ],
        )
        .unwrap(),
        ledger: RecordTable::new(
            FeatureType::Polygons,
            vec![polygon("OMEGA", "Home", "2019-01-01", 9.0)],
        )
        .unwrap(),
        staging: RecordTable::empty(FeatureType::Polygons),
    };

    let result = run(&config, &input).unwrap();
    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].outcome.kind(), OutcomeKind::NewProperty);
    assert_eq!(result.groups[0].outcome.inserted().len(), 2);
    assert_eq!(labels(&result.assembly.next_ledger, "BETA"), vec!["North", "South"]);
    assert_eq!(labels(&result.assembly.next_ledger, "OMEGA"), vec!["Home"]);
}

// -------------------------------------------------------------------------
// Properties
// -------------------------------------------------------------------------

#[test]
fn second_run_is_all_no_change() {
    let config = fixture_config();
    let first_input = fixture_input();
    let first = run(&config, &first_input).unwrap();

    let second_input = ReconInput {
        batch: first_input.batch.clone(),
        ledger: first.assembly.next_ledger.clone(),
        staging: first.assembly.staging.clone(),
    };
    let second = run(&config, &second_input).unwrap();

    assert!(second
        .groups
        .iter()
        .all(|g| g.outcome.kind() == OutcomeKind::NoChange));
    assert_eq!(second.assembly.next_ledger, first.assembly.next_ledger);
    assert!(second.assembly.outbox.is_empty());
    assert_eq!(second.assembly.staging, first.assembly.staging);
}

#[test]
fn untouched_property_passes_through() {
    let input = fixture_input();
    let result = run(&fixture_config(), &input).unwrap();
    assert_eq!(
        result.assembly.next_ledger.for_property("OMEGA"),
        input.ledger.for_property("OMEGA")
    );
}

#[test]
fn non_superseded_rows_appear_once() {
    let config = fixture_config();
    let input = fixture_input();
    let result = run(&config, &input).unwrap();
    let next = &result.assembly.next_ledger;
    let d = config.geometry.decimals;

    let count = |r: &Record| {
        next.iter()
            .filter(|n| n.key(d) == r.key(d) && n.tran_date() == r.tran_date())
            .count()
    };

    for r in input.ledger.iter().filter(|r| r.property() != "GAMMA") {
        assert_eq!(count(r), 1, "{} {}", r.property(), r.attributes.label);
    }
    for r in input.batch.for_property("GAMMA").iter() {
        assert_eq!(count(r), 1, "GAMMA {}", r.attributes.label);
    }
}

#[test]
fn staging_holds_only_latest_snapshot() {
    let config = ReconConfig::default();
    let staging = RecordTable::new(
        FeatureType::Polygons,
        vec![
            polygon("BETA", "Old", "2021-01-01", 0.0),
            polygon("ZETA", "Kept", "2021-01-01", 3.0),
        ],
    )
    .unwrap();
    let input = ReconInput {
        batch: RecordTable::new(
            FeatureType::Polygons,
            vec![polygon("BETA", "New", "2021-06-01", 1.0)],
        )
        .unwrap(),
        ledger: RecordTable::empty(FeatureType::Polygons),
        staging,
    };

    let result = run(&config, &input).unwrap();
    assert_eq!(result.groups[0].outcome.kind(), OutcomeKind::NewInsert);
    assert_eq!(labels(&result.assembly.staging, "BETA"), vec!["New"]);
    assert_eq!(labels(&result.assembly.staging, "ZETA"), vec!["Kept"]);
}

#[test]
fn history_outside_window_blocks_the_run() {
    let input = ReconInput {
        batch: RecordTable::new(
            FeatureType::Polygons,
            vec![polygon("DELTA", "A", "2021-05-01", 0.0)],
        )
        .unwrap(),
        ledger: RecordTable::new(
            FeatureType::Polygons,
            vec![polygon("DELTA", "A", "2020-01-01", 0.0)],
        )
        .unwrap(),
        staging: RecordTable::empty(FeatureType::Polygons),
    };
    let err = run(&ReconConfig::default(), &input).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("irreconcilable"), "{msg}");
    assert!(msg.contains("DELTA"), "{msg}");
}

#[test]
fn multi_date_batch_reruns_as_no_change() {
    let config = ReconConfig::default();
    let batch = RecordTable::new(
        FeatureType::Polygons,
        vec![
            polygon("BETA", "North", "2021-05-01", 0.0),
            polygon("BETA", "South", "2021-05-20", 5.0),
        ],
    )
    .unwrap();
    let first = run(
        &config,
        &ReconInput {
            batch: batch.clone(),
            ledger: RecordTable::new(
                FeatureType::Polygons,
                vec![polygon("OMEGA", "Home", "2019-01-01", 9.0)],
            )
            .unwrap(),
            staging: RecordTable::empty(FeatureType::Polygons),
        },
    )
    .unwrap();

    let kinds: Vec<_> = first.groups.iter().map(|g| g.outcome.kind()).collect();
    assert_eq!(kinds, vec![OutcomeKind::NoChange, OutcomeKind::NewProperty]);
    assert!(matches!(
        first.groups[0].outcome,
        ReconciliationOutcome::NoChange {
            audit: Some(AuditFlag::OvertakenInBatch { .. }),
            ..
        }
    ));
    assert_eq!(labels(&first.assembly.next_ledger, "BETA"), vec!["South"]);

    let second = run(
        &config,
        &ReconInput {
            batch,
            ledger: first.assembly.next_ledger.clone(),
            staging: first.assembly.staging.clone(),
        },
    )
    .unwrap();
    assert!(second
        .groups
        .iter()
        .all(|g| g.outcome.kind() == OutcomeKind::NoChange));
    assert_eq!(second.assembly.next_ledger, first.assembly.next_ledger);
    assert!(second.assembly.outbox.is_empty());
}

#[test]
fn batch_older_than_ledger_is_irreconcilable() {
    let input = ReconInput {
        batch: RecordTable::new(
            FeatureType::Polygons,
            vec![
                polygon("ALPHA", "A", "2021-05-10", 0.0),
                polygon("ALPHA", "B", "2021-05-10", 2.0),
            ],
        )
        .unwrap(),
        ledger: RecordTable::new(
            FeatureType::Polygons,
            vec![
                polygon("ALPHA", "A", "2021-05-01", 0.0),
                polygon("ALPHA", "B", "2021-07-01", 2.0),
            ],
        )
        .unwrap(),
        staging: RecordTable::empty(FeatureType::Polygons),
    };

    match run(&ReconConfig::default(), &input).unwrap_err() {
        LedgerError::Irreconcilable { groups, .. } => {
            assert_eq!(groups.len(), 1);
            assert_eq!(groups[0].property, "ALPHA");
            assert_eq!(groups[0].reason, IrreconcilableReason::LedgerNewerThanBatch);
        }
        other => panic!("unexpected error: {other}"),
    }
}

// -------------------------------------------------------------------------
// Store
// -------------------------------------------------------------------------

#[test]
fn commit_writes_every_output() {
    let config = fixture_config();
    let result = run(&config, &fixture_input()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let paths = OutputPaths::under(dir.path(), FeatureType::Points, Some(&dir.path().join("outbox")));

    let report = store::commit(&result.assembly, &paths, &config.outbox).unwrap();
    assert_eq!(report.written.len(), 4);

    let ledger = store::read_table(&paths.ledger, FeatureType::Points).unwrap();
    assert_eq!(ledger.len(), 8);
    assert_eq!(labels(&ledger, "GAMMA"), labels(&result.assembly.next_ledger, "GAMMA"));
    let staging = store::read_table(&paths.staging, FeatureType::Points).unwrap();
    assert_eq!(staging.len(), 5);

    let stem = dir
        .path()
        .join("outbox/VRD/GA01_Gamma/points/points_Transition_20210510_000000");
    let mirror = store::read_table(&stem.with_extension("geojson"), FeatureType::Points).unwrap();
    assert_eq!(mirror.len(), 5);
    let csv = std::fs::read_to_string(stem.with_extension("csv")).unwrap();
    assert_eq!(csv.lines().count(), 6);
    assert!(csv.contains("POINT (131.4 -16.4)"));

    let leftovers: Vec<_> = walk(dir.path())
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == "tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn committed_ledger_drops_derived_columns() {
    let config = fixture_config();
    let result = run(&config, &fixture_input()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let paths = OutputPaths::under(dir.path(), FeatureType::Points, None);
    store::commit(&result.assembly, &paths, &config.outbox).unwrap();

    let text = std::fs::read_to_string(&paths.ledger).unwrap();
    assert!(!text.contains("TRAN_DATE"));
    assert!(!text.contains("UPLOAD"));
    assert!(!dir.path().join("outbox").exists());
}

fn walk(dir: &std::path::Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            out.extend(walk(&path));
        } else {
            out.push(path);
        }
    }
    out
}
