//! Ledger persistence: GeoJSON tables, CSV mirrors, and the all-or-nothing commit.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::OutboxConfig;
use crate::error::LedgerError;
use crate::geometry::Geometry;
use crate::model::{Assembly, FeatureType, PropertyOutbox};
use crate::record::{parse_currency_date, Attributes, Record};
use crate::table::RecordTable;

// ---------------------------------------------------------------------------
// GeoJSON
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<Feature>,
}

#[derive(Serialize, Deserialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: String,
    properties: Attributes,
    geometry: Geometry,
}

/// Decode a GeoJSON FeatureCollection into a validated table.
pub fn decode_table(
    context: &str,
    json: &str,
    feature_type: FeatureType,
) -> Result<RecordTable, LedgerError> {
    let collection: FeatureCollection = serde_json::from_str(json)
        .map_err(|e| LedgerError::schema(context, e.to_string()))?;
    if collection.kind != "FeatureCollection" {
        return Err(LedgerError::schema(
            context,
            format!("expected FeatureCollection, found '{}'", collection.kind),
        ));
    }

    let mut records = Vec::with_capacity(collection.features.len());
    for (i, f) in collection.features.into_iter().enumerate() {
        let record = Record::new(f.properties, f.geometry).map_err(|e| match e {
            LedgerError::SchemaViolation { message, .. } => {
                LedgerError::schema(format!("{context}, feature {i}"), message)
            }
            other => other,
        })?;
        records.push(record);
    }
    RecordTable::new(feature_type, records)
}

pub fn encode_table(table: &RecordTable) -> Result<String, LedgerError> {
    let collection = FeatureCollection {
        kind: "FeatureCollection".into(),
        features: table
            .iter()
            .map(|r| Feature {
                kind: "Feature".into(),
                properties: r.attributes.clone(),
                geometry: r.geometry.clone(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&collection).map_err(|e| LedgerError::Json(e.to_string()))
}

/// Read a table file. A missing file is an empty table.
pub fn read_table(path: &Path, feature_type: FeatureType) -> Result<RecordTable, LedgerError> {
    if !path.exists() {
        debug!("{} not found, treating as empty", path.display());
        return Ok(RecordTable::empty(feature_type));
    }
    let json = fs::read_to_string(path)
        .map_err(|e| LedgerError::Io(format!("cannot read {}: {e}", path.display())))?;
    decode_table(&path.display().to_string(), &json, feature_type)
}

// ---------------------------------------------------------------------------
// CSV mirror
// ---------------------------------------------------------------------------

const CSV_COLUMNS: [&str; 12] = [
    "FEATURE_GROUP",
    "FEATURE",
    "LABEL",
    "PROPERTY",
    "DISTRICT",
    "PROP_TAG",
    "SOURCE",
    "CONFIDENCE",
    "STATUS",
    "DATE_INSP",
    "DATE_CURR",
    "UPLOAD",
];

/// Flat CSV rendering of a table with a WKT geometry column.
pub fn encode_csv(table: &RecordTable) -> Result<String, LedgerError> {
    let metric = table.feature_type().metric_column();
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = CSV_COLUMNS.to_vec();
    header.extend(metric);
    header.push("geometry");
    writer
        .write_record(&header)
        .map_err(|e| LedgerError::Csv(e.to_string()))?;

    for r in table {
        let a = &r.attributes;
        let mut row: Vec<String> = vec![
            a.feature_group.clone(),
            a.feature.clone(),
            a.label.clone(),
            a.property.clone(),
            a.district.clone(),
            a.prop_tag.clone(),
            a.source.clone(),
            a.confidence.clone(),
            a.status.clone(),
            a.date_insp.clone(),
            a.date_curr.clone(),
            a.upload.clone().unwrap_or_default(),
        ];
        match metric {
            Some("AREA_KM2") => row.push(a.area_km2.map(|v| v.to_string()).unwrap_or_default()),
            Some(_) => row.push(a.length_m.map(|v| v.to_string()).unwrap_or_default()),
            None => {}
        }
        row.push(r.geometry.to_wkt());
        writer
            .write_record(&row)
            .map_err(|e| LedgerError::Csv(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| LedgerError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| LedgerError::Csv(e.to_string()))
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Where one feature type's outputs live.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub ledger: PathBuf,
    pub staging: PathBuf,
    /// Root of the per-property mirrors; `None` skips them.
    pub outbox_root: Option<PathBuf>,
}

impl OutputPaths {
    /// Standard layout under a transition directory.
    pub fn under(transition_dir: &Path, feature_type: FeatureType, outbox_root: Option<&Path>) -> Self {
        let ft = feature_type.as_str();
        Self {
            ledger: transition_dir
                .join("previous_transfer")
                .join(ft)
                .join(format!("previous_transfer_{ft}.geojson")),
            staging: transition_dir
                .join("for_migration")
                .join(ft)
                .join(format!("for_migration_{ft}.geojson")),
            outbox_root: outbox_root.map(Path::to_path_buf),
        }
    }
}

/// `<District>/<PROP_TAG>_<Title_Case_Property>/<feature>/<feature>_Transition_<stamp>` (no extension).
pub fn outbox_stem(
    root: &Path,
    feature_type: FeatureType,
    outbox: &PropertyOutbox,
    config: &OutboxConfig,
) -> PathBuf {
    let ft = feature_type.as_str();
    let property_dir = format!(
        "{}_{}",
        path_segment(outbox.prop_tag.trim()),
        path_segment(&title_case(&outbox.property))
    );
    let stamp = parse_currency_date(&outbox.currency_date)
        .map(|dt: NaiveDateTime| dt.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| "undated".into());

    root.join(path_segment(&config.district_dir(&outbox.district)))
        .join(property_dir)
        .join(ft)
        .join(format!("{ft}_Transition_{stamp}"))
}

/// Make a data-derived value safe as a single directory name: separators and
/// control characters become `_`, and a name of only dots becomes `_`.
fn path_segment(s: &str) -> String {
    let out: String = s
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if out.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        out
    }
}

/// "BIG SPRINGS station" -> "Big_Springs_Station"
fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("_")
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Files written by a commit, final paths.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitReport {
    pub written: Vec<PathBuf>,
}

/// Persist an assembly. Every file is encoded and staged as a sibling temp
/// file first; nothing is renamed into place until all staging succeeded.
/// A failed rename discards the temp files not yet moved.
pub fn commit(
    assembly: &Assembly,
    paths: &OutputPaths,
    outbox_config: &OutboxConfig,
) -> Result<CommitReport, LedgerError> {
    let feature_type = assembly.next_ledger.feature_type();
    let mut pending: Vec<(PathBuf, String)> = Vec::new();

    if let Some(root) = &paths.outbox_root {
        for outbox in &assembly.outbox {
            let stem = outbox_stem(root, feature_type, outbox, outbox_config);
            pending.push((stem.with_extension("geojson"), encode_table(&outbox.records)?));
            pending.push((stem.with_extension("csv"), encode_csv(&outbox.records)?));
        }
    }

    // The ledger goes last: any earlier failure leaves it untouched, so a rerun
    // redoes the whole commit.
    pending.push((paths.staging.clone(), encode_table(&assembly.staging.sorted())?));
    pending.push((paths.ledger.clone(), encode_table(&assembly.next_ledger.sorted())?));

    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(pending.len());
    for (path, contents) in &pending {
        match stage_file(path, contents) {
            Ok(tmp) => staged.push((tmp, path.clone())),
            Err(e) => {
                discard(&staged);
                return Err(e);
            }
        }
    }

    let mut report = CommitReport::default();
    for (i, (tmp, path)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(tmp, path) {
            discard(&staged[i..]);
            return Err(LedgerError::Io(format!(
                "cannot move {} into place: {e}",
                path.display()
            )));
        }
        report.written.push(path.clone());
    }
    info!("{feature_type}: committed {} file(s)", report.written.len());
    Ok(report)
}

fn stage_file(path: &Path, contents: &str) -> Result<PathBuf, LedgerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| LedgerError::Io(format!("cannot create {}: {e}", parent.display())))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)
        .map_err(|e| LedgerError::Io(format!("cannot write {}: {e}", tmp.display())))?;
    Ok(tmp)
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = fs::remove_file(tmp);
    }
}
