use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::geometry::GeometryKind;
use crate::record::Record;
use crate::table::RecordTable;

// ---------------------------------------------------------------------------
// Feature types
// ---------------------------------------------------------------------------

/// One independently reconciled ledger. Each owns a disjoint ledger file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Points,
    Lines,
    Polygons,
    Paddocks,
}

impl FeatureType {
    pub const ALL: [FeatureType; 4] = [Self::Points, Self::Lines, Self::Polygons, Self::Paddocks];

    pub fn geometry_kind(&self) -> GeometryKind {
        match self {
            Self::Points => GeometryKind::Point,
            Self::Lines => GeometryKind::Line,
            Self::Polygons | Self::Paddocks => GeometryKind::Polygon,
        }
    }

    /// Name of the derived metric column carried by this feature type.
    pub fn metric_column(&self) -> Option<&'static str> {
        match self {
            Self::Points => None,
            Self::Lines => Some("LENGTH_M"),
            Self::Polygons | Self::Paddocks => Some("AREA_KM2"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Lines => "lines",
            Self::Polygons => "polygons",
            Self::Paddocks => "paddocks",
        }
    }
}

impl std::fmt::Display for FeatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "points" => Ok(Self::Points),
            "lines" => Ok(Self::Lines),
            "polygons" => Ok(Self::Polygons),
            "paddocks" => Ok(Self::Paddocks),
            other => Err(LedgerError::ConfigValidation(format!(
                "unknown feature type '{other}' (expected points, lines, polygons or paddocks)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// A left row and the right row it was paired with on the attribute key.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub left: Record,
    pub right: Record,
}

#[derive(Debug, Clone)]
pub struct RecordDiff {
    pub only_left: Vec<Record>,
    pub only_right: Vec<Record>,
    pub both: Vec<MatchedPair>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Row counts a group decision is made from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupCounts {
    pub incoming: usize,
    /// All ledger rows for the property, any date.
    pub ledger_for_property: usize,
    /// Whether the feature type's ledger holds any rows at all.
    pub ledger_has_rows: bool,
    /// The batch also carries a later currency date for this property.
    pub overtaken: bool,
    /// Ledger rows for the property dated at or after the window end.
    pub ledger_newer: usize,
    pub contemporary: usize,
    pub ledger_only: usize,
    pub incoming_only: usize,
    pub both: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AuditFlag {
    /// The batch is missing observations the ledger already holds for this date.
    IncomingMissingObservations { ledger_only: usize, incoming_only: usize },
    /// A later snapshot of the same property in this batch takes precedence.
    OvertakenInBatch { latest: NaiveDateTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IrreconcilableReason {
    /// No contemporary rows, but the property has ledger history outside the window.
    HistoryOutsideWindow,
    /// The ledger already holds a snapshot of the property newer than the batch.
    LedgerNewerThanBatch,
    /// A group with no incoming rows.
    EmptyGroup,
}

impl std::fmt::Display for IrreconcilableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HistoryOutsideWindow => write!(f, "ledger history outside window"),
            Self::LedgerNewerThanBatch => write!(f, "ledger holds a newer snapshot than the batch"),
            Self::EmptyGroup => write!(f, "empty incoming group"),
        }
    }
}

/// An operator-facing report of one group the engine refused to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IrreconcilableGroup {
    pub property: String,
    pub currency_date: NaiveDateTime,
    pub reason: IrreconcilableReason,
    pub ledger_rows: usize,
    pub incoming_rows: usize,
}

impl std::fmt::Display for IrreconcilableGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "property '{}' @ {}: {} (ledger rows {}, incoming rows {})",
            self.property, self.currency_date, self.reason, self.ledger_rows, self.incoming_rows
        )
    }
}

#[derive(Debug, Clone)]
pub enum ReconciliationOutcome {
    /// Ledger keeps authority; the incoming rows are discarded.
    NoChange {
        retained: Vec<Record>,
        audit: Option<AuditFlag>,
    },
    /// Contemporary ledger rows are replaced by the incoming rows.
    Supersede {
        superseded: Vec<Record>,
        inserted: Vec<Record>,
    },
    /// First rows ever for the feature type.
    NewInsert { inserted: Vec<Record> },
    /// First rows for this property.
    NewProperty { inserted: Vec<Record> },
    Irreconcilable(IrreconcilableGroup),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    NoChange,
    Supersede,
    NewInsert,
    NewProperty,
    Irreconcilable,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoChange => write!(f, "no_change"),
            Self::Supersede => write!(f, "supersede"),
            Self::NewInsert => write!(f, "new_insert"),
            Self::NewProperty => write!(f, "new_property"),
            Self::Irreconcilable => write!(f, "irreconcilable"),
        }
    }
}

impl ReconciliationOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::NoChange { .. } => OutcomeKind::NoChange,
            Self::Supersede { .. } => OutcomeKind::Supersede,
            Self::NewInsert { .. } => OutcomeKind::NewInsert,
            Self::NewProperty { .. } => OutcomeKind::NewProperty,
            Self::Irreconcilable(_) => OutcomeKind::Irreconcilable,
        }
    }

    /// Rows this outcome introduces into the ledger.
    pub fn inserted(&self) -> &[Record] {
        match self {
            Self::Supersede { inserted, .. }
            | Self::NewInsert { inserted }
            | Self::NewProperty { inserted } => inserted,
            Self::NoChange { .. } | Self::Irreconcilable(_) => &[],
        }
    }
}

/// Decision for one (PROPERTY, currency date) group of the batch.
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub property: String,
    pub currency_date: NaiveDateTime,
    pub counts: GroupCounts,
    pub outcome: ReconciliationOutcome,
}

impl GroupOutcome {
    pub fn report(&self) -> GroupReport {
        GroupReport {
            property: self.property.clone(),
            currency_date: self.currency_date,
            outcome: self.outcome.kind(),
            counts: self.counts,
            audit: match &self.outcome {
                ReconciliationOutcome::NoChange { audit, .. } => *audit,
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub property: String,
    pub currency_date: NaiveDateTime,
    pub outcome: OutcomeKind,
    pub counts: GroupCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditFlag>,
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Accepted new rows for one property, mirrored back to that property.
#[derive(Debug, Clone)]
pub struct PropertyOutbox {
    pub property: String,
    pub district: String,
    pub prop_tag: String,
    /// DATE_CURR of the accepted snapshot.
    pub currency_date: String,
    pub records: RecordTable,
}

#[derive(Debug, Clone)]
pub struct Assembly {
    pub next_ledger: RecordTable,
    pub outbox: Vec<PropertyOutbox>,
    pub staging: RecordTable,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconSummary {
    pub total_groups: usize,
    pub properties_touched: usize,
    pub properties_untouched: usize,
    pub no_change: usize,
    pub supersede: usize,
    pub new_insert: usize,
    pub new_property: usize,
    pub irreconcilable: usize,
    pub audit_flags: usize,
    pub rows_inserted: usize,
    pub rows_superseded: usize,
    pub rows_passed_through: usize,
    pub next_ledger_rows: usize,
    pub staging_rows: usize,
    pub outcome_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub feature_type: FeatureType,
    pub engine_version: String,
    pub run_at: String,
    pub window_days_before: u32,
    pub window_days_after: u32,
}

#[derive(Debug, Clone)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub groups: Vec<GroupOutcome>,
    pub assembly: Assembly,
}

impl ReconResult {
    /// Serializable view without the record payloads.
    pub fn report(&self) -> ReconReport {
        ReconReport {
            meta: self.meta.clone(),
            summary: self.summary.clone(),
            groups: self.groups.iter().map(GroupOutcome::report).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub groups: Vec<GroupReport>,
}
