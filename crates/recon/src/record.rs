use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::geometry::{CanonicalGeometry, Geometry};

/// Formats accepted for DATE_CURR, tried in order.
const CURRENCY_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Format DATE_CURR is written back in when a record is stamped.
pub const CURRENCY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// The persisted attribute columns of one observation.
///
/// Unknown columns are ignored when reading, which is how derived columns
/// (TRAN_DATE, merge indicators) left behind by other tools are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Attributes {
    pub feature_group: String,
    pub feature: String,
    pub label: String,
    pub property: String,
    pub district: String,
    pub prop_tag: String,
    pub source: String,
    pub confidence: String,
    #[serde(default)]
    pub status: String,
    pub date_insp: String,
    pub date_curr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_km2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<String>,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub attributes: Attributes,
    pub geometry: Geometry,
    tran_date: NaiveDateTime,
}

impl Record {
    /// Build a record, deriving its comparison timestamp from DATE_CURR.
    pub fn new(attributes: Attributes, geometry: Geometry) -> Result<Self, LedgerError> {
        if attributes.property.trim().is_empty() {
            return Err(LedgerError::schema(
                format!("record '{}'", attributes.label),
                "PROPERTY is blank",
            ));
        }
        let tran_date = parse_currency_date(&attributes.date_curr).ok_or_else(|| {
            LedgerError::schema(
                format!("property '{}'", attributes.property),
                format!("cannot parse DATE_CURR '{}'", attributes.date_curr),
            )
        })?;
        Ok(Self {
            attributes,
            geometry,
            tran_date,
        })
    }

    pub fn property(&self) -> &str {
        &self.attributes.property
    }

    /// TRAN_DATE: comparison-only, never persisted.
    pub fn tran_date(&self) -> NaiveDateTime {
        self.tran_date
    }

    /// The "same observation" key. STATUS, DATE_CURR, metrics and UPLOAD are
    /// deliberately absent.
    pub fn key(&self, decimals: u32) -> RecordKey {
        let a = &self.attributes;
        RecordKey {
            feature_group: a.feature_group.clone(),
            feature: a.feature.clone(),
            label: a.label.clone(),
            date_insp: a.date_insp.clone(),
            district: a.district.clone(),
            property: a.property.clone(),
            prop_tag: a.prop_tag.clone(),
            source: a.source.clone(),
            confidence: a.confidence.clone(),
            geometry: self.geometry.canonical(decimals),
        }
    }

    /// Copy with the UPLOAD marker cleared, as written to the ledger.
    pub fn without_marker(&self) -> Self {
        let mut r = self.clone();
        r.attributes.upload = None;
        r
    }
}

/// Attribute-equality key. Two records with equal keys are the same observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub feature_group: String,
    pub feature: String,
    pub label: String,
    pub date_insp: String,
    pub district: String,
    pub property: String,
    pub prop_tag: String,
    pub source: String,
    pub confidence: String,
    pub geometry: CanonicalGeometry,
}

pub fn parse_currency_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for fmt in CURRENCY_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
