use std::collections::BTreeSet;

use chrono::NaiveDateTime;

use crate::error::LedgerError;
use crate::model::FeatureType;
use crate::record::Record;

/// Ordered records of one feature type. Operations return new tables.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTable {
    feature_type: FeatureType,
    records: Vec<Record>,
}

impl RecordTable {
    /// Build a table, rejecting records whose geometry does not fit the feature type.
    pub fn new(feature_type: FeatureType, records: Vec<Record>) -> Result<Self, LedgerError> {
        let expected = feature_type.geometry_kind();
        for r in &records {
            let kind = r.geometry.kind();
            if kind != expected {
                return Err(LedgerError::schema(
                    format!("{feature_type} table, property '{}'", r.property()),
                    format!("expected {expected} geometry, found {kind}"),
                ));
            }
        }
        Ok(Self {
            feature_type,
            records,
        })
    }

    pub fn empty(feature_type: FeatureType) -> Self {
        Self {
            feature_type,
            records: Vec::new(),
        }
    }

    /// For records already drawn from a validated table of the same feature type.
    pub(crate) fn from_validated(feature_type: FeatureType, records: Vec<Record>) -> Self {
        Self {
            feature_type,
            records,
        }
    }

    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn filter(&self, pred: impl Fn(&Record) -> bool) -> RecordTable {
        Self::from_validated(
            self.feature_type,
            self.records.iter().filter(|r| pred(r)).cloned().collect(),
        )
    }

    pub fn for_property(&self, property: &str) -> RecordTable {
        self.filter(|r| r.property() == property)
    }

    /// Distinct PROPERTY values, sorted.
    pub fn properties(&self) -> BTreeSet<&str> {
        self.records.iter().map(Record::property).collect()
    }

    /// Distinct currency timestamps, ascending.
    pub fn currency_dates(&self) -> Vec<NaiveDateTime> {
        let set: BTreeSet<NaiveDateTime> = self.records.iter().map(Record::tran_date).collect();
        set.into_iter().collect()
    }

    pub fn concat(&self, other: &RecordTable) -> RecordTable {
        let mut records = self.records.clone();
        records.extend(other.records.iter().cloned());
        Self::from_validated(self.feature_type, records)
    }

    /// Stable sort by (PROPERTY, DATE_CURR) ascending, the persisted order.
    pub fn sorted(&self) -> RecordTable {
        let mut records = self.records.clone();
        records.sort_by(|a, b| {
            a.property()
                .cmp(b.property())
                .then(a.tran_date().cmp(&b.tran_date()))
        });
        Self::from_validated(self.feature_type, records)
    }
}

impl<'a> IntoIterator for &'a RecordTable {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
