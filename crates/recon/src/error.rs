use std::fmt;

use crate::model::{FeatureType, IrreconcilableGroup};

#[derive(Debug)]
pub enum LedgerError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad window bounds, precision out of range, etc.).
    ConfigValidation(String),
    /// A record or file does not match the fixed schema.
    SchemaViolation { context: String, message: String },
    /// One or more groups reached a count combination with no policy.
    /// Nothing may be persisted for the feature type.
    Irreconcilable {
        feature_type: FeatureType,
        groups: Vec<IrreconcilableGroup>,
    },
    /// IO error (file read, write, rename).
    Io(String),
    /// GeoJSON encode/decode error.
    Json(String),
    /// CSV mirror write error.
    Csv(String),
}

impl LedgerError {
    pub(crate) fn schema(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            context: context.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::SchemaViolation { context, message } => {
                write!(f, "schema violation in {context}: {message}")
            }
            Self::Irreconcilable { feature_type, groups } => {
                write!(
                    f,
                    "{feature_type}: {} irreconcilable group(s), nothing written",
                    groups.len()
                )?;
                for g in groups {
                    write!(f, "\n  {g}")?;
                }
                Ok(())
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Json(msg) => write!(f, "GeoJSON error: {msg}"),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
