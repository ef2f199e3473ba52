use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::LedgerError;

/// Finest canonicalisation precision accepted (decimal places).
const MAX_DECIMALS: u32 = 12;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// Bounds of the half-open contemporary window
/// `[currency - days_before, currency + days_after)`.
///
/// Historical runs used ±30/+1, ±15/+1 and ±15/±15. The 30-back / 1-forward
/// pair is the default until the business rule is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    #[serde(default = "default_days_before")]
    pub days_before: u32,
    #[serde(default = "default_days_after")]
    pub days_after: u32,
}

fn default_days_before() -> u32 {
    30
}

fn default_days_after() -> u32 {
    1
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            days_before: default_days_before(),
            days_after: default_days_after(),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeometryConfig {
    /// Coordinates are compared after rounding to this many decimal places.
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_decimals() -> u32 {
    7
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            decimals: default_decimals(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutboxConfig {
    /// Value written to the UPLOAD column of mirrored rows.
    #[serde(default = "default_upload_marker")]
    pub upload_marker: String,
    /// Attribute values blanked in mirrored rows.
    #[serde(default = "default_blank_values")]
    pub blank_values: Vec<String>,
    /// Short directory names for districts.
    #[serde(default = "default_district_aliases")]
    pub district_aliases: BTreeMap<String, String>,
}

fn default_upload_marker() -> String {
    "Transition".into()
}

fn default_blank_values() -> Vec<String> {
    vec!["Not Recorded".into()]
}

fn default_district_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Northern Alice Springs".into(), "Northern_Alice".into()),
        ("Southern Alice Springs".into(), "Southern_Alice".into()),
        ("Victoria River".into(), "VRD".into()),
    ])
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            upload_marker: default_upload_marker(),
            blank_values: default_blank_values(),
            district_aliases: default_district_aliases(),
        }
    }
}

impl OutboxConfig {
    /// Directory name for a district: configured alias, else spaces → underscores.
    pub fn district_dir(&self, district: &str) -> String {
        match self.district_aliases.get(district) {
            Some(alias) => alias.clone(),
            None => district.trim().replace(' ', "_"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, LedgerError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| LedgerError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        // The window must contain its own anchor or a re-run can never match itself.
        if self.window.days_after == 0 {
            return Err(LedgerError::ConfigValidation(
                "window.days_after must be at least 1".into(),
            ));
        }

        if self.geometry.decimals > MAX_DECIMALS {
            return Err(LedgerError::ConfigValidation(format!(
                "geometry.decimals must be at most {MAX_DECIMALS}, got {}",
                self.geometry.decimals
            )));
        }

        if self.outbox.upload_marker.trim().is_empty() {
            return Err(LedgerError::ConfigValidation(
                "outbox.upload_marker must not be empty".into(),
            ));
        }

        for (district, alias) in &self.outbox.district_aliases {
            if alias.trim().is_empty() || alias.contains(['/', '\\']) {
                return Err(LedgerError::ConfigValidation(format!(
                    "outbox.district_aliases: invalid alias '{alias}' for '{district}'"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
