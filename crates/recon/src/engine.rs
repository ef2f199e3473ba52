use log::info;

use crate::assemble::assemble;
use crate::config::ReconConfig;
use crate::error::LedgerError;
use crate::model::{FeatureType, GroupOutcome, ReconMeta, ReconResult};
use crate::reconcile::reconcile_batch;
use crate::summary::compute_summary;
use crate::table::RecordTable;

/// Pre-loaded tables for one feature-type run.
pub struct ReconInput {
    pub batch: RecordTable,
    pub ledger: RecordTable,
    /// Existing migration staging set; empty if none yet.
    pub staging: RecordTable,
}

impl ReconInput {
    pub fn feature_type(&self) -> FeatureType {
        self.ledger.feature_type()
    }

    fn check_feature_types(&self) -> Result<(), LedgerError> {
        let ft = self.ledger.feature_type();
        for (name, table) in [("batch", &self.batch), ("staging", &self.staging)] {
            if table.feature_type() != ft {
                return Err(LedgerError::schema(
                    format!("{name} table"),
                    format!("feature type {} does not match ledger {ft}", table.feature_type()),
                ));
            }
        }
        Ok(())
    }
}

/// Classify every batch group without assembling. Never fails on
/// irreconcilable groups; they are returned as outcomes.
pub fn plan(config: &ReconConfig, input: &ReconInput) -> Result<Vec<GroupOutcome>, LedgerError> {
    input.check_feature_types()?;
    Ok(reconcile_batch(&input.batch, &input.ledger, config))
}

/// Run reconciliation for one feature type. Returns classified groups,
/// summary, and the assembled next-state tables. Everything is computed in
/// memory; persisting is the caller's step.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconResult, LedgerError> {
    let groups = plan(config, input)?;
    let assembly = assemble(&input.ledger, &groups, &input.staging, config)?;
    let summary = compute_summary(&input.ledger, &groups, &assembly);

    info!(
        "{}: {} group(s): {} no change, {} supersede, {} new, {} audit flag(s); ledger {} -> {} rows",
        input.feature_type(),
        summary.total_groups,
        summary.no_change,
        summary.supersede,
        summary.new_insert + summary.new_property,
        summary.audit_flags,
        input.ledger.len(),
        summary.next_ledger_rows,
    );

    Ok(ReconResult {
        meta: ReconMeta {
            feature_type: input.feature_type(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            window_days_before: config.window.days_before,
            window_days_after: config.window.days_after,
        },
        summary,
        groups,
        assembly,
    })
}
