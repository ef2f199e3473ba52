//! `infraledger run` and `infraledger validate`: drive the engine over a
//! transition directory, one feature type per thread.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use infraledger_recon::model::{AuditFlag, ReconReport, ReconciliationOutcome};
use infraledger_recon::store::{self, OutputPaths};
use infraledger_recon::{engine, FeatureType, LedgerError, ReconConfig};
use log::{debug, info};
use serde::Serialize;

use crate::exit_codes::{
    ledger_exit_code, EXIT_ERROR, EXIT_INVALID_CONFIG, EXIT_LOCKED, EXIT_SCHEMA, EXIT_USAGE,
};
use crate::CliError;

/// Parsed `run` arguments.
pub struct RunArgs {
    pub transition_dir: PathBuf,
    pub batch_dir: PathBuf,
    pub outbox_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub features: Vec<FeatureType>,
    pub dry_run: bool,
    pub json: bool,
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn from_ledger(feature_type: FeatureType, err: LedgerError) -> CliError {
    let code = ledger_exit_code(&err);
    let message = match &err {
        // Already prefixed with the feature type.
        LedgerError::Irreconcilable { .. } => err.to_string(),
        _ => format!("{feature_type}: {err}"),
    };
    let hint = match &err {
        LedgerError::Irreconcilable { .. } => {
            Some("review the listed groups manually; the ledger was not changed".to_string())
        }
        _ => None,
    };
    CliError { code, message, hint }
}

// ============================================================================
// Config
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<ReconConfig, CliError> {
    let Some(path) = path else {
        debug!("no config given, using defaults");
        return Ok(ReconConfig::default());
    };
    let text = fs::read_to_string(path).map_err(|e| {
        recon_err(EXIT_INVALID_CONFIG, format!("cannot read config {}: {e}", path.display()))
    })?;
    ReconConfig::from_toml(&text).map_err(|e| recon_err(EXIT_INVALID_CONFIG, e.to_string()))
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(Some(&config_path))?;
    eprintln!(
        "valid: window -{}/+{} day(s), geometry {} decimal(s), {} district alias(es)",
        config.window.days_before,
        config.window.days_after,
        config.geometry.decimals,
        config.outbox.district_aliases.len(),
    );
    Ok(())
}

// ============================================================================
// Lock
// ============================================================================

/// Single-writer guard for one feature type's ledger. The lock file is
/// created exclusively and removed on drop.
struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    fn acquire(path: PathBuf, feature_type: FeatureType) -> Result<Self, CliError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                recon_err(EXIT_SCHEMA, format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                debug!("{feature_type}: acquired {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(CliError {
                code: EXIT_LOCKED,
                message: format!("{feature_type}: ledger is locked ({})", path.display()),
                hint: Some("another run is writing this ledger; remove the lock file if it is stale".into()),
            }),
            Err(e) => Err(recon_err(
                EXIT_SCHEMA,
                format!("cannot create lock {}: {e}", path.display()),
            )),
        }
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

// ============================================================================
// run
// ============================================================================

#[derive(Serialize)]
struct FeatureOutput {
    feature_type: FeatureType,
    status: &'static str,
    dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ReconReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    written: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<u8>,
}

struct FeatureRun {
    report: ReconReport,
    written: Vec<PathBuf>,
    audited: Vec<String>,
}

fn batch_path(batch_dir: &Path, feature_type: FeatureType) -> PathBuf {
    batch_dir.join(format!("{feature_type}.geojson"))
}

/// Feature types to process: explicit list, else those with a batch file.
fn resolve_features(args: &RunArgs) -> Result<Vec<FeatureType>, CliError> {
    if !args.batch_dir.is_dir() {
        return Err(recon_err(
            EXIT_USAGE,
            format!("batch directory not found: {}", args.batch_dir.display()),
        ));
    }

    if !args.features.is_empty() {
        let mut features = args.features.clone();
        features.sort();
        features.dedup();
        for ft in &features {
            let path = batch_path(&args.batch_dir, *ft);
            if !path.is_file() {
                return Err(recon_err(EXIT_USAGE, format!("batch file not found: {}", path.display())));
            }
        }
        return Ok(features);
    }

    let found: Vec<FeatureType> = FeatureType::ALL
        .into_iter()
        .filter(|ft| batch_path(&args.batch_dir, *ft).is_file())
        .collect();
    if found.is_empty() {
        return Err(CliError {
            code: EXIT_USAGE,
            message: format!("no batch files in {}", args.batch_dir.display()),
            hint: Some("expected points.geojson, lines.geojson, polygons.geojson or paddocks.geojson".into()),
        });
    }
    Ok(found)
}

fn run_feature(
    config: &ReconConfig,
    args: &RunArgs,
    feature_type: FeatureType,
) -> Result<FeatureRun, CliError> {
    let paths = OutputPaths::under(&args.transition_dir, feature_type, args.outbox_dir.as_deref());

    let _lock = if args.dry_run {
        None
    } else {
        let lock_path = args.transition_dir.join(feature_type.as_str()).join(".ledger.lock");
        Some(LedgerLock::acquire(lock_path, feature_type)?)
    };

    let input = engine::ReconInput {
        batch: store::read_table(&batch_path(&args.batch_dir, feature_type), feature_type)
            .map_err(|e| from_ledger(feature_type, e))?,
        ledger: store::read_table(&paths.ledger, feature_type)
            .map_err(|e| from_ledger(feature_type, e))?,
        staging: store::read_table(&paths.staging, feature_type)
            .map_err(|e| from_ledger(feature_type, e))?,
    };
    info!(
        "{feature_type}: batch {} row(s), ledger {} row(s)",
        input.batch.len(),
        input.ledger.len()
    );

    let result = engine::run(config, &input).map_err(|e| from_ledger(feature_type, e))?;

    let audited = result
        .groups
        .iter()
        .filter_map(|g| match &g.outcome {
            ReconciliationOutcome::NoChange {
                audit: Some(AuditFlag::IncomingMissingObservations { ledger_only, incoming_only }),
                ..
            } => Some(format!(
                "{} @ {}: batch lacks {ledger_only} ledger row(s), {incoming_only} differing; ledger kept",
                g.property, g.currency_date
            )),
            ReconciliationOutcome::NoChange {
                audit: Some(AuditFlag::OvertakenInBatch { latest }),
                ..
            } => Some(format!(
                "{} @ {}: skipped, batch also carries {latest}",
                g.property, g.currency_date
            )),
            _ => None,
        })
        .collect();

    let written = if args.dry_run {
        Vec::new()
    } else {
        store::commit(&result.assembly, &paths, &config.outbox)
            .map_err(|e| from_ledger(feature_type, e))?
            .written
    };

    Ok(FeatureRun {
        report: result.report(),
        written,
        audited,
    })
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let features = resolve_features(&args)?;

    let runs: Vec<(FeatureType, Result<FeatureRun, CliError>)> = std::thread::scope(|s| {
        let handles: Vec<_> = features
            .iter()
            .map(|&ft| {
                let config = &config;
                let args = &args;
                (ft, s.spawn(move || run_feature(config, args, ft)))
            })
            .collect();
        handles
            .into_iter()
            .map(|(ft, h)| {
                let outcome = h.join().unwrap_or_else(|_| {
                    Err(recon_err(EXIT_ERROR, format!("{ft}: worker panicked")))
                });
                (ft, outcome)
            })
            .collect()
    });

    let mut outputs = Vec::with_capacity(runs.len());
    let mut failures: Vec<CliError> = Vec::new();
    for (ft, outcome) in runs {
        match outcome {
            Ok(run) => {
                print_summary(ft, &run, args.dry_run);
                outputs.push(FeatureOutput {
                    feature_type: ft,
                    status: "ok",
                    dry_run: args.dry_run,
                    report: Some(run.report),
                    written: run.written,
                    error: None,
                    exit_code: None,
                });
            }
            Err(err) => {
                outputs.push(FeatureOutput {
                    feature_type: ft,
                    status: "error",
                    dry_run: args.dry_run,
                    report: None,
                    written: Vec::new(),
                    error: Some(err.message.clone()),
                    exit_code: Some(err.code),
                });
                failures.push(err);
            }
        }
    }

    if args.json {
        let json = serde_json::to_string_pretty(&outputs)
            .map_err(|e| recon_err(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{json}");
    }

    combine_failures(failures)
}

fn print_summary(feature_type: FeatureType, run: &FeatureRun, dry_run: bool) {
    let s = &run.report.summary;
    eprintln!(
        "{feature_type}: {} group(s): {} no change, {} supersede, {} new; ledger {} row(s), {} inserted, {} superseded{}",
        s.total_groups,
        s.no_change,
        s.supersede,
        s.new_insert + s.new_property,
        s.next_ledger_rows,
        s.rows_inserted,
        s.rows_superseded,
        if dry_run { " (dry run, nothing written)" } else { "" },
    );
    for line in &run.audited {
        eprintln!("  audit: {line}");
    }
}

/// One error for the whole run: the highest exit code, every message.
fn combine_failures(mut failures: Vec<CliError>) -> Result<(), CliError> {
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => {
            let code = failures.iter().map(|f| f.code).max().unwrap_or(EXIT_SCHEMA);
            let hint = failures.iter().find(|f| f.code == code).and_then(|f| f.hint.clone());
            let message = failures
                .into_iter()
                .map(|f| f.message)
                .collect::<Vec<_>>()
                .join("\n");
            Err(CliError { code, message, hint })
        }
    }
}
