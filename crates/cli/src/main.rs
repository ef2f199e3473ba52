// infraledger CLI - reconcile survey batches into the property ledger

mod exit_codes;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use infraledger_recon::FeatureType;

use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "infraledger")]
#[command(about = "Reconcile geotagged infrastructure surveys into the property ledger")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile batch files against the ledger and commit the next state
    #[command(after_help = "\
Examples:
  infraledger run --transition-dir transition --batch-dir batch
  infraledger run --transition-dir transition --batch-dir batch --outbox-dir outbox
  infraledger run --transition-dir transition --batch-dir batch --feature points --dry-run --json

Layout under --transition-dir:
  previous_transfer/<feature>/previous_transfer_<feature>.geojson   ledger
  for_migration/<feature>/for_migration_<feature>.geojson           migration staging
  <feature>/.ledger.lock                                            writer lock

Batch files are read from <batch-dir>/<feature>.geojson.")]
    Run {
        /// Directory holding the ledger and migration staging files
        #[arg(long)]
        transition_dir: PathBuf,

        /// Directory holding this batch's <feature>.geojson files
        #[arg(long)]
        batch_dir: PathBuf,

        /// Root for per-property mirrors of accepted rows (skipped if omitted)
        #[arg(long)]
        outbox_dir: Option<PathBuf>,

        /// Reconciliation settings (TOML); defaults apply if omitted
        #[arg(long, env = "INFRALEDGER_CONFIG")]
        config: Option<PathBuf>,

        /// Feature type to reconcile (repeatable); defaults to every batch file present
        #[arg(long = "feature", value_name = "FEATURE")]
        features: Vec<FeatureType>,

        /// Classify and report without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Print per-feature reports as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Validate a reconciliation config without running
    #[command(after_help = "\
Examples:
  infraledger validate recon.toml")]
    Validate {
        /// Path to the TOML config file
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  infraledger-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            transition_dir,
            batch_dir,
            outbox_dir,
            config,
            features,
            dry_run,
            json,
        } => recon::cmd_run(recon::RunArgs {
            transition_dir,
            batch_dir,
            outbox_dir,
            config,
            features,
            dry_run,
            json,
        }),
        Commands::Validate { config } => recon::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}
