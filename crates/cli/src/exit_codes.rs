//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; batch scripts rely on them.
//!
//! | Code | Meaning                                               |
//! |------|-------------------------------------------------------|
//! | 0    | Success (including dry runs)                          |
//! | 1    | General error (unspecified)                           |
//! | 2    | CLI usage error (bad args, missing batch files)       |
//! | 3    | Invalid reconciliation config                         |
//! | 4    | Schema or IO failure reading/writing tables           |
//! | 5    | Irreconcilable groups; nothing written for that type  |
//! | 6    | Ledger locked by another writer                       |
//!
//! When several feature types fail in one run, the highest code wins.

use infraledger_recon::LedgerError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required inputs.
pub const EXIT_USAGE: u8 = 2;

/// Config file cannot be read, parsed or validated.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// A table file is malformed, or reading/writing it failed.
pub const EXIT_SCHEMA: u8 = 4;

/// At least one group has no reconciliation policy. The ledger for that
/// feature type is left untouched.
pub const EXIT_IRRECONCILABLE: u8 = 5;

/// The ledger lock file exists; another run holds it.
pub const EXIT_LOCKED: u8 = 6;

/// Map an engine error to its exit code.
pub fn ledger_exit_code(err: &LedgerError) -> u8 {
    match err {
        LedgerError::ConfigParse(_) | LedgerError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        LedgerError::Irreconcilable { .. } => EXIT_IRRECONCILABLE,
        LedgerError::SchemaViolation { .. }
        | LedgerError::Io(_)
        | LedgerError::Json(_)
        | LedgerError::Csv(_) => EXIT_SCHEMA,
    }
}
