//! `infraledger-recon`: property ledger reconciliation engine.
//!
//! Merges geotagged survey batches into a per-property ledger of
//! infrastructure records. The engine itself ([`engine::run`]) is pure:
//! it receives pre-loaded tables and returns classified groups plus the
//! assembled next state. [`store`] reads and commits those tables.

pub mod assemble;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod latest;
pub mod model;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod summary;
pub mod table;
pub mod window;

pub use config::ReconConfig;
pub use engine::{plan, run, ReconInput};
pub use error::LedgerError;
pub use geometry::Geometry;
pub use model::{FeatureType, GroupOutcome, ReconResult, ReconciliationOutcome};
pub use record::{Attributes, Record};
pub use table::RecordTable;
