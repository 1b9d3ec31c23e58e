//! `aqualedger-engine` - rate resolution, costing, meter deltas and reports.
//!
//! Pure engine crate: receives a loaded ledger, returns costed entries and
//! report structures. No CLI or IO dependencies.

pub mod config;
pub mod cost;
pub mod error;
pub mod ledger;
pub mod meter;
pub mod rates;
pub mod report;
pub mod request;
pub mod shared;

pub use config::EngineConfig;
pub use cost::{resolve_cost, CostOutcome, CostPath, CostQuery};
pub use error::LedgerError;
pub use ledger::{IdSequences, Ledger, LedgerParts};
pub use rates::{RateBook, RateStore};
pub use shared::SharedLedger;
