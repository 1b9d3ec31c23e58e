// File I/O operations

pub mod csv;
pub mod error;
pub mod json;
pub mod store;

pub use error::StoreError;

/// Ledger file format version.
/// Increment when the schema changes in a way that old versions can't read.
pub const LEDGER_FORMAT_VERSION: u32 = 1;
