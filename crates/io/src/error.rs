use std::fmt;

use aqualedger_engine::LedgerError;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sqlite(rusqlite::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    /// A write rejected by the ledger.
    Ledger(LedgerError),
    /// Ledger file written by a newer version.
    UnsupportedVersion { found: u32, supported: u32 },
    /// Bad row in an imported sheet. `line` is 1-based and counts the header.
    Import { line: u64, message: String },
}

impl StoreError {
    pub fn import(line: u64, message: impl Into<String>) -> Self {
        StoreError::Import { line, message: message.into() }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "io error: {e}"),
            StoreError::Sqlite(e) => write!(f, "ledger file error: {e}"),
            StoreError::Csv(e) => write!(f, "csv error: {e}"),
            StoreError::Json(e) => write!(f, "json error: {e}"),
            StoreError::Ledger(e) => write!(f, "{e}"),
            StoreError::UnsupportedVersion { found, supported } => write!(
                f,
                "ledger format version {found} is newer than supported version {supported}"
            ),
            StoreError::Import { line, message } => write!(f, "line {line}: {message}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Sqlite(e) => Some(e),
            StoreError::Csv(e) => Some(e),
            StoreError::Json(e) => Some(e),
            StoreError::Ledger(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<csv::Error> for StoreError {
    fn from(e: csv::Error) -> Self {
        StoreError::Csv(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

impl From<LedgerError> for StoreError {
    fn from(e: LedgerError) -> Self {
        StoreError::Ledger(e)
    }
}
