// JSON export: pretty reports and whole-ledger snapshots

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use aqualedger_engine::{Ledger, LedgerParts};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::LEDGER_FORMAT_VERSION;

/// Write any report as pretty JSON.
pub fn write_report<T: Serialize, W: Write>(report: &T, out: W) -> Result<(), StoreError> {
    let mut out = out;
    serde_json::to_writer_pretty(&mut out, report)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    format_version: u32,
    #[serde(flatten)]
    parts: LedgerParts,
}

/// Dump the whole ledger as a versioned JSON document.
pub fn export_snapshot(ledger: &Ledger, path: &Path) -> Result<(), StoreError> {
    let writer = BufWriter::new(File::create(path)?);
    let snapshot = Snapshot { format_version: LEDGER_FORMAT_VERSION, parts: ledger.to_parts() };
    serde_json::to_writer_pretty(writer, &snapshot)?;
    Ok(())
}

/// Rebuild a ledger from [`export_snapshot`] output. Derived fields are
/// validated on load, not trusted.
pub fn import_snapshot(path: &Path) -> Result<Ledger, StoreError> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: Snapshot = serde_json::from_reader(reader)?;
    if snapshot.format_version > LEDGER_FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: snapshot.format_version,
            supported: LEDGER_FORMAT_VERSION,
        });
    }
    Ok(Ledger::from_parts(snapshot.parts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqualedger_core::SourceKind;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let mut ledger = Ledger::new();
        ledger.add_source("Corporation", SourceKind::Pipeline).unwrap();
        ledger.add_location("Hostel A", "Unloading", 1).unwrap();
        export_snapshot(&ledger, &path).unwrap();

        let loaded = import_snapshot(&path).unwrap();
        assert_eq!(loaded.to_parts(), ledger.to_parts());
    }

    #[test]
    fn test_newer_snapshot_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut value = serde_json::to_value(Snapshot {
            format_version: LEDGER_FORMAT_VERSION,
            parts: LedgerParts::default(),
        })
        .unwrap();
        value["format_version"] = serde_json::json!(LEDGER_FORMAT_VERSION + 1);
        fs::write(&path, value.to_string()).unwrap();

        assert!(matches!(import_snapshot(&path), Err(StoreError::UnsupportedVersion { .. })));
    }

    #[test]
    fn test_report_is_newline_terminated() {
        let mut out = Vec::new();
        write_report(&serde_json::json!({"total_kl": 1.5}), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("}\n"));
    }
}
