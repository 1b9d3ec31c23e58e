//! Ledger file round-trips: everything written comes back, costs included.

use std::str::FromStr;

use aqualedger_core::*;
use aqualedger_engine::ledger::{MovementDraft, YieldDraft};
use aqualedger_engine::rates::{GeneralRateDraft, VendorRateDraft};
use aqualedger_engine::report::DateRange;
use aqualedger_engine::Ledger;
use aqualedger_io::{csv, store, StoreError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tempfile::tempdir;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn populated() -> Ledger {
    let mut ledger = Ledger::new();
    let vendor = ledger.add_source("Sri Murugan Water", SourceKind::Vendor).unwrap().id;
    let hostel = ledger.add_location("Hostel", "Unloading", 2).unwrap().id;
    let bore = ledger.add_yield_location("Bore 3", YieldType::Borewell, false, 0).unwrap().id;
    ledger
        .add_vendor_rate(VendorRateDraft {
            source: vendor,
            water_type: WaterType::Drinking,
            cost_basis: CostBasis::PerLoad,
            rate_value: d("1500"),
            vehicle_capacity: Some(Liters(d("12000"))),
            effective_date: date("2024-01-01"),
        })
        .unwrap();
    ledger
        .add_general_rate(GeneralRateDraft {
            entry_date: date("2024-01-01"),
            effective_date: date("2024-01-01"),
            normal_water_rate: d("0.12"),
            drinking_water_rate: d("0.5"),
        })
        .unwrap();

    let mut draft = MovementDraft::new(date("2024-02-03"), SourceRef::Vendor { source: vendor });
    draft.water_type = WaterType::Drinking;
    draft.unloading_location = Some(hostel);
    draft.shift = Some(Shift::Evening);
    draft.comments = "gate 2".to_string();
    ledger.record_movement(draft).unwrap();

    for (day, reading) in [("2024-02-01", 40), ("2024-02-02", 47)] {
        ledger
            .record_yield(YieldDraft {
                date: date(day),
                location: bore,
                current_reading: reading,
                yield_liters: None,
                comment: String::new(),
            })
            .unwrap();
    }
    ledger
}

#[test]
fn save_then_load_is_identity() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("campus.aqua");
    let ledger = populated();

    store::save(&ledger, &path).unwrap();
    let loaded = store::load(&path).unwrap();

    assert_eq!(loaded.to_parts(), ledger.to_parts());
    let entry = loaded.movements().next().unwrap();
    assert_eq!(entry.total_cost, d("1500.00"));
    assert_eq!(entry.snapshot.cost_per_kl, Some(d("125.00")));
}

#[test]
fn save_overwrites_previous_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("campus.aqua");
    let mut ledger = populated();
    store::save(&ledger, &path).unwrap();

    let id = ledger.movements().next().unwrap().id;
    ledger.delete_movement(id).unwrap();
    store::save(&ledger, &path).unwrap();

    let loaded = store::load(&path).unwrap();
    assert_eq!(loaded.movements().count(), 0);
    assert_eq!(loaded.yields().count(), 2);
    assert!(!dir.path().join("campus.aqua.tmp").exists());
}

#[test]
fn deleted_id_stays_retired_across_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("campus.aqua");
    let mut ledger = populated();
    let removed = ledger.movements().next().unwrap().clone();
    ledger.delete_movement(removed.id).unwrap();
    store::save(&ledger, &path).unwrap();

    let mut loaded = store::load(&path).unwrap();
    assert_eq!(loaded.sequences(), ledger.sequences());
    let mut draft = MovementDraft::new(date("2024-02-04"), removed.source);
    draft.unloading_location = removed.unloading_location;
    let fresh = loaded.record_movement(draft).unwrap();
    assert_ne!(fresh.id, removed.id);
    assert_eq!(fresh.id, EntryId(removed.id.0 + 1));
}

#[test]
fn garbage_file_is_a_store_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("campus.aqua");
    std::fs::write(&path, b"not a database").unwrap();
    assert!(matches!(store::load(&path), Err(StoreError::Sqlite(_))));
}

#[test]
fn imported_sheet_survives_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("campus.aqua");
    let mut ledger = populated();
    csv::import_yield_readings(
        &mut ledger,
        date("2024-02-03"),
        "location,current_reading,comment\nBore 3,52,after rain\n",
    )
    .unwrap();
    store::save(&ledger, &path).unwrap();

    let loaded = store::load(&path).unwrap();
    let last = loaded.yields().max_by_key(|y| y.date).unwrap();
    assert_eq!(last.previous_reading, 47);
    assert_eq!(last.yield_liters, 5000);
    assert_eq!(last.comment, "after rain");
}

#[test]
fn movement_export_has_one_row_per_entry() {
    let ledger = populated();
    let mut out = Vec::new();
    let written = csv::export_movements(&ledger, &DateRange::all(), &mut out).unwrap();
    assert_eq!(written, 1);

    let text = String::from_utf8(out).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("id,entry_date,source_type,source"));
    let row = lines.next().unwrap();
    assert!(row.contains("Sri Murugan Water"));
    assert!(row.contains("Evening"));
    assert!(row.contains("1500.0"));
}
