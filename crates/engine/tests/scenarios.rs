//! End-to-end ledger scenarios: rates in, costed entries and reports out.

use std::str::FromStr;

use aqualedger_core::*;
use aqualedger_engine::ledger::{BulkYieldRow, EnteredQuantity, MovementDraft, YieldDraft};
use aqualedger_engine::rates::{PipelineRateDraft, VendorRateDraft};
use aqualedger_engine::report::{self, DateRange, Granularity};
use aqualedger_engine::request::{CostRequest, SourceType};
use aqualedger_engine::{EngineConfig, Ledger, LedgerError, SharedLedger};
use chrono::NaiveDate;
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

struct Campus {
    ledger: Ledger,
    vendor: SourceId,
    pipeline: SourceId,
    hostel: LocationId,
}

fn campus() -> Campus {
    let mut ledger = Ledger::new();
    let vendor = ledger.add_source("Sri Murugan Water", SourceKind::Vendor).unwrap().id;
    let pipeline = ledger.add_source("Corporation Line", SourceKind::Pipeline).unwrap().id;
    let hostel = ledger.add_location("Hostel", "Unloading", 0).unwrap().id;
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
        .add_pipeline_rate(PipelineRateDraft {
            source: pipeline,
            cost_per_liter: d("0.05"),
            effective_date: date("2024-01-01"),
        })
        .unwrap();
    Campus { ledger, vendor, pipeline, hostel }
}

// -------------------------------------------------------------------------
// Costing
// -------------------------------------------------------------------------

#[test]
fn per_load_vendor_purchase() {
    let mut c = campus();
    let mut draft = MovementDraft::new(date("2024-02-01"), SourceRef::Vendor { source: c.vendor });
    draft.water_type = WaterType::Drinking;
    draft.load_count = 2;
    let entry = c.ledger.record_movement(draft).unwrap();
    assert_eq!(entry.total_cost, d("3000.00"));
    assert_eq!(entry.quantity, Liters(d("24000")));
}

#[test]
fn pipeline_quantity_entered_in_kiloliters() {
    let mut c = campus();
    let mut draft = MovementDraft::new(date("2024-01-15"), SourceRef::Pipeline { source: c.pipeline });
    draft.quantity = Some(EnteredQuantity::Kiloliters(Kiloliters(d("12"))));
    let entry = c.ledger.record_movement(draft).unwrap();
    assert_eq!(entry.quantity.value(), d("12000"));
    assert_eq!(entry.total_cost, d("600.00"));
}

#[test]
fn missing_rate_saves_zero_cost() {
    let mut c = campus();
    let mut draft = MovementDraft::new(date("2023-06-01"), SourceRef::Pipeline { source: c.pipeline });
    draft.quantity = Some(EnteredQuantity::Liters(Liters(d("5000"))));
    let entry = c.ledger.record_movement(draft).unwrap();
    assert_eq!(entry.total_cost, Decimal::ZERO);
    assert_eq!(entry.snapshot.rate_id, None);
}

#[test]
fn later_rate_does_not_touch_saved_entries() {
    let mut c = campus();
    let mut draft = MovementDraft::new(date("2024-02-01"), SourceRef::Vendor { source: c.vendor });
    draft.load_count = 1;
    let saved = c.ledger.record_movement(draft).unwrap();
    c.ledger
        .add_vendor_rate(VendorRateDraft {
            source: c.vendor,
            water_type: WaterType::Drinking,
            cost_basis: CostBasis::PerLoad,
            rate_value: d("1800"),
            vehicle_capacity: Some(Liters(d("12000"))),
            effective_date: date("2024-01-15"),
        })
        .unwrap();
    assert_eq!(c.ledger.movement(saved.id).unwrap().total_cost, d("1500.00"));
}

#[test]
fn preview_matches_recorded_cost() {
    let c = campus();
    let preview = c
        .ledger
        .preview(CostRequest {
            source_type: SourceType::Pipeline,
            source_id: Some(c.pipeline.0),
            vehicle_id: None,
            loading_location_id: None,
            water_type: None,
            quantity_liters: 12.0,
            load_count: Some(1),
            entry_date: Some("2024-01-15".to_string()),
            is_manual_override: false,
        })
        .unwrap();
    assert_eq!(preview.total_cost, 600.0);
}

#[test]
fn preview_requires_entry_date() {
    let c = campus();
    let err = c
        .ledger
        .preview(CostRequest {
            source_type: SourceType::Vendor,
            source_id: Some(c.vendor.0),
            vehicle_id: None,
            loading_location_id: None,
            water_type: Some("Drinking Water".to_string()),
            quantity_liters: 12_000.0,
            load_count: Some(1),
            entry_date: Some("15/01/2024".to_string()),
            is_manual_override: false,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidDate { .. }));
}

// -------------------------------------------------------------------------
// Readings
// -------------------------------------------------------------------------

#[test]
fn meter_rollback_yields_zero() {
    let mut ledger = Ledger::new();
    let well = ledger.add_yield_location("East Well", YieldType::Well, false, 0).unwrap().id;
    for (day, reading) in [("2024-03-01", 100), ("2024-03-02", 95)] {
        ledger
            .record_yield(YieldDraft {
                date: date(day),
                location: well,
                current_reading: reading,
                yield_liters: None,
                comment: String::new(),
            })
            .unwrap();
    }
    let second = ledger.yields().find(|y| y.date == date("2024-03-02")).unwrap();
    assert_eq!(second.previous_reading, 100);
    assert_eq!(second.yield_liters, 0);
}

#[test]
fn bulk_yield_twice_keeps_one_record() {
    let mut ledger = Ledger::new();
    let well = ledger.add_yield_location("East Well", YieldType::Well, false, 0).unwrap().id;
    let row = |reading| BulkYieldRow {
        location: well,
        current_reading: Some(reading),
        yield_liters: None,
        comment: String::new(),
    };
    let first = ledger.bulk_yield(date("2024-03-01"), vec![row(40)]).unwrap();
    let second = ledger.bulk_yield(date("2024-03-01"), vec![row(42)]).unwrap();
    assert_eq!(first.created.len(), 1);
    assert_eq!(second.updated, first.created);
    assert_eq!(ledger.yields().count(), 1);
    assert_eq!(ledger.yields().next().unwrap().current_reading, 42);
}

#[test]
fn bulk_batch_is_all_or_nothing() {
    let mut ledger = Ledger::new();
    let well = ledger.add_yield_location("East Well", YieldType::Well, false, 0).unwrap().id;
    let rows = vec![
        BulkYieldRow { location: well, current_reading: Some(10), yield_liters: None, comment: String::new() },
        BulkYieldRow {
            location: YieldLocationId(404),
            current_reading: Some(10),
            yield_liters: None,
            comment: String::new(),
        },
    ];
    assert!(matches!(
        ledger.bulk_yield(date("2024-03-01"), rows),
        Err(LedgerError::NotFound { .. })
    ));
    assert_eq!(ledger.yields().count(), 0);
}

// -------------------------------------------------------------------------
// Reports
// -------------------------------------------------------------------------

#[test]
fn pipeline_rows_never_count_as_drinking() {
    let mut c = campus();
    let mut pipe = MovementDraft::new(date("2024-02-05"), SourceRef::Pipeline { source: c.pipeline });
    pipe.water_type = WaterType::Drinking;
    pipe.quantity = Some(EnteredQuantity::Kiloliters(Kiloliters(d("5"))));
    c.ledger.record_movement(pipe).unwrap();

    let mut drinking = MovementDraft::new(date("2024-02-06"), SourceRef::Vendor { source: c.vendor });
    drinking.quantity = Some(EnteredQuantity::Liters(Liters(d("3000"))));
    drinking.unloading_location = Some(c.hostel);
    c.ledger.record_movement(drinking).unwrap();

    let config = EngineConfig::default();
    let agg = report::summary(&c.ledger, &DateRange::all(), Granularity::Month, &config);
    let feb = &agg.buckets["2024-02"];
    assert_eq!(feb.breakdown["Corporation Water"].total_kl, 5.0);
    assert_eq!(feb.breakdown["Drinking Water"].total_kl, 3.0);

    let json = serde_json::to_value(&agg).unwrap();
    assert_eq!(json["buckets"]["2024-02"]["breakdown"]["Corporation Water"]["total_kl"], 5.0);
}

#[test]
fn shared_ledger_serializes_writers() {
    let c = campus();
    let vendor = c.vendor;
    let shared = SharedLedger::new(c.ledger);
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                shared.write(|l| {
                    let mut draft =
                        MovementDraft::new(date("2024-02-01"), SourceRef::Vendor { source: vendor });
                    draft.comments = format!("writer {i}");
                    l.record_movement(draft)
                })
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap().unwrap();
    }
    let ids: Vec<u64> = shared.read(|l| l.movements().map(|m| m.id.0).collect());
    assert_eq!(ids, vec![1, 2, 3, 4]);
}
