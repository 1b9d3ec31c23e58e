// Property-based tests for rate selection, costing and meter deltas.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use aqualedger_core::*;
use aqualedger_engine::ledger::BulkConsumptionRow;
use aqualedger_engine::meter::{resolve_delta, ReadingMode};
use aqualedger_engine::rates::{GeneralRateDraft, VendorRateDraft};
use aqualedger_engine::{resolve_cost, CostQuery, Ledger, RateBook, RateStore};
use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

fn day(offset: u64) -> NaiveDate {
    base() + Days::new(offset)
}

/// General rate book with one record per offset.
fn book(offsets: &[u64]) -> RateBook {
    let mut book = RateBook::new();
    for (i, &o) in offsets.iter().enumerate() {
        book.add_general_rate(GeneralRateDraft {
            entry_date: day(o),
            effective_date: day(o),
            normal_water_rate: Decimal::new(i as i64 + 1, 2),
            drinking_water_rate: Decimal::new(i as i64 + 1, 1),
        })
        .unwrap();
    }
    book
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn latest_rate_is_stable_between_effective_dates(
        offsets in proptest::collection::vec(0u64..400, 1..12),
        a in 0u64..500,
        b in 0u64..500,
    ) {
        let (d1, d2) = (a.min(b), a.max(b));
        let book = book(&offsets);
        let changed = offsets.iter().any(|&o| o > d1 && o <= d2);
        let r1 = book.latest_rate(&RateKey::General, day(d1)).map(RateRecord::id);
        let r2 = book.latest_rate(&RateKey::General, day(d2)).map(RateRecord::id);
        if !changed {
            prop_assert_eq!(r1, r2);
        }
        if let Some(r) = book.latest_rate(&RateKey::General, day(d2)) {
            prop_assert!(r.effective_date() <= day(d2));
        }
    }

    #[test]
    fn per_load_cost_is_exact(
        cents in 0i64..100_000_000,
        loads in 1u32..50,
        capacity in proptest::option::of(1i64..30_000),
    ) {
        let rate_value = Decimal::new(cents, 2);
        let mut book = RateBook::new();
        book.add_vendor_rate(VendorRateDraft {
            source: SourceId(1),
            water_type: WaterType::Normal,
            cost_basis: CostBasis::PerLoad,
            rate_value,
            vehicle_capacity: capacity.map(Liters::from_whole),
            effective_date: base(),
        })
        .unwrap();
        let outcome = resolve_cost(&book, &CostQuery {
            source: SourceRef::Vendor { source: SourceId(1) },
            water_type: WaterType::Normal,
            quantity: Liters::from_whole(12_000),
            load_count: loads,
            entry_date: day(30),
            manual_override: false,
        });
        prop_assert_eq!(outcome.total_cost, rate_value * Decimal::from(loads));
    }

    #[test]
    fn kiloliter_round_trip(milli in 0i64..10_000_000_000) {
        let kl = Kiloliters(Decimal::new(milli, 3));
        prop_assert_eq!(kl.to_liters().to_kl(), kl);
    }

    #[test]
    fn meter_delta_never_negative(prev in -1_000_000i64..1_000_000, curr in -1_000_000i64..1_000_000) {
        let delta = resolve_delta(Some(prev), curr, ReadingMode::Metered);
        prop_assert!(delta.derived_liters >= 0);
        prop_assert_eq!(delta.derived_liters, (curr - prev).max(0) * 1000);
        prop_assert_eq!(delta.previous_reading, prev);
    }

    #[test]
    fn bulk_consumption_is_idempotent(
        readings in proptest::collection::vec(1i64..100_000, 1..6),
        resubmit in 1i64..100_000,
    ) {
        let mut ledger = Ledger::new();
        let ids: Vec<ConsumptionLocationId> = (0..readings.len())
            .map(|i| {
                ledger
                    .add_consumption_location(&format!("Block {i}"), ConsumptionType::Normal, None, i as i32)
                    .unwrap()
                    .id
            })
            .collect();
        let rows = |value: Option<i64>| -> Vec<BulkConsumptionRow> {
            ids.iter()
                .zip(&readings)
                .map(|(&location, &r)| BulkConsumptionRow {
                    location,
                    current_reading: Some(value.unwrap_or(r)),
                    comment: String::new(),
                })
                .collect()
        };
        ledger.bulk_consumption(day(10), rows(None)).unwrap();
        ledger.bulk_consumption(day(10), rows(None)).unwrap();
        ledger.bulk_consumption(day(10), rows(Some(resubmit))).unwrap();
        prop_assert_eq!(ledger.consumptions().count(), ids.len());
        prop_assert!(ledger.consumptions().all(|c| c.current_reading == resubmit));
    }
}
