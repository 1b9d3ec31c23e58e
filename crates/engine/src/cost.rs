//! Cost Resolver.
//!
//! Picks the rate applicable on the entry date and turns a movement into a
//! total cost. A missing rate or an unpriceable rate costs 0 and is logged;
//! it never fails the write.

use aqualedger_core::money::{round_currency, round_dp, round_rate, CURRENCY_DP};
use aqualedger_core::units::LITERS_PER_KL;
use aqualedger_core::*;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::rates::RateStore;

/// Everything the resolver needs about one movement.
#[derive(Debug, Clone, PartialEq)]
pub struct CostQuery {
    pub source: SourceRef,
    pub water_type: WaterType,
    /// Already in liters. Pipeline kiloliters are converted before this point.
    pub quantity: Liters,
    pub load_count: u32,
    pub entry_date: NaiveDate,
    /// Forces quantity proration even for per-load vendor rates.
    pub manual_override: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostPath {
    /// Internal haul: cost per load × loads.
    PerTrip,
    /// Vendor per-load rate × loads.
    PerLoad,
    /// Vendor rate prorated by quantity through the stored per-KL cache.
    ProratedCached,
    /// Vendor rate prorated by quantity through a per-KL figure derived now.
    ProratedDerived,
    /// Pipeline liters × cost per liter.
    Metered,
    /// No applicable rate, or a rate with no usable per-KL figure.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostOutcome {
    /// Rounded to 2 places, half away from zero.
    pub total_cost: Decimal,
    pub path: CostPath,
    pub snapshot: RateSnapshot,
}

impl CostOutcome {
    fn unresolved(snapshot: RateSnapshot) -> Self {
        CostOutcome { total_cost: Decimal::ZERO, path: CostPath::Unresolved, snapshot }
    }
}

fn snapshot(rate_id: RateId, per_liter: Option<Decimal>, per_kl: Option<Decimal>) -> RateSnapshot {
    RateSnapshot {
        rate_id: Some(rate_id),
        cost_per_liter: per_liter.map(round_rate),
        cost_per_kl: per_kl.map(|v| round_dp(v, CURRENCY_DP)),
    }
}

pub fn resolve_cost<S: RateStore + ?Sized>(rates: &S, query: &CostQuery) -> CostOutcome {
    let loads = Decimal::from(query.load_count);
    let outcome = match query.source {
        SourceRef::Internal { vehicle, loading_location } => {
            match rates.internal_rate(vehicle, loading_location, query.entry_date) {
                Some(rate) => CostOutcome {
                    total_cost: round_currency(rate.cost_per_load * loads),
                    path: CostPath::PerTrip,
                    snapshot: snapshot(
                        rate.id,
                        rate.effective_cost_per_liter(),
                        rate.effective_cost_per_kl(),
                    ),
                },
                None => {
                    warn!(
                        vehicle = %vehicle,
                        loading_location = %loading_location,
                        date = %query.entry_date,
                        "no internal vehicle rate applies; cost set to 0"
                    );
                    CostOutcome::unresolved(RateSnapshot::default())
                }
            }
        }
        SourceRef::Vendor { source } => {
            match rates.vendor_rate(source, query.water_type, query.entry_date) {
                Some(rate) => vendor_cost(rate, query, loads),
                None => {
                    warn!(
                        source = %source,
                        water_type = %query.water_type,
                        date = %query.entry_date,
                        "no vendor rate applies; cost set to 0"
                    );
                    CostOutcome::unresolved(RateSnapshot::default())
                }
            }
        }
        SourceRef::Pipeline { source } => match rates.pipeline_rate(source, query.entry_date) {
            Some(rate) => CostOutcome {
                total_cost: round_currency(query.quantity.value() * rate.cost_per_liter),
                path: CostPath::Metered,
                snapshot: snapshot(rate.id, Some(rate.cost_per_liter), Some(rate.cost_per_kl())),
            },
            None => {
                warn!(
                    source = %source,
                    date = %query.entry_date,
                    "no pipeline rate applies; cost set to 0"
                );
                CostOutcome::unresolved(RateSnapshot::default())
            }
        },
    };
    debug!(
        source = query.source.type_label(),
        path = ?outcome.path,
        total_cost = %outcome.total_cost,
        "resolved cost"
    );
    outcome
}

fn vendor_cost(rate: &VendorRate, query: &CostQuery, loads: Decimal) -> CostOutcome {
    let snap = snapshot(rate.id, rate.effective_cost_per_liter(), rate.effective_cost_per_kl());

    if rate.cost_basis == CostBasis::PerLoad && !query.manual_override {
        return CostOutcome {
            total_cost: round_currency(rate.rate_value * loads),
            path: CostPath::PerLoad,
            snapshot: snap,
        };
    }

    let kl = query.quantity.value() / LITERS_PER_KL;
    if let Some(per_kl) = rate.cached_cost_per_kl {
        return CostOutcome {
            total_cost: round_currency(kl * per_kl),
            path: CostPath::ProratedCached,
            snapshot: snap,
        };
    }
    match rate.derived_cost_per_kl() {
        Some(per_kl) => CostOutcome {
            total_cost: round_currency(kl * per_kl),
            path: CostPath::ProratedDerived,
            snapshot: snap,
        },
        None => {
            warn!(
                rate_id = %rate.id,
                "per-load vendor rate has no vehicle capacity; prorated cost set to 0"
            );
            CostOutcome::unresolved(snap)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn vendor_book(basis: CostBasis, value: &str, capacity: Option<&str>) -> RateBook {
        let mut book = RateBook::new();
        book.add_vendor_rate(VendorRateDraft {
            source: SourceId(1),
            water_type: WaterType::Drinking,
            cost_basis: basis,
            rate_value: d(value),
            vehicle_capacity: capacity.map(|c| Liters(d(c))),
            effective_date: date("2024-01-01"),
        })
        .unwrap();
        book
    }

    fn vendor_query(liters: &str, loads: u32, manual: bool) -> CostQuery {
        CostQuery {
            source: SourceRef::Vendor { source: SourceId(1) },
            water_type: WaterType::Drinking,
            quantity: Liters(d(liters)),
            load_count: loads,
            entry_date: date("2024-02-01"),
            manual_override: manual,
        }
    }

    #[test]
    fn vendor_per_load_multiplies_loads() {
        let book = vendor_book(CostBasis::PerLoad, "1500", None);
        let out = resolve_cost(&book, &vendor_query("24000", 2, false));
        assert_eq!(out.total_cost, d("3000.00"));
        assert_eq!(out.path, CostPath::PerLoad);
    }

    #[test]
    fn manual_override_prorates_per_load_rate() {
        let book = vendor_book(CostBasis::PerLoad, "1500", Some("12000"));
        let out = resolve_cost(&book, &vendor_query("9000", 1, true));
        assert_eq!(out.path, CostPath::ProratedCached);
        assert_eq!(out.total_cost, d("1125.00"));
    }

    #[test]
    fn per_liter_vendor_prorates() {
        let book = vendor_book(CostBasis::PerLiter, "0.08", None);
        let out = resolve_cost(&book, &vendor_query("12500", 1, false));
        assert_eq!(out.total_cost, d("1000.00"));
        assert_eq!(out.snapshot.cost_per_kl, Some(d("80")));
        assert_eq!(out.snapshot.cost_per_liter, Some(d("0.08")));
    }

    #[test]
    fn missing_cache_falls_back_to_derivation() {
        let mut book = RateBook::new();
        book.insert(RateRecord::Vendor(VendorRate {
            id: RateId(1),
            source: SourceId(1),
            water_type: WaterType::Drinking,
            cost_basis: CostBasis::PerLiter,
            rate_value: d("0.1"),
            vehicle_capacity: None,
            effective_date: date("2024-01-01"),
            cached_cost_per_liter: None,
            cached_cost_per_kl: None,
        }));
        let out = resolve_cost(&book, &vendor_query("3000", 1, false));
        assert_eq!(out.path, CostPath::ProratedDerived);
        assert_eq!(out.total_cost, d("300.00"));
    }

    #[test]
    fn per_load_without_capacity_under_override_is_zero() {
        let book = vendor_book(CostBasis::PerLoad, "1500", None);
        let out = resolve_cost(&book, &vendor_query("9000", 1, true));
        assert_eq!(out.path, CostPath::Unresolved);
        assert_eq!(out.total_cost, Decimal::ZERO);
        assert!(out.snapshot.rate_id.is_some());
    }

    #[test]
    fn no_rate_costs_zero() {
        let book = RateBook::new();
        let out = resolve_cost(&book, &vendor_query("12000", 1, false));
        assert_eq!(out.total_cost, Decimal::ZERO);
        assert_eq!(out.path, CostPath::Unresolved);
        assert_eq!(out.snapshot, RateSnapshot::default());
    }

    #[test]
    fn future_rate_never_applies() {
        let mut book = RateBook::new();
        book.add_vendor_rate(VendorRateDraft {
            source: SourceId(1),
            water_type: WaterType::Drinking,
            cost_basis: CostBasis::PerLoad,
            rate_value: d("1500"),
            vehicle_capacity: None,
            effective_date: date("2024-03-01"),
        })
        .unwrap();
        let out = resolve_cost(&book, &vendor_query("12000", 1, false));
        assert_eq!(out.total_cost, Decimal::ZERO);
    }

    #[test]
    fn internal_is_per_trip_regardless_of_quantity() {
        let mut book = RateBook::new();
        book.add_internal_rate(
            InternalRateDraft {
                vehicle: VehicleId(3),
                loading_location: LocationId(4),
                cost_per_load: d("450"),
                effective_date: date("2024-01-01"),
            },
            Some(Liters(d("6000"))),
        )
        .unwrap();
        let q = CostQuery {
            source: SourceRef::Internal { vehicle: VehicleId(3), loading_location: LocationId(4) },
            water_type: WaterType::Normal,
            quantity: Liters(d("1")),
            load_count: 3,
            entry_date: date("2024-01-20"),
            manual_override: true,
        };
        let out = resolve_cost(&book, &q);
        assert_eq!(out.path, CostPath::PerTrip);
        assert_eq!(out.total_cost, d("1350.00"));
        assert_eq!(out.snapshot.cost_per_kl, Some(d("75.00")));
        assert_eq!(out.snapshot.cost_per_liter, Some(d("0.075")));
    }

    #[test]
    fn pipeline_meters_liters() {
        let mut book = RateBook::new();
        book.add_pipeline_rate(PipelineRateDraft {
            source: SourceId(2),
            cost_per_liter: d("0.05"),
            effective_date: date("2024-01-01"),
        })
        .unwrap();
        let q = CostQuery {
            source: SourceRef::Pipeline { source: SourceId(2) },
            water_type: WaterType::Drinking,
            quantity: Liters(d("12000")),
            load_count: 1,
            entry_date: date("2024-01-15"),
            manual_override: false,
        };
        let out = resolve_cost(&book, &q);
        assert_eq!(out.total_cost, d("600.00"));
        assert_eq!(out.path, CostPath::Metered);
    }

    #[test]
    fn total_rounds_half_up() {
        let book = vendor_book(CostBasis::PerLiter, "0.0125", None);
        // 0.0125 * 1000 = 12.5 per KL; 0.02 KL -> 0.25; 0.0204 KL -> 0.255 -> 0.26
        let out = resolve_cost(&book, &vendor_query("20.4", 1, false));
        assert_eq!(out.total_cost, d("0.26"));
    }
}
