//! Current rate card per source, with no date cutoff.

use std::collections::BTreeMap;

use aqualedger_core::money::{to_report, CURRENCY_DP, RATE_CACHE_DP};
use aqualedger_core::*;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::ledger::Ledger;
use crate::rates::select_latest;

fn latest<'a>(ledger: &'a Ledger, key: &RateKey) -> Option<&'a RateRecord> {
    select_latest(ledger.rates().history(key), NaiveDate::MAX)
}

fn rate(value: Option<Decimal>) -> Option<f64> {
    value.map(|v| to_report(v, RATE_CACHE_DP))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorRateCard {
    pub cost_basis: CostBasis,
    pub capacity: Option<f64>,
    /// Only set for per-load pricing.
    pub per_load: Option<f64>,
    pub per_kl: Option<f64>,
    pub per_litre: Option<f64>,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorRates {
    pub vendor_id: SourceId,
    pub vendor_name: String,
    /// Keyed by water-type label.
    pub rates: BTreeMap<String, VendorRateCard>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InternalRateCard {
    pub loading_location: String,
    pub per_load: f64,
    pub per_kl: Option<f64>,
    pub per_litre: Option<f64>,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRates {
    pub vehicle_id: VehicleId,
    pub vehicle_name: String,
    pub capacity: f64,
    pub rates: Vec<InternalRateCard>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRateCard {
    pub source_id: SourceId,
    pub source_name: String,
    pub cost_per_liter: Option<f64>,
    pub cost_per_kl: Option<f64>,
    pub effective_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateDetails {
    pub vendors: Vec<VendorRates>,
    pub internal_vehicles: Vec<VehicleRates>,
    pub pipelines: Vec<PipelineRateCard>,
}

pub fn rate_details(ledger: &Ledger) -> RateDetails {
    let vendors = ledger
        .sources()
        .filter(|s| s.active && s.kind == SourceKind::Vendor)
        .map(|vendor| {
            let rates = WaterType::ALL
                .iter()
                .filter_map(|&water_type| {
                    let key = RateKey::Vendor { source: vendor.id, water_type };
                    let r = latest(ledger, &key)?.as_vendor()?;
                    let card = VendorRateCard {
                        cost_basis: r.cost_basis,
                        capacity: r.vehicle_capacity.map(|c| to_report(c.value(), CURRENCY_DP)),
                        per_load: (r.cost_basis == CostBasis::PerLoad)
                            .then(|| to_report(r.rate_value, CURRENCY_DP)),
                        per_kl: rate(r.effective_cost_per_kl()),
                        per_litre: rate(r.effective_cost_per_liter()),
                        effective_date: r.effective_date,
                    };
                    Some((water_type.label().to_string(), card))
                })
                .collect();
            VendorRates { vendor_id: vendor.id, vendor_name: vendor.name.clone(), rates }
        })
        .collect();

    let internal_vehicles = ledger
        .vehicles()
        .map(|vehicle| {
            let rates = ledger
                .locations()
                .filter_map(|loc| {
                    let key = RateKey::Internal { vehicle: vehicle.id, loading_location: loc.id };
                    let r = latest(ledger, &key)?.as_internal()?;
                    Some(InternalRateCard {
                        loading_location: loc.name.clone(),
                        per_load: to_report(r.cost_per_load, CURRENCY_DP),
                        per_kl: rate(r.effective_cost_per_kl()),
                        per_litre: rate(r.effective_cost_per_liter()),
                        effective_date: r.effective_date,
                    })
                })
                .collect();
            VehicleRates {
                vehicle_id: vehicle.id,
                vehicle_name: vehicle.name.clone(),
                capacity: to_report(vehicle.capacity.value(), CURRENCY_DP),
                rates,
            }
        })
        .collect();

    let pipelines = ledger
        .sources()
        .filter(|s| s.active && s.kind == SourceKind::Pipeline)
        .map(|pipe| {
            let r = latest(ledger, &RateKey::Pipeline { source: pipe.id }).and_then(RateRecord::as_pipeline);
            PipelineRateCard {
                source_id: pipe.id,
                source_name: pipe.name.clone(),
                cost_per_liter: r.map(|r| to_report(r.cost_per_liter, RATE_CACHE_DP)),
                cost_per_kl: r.map(|r| to_report(r.cost_per_kl(), RATE_CACHE_DP)),
                effective_date: r.map(|r| r.effective_date),
            }
        })
        .collect();

    RateDetails { vendors, internal_vehicles, pipelines }
}
