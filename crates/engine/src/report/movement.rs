//! Movement reports: summaries, per-vendor / per-vehicle / per-site views
//! and the cost comparison.

use std::collections::BTreeMap;

use aqualedger_core::money::{ratio_or_zero, round_dp, to_report, CURRENCY_DP, RATE_CACHE_DP};
use aqualedger_core::*;
use chrono::Datelike;
use rust_decimal::Decimal;
use serde::Serialize;

use super::aggregate::{aggregate, tally, ByKey, Measured, Tally, Totals, WaterCategories};
use super::{Aggregation, BucketSummary, DateRange, Granularity};
use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::ledger::Ledger;

const UNKNOWN: &str = "Unknown";

fn in_range<'a>(ledger: &'a Ledger, range: &'a DateRange) -> impl Iterator<Item = &'a MovementEntry> + 'a {
    ledger.movements().filter(move |m| range.contains(m.entry_date))
}

fn location_name(ledger: &Ledger, id: Option<LocationId>) -> String {
    id.and_then(|id| ledger.location(id).ok())
        .map_or_else(|| UNKNOWN.to_string(), |l| l.name.clone())
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Day / month / year buckets with the water-category breakdown and an
/// overall summary.
pub fn summary(
    ledger: &Ledger,
    range: &DateRange,
    granularity: Granularity,
    config: &EngineConfig,
) -> Aggregation {
    aggregate(ledger.movements(), range, granularity, &WaterCategories, config.report.volume_decimals)
}

/// The last `trend_years` years up to the latest recorded movement.
pub fn default_trend_range(ledger: &Ledger, config: &EngineConfig) -> Result<DateRange, LedgerError> {
    let Some(latest) = ledger.movements().map(|m| m.entry_date.year()).max() else {
        return Ok(DateRange::all());
    };
    let span = i32::try_from(config.report.trend_years).unwrap_or(i32::MAX);
    DateRange::years(Some(latest.saturating_sub(span - 1)), Some(latest))
}

/// Totals per water category.
pub fn water_type_consumption(
    ledger: &Ledger,
    range: &DateRange,
    config: &EngineConfig,
) -> BTreeMap<String, Totals> {
    summary(ledger, range, Granularity::Year, config).summary.breakdown
}

// ---------------------------------------------------------------------------
// Vendors and vehicles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorUsageRow {
    pub vendor_id: SourceId,
    pub vendor_name: String,
    #[serde(flatten)]
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorUsage {
    pub vendors: Vec<VendorUsageRow>,
    pub summary: BucketSummary,
}

pub fn vendor_usage(ledger: &Ledger, range: &DateRange, config: &EngineConfig) -> VendorUsage {
    let dp = config.report.volume_decimals;
    let vendors = ledger
        .sources()
        .filter(|s| s.kind == SourceKind::Vendor)
        .map(|vendor| {
            let mut t = Tally::default();
            in_range(ledger, range)
                .filter(|m| m.source == SourceRef::Vendor { source: vendor.id })
                .for_each(|m| t.add(m));
            VendorUsageRow { vendor_id: vendor.id, vendor_name: vendor.name.clone(), totals: t.totals(dp) }
        })
        .collect();
    VendorUsage { vendors, summary: summary(ledger, range, Granularity::Year, config).summary }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleUtilizationRow {
    pub vehicle_id: VehicleId,
    pub vehicle_name: String,
    #[serde(flatten)]
    pub totals: Totals,
}

/// Internal hauls per vehicle.
pub fn vehicle_utilization(
    ledger: &Ledger,
    range: &DateRange,
    config: &EngineConfig,
) -> Vec<VehicleUtilizationRow> {
    ledger
        .vehicles()
        .map(|vehicle| {
            let mut t = Tally::default();
            in_range(ledger, range)
                .filter(|m| m.source.vehicle_id() == Some(vehicle.id))
                .for_each(|m| t.add(m));
            VehicleUtilizationRow {
                vehicle_id: vehicle.id,
                vehicle_name: vehicle.name.clone(),
                totals: t.totals(config.report.volume_decimals),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityRow {
    pub vehicle_id: VehicleId,
    pub vehicle_name: String,
    pub capacity_liters: f64,
    pub avg_load_liters: f64,
    pub utilization_percentage: f64,
    pub trips: usize,
}

/// Average entry quantity against rated capacity, per internal vehicle.
pub fn capacity_utilization(ledger: &Ledger, range: &DateRange) -> Vec<CapacityRow> {
    ledger
        .vehicles()
        .map(|vehicle| {
            let mut t = Tally::default();
            in_range(ledger, range)
                .filter(|m| m.source.vehicle_id() == Some(vehicle.id))
                .for_each(|m| t.add(m));
            let avg = ratio_or_zero(t.liters, Decimal::from(t.entries));
            let capacity = vehicle.capacity.value();
            let utilization = if capacity > Decimal::ZERO {
                avg / capacity * Decimal::ONE_HUNDRED
            } else {
                Decimal::ZERO
            };
            CapacityRow {
                vehicle_id: vehicle.id,
                vehicle_name: vehicle.name.clone(),
                capacity_liters: to_report(capacity, CURRENCY_DP),
                avg_load_liters: to_report(avg, CURRENCY_DP),
                utilization_percentage: to_report(utilization, CURRENCY_DP),
                trips: t.entries,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cost comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCost {
    pub total_kl: f64,
    pub total_cost: f64,
    pub cost_per_kl: f64,
    pub cost_per_liter: f64,
}

impl SourceCost {
    fn from_tally(t: &Tally, volume_dp: u32) -> Self {
        let per_kl = round_dp(ratio_or_zero(t.cost, t.kl()), CURRENCY_DP);
        let per_liter = round_dp(per_kl / aqualedger_core::units::LITERS_PER_KL, RATE_CACHE_DP);
        SourceCost {
            total_kl: to_report(t.kl(), volume_dp),
            total_cost: to_report(t.cost, CURRENCY_DP),
            cost_per_kl: to_report(per_kl, CURRENCY_DP),
            cost_per_liter: to_report(per_liter, RATE_CACHE_DP),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostComparison {
    pub vendor: SourceCost,
    pub internal_vehicles: SourceCost,
    pub pipeline: SourceCost,
}

pub fn cost_comparison(ledger: &Ledger, range: &DateRange, config: &EngineConfig) -> CostComparison {
    let by_type = ByKey::new(
        vec!["vendor".to_string(), "internal".to_string(), "pipeline".to_string()],
        |m: &MovementEntry| Some(m.source.type_label().to_string()),
    );
    let t = tally(ledger.movements(), range, Granularity::Year, &by_type);
    let dp = config.report.volume_decimals;
    let get = |k: &str| SourceCost::from_tally(t.overall.breakdown.get(k).unwrap_or(&Tally::default()), dp);
    CostComparison { vendor: get("vendor"), internal_vehicles: get("internal"), pipeline: get("pipeline") }
}

// ---------------------------------------------------------------------------
// Sites
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteRow {
    pub location_id: LocationId,
    pub location_name: String,
    pub location_type: String,
    #[serde(flatten)]
    pub totals: Totals,
}

/// Per unloading point, loading points excluded, largest volume first.
pub fn site_consumption(ledger: &Ledger, range: &DateRange, config: &EngineConfig) -> Vec<SiteRow> {
    let mut rows: Vec<(Decimal, SiteRow)> = ledger
        .locations()
        .filter(|l| !l.is_loading_point())
        .map(|loc| {
            let mut t = Tally::default();
            in_range(ledger, range)
                .filter(|m| m.unloading_location == Some(loc.id))
                .for_each(|m| t.add(m));
            let row = SiteRow {
                location_id: loc.id,
                location_name: loc.name.clone(),
                location_type: loc.location_type.clone(),
                totals: t.totals(config.report.volume_decimals),
            };
            (t.liters, row)
        })
        .collect();
    rows.sort_by(|a, b| b.0.cmp(&a.0));
    rows.into_iter().map(|(_, row)| row).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteDetail {
    pub location: Location,
    pub totals: Totals,
    pub by_water_type: BTreeMap<String, Totals>,
    pub daily_trend: BTreeMap<String, BucketSummary>,
}

pub fn site_detail(
    ledger: &Ledger,
    location: LocationId,
    range: &DateRange,
    config: &EngineConfig,
) -> Result<SiteDetail, LedgerError> {
    let loc = ledger.location(location)?.clone();
    let entries: Vec<&MovementEntry> =
        ledger.movements().filter(|m| m.unloading_location == Some(location)).collect();
    let daily = aggregate(
        entries.iter().copied(),
        range,
        Granularity::Day,
        &WaterCategories,
        config.report.volume_decimals,
    );
    let s = &daily.summary;
    Ok(SiteDetail {
        location: loc,
        totals: Totals { loads: s.loads, entries: s.entries, total_kl: s.total_kl, total_cost: s.total_cost },
        by_water_type: s.breakdown.clone(),
        daily_trend: daily.buckets,
    })
}

// ---------------------------------------------------------------------------
// Vendor detail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseRow {
    pub date: chrono::NaiveDate,
    pub location_name: String,
    pub water_type: WaterType,
    #[serde(flatten)]
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorDetail {
    pub vendor: Source,
    pub totals: Totals,
    pub purchase_history: Vec<PurchaseRow>,
}

/// Totals and date / unloading point / water type history of one vendor.
pub fn vendor_detail(
    ledger: &Ledger,
    vendor: SourceId,
    range: &DateRange,
    config: &EngineConfig,
) -> Result<VendorDetail, LedgerError> {
    let source = ledger.source_of_kind(vendor, SourceKind::Vendor)?.clone();
    let dp = config.report.volume_decimals;
    let mut total = Tally::default();
    let mut groups: BTreeMap<(chrono::NaiveDate, String, WaterType), Tally> = BTreeMap::new();
    for m in in_range(ledger, range).filter(|m| m.source == SourceRef::Vendor { source: vendor }) {
        total.add(m);
        groups
            .entry((m.date(), location_name(ledger, m.unloading_location), m.water_type))
            .or_default()
            .add(m);
    }
    Ok(VendorDetail {
        vendor: source,
        totals: total.totals(dp),
        purchase_history: groups
            .into_iter()
            .map(|((date, location_name, water_type), t)| PurchaseRow {
                date,
                location_name,
                water_type,
                totals: t.totals(dp),
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{EnteredQuantity, MovementDraft};
    use crate::rates::{InternalRateDraft, PipelineRateDraft, VendorRateDraft};
    use chrono::NaiveDate;
    use std::str::FromStr;

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
        truck: VehicleId,
        muthu: LocationId,
        hostel: LocationId,
        kitchen: LocationId,
    }

    fn campus() -> Campus {
        let mut ledger = Ledger::new();
        let vendor = ledger.add_source("Balaji Tankers", SourceKind::Vendor).unwrap().id;
        let pipeline = ledger.add_source("Corporation", SourceKind::Pipeline).unwrap().id;
        let truck = ledger.add_vehicle("Tanker 1", Liters(d("6000"))).unwrap().id;
        let muthu = ledger.add_location("Muthu Nagar", "Loading", 0).unwrap().id;
        let hostel = ledger.add_location("Hostel", "Unloading", 1).unwrap().id;
        let kitchen = ledger.add_location("Kitchen", "Unloading", 2).unwrap().id;
        ledger
            .add_vendor_rate(VendorRateDraft {
                source: vendor,
                water_type: WaterType::Normal,
                cost_basis: CostBasis::PerLoad,
                rate_value: d("1200"),
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
        ledger
            .add_internal_rate(InternalRateDraft {
                vehicle: truck,
                loading_location: muthu,
                cost_per_load: d("300"),
                effective_date: date("2024-01-01"),
            })
            .unwrap();
        Campus { ledger, vendor, pipeline, truck, muthu, hostel, kitchen }
    }

    fn record(c: &mut Campus, day: &str, source: SourceRef, water: WaterType, loads: u32, to: LocationId) {
        let mut draft = MovementDraft::new(date(day), source);
        draft.water_type = water;
        draft.load_count = loads;
        draft.unloading_location = Some(to);
        if source.is_pipeline() {
            draft.quantity = Some(EnteredQuantity::Kiloliters(Kiloliters(d("5"))));
        }
        c.ledger.record_movement(draft).unwrap();
    }

    fn populated() -> Campus {
        let mut c = campus();
        let vendor = SourceRef::Vendor { source: c.vendor };
        let pipe = SourceRef::Pipeline { source: c.pipeline };
        let haul = SourceRef::Internal { vehicle: c.truck, loading_location: c.muthu };
        let (hostel, kitchen) = (c.hostel, c.kitchen);
        record(&mut c, "2024-01-03", vendor, WaterType::Normal, 2, hostel);
        record(&mut c, "2024-01-04", pipe, WaterType::Drinking, 1, kitchen);
        record(&mut c, "2024-01-05", haul, WaterType::Normal, 3, hostel);
        record(&mut c, "2024-02-01", vendor, WaterType::Normal, 1, kitchen);
        c
    }

    #[test]
    fn monthly_summary_buckets() {
        let c = populated();
        let agg = summary(&c.ledger, &DateRange::all(), Granularity::Month, &EngineConfig::default());
        let jan = &agg.buckets["2024-01"];
        // 24 KL vendor + 5 KL pipeline + 18 KL internal
        assert_eq!(jan.total_kl, 47.0);
        assert_eq!(jan.loads, 6);
        assert_eq!(jan.breakdown["Corporation Water"].total_kl, 5.0);
        assert_eq!(jan.breakdown["Normal Water (Salt)"].total_kl, 42.0);
        assert_eq!(jan.breakdown["Drinking Water"].total_kl, 0.0);
        assert_eq!(agg.summary.total_cost, 2400.0 + 250.0 + 900.0 + 1200.0);
    }

    #[test]
    fn vendor_usage_counts_entries() {
        let c = populated();
        let usage = vendor_usage(&c.ledger, &DateRange::all(), &EngineConfig::default());
        assert_eq!(usage.vendors.len(), 1);
        assert_eq!(usage.vendors[0].totals.entries, 2);
        assert_eq!(usage.vendors[0].totals.loads, 3);
        assert_eq!(usage.vendors[0].totals.total_kl, 36.0);
    }

    #[test]
    fn cost_comparison_per_kl() {
        let c = populated();
        let cmp = cost_comparison(&c.ledger, &DateRange::all(), &EngineConfig::default());
        assert_eq!(cmp.vendor.cost_per_kl, 100.0);
        assert_eq!(cmp.vendor.cost_per_liter, 0.1);
        assert_eq!(cmp.pipeline.cost_per_kl, 50.0);
        assert_eq!(cmp.internal_vehicles.cost_per_kl, 50.0);
    }

    #[test]
    fn sites_exclude_loading_points_and_sort_by_volume() {
        let c = populated();
        let rows = site_consumption(&c.ledger, &DateRange::all(), &EngineConfig::default());
        let names: Vec<_> = rows.iter().map(|r| r.location_name.as_str()).collect();
        assert_eq!(names, vec!["Hostel", "Kitchen"]);
        assert_eq!(rows[0].totals.total_kl, 42.0);
    }

    #[test]
    fn capacity_utilization_average() {
        let c = populated();
        let rows = capacity_utilization(&c.ledger, &DateRange::all());
        assert_eq!(rows[0].trips, 1);
        assert_eq!(rows[0].avg_load_liters, 18_000.0);
        assert_eq!(rows[0].utilization_percentage, 300.0);
    }

    #[test]
    fn site_detail_daily_trend() {
        let c = populated();
        let detail = site_detail(&c.ledger, c.kitchen, &DateRange::all(), &EngineConfig::default()).unwrap();
        assert_eq!(detail.totals.entries, 2);
        assert_eq!(detail.daily_trend.len(), 2);
        assert_eq!(detail.by_water_type["Corporation Water"].total_kl, 5.0);
        assert!(site_detail(&c.ledger, LocationId(99), &DateRange::all(), &EngineConfig::default()).is_err());
    }

    #[test]
    fn vendor_detail_rejects_pipeline() {
        let c = populated();
        let detail = vendor_detail(&c.ledger, c.vendor, &DateRange::all(), &EngineConfig::default()).unwrap();
        assert_eq!(detail.purchase_history.len(), 2);
        assert_eq!(detail.purchase_history[0].location_name, "Hostel");
        assert!(matches!(
            vendor_detail(&c.ledger, c.pipeline, &DateRange::all(), &EngineConfig::default()),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn trend_range_spans_configured_years() {
        let c = populated();
        let range = default_trend_range(&c.ledger, &EngineConfig::default()).unwrap();
        assert_eq!(range.start, Some(date("2020-01-01")));
        assert_eq!(range.end, Some(date("2024-12-31")));
    }
}
