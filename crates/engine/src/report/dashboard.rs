//! Month dashboard and the multi-month normal-water matrix.

use std::collections::BTreeMap;

use aqualedger_core::money::{to_report, CURRENCY_DP};
use aqualedger_core::units::LITERS_PER_KL;
use aqualedger_core::*;
use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use super::aggregate::{Categorize, Measured, Tally, TallyBucket};
use super::{days_in_month, month_bounds, months_between, DateRange};
use crate::config::{DashboardConfig, EngineConfig};
use crate::error::LedgerError;
use crate::ledger::Ledger;

const UNKNOWN: &str = "Unknown";
const RECENT_LIMIT: usize = 5;

// ---------------------------------------------------------------------------
// Load sizes
// ---------------------------------------------------------------------------

pub const LARGE_LOAD: &str = "12 KL";
pub const SMALL_LOAD: &str = "6 KL";

/// Buckets an entry by its average liters per load. Entries under the small
/// threshold fall in neither bucket.
#[derive(Debug, Clone, Copy)]
pub struct LoadSizes {
    pub large_min: Decimal,
    pub small_min: Decimal,
}

impl LoadSizes {
    pub fn from_config(config: &DashboardConfig) -> Self {
        LoadSizes {
            large_min: Decimal::from(config.large_load_min_liters),
            small_min: Decimal::from(config.small_load_min_liters),
        }
    }

    pub fn classify(&self, entry: &MovementEntry) -> Option<&'static str> {
        let loads = Decimal::from(entry.load_count.max(1));
        let avg = entry.quantity.value() / loads;
        if avg >= self.large_min {
            Some(LARGE_LOAD)
        } else if avg >= self.small_min {
            Some(SMALL_LOAD)
        } else {
            None
        }
    }
}

impl Categorize<MovementEntry> for LoadSizes {
    fn labels(&self) -> Vec<String> {
        vec![LARGE_LOAD.to_string(), SMALL_LOAD.to_string()]
    }

    fn category(&self, item: &MovementEntry) -> Option<String> {
        self.classify(item).map(str::to_string)
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryVolume {
    #[serde(rename = "type")]
    pub label: String,
    pub volume_kl: f64,
    pub liters: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSizeRow {
    pub location: String,
    pub location_id: Option<LocationId>,
    pub count_12kl: u64,
    pub count_6kl: u64,
    pub total_liters: f64,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatrixCell {
    pub volume: f64,
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixRow {
    pub location: String,
    pub daily: BTreeMap<u32, MatrixCell>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyMatrix {
    pub days: Vec<u32>,
    pub locations: Vec<MatrixRow>,
    pub daily_totals: BTreeMap<u32, f64>,
    pub grand_total: f64,
    pub month_name: String,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentActivity {
    pub id: EntryId,
    pub date: NaiveDate,
    pub source: String,
    pub vehicle: String,
    pub volume_kl: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub month_key: String,
    pub total_cost: f64,
    pub total_volume_kl: f64,
    pub total_volume_liters: f64,
    pub breakdown: Vec<CategoryVolume>,
    pub normal_water_breakdown: Vec<LoadSizeRow>,
    /// One load-size table per configured loading point.
    pub loading_point_breakdowns: BTreeMap<String, Vec<LoadSizeRow>>,
    pub monthly_matrix: MonthlyMatrix,
    pub recent_activity: Vec<RecentActivity>,
}

fn is_normal_purchase(m: &MovementEntry) -> bool {
    !m.source.is_pipeline() && m.water_type == WaterType::Normal
}

fn name_contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn unloading_name(ledger: &Ledger, m: &MovementEntry) -> String {
    m.unloading_location
        .and_then(|id| ledger.location(id).ok())
        .map_or_else(|| UNKNOWN.to_string(), |l| l.name.clone())
}

fn loading_name(ledger: &Ledger, m: &MovementEntry) -> Option<String> {
    m.loading_location
        .and_then(|id| ledger.location(id).ok())
        .map(|l| l.name.clone())
}

fn volume(liters: Decimal, dp: u32) -> f64 {
    to_report(liters / LITERS_PER_KL, dp)
}

fn load_size_rows<'a>(
    ledger: &Ledger,
    entries: impl Iterator<Item = &'a MovementEntry>,
    sizes: &LoadSizes,
) -> Vec<LoadSizeRow> {
    let mut by_location: BTreeMap<String, (Option<LocationId>, TallyBucket)> = BTreeMap::new();
    for m in entries {
        let (_, bucket) = by_location
            .entry(unloading_name(ledger, m))
            .or_insert_with(|| (m.unloading_location, TallyBucket::default()));
        bucket.total.add(m);
        if let Some(size) = sizes.category(m) {
            bucket.breakdown.entry(size).or_default().add(m);
        }
    }
    let loads = |b: &TallyBucket, label: &str| b.breakdown.get(label).map_or(0, |t| t.loads);
    let mut rows: Vec<(Decimal, LoadSizeRow)> = by_location
        .into_iter()
        .map(|(location, (location_id, bucket))| {
            let row = LoadSizeRow {
                location,
                location_id,
                count_12kl: loads(&bucket, LARGE_LOAD),
                count_6kl: loads(&bucket, SMALL_LOAD),
                total_liters: to_report(bucket.total.liters, CURRENCY_DP),
                total_amount: to_report(bucket.total.cost, CURRENCY_DP),
            };
            (bucket.total.cost, row)
        })
        .collect();
    rows.sort_by(|a, b| b.0.cmp(&a.0));
    rows.into_iter().map(|(_, row)| row).collect()
}

fn monthly_matrix<'a>(
    entries: impl Iterator<Item = &'a MovementEntry>,
    ledger: &Ledger,
    first: NaiveDate,
    dp: u32,
) -> MonthlyMatrix {
    let days: Vec<u32> = (1..=days_in_month(first.year(), first.month())).collect();
    let mut rows: BTreeMap<String, (BTreeMap<u32, (Decimal, Vec<String>)>, Decimal)> = BTreeMap::new();
    let mut daily_totals: BTreeMap<u32, Decimal> = days.iter().map(|&d| (d, Decimal::ZERO)).collect();
    let mut grand_total = Decimal::ZERO;

    for m in entries {
        let day = m.entry_date.day();
        let liters = m.liters();
        let (cells, total) = rows.entry(unloading_name(ledger, m)).or_insert_with(|| {
            (days.iter().map(|&d| (d, (Decimal::ZERO, Vec::new()))).collect(), Decimal::ZERO)
        });
        if let Some((vol, comments)) = cells.get_mut(&day) {
            *vol += liters;
            if !m.comments.is_empty() {
                comments.push(m.comments.clone());
            }
        }
        *total += liters;
        *daily_totals.entry(day).or_default() += liters;
        grand_total += liters;
    }

    MonthlyMatrix {
        locations: rows
            .into_iter()
            .map(|(location, (cells, total))| MatrixRow {
                location,
                daily: cells
                    .into_iter()
                    .map(|(d, (liters, comments))| (d, MatrixCell { volume: volume(liters, dp), comments }))
                    .collect(),
                total: volume(total, dp),
            })
            .collect(),
        daily_totals: daily_totals.into_iter().map(|(d, l)| (d, volume(l, dp))).collect(),
        grand_total: volume(grand_total, dp),
        month_name: first.format("%B").to_string(),
        year: first.year(),
        days,
    }
}

fn recent_activity(ledger: &Ledger, dp: u32) -> Vec<RecentActivity> {
    let mut all: Vec<&MovementEntry> = ledger.movements().collect();
    all.sort_by(|a, b| (b.entry_date, b.id).cmp(&(a.entry_date, a.id)));
    all.into_iter()
        .take(RECENT_LIMIT)
        .map(|m| {
            let source = match m.source {
                SourceRef::Internal { .. } => loading_name(ledger, m),
                _ => m.source.source_id().and_then(|id| ledger.source(id).ok()).map(|s| s.name.clone()),
            };
            let vehicle = m.source.vehicle_id().and_then(|id| ledger.vehicle(id).ok());
            RecentActivity {
                id: m.id,
                date: m.entry_date,
                source: source.unwrap_or_else(|| "-".to_string()),
                vehicle: vehicle.map_or_else(|| "-".to_string(), |v| v.name.clone()),
                volume_kl: volume(m.liters(), dp),
                cost: to_report(m.total_cost, CURRENCY_DP),
            }
        })
        .collect()
}

/// Dashboard for the calendar month containing `day`.
pub fn dashboard(ledger: &Ledger, day: NaiveDate, config: &EngineConfig) -> Result<Dashboard, LedgerError> {
    let (first, last) = month_bounds(day.year(), day.month())
        .ok_or_else(|| LedgerError::invalid(format!("no month for {day}")))?;
    let month = DateRange { start: Some(first), end: Some(last) };
    let dp = config.report.volume_decimals;
    let dash = &config.dashboard;
    let sizes = LoadSizes::from_config(dash);
    let entries: Vec<&MovementEntry> = ledger.movements().filter(|m| month.contains(m.entry_date)).collect();

    let mut total = Tally::default();
    let mut corporation = Tally::default();
    let mut drinking = Tally::default();
    let mut normal = Tally::default();
    for &m in &entries {
        total.add(m);
        if m.source.is_pipeline() {
            corporation.add(m);
        } else if m.water_type == WaterType::Drinking {
            drinking.add(m);
        } else if loading_name(ledger, m).is_some_and(|n| name_contains(&n, &dash.normal_water_loading_point)) {
            normal.add(m);
        }
    }
    let category = |label: &str, t: &Tally| CategoryVolume {
        label: label.to_string(),
        volume_kl: volume(t.liters, dp),
        liters: to_report(t.liters, CURRENCY_DP),
        cost: to_report(t.cost, CURRENCY_DP),
    };

    let normal_entries = || entries.iter().copied().filter(|m| is_normal_purchase(m));
    let loading_point_breakdowns = dash
        .loading_point_breakdowns
        .iter()
        .map(|point| {
            let matching = normal_entries()
                .filter(|m| loading_name(ledger, m).is_some_and(|n| name_contains(&n, point)));
            (point.clone(), load_size_rows(ledger, matching, &sizes))
        })
        .collect();

    Ok(Dashboard {
        month_key: first.format("%Y-%m").to_string(),
        total_cost: to_report(total.cost, CURRENCY_DP),
        total_volume_kl: volume(total.liters, dp),
        total_volume_liters: to_report(total.liters, CURRENCY_DP),
        breakdown: vec![
            category("Corporation", &corporation),
            category(WaterType::Drinking.label(), &drinking),
            category("Normal Water", &normal),
        ],
        normal_water_breakdown: load_size_rows(ledger, normal_entries(), &sizes),
        loading_point_breakdowns,
        monthly_matrix: monthly_matrix(normal_entries(), ledger, first, dp),
        recent_activity: recent_activity(ledger, dp),
    })
}

// ---------------------------------------------------------------------------
// Multi-month matrix
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VolumeCost {
    pub volume: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthLabel {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiMonthRow {
    pub location: String,
    pub monthly: BTreeMap<String, VolumeCost>,
    pub total: VolumeCost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiMonth {
    pub months: Vec<MonthLabel>,
    pub locations: Vec<MultiMonthRow>,
    pub monthly_totals: BTreeMap<String, VolumeCost>,
    pub grand_total: VolumeCost,
}

fn volume_cost(t: &Tally, dp: u32) -> VolumeCost {
    VolumeCost { volume: volume(t.liters, dp), cost: to_report(t.cost, CURRENCY_DP) }
}

/// Normal-water purchases per unloading point for the `months` calendar
/// months ending with the one containing `day`, cut off at `day`.
pub fn multi_month(
    ledger: &Ledger,
    day: NaiveDate,
    months: u32,
    config: &EngineConfig,
) -> Result<MultiMonth, LedgerError> {
    if months == 0 {
        return Err(LedgerError::invalid("months must be at least 1"));
    }
    let start = day
        .with_day(1)
        .and_then(|d| d.checked_sub_months(Months::new(months - 1)))
        .ok_or_else(|| LedgerError::invalid(format!("month range out of bounds: {months}")))?;
    let range = DateRange::new(Some(start), Some(day))?;
    let dp = config.report.volume_decimals;

    let labels: Vec<MonthLabel> = months_between(start, day)
        .into_iter()
        .filter_map(|(y, m)| NaiveDate::from_ymd_opt(y, m, 1))
        .map(|first| MonthLabel {
            key: first.format("%Y-%m").to_string(),
            label: first.format("%b %Y").to_string(),
        })
        .collect();
    let empty = || -> BTreeMap<String, Tally> {
        labels.iter().map(|l| (l.key.clone(), Tally::default())).collect()
    };

    let mut rows: BTreeMap<String, (BTreeMap<String, Tally>, Tally)> = BTreeMap::new();
    let mut monthly_totals = empty();
    let mut grand = Tally::default();
    for m in ledger
        .movements()
        .filter(|m| range.contains(m.entry_date) && is_normal_purchase(m))
    {
        let key = m.entry_date.format("%Y-%m").to_string();
        let (cells, total) = rows.entry(unloading_name(ledger, m)).or_insert_with(|| (empty(), Tally::default()));
        cells.entry(key.clone()).or_default().add(m);
        total.add(m);
        monthly_totals.entry(key).or_default().add(m);
        grand.add(m);
    }

    Ok(MultiMonth {
        locations: rows
            .into_iter()
            .map(|(location, (cells, total))| MultiMonthRow {
                location,
                monthly: cells.iter().map(|(k, t)| (k.clone(), volume_cost(t, dp))).collect(),
                total: volume_cost(&total, dp),
            })
            .collect(),
        monthly_totals: monthly_totals.iter().map(|(k, t)| (k.clone(), volume_cost(t, dp))).collect(),
        grand_total: volume_cost(&grand, dp),
        months: labels,
    })
}
