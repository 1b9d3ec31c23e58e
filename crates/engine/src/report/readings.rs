//! Yield and consumption reports.

use std::collections::{BTreeMap, HashMap};

use aqualedger_core::money::{ratio_or_zero, to_report, CURRENCY_DP};
use aqualedger_core::units::LITERS_PER_KL;
use aqualedger_core::*;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::aggregate::{tally, ByKey, Measured, Tally, Tallies};
use super::{days_in_month, month_bounds, months_between, DateRange, Granularity};
use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::rates::RateStore;

// ---------------------------------------------------------------------------
// Daily location reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub date: String,
    pub total_kl: f64,
    /// Keyed by location name.
    pub breakdown: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub total_kl: f64,
    pub breakdown: BTreeMap<String, f64>,
}

/// Per-day volume with one column per active location. Totals include
/// records of inactive locations; the columns do not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyLocationReport {
    pub daily_data: Vec<DailyRow>,
    pub summary: DailySummary,
    pub location_names: Vec<String>,
}

fn kl_map(breakdown: &BTreeMap<String, Tally>, dp: u32) -> BTreeMap<String, f64> {
    breakdown.iter().map(|(k, t)| (k.clone(), to_report(t.kl(), dp))).collect()
}

fn daily_report(t: Tallies, location_names: Vec<String>, dp: u32) -> DailyLocationReport {
    DailyLocationReport {
        daily_data: t
            .buckets
            .iter()
            .map(|(date, b)| DailyRow {
                date: date.clone(),
                total_kl: to_report(b.total.kl(), dp),
                breakdown: kl_map(&b.breakdown, dp),
            })
            .collect(),
        summary: DailySummary {
            total_kl: to_report(t.overall.total.kl(), dp),
            breakdown: kl_map(&t.overall.breakdown, dp),
        },
        location_names,
    }
}

pub fn daily_yield(ledger: &Ledger, range: &DateRange, config: &EngineConfig) -> DailyLocationReport {
    let mut active: Vec<&YieldLocation> = ledger.yield_locations().filter(|l| l.active).collect();
    active.sort_by(|a, b| (a.sort_order, &a.name).cmp(&(b.sort_order, &b.name)));
    let names: HashMap<YieldLocationId, String> =
        active.iter().map(|l| (l.id, l.name.clone())).collect();
    let location_names: Vec<String> = active.iter().map(|l| l.name.clone()).collect();

    let by_location = ByKey::new(location_names.clone(), |e: &YieldEntry| names.get(&e.location).cloned());
    let t = tally(ledger.yields(), range, Granularity::Day, &by_location);
    daily_report(t, location_names, config.report.volume_decimals)
}

pub fn daily_normal_consumption(
    ledger: &Ledger,
    range: &DateRange,
    config: &EngineConfig,
) -> DailyLocationReport {
    let normal: HashMap<ConsumptionLocationId, &ConsumptionLocation> = ledger
        .consumption_locations()
        .filter(|l| l.consumption_type == ConsumptionType::Normal)
        .map(|l| (l.id, l))
        .collect();
    let mut active: Vec<&ConsumptionLocation> = normal.values().copied().filter(|l| l.active).collect();
    active.sort_by(|a, b| (a.sort_order, &a.name).cmp(&(b.sort_order, &b.name)));
    let location_names: Vec<String> = active.iter().map(|l| l.name.clone()).collect();

    let entries = ledger.consumptions().filter(|e| normal.contains_key(&e.location));
    let by_location = ByKey::new(location_names.clone(), |e: &ConsumptionEntry| {
        normal.get(&e.location).filter(|l| l.active).map(|l| l.name.clone())
    });
    let t = tally(entries, range, Granularity::Day, &by_location);
    daily_report(t, location_names, config.report.volume_decimals)
}

// ---------------------------------------------------------------------------
// Category monthly breakdown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMonth {
    pub name: String,
    pub normal_qty_kl: f64,
    pub drinking_qty_kl: f64,
    pub normal_cost: f64,
    pub drinking_cost: f64,
    pub total_cost: f64,
    pub has_student_count: bool,
    pub normal_student_count: u32,
    pub drinking_student_count: u32,
    /// Liters per head per day.
    pub normal_lsd: f64,
    pub drinking_lsd: f64,
    /// Cost per head per day.
    pub normal_csd: f64,
    pub drinking_csd: f64,
    pub total_lsd: f64,
    pub total_csd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryChart {
    pub normal_purchase_kl: f64,
    pub normal_purchase_amt: f64,
    pub normal_yield_kl: f64,
    pub normal_yield_amt: f64,
    pub normal_consumed_kl: f64,
    pub normal_consumed_amt: f64,
    pub drinking_purchase_kl: f64,
    pub drinking_purchase_amt: f64,
    pub drinking_consumed_kl: f64,
    pub drinking_consumed_amt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthBreakdown {
    pub month_key: String,
    pub month_name: String,
    pub categories: Vec<CategoryMonth>,
    pub summary_chart: SummaryChart,
}

#[derive(Debug, Default)]
struct Consumed {
    normal: Decimal,
    drinking: Decimal,
}

impl Consumed {
    fn add(&mut self, kind: ConsumptionType, liters: Decimal) {
        match kind {
            ConsumptionType::Normal => self.normal += liters,
            ConsumptionType::Drinking => self.drinking += liters,
        }
    }
}

/// Per-head-per-day ratio, 0 when nobody is counted.
fn per_head_day(value: Decimal, heads: u32, days: u32) -> Decimal {
    ratio_or_zero(value, Decimal::from(heads) * Decimal::from(days))
}

/// Months overlapping `[start, end]`, each costed at the general rate in
/// force on the month's last day.
pub fn category_monthly_breakdown(
    ledger: &Ledger,
    start: NaiveDate,
    end: NaiveDate,
    config: &EngineConfig,
) -> Result<Vec<MonthBreakdown>, LedgerError> {
    DateRange::new(Some(start), Some(end))?;
    let dp = config.report.volume_decimals;
    let kl = |liters: Decimal| to_report(liters / LITERS_PER_KL, dp);
    let money = |amount: Decimal| to_report(amount, CURRENCY_DP);

    let mut categories: Vec<&Category> = ledger.categories().collect();
    categories.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = Vec::new();
    for (year, month) in months_between(start, end) {
        let (first, last) = month_bounds(year, month)
            .ok_or_else(|| LedgerError::invalid(format!("no such month: {year}-{month:02}")))?;
        let days = days_in_month(year, month);
        let month_range = DateRange { start: Some(first), end: Some(last) };

        let general = ledger.rates().general_rate(last);
        let normal_rate = general.map_or(Decimal::ZERO, |r| r.normal_water_rate);
        let drinking_rate = general.map_or(Decimal::ZERO, |r| r.drinking_water_rate);

        let mut per_category: HashMap<CategoryId, Consumed> = HashMap::new();
        let mut campus = Consumed::default();
        for entry in ledger.consumptions().filter(|e| month_range.contains(e.date)) {
            let Ok(location) = ledger.consumption_location(entry.location) else {
                continue;
            };
            let liters = entry.liters();
            campus.add(location.consumption_type, liters);
            if let Some(cat) = location.category {
                per_category.entry(cat).or_default().add(location.consumption_type, liters);
            }
        }

        let rows = categories
            .iter()
            .map(|cat| {
                let used = per_category.remove(&cat.id).unwrap_or_default();
                let normal_cost = used.normal * normal_rate;
                let drinking_cost = used.drinking * drinking_rate;
                let normal_heads = cat.normal_head_count();
                let drinking_heads = cat.drinking_head_count(&config.headcount.alternate_keywords);
                let normal_lsd = per_head_day(used.normal, normal_heads, days);
                let drinking_lsd = per_head_day(used.drinking, drinking_heads, days);
                let normal_csd = per_head_day(normal_cost, normal_heads, days);
                let drinking_csd = per_head_day(drinking_cost, drinking_heads, days);
                CategoryMonth {
                    name: cat.name.clone(),
                    normal_qty_kl: kl(used.normal),
                    drinking_qty_kl: kl(used.drinking),
                    normal_cost: money(normal_cost),
                    drinking_cost: money(drinking_cost),
                    total_cost: money(normal_cost + drinking_cost),
                    has_student_count: cat.has_student_count,
                    normal_student_count: normal_heads,
                    drinking_student_count: drinking_heads,
                    normal_lsd: money(normal_lsd),
                    drinking_lsd: money(drinking_lsd),
                    normal_csd: money(normal_csd),
                    drinking_csd: money(drinking_csd),
                    total_lsd: money(normal_lsd + drinking_lsd),
                    total_csd: money(normal_csd + drinking_csd),
                }
            })
            .collect();

        let mut normal_purchase = Tally::default();
        let mut drinking_purchase = Tally::default();
        for m in ledger.movements().filter(|m| month_range.contains(m.entry_date)) {
            if m.source.is_pipeline() || m.water_type == WaterType::Normal {
                normal_purchase.add(m);
            } else {
                drinking_purchase.add(m);
            }
        }
        let mut yielded = Tally::default();
        ledger
            .yields()
            .filter(|y| month_range.contains(y.date))
            .for_each(|y| yielded.add(y));

        out.push(MonthBreakdown {
            month_key: first.format("%Y-%m").to_string(),
            month_name: first.format("%B %Y").to_string(),
            categories: rows,
            summary_chart: SummaryChart {
                normal_purchase_kl: kl(normal_purchase.liters),
                normal_purchase_amt: money(normal_purchase.cost),
                normal_yield_kl: kl(yielded.liters),
                normal_yield_amt: 0.0,
                normal_consumed_kl: kl(campus.normal),
                normal_consumed_amt: money(campus.normal * normal_rate),
                drinking_purchase_kl: kl(drinking_purchase.liters),
                drinking_purchase_amt: money(drinking_purchase.cost),
                drinking_consumed_kl: kl(campus.drinking),
                drinking_consumed_amt: money(campus.drinking * drinking_rate),
            },
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ConsumptionDraft, YieldDraft};
    use crate::rates::GeneralRateDraft;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn daily_yield_columns_follow_sort_order() {
        let mut ledger = Ledger::new();
        let well = ledger.add_yield_location("Well 2", YieldType::Well, false, 2).unwrap().id;
        let bore = ledger.add_yield_location("Borewell 1", YieldType::Borewell, false, 1).unwrap().id;
        for (loc, day, reading) in [
            (well, "2024-03-01", 10),
            (well, "2024-03-02", 13),
            (bore, "2024-03-01", 20),
            (bore, "2024-03-02", 25),
        ] {
            ledger
                .record_yield(YieldDraft {
                    date: date(day),
                    location: loc,
                    current_reading: reading,
                    yield_liters: None,
                    comment: String::new(),
                })
                .unwrap();
        }
        let report = daily_yield(&ledger, &DateRange::all(), &EngineConfig::default());
        assert_eq!(report.location_names, vec!["Borewell 1", "Well 2"]);
        assert_eq!(report.daily_data.len(), 2);
        let day2 = &report.daily_data[1];
        assert_eq!(day2.breakdown["Well 2"], 3.0);
        assert_eq!(day2.breakdown["Borewell 1"], 5.0);
        assert_eq!(day2.total_kl, 8.0);
        assert_eq!(report.summary.total_kl, 38.0);
    }

    fn campus_with_consumption() -> Ledger {
        let mut ledger = Ledger::new();
        let mut school = Category::new(CategoryId(0), "Boys School");
        school.student_count = 500;
        school.second_count = 520;
        let school = ledger.add_category(school).unwrap().id;
        let normal_loc = ledger
            .add_consumption_location("School Block", ConsumptionType::Normal, Some(school), 0)
            .unwrap()
            .id;
        let drinking_loc = ledger
            .add_consumption_location("School RO", ConsumptionType::Drinking, Some(school), 0)
            .unwrap()
            .id;
        ledger
            .add_general_rate(GeneralRateDraft {
                entry_date: date("2024-01-01"),
                effective_date: date("2024-01-01"),
                normal_water_rate: d("0.1"),
                drinking_water_rate: d("0.5"),
            })
            .unwrap();
        for (loc, day, reading) in [
            (normal_loc, "2024-04-01", 0),
            (normal_loc, "2024-04-30", 1_500),
            (drinking_loc, "2024-04-01", 0),
            (drinking_loc, "2024-04-30", 312),
        ] {
            ledger
                .record_consumption(ConsumptionDraft {
                    date: date(day),
                    location: loc,
                    current_reading: reading,
                    comment: String::new(),
                })
                .unwrap();
        }
        ledger
    }

    #[test]
    fn per_capita_uses_alternate_headcount_for_drinking() {
        let ledger = campus_with_consumption();
        let months = category_monthly_breakdown(
            &ledger,
            date("2024-04-01"),
            date("2024-04-30"),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(months.len(), 1);
        let cat = &months[0].categories[0];
        assert_eq!(cat.normal_student_count, 500);
        assert_eq!(cat.drinking_student_count, 520);
        // 1,500,000 L / (500 × 30)
        assert_eq!(cat.normal_lsd, 100.0);
        // 312,000 L / (520 × 30)
        assert_eq!(cat.drinking_lsd, 20.0);
        assert_eq!(cat.normal_cost, 150_000.0);
        assert_eq!(cat.drinking_cost, 156_000.0);
        assert_eq!(cat.normal_csd, 10.0);
        assert_eq!(months[0].month_name, "April 2024");
        assert_eq!(months[0].summary_chart.normal_consumed_kl, 1500.0);
    }

    #[test]
    fn zero_headcount_gives_zero_metrics() {
        let mut ledger = campus_with_consumption();
        ledger.add_category(Category::new(CategoryId(0), "Admin")).unwrap();
        let months = category_monthly_breakdown(
            &ledger,
            date("2024-04-15"),
            date("2024-05-10"),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(months.len(), 2);
        let admin = &months[0].categories[0];
        assert_eq!(admin.name, "Admin");
        assert_eq!(admin.normal_lsd, 0.0);
        assert_eq!(months[1].categories[1].normal_qty_kl, 0.0);
    }

    #[test]
    fn reversed_range_is_rejected() {
        let ledger = Ledger::new();
        assert!(category_monthly_breakdown(
            &ledger,
            date("2024-05-01"),
            date("2024-04-01"),
            &EngineConfig::default()
        )
        .is_err());
    }
}
