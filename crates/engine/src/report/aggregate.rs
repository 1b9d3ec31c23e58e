//! One aggregation engine for every report: filter by date range, bucket by
//! granularity, split each bucket by a categorization rule, and keep a grand
//! total under the same rule.

use std::collections::BTreeMap;

use aqualedger_core::money::{to_report, CURRENCY_DP};
use aqualedger_core::units::LITERS_PER_KL;
use aqualedger_core::*;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::{DateRange, Granularity};

/// Label for pipeline-supplied water, whatever the row's water type says.
pub const CORPORATION_WATER: &str = "Corporation Water";

// ---------------------------------------------------------------------------
// Measured records
// ---------------------------------------------------------------------------

/// A dated record with a volume and, optionally, loads and a cost.
pub trait Measured {
    fn date(&self) -> NaiveDate;
    fn liters(&self) -> Decimal;

    fn cost(&self) -> Decimal {
        Decimal::ZERO
    }

    fn loads(&self) -> u64 {
        0
    }
}

impl Measured for MovementEntry {
    fn date(&self) -> NaiveDate {
        self.entry_date
    }

    fn liters(&self) -> Decimal {
        self.quantity.value()
    }

    fn cost(&self) -> Decimal {
        self.total_cost
    }

    fn loads(&self) -> u64 {
        u64::from(self.load_count)
    }
}

impl Measured for YieldEntry {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn liters(&self) -> Decimal {
        Decimal::from(self.yield_liters)
    }
}

impl Measured for ConsumptionEntry {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn liters(&self) -> Decimal {
        Decimal::from(self.consumption_liters)
    }
}

// ---------------------------------------------------------------------------
// Categorization
// ---------------------------------------------------------------------------

pub trait Categorize<M: ?Sized> {
    /// Labels that always appear in a breakdown, zero-filled.
    fn labels(&self) -> Vec<String>;

    /// Category of one record; `None` keeps it out of the breakdown but in the totals.
    fn category(&self, item: &M) -> Option<String>;
}

/// Corporation Water iff the source is a pipeline; otherwise the row's water type.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaterCategories;

impl WaterCategories {
    pub fn label(entry: &MovementEntry) -> &'static str {
        if entry.source.is_pipeline() {
            CORPORATION_WATER
        } else {
            entry.water_type.label()
        }
    }
}

impl Categorize<MovementEntry> for WaterCategories {
    fn labels(&self) -> Vec<String> {
        vec![
            CORPORATION_WATER.to_string(),
            WaterType::Drinking.label().to_string(),
            WaterType::Normal.label().to_string(),
        ]
    }

    fn category(&self, item: &MovementEntry) -> Option<String> {
        Some(Self::label(item).to_string())
    }
}

/// Categorization from a closure and a fixed label set.
pub struct ByKey<F> {
    labels: Vec<String>,
    key: F,
}

impl<F> ByKey<F> {
    pub fn new(labels: Vec<String>, key: F) -> Self {
        Self { labels, key }
    }
}

impl<M, F> Categorize<M> for ByKey<F>
where
    F: Fn(&M) -> Option<String>,
{
    fn labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    fn category(&self, item: &M) -> Option<String> {
        (self.key)(item)
    }
}

// ---------------------------------------------------------------------------
// Tallies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub loads: u64,
    pub entries: usize,
    pub liters: Decimal,
    pub cost: Decimal,
}

impl Tally {
    pub fn add<M: Measured + ?Sized>(&mut self, item: &M) {
        self.loads += item.loads();
        self.entries += 1;
        self.liters += item.liters();
        self.cost += item.cost();
    }

    pub fn kl(&self) -> Decimal {
        self.liters / LITERS_PER_KL
    }

    pub fn totals(&self, volume_dp: u32) -> Totals {
        Totals {
            loads: self.loads,
            entries: self.entries,
            total_kl: to_report(self.kl(), volume_dp),
            total_cost: to_report(self.cost, CURRENCY_DP),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TallyBucket {
    pub total: Tally,
    pub breakdown: BTreeMap<String, Tally>,
}

impl TallyBucket {
    fn with_labels(labels: &[String]) -> Self {
        Self {
            total: Tally::default(),
            breakdown: labels.iter().map(|l| (l.clone(), Tally::default())).collect(),
        }
    }

    fn add<M: Measured + ?Sized>(&mut self, item: &M, category: Option<&str>) {
        self.total.add(item);
        if let Some(c) = category {
            self.breakdown.entry(c.to_string()).or_default().add(item);
        }
    }

    pub fn summarize(&self, volume_dp: u32) -> BucketSummary {
        let t = self.total.totals(volume_dp);
        BucketSummary {
            loads: t.loads,
            entries: t.entries,
            total_kl: t.total_kl,
            total_cost: t.total_cost,
            breakdown: self
                .breakdown
                .iter()
                .map(|(k, v)| (k.clone(), v.totals(volume_dp)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tallies {
    pub buckets: BTreeMap<String, TallyBucket>,
    pub overall: TallyBucket,
}

impl Tallies {
    pub fn summarize(&self, volume_dp: u32) -> Aggregation {
        Aggregation {
            buckets: self
                .buckets
                .iter()
                .map(|(k, b)| (k.clone(), b.summarize(volume_dp)))
                .collect(),
            summary: self.overall.summarize(volume_dp),
        }
    }
}

/// Raw tallies: filter, bucket, categorize.
pub fn tally<'a, M, C, I>(items: I, range: &DateRange, granularity: Granularity, categorize: &C) -> Tallies
where
    M: Measured + 'a,
    C: Categorize<M> + ?Sized,
    I: IntoIterator<Item = &'a M>,
{
    let labels = categorize.labels();
    let mut out = Tallies { buckets: BTreeMap::new(), overall: TallyBucket::with_labels(&labels) };
    for item in items {
        let date = item.date();
        if !range.contains(date) {
            continue;
        }
        let category = categorize.category(item);
        out.buckets
            .entry(granularity.key(date))
            .or_insert_with(|| TallyBucket::with_labels(&labels))
            .add(item, category.as_deref());
        out.overall.add(item, category.as_deref());
    }
    out
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub loads: u64,
    pub entries: usize,
    pub total_kl: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketSummary {
    pub loads: u64,
    pub entries: usize,
    pub total_kl: f64,
    pub total_cost: f64,
    pub breakdown: BTreeMap<String, Totals>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregation {
    pub buckets: BTreeMap<String, BucketSummary>,
    pub summary: BucketSummary,
}

pub fn aggregate<'a, M, C, I>(
    items: I,
    range: &DateRange,
    granularity: Granularity,
    categorize: &C,
    volume_dp: u32,
) -> Aggregation
where
    M: Measured + 'a,
    C: Categorize<M> + ?Sized,
    I: IntoIterator<Item = &'a M>,
{
    tally(items, range, granularity, categorize).summarize(volume_dp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn entry(id: u64, day: &str, source: SourceRef, water: WaterType, liters: i64, cost: &str) -> MovementEntry {
        MovementEntry {
            id: EntryId(id),
            entry_date: date(day),
            source,
            loading_location: None,
            unloading_location: None,
            shift: None,
            water_type: water,
            load_count: 1,
            meter_current: None,
            meter_previous: None,
            manual_capacity_liters: None,
            is_manual_override: false,
            quantity: Liters::from_whole(liters),
            total_cost: Decimal::from_str(cost).unwrap(),
            snapshot: RateSnapshot::default(),
            comments: String::new(),
        }
    }

    fn pipe() -> SourceRef {
        SourceRef::Pipeline { source: SourceId(1) }
    }

    fn vendor() -> SourceRef {
        SourceRef::Vendor { source: SourceId(2) }
    }

    #[test]
    fn pipeline_never_counts_as_drinking() {
        let entries = vec![
            entry(1, "2024-01-05", pipe(), WaterType::Drinking, 5_000, "250"),
            entry(2, "2024-01-06", vendor(), WaterType::Drinking, 3_000, "1500"),
            entry(3, "2024-01-07", vendor(), WaterType::Normal, 2_000, "800"),
        ];
        let agg = aggregate(&entries, &DateRange::all(), Granularity::Month, &WaterCategories, 3);
        let bucket = &agg.buckets["2024-01"];
        assert_eq!(bucket.total_kl, 10.0);
        assert_eq!(bucket.loads, 3);
        assert_eq!(bucket.breakdown[CORPORATION_WATER].total_kl, 5.0);
        assert_eq!(bucket.breakdown["Drinking Water"].total_kl, 3.0);
        assert_eq!(bucket.breakdown["Normal Water (Salt)"].total_kl, 2.0);
        assert_eq!(agg.summary.total_cost, 2550.0);
    }

    #[test]
    fn breakdown_is_zero_filled() {
        let entries = vec![entry(1, "2024-01-05", vendor(), WaterType::Normal, 2_000, "800")];
        let agg = aggregate(&entries, &DateRange::all(), Granularity::Day, &WaterCategories, 3);
        let bucket = &agg.buckets["2024-01-05"];
        assert_eq!(bucket.breakdown.len(), 3);
        assert_eq!(bucket.breakdown[CORPORATION_WATER], Totals::default());
    }

    #[test]
    fn range_filter_and_buckets() {
        let entries = vec![
            entry(1, "2023-12-31", vendor(), WaterType::Normal, 1_000, "10"),
            entry(2, "2024-01-01", vendor(), WaterType::Normal, 1_000, "10"),
            entry(3, "2024-02-15", vendor(), WaterType::Normal, 1_500, "15"),
            entry(4, "2024-03-01", vendor(), WaterType::Normal, 1_000, "10"),
        ];
        let range = DateRange::parse(Some("2024-01-01"), Some("2024-02-29")).unwrap();
        let agg = aggregate(&entries, &range, Granularity::Month, &WaterCategories, 3);
        assert_eq!(agg.buckets.keys().collect::<Vec<_>>(), vec!["2024-01", "2024-02"]);
        assert_eq!(agg.summary.total_kl, 2.5);
        assert_eq!(agg.summary.entries, 2);
    }

    #[test]
    fn custom_categorization() {
        let entries = vec![
            entry(1, "2024-01-05", pipe(), WaterType::Drinking, 5_000, "250"),
            entry(2, "2024-01-06", vendor(), WaterType::Drinking, 3_000, "1500"),
        ];
        let by_type = ByKey::new(vec![], |e: &MovementEntry| Some(e.source.type_label().to_string()));
        let agg = aggregate(&entries, &DateRange::all(), Granularity::Year, &by_type, 2);
        assert_eq!(agg.buckets["2024"].breakdown["vendor"].total_cost, 1500.0);
        assert_eq!(agg.buckets["2024"].breakdown["pipeline"].total_kl, 5.0);
    }

    #[test]
    fn volume_rounding_follows_decimals() {
        let entries = vec![entry(1, "2024-01-05", vendor(), WaterType::Normal, 12_345, "0")];
        let agg = aggregate(&entries, &DateRange::all(), Granularity::Day, &WaterCategories, 2);
        assert_eq!(agg.summary.total_kl, 12.35);
    }
}
