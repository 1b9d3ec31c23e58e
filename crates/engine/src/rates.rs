//! Rate Store: effective-dated histories and the as-of lookup.

use std::collections::BTreeMap;

use aqualedger_core::units::Liters;
use aqualedger_core::*;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// As-of lookup over effective-dated rate histories.
pub trait RateStore {
    /// Latest record for `key` with `effective_date <= as_of`. Equal dates go
    /// to the later entry date (general rates), then the most recently created.
    fn latest_rate(&self, key: &RateKey, as_of: NaiveDate) -> Option<&RateRecord>;

    fn vendor_rate(
        &self,
        source: SourceId,
        water_type: WaterType,
        as_of: NaiveDate,
    ) -> Option<&VendorRate> {
        self.latest_rate(&RateKey::Vendor { source, water_type }, as_of)
            .and_then(RateRecord::as_vendor)
    }

    fn internal_rate(
        &self,
        vehicle: VehicleId,
        loading_location: LocationId,
        as_of: NaiveDate,
    ) -> Option<&InternalVehicleRate> {
        self.latest_rate(&RateKey::Internal { vehicle, loading_location }, as_of)
            .and_then(RateRecord::as_internal)
    }

    fn pipeline_rate(&self, source: SourceId, as_of: NaiveDate) -> Option<&PipelineRate> {
        self.latest_rate(&RateKey::Pipeline { source }, as_of)
            .and_then(RateRecord::as_pipeline)
    }

    fn general_rate(&self, as_of: NaiveDate) -> Option<&GeneralWaterRate> {
        self.latest_rate(&RateKey::General, as_of)
            .and_then(RateRecord::as_general)
    }
}

fn precedence(r: &RateRecord) -> (NaiveDate, Option<NaiveDate>, RateId) {
    (r.effective_date(), r.entry_date(), r.id())
}

/// Pick the applicable record out of one key's history.
pub fn select_latest<'a, I>(records: I, as_of: NaiveDate) -> Option<&'a RateRecord>
where
    I: IntoIterator<Item = &'a RateRecord>,
{
    records
        .into_iter()
        .filter(|r| r.effective_date() <= as_of)
        .max_by_key(|r| precedence(r))
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorRateDraft {
    pub source: SourceId,
    pub water_type: WaterType,
    pub cost_basis: CostBasis,
    pub rate_value: Decimal,
    #[serde(default)]
    pub vehicle_capacity: Option<Liters>,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalRateDraft {
    pub vehicle: VehicleId,
    pub loading_location: LocationId,
    pub cost_per_load: Decimal,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRateDraft {
    pub source: SourceId,
    pub cost_per_liter: Decimal,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralRateDraft {
    pub entry_date: NaiveDate,
    pub effective_date: NaiveDate,
    pub normal_water_rate: Decimal,
    pub drinking_water_rate: Decimal,
}

fn non_negative(field: &str, value: Decimal) -> Result<(), LedgerError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(LedgerError::invalid(format!("{field} must not be negative, got {value}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// RateBook
// ---------------------------------------------------------------------------

/// In-memory rate histories grouped by key. Append-only.
#[derive(Debug, Clone, Default)]
pub struct RateBook {
    histories: BTreeMap<RateKey, Vec<RateRecord>>,
    next_id: u64,
}

impl RateStore for RateBook {
    fn latest_rate(&self, key: &RateKey, as_of: NaiveDate) -> Option<&RateRecord> {
        self.histories.get(key).and_then(|h| select_latest(h, as_of))
    }
}

impl RateBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored records, keeping their ids.
    pub fn from_records(records: impl IntoIterator<Item = RateRecord>) -> Self {
        let mut book = Self::new();
        for r in records {
            book.insert(r);
        }
        book
    }

    /// Insert a record with an existing id.
    pub fn insert(&mut self, record: RateRecord) {
        self.next_id = self.next_id.max(record.id().0);
        self.histories.entry(record.key()).or_default().push(record);
    }

    fn allocate(&mut self) -> RateId {
        self.next_id += 1;
        RateId(self.next_id)
    }

    pub fn len(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn history(&self, key: &RateKey) -> &[RateRecord] {
        self.histories.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All records, ordered by key then insertion.
    pub fn records(&self) -> impl Iterator<Item = &RateRecord> {
        self.histories.values().flatten()
    }

    /// Latest record per key with no date cutoff.
    pub fn current_rates(&self) -> Vec<&RateRecord> {
        self.histories
            .values()
            .filter_map(|h| h.iter().max_by_key(|r| precedence(r)))
            .collect()
    }

    pub fn add_vendor_rate(&mut self, draft: VendorRateDraft) -> Result<VendorRate, LedgerError> {
        non_negative("rate_value", draft.rate_value)?;
        if let Some(cap) = draft.vehicle_capacity {
            non_negative("vehicle_capacity", cap.value())?;
        }
        let rate = VendorRate {
            id: self.allocate(),
            source: draft.source,
            water_type: draft.water_type,
            cost_basis: draft.cost_basis,
            rate_value: draft.rate_value,
            vehicle_capacity: draft.vehicle_capacity,
            effective_date: draft.effective_date,
            cached_cost_per_liter: None,
            cached_cost_per_kl: None,
        }
        .with_computed_cache();
        self.insert(RateRecord::Vendor(rate.clone()));
        Ok(rate)
    }

    /// `capacity` is the vehicle's capacity at entry time.
    pub fn add_internal_rate(
        &mut self,
        draft: InternalRateDraft,
        capacity: Option<Liters>,
    ) -> Result<InternalVehicleRate, LedgerError> {
        non_negative("cost_per_load", draft.cost_per_load)?;
        let rate = InternalVehicleRate {
            id: self.allocate(),
            vehicle: draft.vehicle,
            loading_location: draft.loading_location,
            cost_per_load: draft.cost_per_load,
            effective_date: draft.effective_date,
            capacity,
            cached_cost_per_liter: None,
            cached_cost_per_kl: None,
        }
        .with_computed_cache();
        self.insert(RateRecord::Internal(rate.clone()));
        Ok(rate)
    }

    pub fn add_pipeline_rate(
        &mut self,
        draft: PipelineRateDraft,
    ) -> Result<PipelineRate, LedgerError> {
        non_negative("cost_per_liter", draft.cost_per_liter)?;
        let rate = PipelineRate {
            id: self.allocate(),
            source: draft.source,
            cost_per_liter: draft.cost_per_liter,
            effective_date: draft.effective_date,
        };
        self.insert(RateRecord::Pipeline(rate.clone()));
        Ok(rate)
    }

    pub fn add_general_rate(
        &mut self,
        draft: GeneralRateDraft,
    ) -> Result<GeneralWaterRate, LedgerError> {
        non_negative("normal_water_rate", draft.normal_water_rate)?;
        non_negative("drinking_water_rate", draft.drinking_water_rate)?;
        let rate = GeneralWaterRate {
            id: self.allocate(),
            entry_date: draft.entry_date,
            effective_date: draft.effective_date,
            normal_water_rate: draft.normal_water_rate,
            drinking_water_rate: draft.drinking_water_rate,
        };
        self.insert(RateRecord::General(rate.clone()));
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn pipeline(book: &mut RateBook, cost: &str, eff: &str) -> RateId {
        book.add_pipeline_rate(PipelineRateDraft {
            source: SourceId(1),
            cost_per_liter: d(cost),
            effective_date: date(eff),
        })
        .unwrap()
        .id
    }

    #[test]
    fn latest_on_or_before() {
        let mut book = RateBook::new();
        pipeline(&mut book, "0.04", "2024-01-01");
        pipeline(&mut book, "0.05", "2024-03-01");

        let at = |s| book.pipeline_rate(SourceId(1), date(s)).map(|r| r.cost_per_liter);
        assert_eq!(at("2023-12-31"), None);
        assert_eq!(at("2024-01-01"), Some(d("0.04")));
        assert_eq!(at("2024-02-29"), Some(d("0.04")));
        assert_eq!(at("2024-03-01"), Some(d("0.05")));
        assert_eq!(at("2030-01-01"), Some(d("0.05")));
    }

    #[test]
    fn same_date_goes_to_most_recent() {
        let mut book = RateBook::new();
        pipeline(&mut book, "0.04", "2024-01-01");
        let second = pipeline(&mut book, "0.06", "2024-01-01");
        let r = book.pipeline_rate(SourceId(1), date("2024-01-10")).unwrap();
        assert_eq!(r.id, second);
    }

    #[test]
    fn insertion_order_does_not_matter_for_dates() {
        let mut book = RateBook::new();
        pipeline(&mut book, "0.05", "2024-03-01");
        pipeline(&mut book, "0.04", "2024-01-01");
        let r = book.pipeline_rate(SourceId(1), date("2024-04-01")).unwrap();
        assert_eq!(r.cost_per_liter, d("0.05"));
    }

    #[test]
    fn keys_are_isolated() {
        let mut book = RateBook::new();
        book.add_vendor_rate(VendorRateDraft {
            source: SourceId(7),
            water_type: WaterType::Drinking,
            cost_basis: CostBasis::PerLoad,
            rate_value: d("1500"),
            vehicle_capacity: Some(Liters(d("12000"))),
            effective_date: date("2024-01-01"),
        })
        .unwrap();
        assert!(book.vendor_rate(SourceId(7), WaterType::Normal, date("2024-02-01")).is_none());
        assert!(book.vendor_rate(SourceId(8), WaterType::Drinking, date("2024-02-01")).is_none());
        let r = book.vendor_rate(SourceId(7), WaterType::Drinking, date("2024-02-01")).unwrap();
        assert_eq!(r.cached_cost_per_kl, Some(d("125")));
    }

    #[test]
    fn general_rate_ties_prefer_later_entry_date() {
        let mut book = RateBook::new();
        let later = book
            .add_general_rate(GeneralRateDraft {
                entry_date: date("2024-02-10"),
                effective_date: date("2024-02-01"),
                normal_water_rate: d("0.02"),
                drinking_water_rate: d("0.10"),
            })
            .unwrap();
        book.add_general_rate(GeneralRateDraft {
            entry_date: date("2024-02-05"),
            effective_date: date("2024-02-01"),
            normal_water_rate: d("0.03"),
            drinking_water_rate: d("0.12"),
        })
        .unwrap();
        let r = book.general_rate(date("2024-02-29")).unwrap();
        assert_eq!(r.id, later.id);
    }

    #[test]
    fn current_rates_ignores_dates() {
        let mut book = RateBook::new();
        pipeline(&mut book, "0.04", "2024-01-01");
        pipeline(&mut book, "0.09", "2099-01-01");
        let current = book.current_rates();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].as_pipeline().unwrap().cost_per_liter, d("0.09"));
    }

    #[test]
    fn negative_rates_rejected() {
        let mut book = RateBook::new();
        let err = book
            .add_pipeline_rate(PipelineRateDraft {
                source: SourceId(1),
                cost_per_liter: d("-0.01"),
                effective_date: date("2024-01-01"),
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert!(book.is_empty());
    }

    #[test]
    fn from_records_keeps_ids_and_continues_sequence() {
        let mut book = RateBook::new();
        pipeline(&mut book, "0.04", "2024-01-01");
        pipeline(&mut book, "0.05", "2024-02-01");
        let mut reloaded = RateBook::from_records(book.records().cloned().collect::<Vec<_>>());
        let id = pipeline(&mut reloaded, "0.06", "2024-03-01");
        assert_eq!(id, RateId(3));
        assert_eq!(reloaded.len(), 3);
    }
}
