//! The ledger: master data, rate histories and recorded entries, with the
//! write paths that keep derived fields consistent.
//!
//! Single-entry writes validate and build the new record before touching
//! any state. Multi-row writes run inside [`Ledger::transaction`]: the
//! closure works on a scratch copy that replaces the ledger only when it
//! returns `Ok`.

mod movement;
mod readings;

use std::collections::BTreeMap;

use aqualedger_core::*;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::meter::ReadingIndex;
use crate::rates::{
    GeneralRateDraft, InternalRateDraft, PipelineRateDraft, RateBook, VendorRateDraft,
};

pub use movement::{EnteredQuantity, MovementDraft, PipelineReading};
pub use readings::{
    BulkConsumptionRow, BulkOutcome, BulkYieldRow, ConsumptionDraft, ConsumptionSheetRow,
    ReadingKind, YieldDraft, YieldSheetRow,
};

/// Flat snapshot of a ledger, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerParts {
    pub sources: Vec<Source>,
    pub locations: Vec<Location>,
    pub vehicles: Vec<InternalVehicle>,
    pub yield_locations: Vec<YieldLocation>,
    pub consumption_locations: Vec<ConsumptionLocation>,
    pub categories: Vec<Category>,
    pub rates: Vec<RateRecord>,
    pub movements: Vec<MovementEntry>,
    pub yields: Vec<YieldEntry>,
    pub consumptions: Vec<ConsumptionEntry>,
    #[serde(default)]
    pub sequences: IdSequences,
}

/// Highest id ever issued, per table. Deleting the newest record does not
/// lower it, so an id is never handed out twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdSequences {
    pub sources: u64,
    pub locations: u64,
    pub vehicles: u64,
    pub yield_locations: u64,
    pub consumption_locations: u64,
    pub categories: u64,
    pub movements: u64,
    pub yields: u64,
    pub consumptions: u64,
}

impl IdSequences {
    /// `(table, last id)` pairs, in schema order.
    pub fn named(&self) -> [(&'static str, u64); 9] {
        [
            ("sources", self.sources),
            ("locations", self.locations),
            ("vehicles", self.vehicles),
            ("yield_locations", self.yield_locations),
            ("consumption_locations", self.consumption_locations),
            ("categories", self.categories),
            ("movements", self.movements),
            ("yields", self.yields),
            ("consumptions", self.consumptions),
        ]
    }

    /// Set one counter by table name. Unknown names are ignored and return false.
    pub fn set_named(&mut self, table: &str, value: u64) -> bool {
        let slot = match table {
            "sources" => &mut self.sources,
            "locations" => &mut self.locations,
            "vehicles" => &mut self.vehicles,
            "yield_locations" => &mut self.yield_locations,
            "consumption_locations" => &mut self.consumption_locations,
            "categories" => &mut self.categories,
            "movements" => &mut self.movements,
            "yields" => &mut self.yields,
            "consumptions" => &mut self.consumptions,
            _ => return false,
        };
        *slot = value;
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    sources: BTreeMap<SourceId, Source>,
    locations: BTreeMap<LocationId, Location>,
    vehicles: BTreeMap<VehicleId, InternalVehicle>,
    yield_locations: BTreeMap<YieldLocationId, YieldLocation>,
    consumption_locations: BTreeMap<ConsumptionLocationId, ConsumptionLocation>,
    categories: BTreeMap<CategoryId, Category>,
    rates: RateBook,
    movements: BTreeMap<EntryId, MovementEntry>,
    yields: BTreeMap<EntryId, YieldEntry>,
    consumptions: BTreeMap<EntryId, ConsumptionEntry>,
    yield_index: ReadingIndex<YieldLocationId>,
    consumption_index: ReadingIndex<ConsumptionLocationId>,
    pipeline_index: ReadingIndex<SourceId>,
    sequences: IdSequences,
}

fn bump(seq: &mut u64) -> u64 {
    *seq += 1;
    *seq
}

/// Raise `seq` to the highest key present; files written before counters
/// were stored carry none.
fn floor_to_keys<K: Copy, V>(seq: &mut u64, map: &BTreeMap<K, V>, id: impl Fn(K) -> u64) {
    if let Some(k) = map.keys().next_back() {
        *seq = (*seq).max(id(*k));
    }
}

fn require<'a, K: Ord + std::fmt::Display + Copy, V>(
    map: &'a BTreeMap<K, V>,
    entity: &'static str,
    id: K,
) -> Result<&'a V, LedgerError> {
    map.get(&id).ok_or_else(|| LedgerError::not_found(entity, id))
}

fn require_name(name: &str) -> Result<String, LedgerError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::invalid("name must not be empty"));
    }
    Ok(trimmed.to_string())
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a scratch copy; commit only on `Ok`.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Ledger) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut scratch = self.clone();
        let out = f(&mut scratch)?;
        *self = scratch;
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Snapshot conversion
    // -----------------------------------------------------------------------

    pub fn from_parts(parts: LedgerParts) -> Result<Self, LedgerError> {
        let mut ledger = Ledger::new();
        ledger.sources = parts.sources.into_iter().map(|s| (s.id, s)).collect();
        ledger.locations = parts.locations.into_iter().map(|l| (l.id, l)).collect();
        ledger.vehicles = parts.vehicles.into_iter().map(|v| (v.id, v)).collect();
        ledger.yield_locations = parts.yield_locations.into_iter().map(|l| (l.id, l)).collect();
        ledger.consumption_locations =
            parts.consumption_locations.into_iter().map(|l| (l.id, l)).collect();
        ledger.categories = parts.categories.into_iter().map(|c| (c.id, c)).collect();
        ledger.rates = RateBook::from_records(parts.rates);

        for m in parts.movements {
            if let (SourceRef::Pipeline { source }, Some(reading)) = (m.source, m.meter_current) {
                ledger.pipeline_index.insert(source, m.entry_date, m.id, reading);
            }
            ledger.movements.insert(m.id, m);
        }
        for y in parts.yields {
            require(&ledger.yield_locations, "yield location", y.location)?;
            ledger.yield_index.insert(y.location, y.date, y.id, y.current_reading);
            ledger.yields.insert(y.id, y);
        }
        for c in parts.consumptions {
            require(&ledger.consumption_locations, "consumption location", c.location)?;
            ledger.consumption_index.insert(c.location, c.date, c.id, c.current_reading);
            ledger.consumptions.insert(c.id, c);
        }

        let mut seq = parts.sequences;
        floor_to_keys(&mut seq.sources, &ledger.sources, |k| k.0);
        floor_to_keys(&mut seq.locations, &ledger.locations, |k| k.0);
        floor_to_keys(&mut seq.vehicles, &ledger.vehicles, |k| k.0);
        floor_to_keys(&mut seq.yield_locations, &ledger.yield_locations, |k| k.0);
        floor_to_keys(&mut seq.consumption_locations, &ledger.consumption_locations, |k| k.0);
        floor_to_keys(&mut seq.categories, &ledger.categories, |k| k.0);
        floor_to_keys(&mut seq.movements, &ledger.movements, |k| k.0);
        floor_to_keys(&mut seq.yields, &ledger.yields, |k| k.0);
        floor_to_keys(&mut seq.consumptions, &ledger.consumptions, |k| k.0);
        ledger.sequences = seq;
        Ok(ledger)
    }

    pub fn to_parts(&self) -> LedgerParts {
        LedgerParts {
            sources: self.sources.values().cloned().collect(),
            locations: self.locations.values().cloned().collect(),
            vehicles: self.vehicles.values().cloned().collect(),
            yield_locations: self.yield_locations.values().cloned().collect(),
            consumption_locations: self.consumption_locations.values().cloned().collect(),
            categories: self.categories.values().cloned().collect(),
            rates: self.rates.records().cloned().collect(),
            movements: self.movements.values().cloned().collect(),
            yields: self.yields.values().cloned().collect(),
            consumptions: self.consumptions.values().cloned().collect(),
            sequences: self.sequences,
        }
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn rates(&self) -> &RateBook {
        &self.rates
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &InternalVehicle> {
        self.vehicles.values()
    }

    pub fn yield_locations(&self) -> impl Iterator<Item = &YieldLocation> {
        self.yield_locations.values()
    }

    pub fn consumption_locations(&self) -> impl Iterator<Item = &ConsumptionLocation> {
        self.consumption_locations.values()
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn movements(&self) -> impl Iterator<Item = &MovementEntry> {
        self.movements.values()
    }

    pub fn yields(&self) -> impl Iterator<Item = &YieldEntry> {
        self.yields.values()
    }

    pub fn consumptions(&self) -> impl Iterator<Item = &ConsumptionEntry> {
        self.consumptions.values()
    }

    pub fn source(&self, id: SourceId) -> Result<&Source, LedgerError> {
        require(&self.sources, "source", id)
    }

    pub fn location(&self, id: LocationId) -> Result<&Location, LedgerError> {
        require(&self.locations, "location", id)
    }

    pub fn vehicle(&self, id: VehicleId) -> Result<&InternalVehicle, LedgerError> {
        require(&self.vehicles, "vehicle", id)
    }

    pub fn yield_location(&self, id: YieldLocationId) -> Result<&YieldLocation, LedgerError> {
        require(&self.yield_locations, "yield location", id)
    }

    pub fn consumption_location(
        &self,
        id: ConsumptionLocationId,
    ) -> Result<&ConsumptionLocation, LedgerError> {
        require(&self.consumption_locations, "consumption location", id)
    }

    pub fn category(&self, id: CategoryId) -> Result<&Category, LedgerError> {
        require(&self.categories, "category", id)
    }

    pub fn movement(&self, id: EntryId) -> Result<&MovementEntry, LedgerError> {
        require(&self.movements, "movement", id)
    }

    pub fn yield_entry(&self, id: EntryId) -> Result<&YieldEntry, LedgerError> {
        require(&self.yields, "yield entry", id)
    }

    pub fn consumption_entry(&self, id: EntryId) -> Result<&ConsumptionEntry, LedgerError> {
        require(&self.consumptions, "consumption entry", id)
    }

    /// Source of the given kind, NotFound when absent or of another kind.
    pub fn source_of_kind(&self, id: SourceId, kind: SourceKind) -> Result<&Source, LedgerError> {
        let source = self.source(id)?;
        if source.kind != kind {
            return Err(LedgerError::NotFound {
                entity: "source",
                id: format!("{id} ({})", kind.label()),
            });
        }
        Ok(source)
    }

    pub fn location_by_name(&self, name: &str) -> Option<&Location> {
        self.locations.values().find(|l| l.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn source_by_name(&self, name: &str) -> Option<&Source> {
        self.sources.values().find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn vehicle_by_name(&self, name: &str) -> Option<&InternalVehicle> {
        self.vehicles.values().find(|v| v.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn yield_location_by_name(&self, name: &str) -> Option<&YieldLocation> {
        self.yield_locations.values().find(|l| l.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn consumption_location_by_name(
        &self,
        name: &str,
        consumption_type: ConsumptionType,
    ) -> Option<&ConsumptionLocation> {
        self.consumption_locations.values().find(|l| {
            l.consumption_type == consumption_type && l.name.eq_ignore_ascii_case(name.trim())
        })
    }

    // -----------------------------------------------------------------------
    // Master data
    // -----------------------------------------------------------------------

    pub fn add_source(&mut self, name: &str, kind: SourceKind) -> Result<Source, LedgerError> {
        let name = require_name(name)?;
        if self.source_by_name(&name).is_some() {
            return Err(LedgerError::Duplicate { entity: "source", name });
        }
        let source = Source { id: SourceId(bump(&mut self.sequences.sources)), name, kind, active: true };
        self.sources.insert(source.id, source.clone());
        Ok(source)
    }

    pub fn add_location(
        &mut self,
        name: &str,
        location_type: &str,
        sort_order: i32,
    ) -> Result<Location, LedgerError> {
        let name = require_name(name)?;
        if self.location_by_name(&name).is_some() {
            return Err(LedgerError::Duplicate { entity: "location", name });
        }
        let location = Location {
            id: LocationId(bump(&mut self.sequences.locations)),
            name,
            location_type: location_type.trim().to_string(),
            active: true,
            sort_order,
        };
        self.locations.insert(location.id, location.clone());
        Ok(location)
    }

    pub fn add_vehicle(&mut self, name: &str, capacity: Liters) -> Result<InternalVehicle, LedgerError> {
        let name = require_name(name)?;
        if self.vehicle_by_name(&name).is_some() {
            return Err(LedgerError::Duplicate { entity: "vehicle", name });
        }
        if capacity.value().is_sign_negative() {
            return Err(LedgerError::invalid("vehicle capacity must not be negative"));
        }
        let vehicle = InternalVehicle { id: VehicleId(bump(&mut self.sequences.vehicles)), name, capacity };
        self.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(vehicle)
    }

    pub fn add_yield_location(
        &mut self,
        name: &str,
        yield_type: YieldType,
        is_manual_yield: bool,
        sort_order: i32,
    ) -> Result<YieldLocation, LedgerError> {
        let name = require_name(name)?;
        if self.yield_location_by_name(&name).is_some() {
            return Err(LedgerError::Duplicate { entity: "yield location", name });
        }
        let location = YieldLocation {
            id: YieldLocationId(bump(&mut self.sequences.yield_locations)),
            name,
            yield_type,
            is_manual_yield,
            active: true,
            sort_order,
        };
        self.yield_locations.insert(location.id, location.clone());
        Ok(location)
    }

    pub fn add_consumption_location(
        &mut self,
        name: &str,
        consumption_type: ConsumptionType,
        category: Option<CategoryId>,
        sort_order: i32,
    ) -> Result<ConsumptionLocation, LedgerError> {
        let name = require_name(name)?;
        if self.consumption_location_by_name(&name, consumption_type).is_some() {
            return Err(LedgerError::Duplicate { entity: "consumption location", name });
        }
        if let Some(cat) = category {
            self.category(cat)?;
        }
        let location = ConsumptionLocation {
            id: ConsumptionLocationId(bump(&mut self.sequences.consumption_locations)),
            name,
            consumption_type,
            category,
            active: true,
            sort_order,
        };
        self.consumption_locations.insert(location.id, location.clone());
        Ok(location)
    }

    /// Add a category. `category.id` is ignored and assigned here.
    pub fn add_category(&mut self, mut category: Category) -> Result<Category, LedgerError> {
        category.name = require_name(&category.name)?;
        if self.categories.values().any(|c| c.name.eq_ignore_ascii_case(&category.name)) {
            return Err(LedgerError::Duplicate { entity: "category", name: category.name });
        }
        category.id = CategoryId(bump(&mut self.sequences.categories));
        self.categories.insert(category.id, category.clone());
        Ok(category)
    }

    // -----------------------------------------------------------------------
    // Rates
    // -----------------------------------------------------------------------

    pub fn add_vendor_rate(&mut self, draft: VendorRateDraft) -> Result<VendorRate, LedgerError> {
        self.source_of_kind(draft.source, SourceKind::Vendor)?;
        self.rates.add_vendor_rate(draft)
    }

    /// Snapshots the vehicle's current capacity into the rate's caches.
    pub fn add_internal_rate(
        &mut self,
        draft: InternalRateDraft,
    ) -> Result<InternalVehicleRate, LedgerError> {
        let capacity = self.vehicle(draft.vehicle)?.capacity;
        self.location(draft.loading_location)?;
        self.rates.add_internal_rate(draft, Some(capacity))
    }

    pub fn add_pipeline_rate(&mut self, draft: PipelineRateDraft) -> Result<PipelineRate, LedgerError> {
        self.source_of_kind(draft.source, SourceKind::Pipeline)?;
        self.rates.add_pipeline_rate(draft)
    }

    pub fn add_general_rate(&mut self, draft: GeneralRateDraft) -> Result<GeneralWaterRate, LedgerError> {
        self.rates.add_general_rate(draft)
    }

    /// No records of any kind. Id counters are not considered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
            && self.locations.is_empty()
            && self.vehicles.is_empty()
            && self.yield_locations.is_empty()
            && self.consumption_locations.is_empty()
            && self.categories.is_empty()
            && self.rates.is_empty()
            && self.movements.is_empty()
            && self.yields.is_empty()
            && self.consumptions.is_empty()
    }

    pub fn sequences(&self) -> IdSequences {
        self.sequences
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn master_names_are_unique() {
        let mut ledger = Ledger::new();
        ledger.add_source("Sri Balaji Tankers", SourceKind::Vendor).unwrap();
        let err = ledger.add_source(" sri balaji tankers ", SourceKind::Vendor).unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate { entity: "source", .. }));
    }

    #[test]
    fn consumption_location_unique_per_type() {
        let mut ledger = Ledger::new();
        ledger.add_consumption_location("Hostel A", ConsumptionType::Normal, None, 0).unwrap();
        ledger.add_consumption_location("Hostel A", ConsumptionType::Drinking, None, 0).unwrap();
        assert!(ledger
            .add_consumption_location("Hostel A", ConsumptionType::Normal, None, 1)
            .is_err());
    }

    #[test]
    fn vendor_rate_requires_vendor_source() {
        let mut ledger = Ledger::new();
        let pipe = ledger.add_source("Corporation", SourceKind::Pipeline).unwrap();
        let err = ledger
            .add_vendor_rate(VendorRateDraft {
                source: pipe.id,
                water_type: WaterType::Drinking,
                cost_basis: CostBasis::PerLoad,
                rate_value: d("1500"),
                vehicle_capacity: None,
                effective_date: date("2024-01-01"),
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "source", .. }));
    }

    #[test]
    fn internal_rate_snapshots_capacity() {
        let mut ledger = Ledger::new();
        let truck = ledger.add_vehicle("TN-37 Tanker", Liters(d("12000"))).unwrap();
        let point = ledger.add_location("Muthu Nagar", "Loading", 0).unwrap();
        let rate = ledger
            .add_internal_rate(InternalRateDraft {
                vehicle: truck.id,
                loading_location: point.id,
                cost_per_load: d("600"),
                effective_date: date("2024-01-01"),
            })
            .unwrap();
        assert_eq!(rate.capacity, Some(Liters(d("12000"))));
        assert_eq!(rate.cached_cost_per_kl, Some(d("50")));
    }

    #[test]
    fn failed_transaction_leaves_ledger_untouched() {
        let mut ledger = Ledger::new();
        let result: Result<(), LedgerError> = ledger.transaction(|l| {
            l.add_source("Vendor A", SourceKind::Vendor)?;
            l.add_source("Vendor A", SourceKind::Vendor)?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(ledger.sources().count(), 0);
    }

    #[test]
    fn counters_come_from_stored_keys_when_missing() {
        let mut ledger = Ledger::new();
        ledger.add_source("Corporation", SourceKind::Pipeline).unwrap();
        ledger.add_source("Vendor A", SourceKind::Vendor).unwrap();
        let mut parts = ledger.to_parts();
        parts.sequences = IdSequences::default();
        let mut back = Ledger::from_parts(parts).unwrap();
        assert_eq!(back.sequences().sources, 2);
        assert_eq!(back.add_source("Vendor B", SourceKind::Vendor).unwrap().id, SourceId(3));
    }

    #[test]
    fn stored_counter_wins_over_lower_keys() {
        let mut parts = LedgerParts::default();
        parts.sequences.movements = 7;
        let back = Ledger::from_parts(parts).unwrap();
        assert_eq!(back.sequences().movements, 7);
    }

    #[test]
    fn parts_round_trip() {
        let mut ledger = Ledger::new();
        ledger.add_source("Corporation", SourceKind::Pipeline).unwrap();
        ledger.add_location("Main Sump", "Unloading", 2).unwrap();
        let parts = ledger.to_parts();
        let back = Ledger::from_parts(parts.clone()).unwrap();
        assert_eq!(back.to_parts(), parts);
    }
}
