//! Movement write paths: purchases, internal hauls and pipeline supply.

use aqualedger_core::money::round_currency;
use aqualedger_core::*;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Ledger;
use crate::cost::{resolve_cost, CostOutcome, CostQuery};
use crate::error::LedgerError;
use crate::meter::{resolve_delta, ReadingMode};
use crate::rates::RateStore;

/// Quantity as the operator entered it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnteredQuantity {
    Liters(Liters),
    /// Pipeline meters are read in kiloliters.
    Kiloliters(Kiloliters),
}

impl EnteredQuantity {
    pub fn liters(self) -> Liters {
        match self {
            EnteredQuantity::Liters(l) => l,
            EnteredQuantity::Kiloliters(kl) => kl.to_liters(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementDraft {
    pub entry_date: NaiveDate,
    pub source: SourceRef,
    /// Loading point for vendor/pipeline entries. Internal hauls take it from `source`.
    #[serde(default)]
    pub loading_location: Option<LocationId>,
    #[serde(default)]
    pub unloading_location: Option<LocationId>,
    #[serde(default)]
    pub shift: Option<Shift>,
    #[serde(default)]
    pub water_type: WaterType,
    #[serde(default = "one")]
    pub load_count: u32,
    /// Pipeline meter reading, kiloliters.
    #[serde(default)]
    pub meter_current: Option<i64>,
    /// Leave empty to derive the nominal quantity.
    #[serde(default)]
    pub quantity: Option<EnteredQuantity>,
    #[serde(default)]
    pub manual_capacity_liters: Option<Liters>,
    #[serde(default)]
    pub is_manual_override: bool,
    #[serde(default)]
    pub comments: String,
}

fn one() -> u32 {
    1
}

impl MovementDraft {
    pub fn new(entry_date: NaiveDate, source: SourceRef) -> Self {
        MovementDraft {
            entry_date,
            source,
            loading_location: None,
            unloading_location: None,
            shift: None,
            water_type: WaterType::default(),
            load_count: 1,
            meter_current: None,
            quantity: None,
            manual_capacity_liters: None,
            is_manual_override: false,
            comments: String::new(),
        }
    }
}

/// Last meter reading of a pipeline source plus the rate applicable on the date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReading {
    pub source: SourceId,
    pub previous_reading: Option<i64>,
    pub active_rate: Option<PipelineRate>,
}

impl Ledger {
    pub fn record_movement(&mut self, draft: MovementDraft) -> Result<MovementEntry, LedgerError> {
        let id = EntryId(self.sequences.movements + 1);
        let entry = self.build_movement(id, draft)?;
        self.sequences.movements = id.0;
        self.store_movement(entry.clone());
        info!(id = %entry.id, total_cost = %entry.total_cost, "recorded movement");
        Ok(entry)
    }

    /// Re-derives quantity and cost from the new draft. The snapshot is the
    /// rate applicable on the (possibly changed) date.
    pub fn update_movement(
        &mut self,
        id: EntryId,
        draft: MovementDraft,
    ) -> Result<MovementEntry, LedgerError> {
        self.movement(id)?;
        // The meter prior skips `id`, so the old entry can stay indexed while building.
        let entry = self.build_movement(id, draft)?;
        self.unstore_movement(id)?;
        self.store_movement(entry.clone());
        info!(id = %id, total_cost = %entry.total_cost, "updated movement");
        Ok(entry)
    }

    pub fn delete_movement(&mut self, id: EntryId) -> Result<MovementEntry, LedgerError> {
        self.unstore_movement(id)
    }

    /// Resolve cost for a query without writing anything. Referenced ids must exist.
    pub fn preview_cost(&self, query: &CostQuery) -> Result<CostOutcome, LedgerError> {
        self.check_source(&query.source)?;
        Ok(resolve_cost(&self.rates, query))
    }

    /// Latest pipeline meter reading on or before `date`.
    pub fn last_pipeline_reading(
        &self,
        source: SourceId,
        date: NaiveDate,
    ) -> Result<PipelineReading, LedgerError> {
        self.source_of_kind(source, SourceKind::Pipeline)?;
        Ok(PipelineReading {
            source,
            previous_reading: self
                .pipeline_index
                .latest_on_or_before(source, date)
                .map(|(_, reading)| reading),
            active_rate: self.rates.pipeline_rate(source, date).cloned(),
        })
    }

    fn check_source(&self, source: &SourceRef) -> Result<(), LedgerError> {
        match *source {
            SourceRef::Vendor { source } => {
                self.source_of_kind(source, SourceKind::Vendor)?;
            }
            SourceRef::Pipeline { source } => {
                self.source_of_kind(source, SourceKind::Pipeline)?;
            }
            SourceRef::Internal { vehicle, loading_location } => {
                self.vehicle(vehicle)?;
                self.location(loading_location)?;
            }
        }
        Ok(())
    }

    fn store_movement(&mut self, entry: MovementEntry) {
        if let (SourceRef::Pipeline { source }, Some(reading)) = (entry.source, entry.meter_current) {
            self.pipeline_index.insert(source, entry.entry_date, entry.id, reading);
        }
        self.movements.insert(entry.id, entry);
    }

    fn unstore_movement(&mut self, id: EntryId) -> Result<MovementEntry, LedgerError> {
        let entry = self
            .movements
            .remove(&id)
            .ok_or_else(|| LedgerError::not_found("movement", id))?;
        if let SourceRef::Pipeline { source } = entry.source {
            self.pipeline_index.remove(source, entry.entry_date, id);
        }
        Ok(entry)
    }

    fn build_movement(&self, id: EntryId, draft: MovementDraft) -> Result<MovementEntry, LedgerError> {
        self.check_source(&draft.source)?;
        if draft.load_count == 0 {
            return Err(LedgerError::invalid("load_count must be at least 1"));
        }
        if let Some(loc) = draft.unloading_location {
            self.location(loc)?;
        }
        let loading_location = match draft.source {
            SourceRef::Internal { loading_location, .. } => {
                if matches!(draft.loading_location, Some(l) if l != loading_location) {
                    return Err(LedgerError::invalid(
                        "loading_location differs from the internal haul's loading point",
                    ));
                }
                Some(loading_location)
            }
            _ => {
                if let Some(loc) = draft.loading_location {
                    self.location(loc)?;
                }
                draft.loading_location
            }
        };
        if draft.meter_current.is_some() && !draft.source.is_pipeline() {
            return Err(LedgerError::invalid("meter readings apply to pipeline sources only"));
        }

        let loads = Decimal::from(draft.load_count);
        let mut meter_previous = None;
        let quantity = match (draft.source, draft.quantity, draft.meter_current) {
            (_, Some(q), _) if q.liters().value().is_sign_negative() => {
                return Err(LedgerError::invalid("quantity must not be negative"));
            }
            (SourceRef::Pipeline { source }, q, Some(current)) => {
                let prior = self
                    .pipeline_index
                    .prior(source, draft.entry_date, Some(id))
                    .map(|(_, reading)| reading);
                let delta = resolve_delta(prior, current, ReadingMode::Metered);
                meter_previous = Some(delta.previous_reading);
                q.map(EnteredQuantity::liters)
                    .unwrap_or_else(|| Liters::from_whole(delta.derived_liters))
            }
            (SourceRef::Pipeline { .. }, Some(q), None) => q.liters(),
            (SourceRef::Pipeline { .. }, None, None) => {
                return Err(LedgerError::invalid(
                    "pipeline entries need a quantity or a meter reading",
                ));
            }
            (_, Some(q), _) => q.liters(),
            (source, None, _) => self.nominal_quantity(&draft, source, loads)?,
        };

        let outcome = resolve_cost(
            &self.rates,
            &CostQuery {
                source: draft.source,
                water_type: draft.water_type,
                quantity,
                load_count: draft.load_count,
                entry_date: draft.entry_date,
                manual_override: draft.is_manual_override,
            },
        );

        Ok(MovementEntry {
            id,
            entry_date: draft.entry_date,
            source: draft.source,
            loading_location,
            unloading_location: draft.unloading_location,
            shift: draft.shift,
            water_type: draft.water_type,
            load_count: draft.load_count,
            meter_current: draft.meter_current,
            meter_previous,
            manual_capacity_liters: draft.manual_capacity_liters,
            is_manual_override: draft.is_manual_override,
            quantity,
            total_cost: round_currency(outcome.total_cost),
            snapshot: outcome.snapshot,
            comments: draft.comments,
        })
    }

    /// Loads × per-load liters: the manual capacity when given, else the
    /// vehicle capacity (internal) or the vendor rate's vehicle capacity.
    fn nominal_quantity(
        &self,
        draft: &MovementDraft,
        source: SourceRef,
        loads: Decimal,
    ) -> Result<Liters, LedgerError> {
        if let Some(per_load) = draft.manual_capacity_liters {
            return Ok(per_load * loads);
        }
        let capacity = match source {
            SourceRef::Internal { vehicle, .. } => Some(self.vehicle(vehicle)?.capacity),
            SourceRef::Vendor { source } => self
                .rates
                .vendor_rate(source, draft.water_type, draft.entry_date)
                .and_then(|r| r.vehicle_capacity),
            SourceRef::Pipeline { .. } => None,
        };
        capacity
            .map(|c| c * loads)
            .ok_or_else(|| LedgerError::invalid("quantity is required: no capacity to derive it from"))
    }
}
