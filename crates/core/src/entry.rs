//! Recorded entries: water movements, yield readings, consumption readings.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::*;
use crate::master::{Shift, WaterType};
use crate::units::Liters;

/// Where a movement's water came from.
///
/// An internal haul carries its vehicle and loading point; purchases carry
/// the vendor or pipeline source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRef {
    Vendor { source: SourceId },
    Pipeline { source: SourceId },
    Internal { vehicle: VehicleId, loading_location: LocationId },
}

impl SourceRef {
    pub fn source_id(&self) -> Option<SourceId> {
        match self {
            SourceRef::Vendor { source } | SourceRef::Pipeline { source } => Some(*source),
            SourceRef::Internal { .. } => None,
        }
    }

    pub fn vehicle_id(&self) -> Option<VehicleId> {
        match self {
            SourceRef::Internal { vehicle, .. } => Some(*vehicle),
            _ => None,
        }
    }

    pub fn is_pipeline(&self) -> bool {
        matches!(self, SourceRef::Pipeline { .. })
    }

    pub fn is_vendor(&self) -> bool {
        matches!(self, SourceRef::Vendor { .. })
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, SourceRef::Internal { .. })
    }

    pub fn type_label(&self) -> &'static str {
        match self {
            SourceRef::Vendor { .. } => "vendor",
            SourceRef::Pipeline { .. } => "pipeline",
            SourceRef::Internal { .. } => "internal",
        }
    }
}

/// The rate a movement was costed with, frozen at write time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub rate_id: Option<RateId>,
    /// 4 places.
    pub cost_per_liter: Option<Decimal>,
    /// 2 places.
    pub cost_per_kl: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementEntry {
    pub id: EntryId,
    pub entry_date: NaiveDate,
    pub source: SourceRef,
    /// Loading point. For internal hauls this equals the source's loading location.
    pub loading_location: Option<LocationId>,
    pub unloading_location: Option<LocationId>,
    pub shift: Option<Shift>,
    pub water_type: WaterType,
    pub load_count: u32,
    /// Pipeline meter readings, kiloliters on the meter face.
    pub meter_current: Option<i64>,
    pub meter_previous: Option<i64>,
    /// Per-load liters when the operator overrides nominal capacity.
    pub manual_capacity_liters: Option<Liters>,
    pub is_manual_override: bool,
    pub quantity: Liters,
    pub total_cost: Decimal,
    pub snapshot: RateSnapshot,
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldEntry {
    pub id: EntryId,
    pub date: NaiveDate,
    pub location: YieldLocationId,
    pub current_reading: i64,
    pub previous_reading: i64,
    pub yield_liters: i64,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionEntry {
    pub id: EntryId,
    pub date: NaiveDate,
    pub location: ConsumptionLocationId,
    pub current_reading: i64,
    pub previous_reading: i64,
    pub consumption_liters: i64,
    pub comment: String,
}
