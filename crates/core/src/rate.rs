//! Effective-dated rate records.
//!
//! Rate rows are append-only. Derived per-liter / per-kiloliter caches are
//! computed once when a row is entered and never rewritten.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::*;
use crate::master::WaterType;
use crate::money::round_rate;
use crate::units::{self, Liters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostBasis {
    #[serde(rename = "Per_Load")]
    PerLoad,
    #[serde(rename = "Per_Liter")]
    PerLiter,
}

impl std::str::FromStr for CostBasis {
    type Err = crate::master::ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "perload" | "load" => Ok(CostBasis::PerLoad),
            "perliter" | "perlitre" | "liter" => Ok(CostBasis::PerLiter),
            _ => Err(crate::master::ParseLabelError { kind: "cost basis", value: s.to_string() }),
        }
    }
}

// ---------------------------------------------------------------------------
// Vendor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorRate {
    pub id: RateId,
    pub source: SourceId,
    pub water_type: WaterType,
    pub cost_basis: CostBasis,
    pub rate_value: Decimal,
    pub vehicle_capacity: Option<Liters>,
    pub effective_date: NaiveDate,
    pub cached_cost_per_liter: Option<Decimal>,
    pub cached_cost_per_kl: Option<Decimal>,
}

impl VendorRate {
    /// Per-kiloliter cost derived from the basis, ignoring any cache.
    pub fn derived_cost_per_kl(&self) -> Option<Decimal> {
        match self.cost_basis {
            CostBasis::PerLiter => Some(units::cost_per_kl_from_liter(self.rate_value)),
            CostBasis::PerLoad => self
                .vehicle_capacity
                .and_then(|cap| units::cost_per_kl_from_load(self.rate_value, cap)),
        }
    }

    pub fn derived_cost_per_liter(&self) -> Option<Decimal> {
        match self.cost_basis {
            CostBasis::PerLiter => Some(self.rate_value),
            CostBasis::PerLoad => self
                .vehicle_capacity
                .and_then(|cap| units::cost_per_liter_from_load(self.rate_value, cap)),
        }
    }

    /// Cache when present, otherwise derived on the fly.
    pub fn effective_cost_per_kl(&self) -> Option<Decimal> {
        self.cached_cost_per_kl.or_else(|| self.derived_cost_per_kl())
    }

    pub fn effective_cost_per_liter(&self) -> Option<Decimal> {
        self.cached_cost_per_liter.or_else(|| self.derived_cost_per_liter())
    }

    /// Fill both caches from the basis, rounded to 4 places.
    pub fn with_computed_cache(mut self) -> Self {
        self.cached_cost_per_kl = self.derived_cost_per_kl().map(round_rate);
        self.cached_cost_per_liter = self.derived_cost_per_liter().map(round_rate);
        self
    }
}

// ---------------------------------------------------------------------------
// Internal vehicle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalVehicleRate {
    pub id: RateId,
    pub vehicle: VehicleId,
    pub loading_location: LocationId,
    pub cost_per_load: Decimal,
    pub effective_date: NaiveDate,
    /// Vehicle capacity when the rate was entered.
    pub capacity: Option<Liters>,
    pub cached_cost_per_liter: Option<Decimal>,
    pub cached_cost_per_kl: Option<Decimal>,
}

impl InternalVehicleRate {
    pub fn derived_cost_per_kl(&self) -> Option<Decimal> {
        self.capacity
            .and_then(|cap| units::cost_per_kl_from_load(self.cost_per_load, cap))
    }

    pub fn derived_cost_per_liter(&self) -> Option<Decimal> {
        self.capacity
            .and_then(|cap| units::cost_per_liter_from_load(self.cost_per_load, cap))
    }

    pub fn effective_cost_per_kl(&self) -> Option<Decimal> {
        self.cached_cost_per_kl.or_else(|| self.derived_cost_per_kl())
    }

    pub fn effective_cost_per_liter(&self) -> Option<Decimal> {
        self.cached_cost_per_liter.or_else(|| self.derived_cost_per_liter())
    }

    pub fn with_computed_cache(mut self) -> Self {
        self.cached_cost_per_kl = self.derived_cost_per_kl().map(round_rate);
        self.cached_cost_per_liter = self.derived_cost_per_liter().map(round_rate);
        self
    }
}

// ---------------------------------------------------------------------------
// Pipeline / general
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRate {
    pub id: RateId,
    pub source: SourceId,
    pub cost_per_liter: Decimal,
    pub effective_date: NaiveDate,
}

impl PipelineRate {
    pub fn cost_per_kl(&self) -> Decimal {
        units::cost_per_kl_from_liter(self.cost_per_liter)
    }
}

/// Campus-wide per-liter cost used to price consumption readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralWaterRate {
    pub id: RateId,
    /// Date the row was entered. Breaks ties between equal effective dates.
    pub entry_date: NaiveDate,
    pub effective_date: NaiveDate,
    pub normal_water_rate: Decimal,
    pub drinking_water_rate: Decimal,
}

impl GeneralWaterRate {
    pub fn rate_for(&self, water_type: WaterType) -> Decimal {
        match water_type {
            WaterType::Normal => self.normal_water_rate,
            WaterType::Drinking => self.drinking_water_rate,
        }
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Lookup key of an effective-dated history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateKey {
    Vendor { source: SourceId, water_type: WaterType },
    Internal { vehicle: VehicleId, loading_location: LocationId },
    Pipeline { source: SourceId },
    General,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateRecord {
    Vendor(VendorRate),
    Internal(InternalVehicleRate),
    Pipeline(PipelineRate),
    General(GeneralWaterRate),
}

impl RateRecord {
    pub fn id(&self) -> RateId {
        match self {
            RateRecord::Vendor(r) => r.id,
            RateRecord::Internal(r) => r.id,
            RateRecord::Pipeline(r) => r.id,
            RateRecord::General(r) => r.id,
        }
    }

    pub fn effective_date(&self) -> NaiveDate {
        match self {
            RateRecord::Vendor(r) => r.effective_date,
            RateRecord::Internal(r) => r.effective_date,
            RateRecord::Pipeline(r) => r.effective_date,
            RateRecord::General(r) => r.effective_date,
        }
    }

    /// Secondary ordering between rows sharing an effective date.
    pub fn entry_date(&self) -> Option<NaiveDate> {
        match self {
            RateRecord::General(r) => Some(r.entry_date),
            _ => None,
        }
    }

    pub fn key(&self) -> RateKey {
        match self {
            RateRecord::Vendor(r) => RateKey::Vendor { source: r.source, water_type: r.water_type },
            RateRecord::Internal(r) => RateKey::Internal {
                vehicle: r.vehicle,
                loading_location: r.loading_location,
            },
            RateRecord::Pipeline(r) => RateKey::Pipeline { source: r.source },
            RateRecord::General(_) => RateKey::General,
        }
    }

    pub fn as_vendor(&self) -> Option<&VendorRate> {
        match self {
            RateRecord::Vendor(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_internal(&self) -> Option<&InternalVehicleRate> {
        match self {
            RateRecord::Internal(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_pipeline(&self) -> Option<&PipelineRate> {
        match self {
            RateRecord::Pipeline(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_general(&self) -> Option<&GeneralWaterRate> {
        match self {
            RateRecord::General(r) => Some(r),
            _ => None,
        }
    }
}
