//! `aqualedger-core` - domain types shared by the engine, the store and the CLI.
//!
//! Nothing in here performs IO or looks anything up; lookups and costing
//! live in `aqualedger-engine`.

pub mod entry;
pub mod ids;
pub mod master;
pub mod money;
pub mod rate;
pub mod units;

pub use entry::{ConsumptionEntry, MovementEntry, RateSnapshot, SourceRef, YieldEntry};
pub use ids::*;
pub use master::{
    Category, ConsumptionLocation, ConsumptionType, InternalVehicle, Location, ParseLabelError,
    Shift, Source, SourceKind, WaterType, YieldLocation, YieldType,
};
pub use rate::{
    CostBasis, GeneralWaterRate, InternalVehicleRate, PipelineRate, RateKey, RateRecord,
    VendorRate,
};
pub use units::{Kiloliters, Liters};
