//! Boundary DTOs: the cost preview request and date parsing.
//!
//! Input validation happens here, before anything reaches the resolver.

use aqualedger_core::money::{to_report, CURRENCY_DP};
use aqualedger_core::*;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cost::{CostPath, CostQuery};
use crate::error::LedgerError;
use crate::ledger::Ledger;

/// Parse a `YYYY-MM-DD` field.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| LedgerError::InvalidDate {
        field: field.to_string(),
        value: value.to_string(),
    })
}

pub fn parse_optional_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, LedgerError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_date(field, v).map(Some),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Vendor,
    Pipeline,
    Internal,
}

/// Cost preview request.
///
/// For pipeline sources `quantity_liters` carries the kiloliters read off
/// the meter, and is converted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRequest {
    pub source_type: SourceType,
    #[serde(default)]
    pub source_id: Option<u64>,
    #[serde(default)]
    pub vehicle_id: Option<u64>,
    #[serde(default)]
    pub loading_location_id: Option<u64>,
    #[serde(default)]
    pub water_type: Option<String>,
    #[serde(default)]
    pub quantity_liters: f64,
    #[serde(default)]
    pub load_count: Option<u32>,
    #[serde(default)]
    pub entry_date: Option<String>,
    #[serde(default)]
    pub is_manual_override: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostResponse {
    pub total_cost: f64,
    pub path: CostPath,
    pub rate_id: Option<RateId>,
}

fn required(field: &str, value: Option<u64>) -> Result<u64, LedgerError> {
    value.ok_or_else(|| LedgerError::invalid(format!("{field} is required")))
}

fn decimal(field: &str, value: f64) -> Result<Decimal, LedgerError> {
    if !value.is_finite() || value < 0.0 {
        return Err(LedgerError::invalid(format!("{field} must be a non-negative number")));
    }
    value
        .to_string()
        .parse::<Decimal>()
        .map_err(|_| LedgerError::invalid(format!("{field} is out of range: {value}")))
}

impl CostRequest {
    pub fn into_query(self) -> Result<CostQuery, LedgerError> {
        let entry_date = match self.entry_date.as_deref() {
            Some(v) => parse_date("entry_date", v)?,
            None => return Err(LedgerError::invalid("entry_date is required")),
        };
        let water_type = match self.water_type.as_deref().map(str::trim) {
            None | Some("") => WaterType::default(),
            Some(v) => v.parse::<WaterType>().map_err(|e| LedgerError::invalid(e.to_string()))?,
        };
        let amount = decimal("quantity_liters", self.quantity_liters)?;
        let (source, quantity) = match self.source_type {
            SourceType::Vendor => (
                SourceRef::Vendor { source: SourceId(required("source_id", self.source_id)?) },
                Liters(amount),
            ),
            SourceType::Pipeline => (
                SourceRef::Pipeline { source: SourceId(required("source_id", self.source_id)?) },
                Kiloliters(amount).to_liters(),
            ),
            SourceType::Internal => (
                SourceRef::Internal {
                    vehicle: VehicleId(required("vehicle_id", self.vehicle_id)?),
                    loading_location: LocationId(required(
                        "loading_location_id",
                        self.loading_location_id,
                    )?),
                },
                Liters(amount),
            ),
        };
        Ok(CostQuery {
            source,
            water_type,
            quantity,
            load_count: self.load_count.unwrap_or(1),
            entry_date,
            manual_override: self.is_manual_override,
        })
    }
}

impl Ledger {
    /// Validate a preview request and resolve its cost.
    pub fn preview(&self, request: CostRequest) -> Result<CostResponse, LedgerError> {
        let query = request.into_query()?;
        let outcome = self.preview_cost(&query)?;
        Ok(CostResponse {
            total_cost: to_report(outcome.total_cost, CURRENCY_DP),
            path: outcome.path,
            rate_id: outcome.snapshot.rate_id,
        })
    }
}
