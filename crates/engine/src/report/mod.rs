//! Aggregation/Reporting Engine.
//!
//! Reports only read stored quantities and totals; nothing here recomputes
//! a cost or a meter delta.

pub mod aggregate;
pub mod dashboard;
pub mod movement;
pub mod rates;
pub mod readings;

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::request::parse_optional_date;

pub use aggregate::{aggregate, Aggregation, BucketSummary, Categorize, Totals, WaterCategories};
pub use dashboard::{dashboard, multi_month, Dashboard, LoadSizes, MultiMonth};
pub use movement::{
    capacity_utilization, cost_comparison, default_trend_range, site_consumption, site_detail,
    summary, vehicle_utilization, vendor_detail, vendor_usage, water_type_consumption,
};
pub use rates::{rate_details, RateDetails};
pub use readings::{category_monthly_breakdown, daily_normal_consumption, daily_yield, MonthBreakdown};

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

/// Inclusive date filter; an absent bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, LedgerError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(LedgerError::invalid(format!(
                    "start_date {s} is after end_date {e}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Parse optional `start_date` / `end_date` strings.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, LedgerError> {
        Self::new(
            parse_optional_date("start_date", start)?,
            parse_optional_date("end_date", end)?,
        )
    }

    /// January 1 of `start_year` through December 31 of `end_year`.
    pub fn years(start_year: Option<i32>, end_year: Option<i32>) -> Result<Self, LedgerError> {
        let first = |y: i32| {
            NaiveDate::from_ymd_opt(y, 1, 1)
                .ok_or_else(|| LedgerError::invalid(format!("year out of range: {y}")))
        };
        let last = |y: i32| {
            NaiveDate::from_ymd_opt(y, 12, 31)
                .ok_or_else(|| LedgerError::invalid(format!("year out of range: {y}")))
        };
        Self::new(start_year.map(first).transpose()?, end_year.map(last).transpose()?)
    }

    pub fn month(year: i32, month: u32) -> Result<Self, LedgerError> {
        let (first, last) = month_bounds(year, month)
            .ok_or_else(|| LedgerError::invalid(format!("no such month: {year}-{month:02}")))?;
        Ok(Self { start: Some(first), end: Some(last) })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((first, last))
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    month_bounds(year, month).map_or(0, |(_, last)| last.day())
}

/// Months touched by `[start, end]`, as (year, month).
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<(i32, u32)> {
    let mut out = Vec::new();
    let mut cur = start.with_day(1);
    while let Some(d) = cur {
        if d > end {
            break;
        }
        out.push((d.year(), d.month()));
        cur = d.checked_add_months(Months::new(1));
    }
    out
}

// ---------------------------------------------------------------------------
// Granularity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Month,
    Year,
}

impl Granularity {
    /// Bucket key: `YYYY-MM-DD`, `YYYY-MM` or `YYYY`. Keys sort chronologically.
    pub fn key(self, date: NaiveDate) -> String {
        match self {
            Granularity::Day => date.format("%Y-%m-%d").to_string(),
            Granularity::Month => date.format("%Y-%m").to_string(),
            Granularity::Year => date.format("%Y").to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Month => write!(f, "month"),
            Granularity::Year => write!(f, "year"),
        }
    }
}

impl FromStr for Granularity {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "month" | "monthly" => Ok(Granularity::Month),
            "year" | "yearly" => Ok(Granularity::Year),
            other => Err(LedgerError::invalid(format!("unknown granularity '{other}'"))),
        }
    }
}
