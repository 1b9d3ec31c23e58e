// CSV import (rate sheets, bulk readings) and export (movements, report rows)

use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use aqualedger_core::money::{to_report, CURRENCY_DP};
use aqualedger_core::*;
use aqualedger_engine::ledger::{BulkConsumptionRow, BulkOutcome, BulkYieldRow};
use aqualedger_engine::rates::{GeneralRateDraft, InternalRateDraft, PipelineRateDraft, VendorRateDraft};
use aqualedger_engine::report::DateRange;
use aqualedger_engine::request::parse_date;
use aqualedger_engine::Ledger;
use chrono::NaiveDate;
use csv::StringRecord;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::StoreError;

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, StoreError> {
    let mut file = std::fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    // Try UTF-8 first; on failure, recover the buffer from the error
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            // Sheets saved from Excel are often Windows-1252
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Lines agreeing with line 1, weighted by field count
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

fn normalize_header(h: &str) -> String {
    h.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

/// Deserialize every data row with normalized headers, tagging each with its line.
fn read_rows<T: DeserializeOwned>(content: &str) -> Result<Vec<(u64, T)>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers: StringRecord = reader.headers()?.iter().map(normalize_header).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(0, |p| p.line());
        let row = record
            .deserialize::<T>(Some(&headers))
            .map_err(|e| StoreError::import(line, e.to_string()))?;
        rows.push((line, row));
    }
    Ok(rows)
}

fn decimal(line: u64, field: &str, value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value.trim())
        .map_err(|_| StoreError::import(line, format!("{field}: '{value}' is not a number")))
}

fn date(line: u64, field: &'static str, value: &str) -> Result<NaiveDate, StoreError> {
    parse_date(field, value).map_err(|e| StoreError::import(line, e.to_string()))
}

fn label<T>(line: u64, value: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| StoreError::import(line, e.to_string()))
}

fn at_line<T>(line: u64, result: Result<T, aqualedger_engine::LedgerError>) -> Result<T, StoreError> {
    result.map_err(|e| StoreError::import(line, e.to_string()))
}

// ---------------------------------------------------------------------------
// Rate sheets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct VendorRateRow {
    vendor: String,
    water_type: String,
    cost_basis: String,
    rate_value: String,
    #[serde(default)]
    vehicle_capacity: Option<String>,
    effective_date: String,
}

#[derive(Debug, Deserialize)]
struct InternalRateRow {
    vehicle: String,
    loading_location: String,
    cost_per_load: String,
    effective_date: String,
}

#[derive(Debug, Deserialize)]
struct PipelineRateRow {
    source: String,
    cost_per_liter: String,
    effective_date: String,
}

#[derive(Debug, Deserialize)]
struct GeneralRateRow {
    #[serde(default)]
    entry_date: Option<String>,
    effective_date: String,
    normal_water_rate: String,
    drinking_water_rate: String,
}

/// Import a vendor rate sheet: `vendor, water_type, cost_basis, rate_value,
/// vehicle_capacity, effective_date`. All rows or none.
pub fn import_vendor_rates(ledger: &mut Ledger, content: &str) -> Result<usize, StoreError> {
    let rows: Vec<(u64, VendorRateRow)> = read_rows(content)?;
    let mut scratch = ledger.clone();
    for (line, row) in &rows {
        let line = *line;
        let vendor = scratch
            .source_by_name(&row.vendor)
            .filter(|s| s.kind == SourceKind::Vendor)
            .map(|s| s.id)
            .ok_or_else(|| StoreError::import(line, format!("unknown vendor '{}'", row.vendor)))?;
        let draft = VendorRateDraft {
            source: vendor,
            water_type: label(line, &row.water_type)?,
            cost_basis: label(line, &row.cost_basis)?,
            rate_value: decimal(line, "rate_value", &row.rate_value)?,
            vehicle_capacity: row
                .vehicle_capacity
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| decimal(line, "vehicle_capacity", v).map(Liters))
                .transpose()?,
            effective_date: date(line, "effective_date", &row.effective_date)?,
        };
        at_line(line, scratch.add_vendor_rate(draft))?;
    }
    *ledger = scratch;
    info!(rows = rows.len(), "vendor rates imported");
    Ok(rows.len())
}

/// `vehicle, loading_location, cost_per_load, effective_date`.
pub fn import_internal_rates(ledger: &mut Ledger, content: &str) -> Result<usize, StoreError> {
    let rows: Vec<(u64, InternalRateRow)> = read_rows(content)?;
    let mut scratch = ledger.clone();
    for (line, row) in &rows {
        let line = *line;
        let vehicle = scratch
            .vehicle_by_name(&row.vehicle)
            .map(|v| v.id)
            .ok_or_else(|| StoreError::import(line, format!("unknown vehicle '{}'", row.vehicle)))?;
        let loading_location = scratch
            .location_by_name(&row.loading_location)
            .map(|l| l.id)
            .ok_or_else(|| {
                StoreError::import(line, format!("unknown location '{}'", row.loading_location))
            })?;
        let draft = InternalRateDraft {
            vehicle,
            loading_location,
            cost_per_load: decimal(line, "cost_per_load", &row.cost_per_load)?,
            effective_date: date(line, "effective_date", &row.effective_date)?,
        };
        at_line(line, scratch.add_internal_rate(draft))?;
    }
    *ledger = scratch;
    info!(rows = rows.len(), "internal vehicle rates imported");
    Ok(rows.len())
}

/// `source, cost_per_liter, effective_date`.
pub fn import_pipeline_rates(ledger: &mut Ledger, content: &str) -> Result<usize, StoreError> {
    let rows: Vec<(u64, PipelineRateRow)> = read_rows(content)?;
    let mut scratch = ledger.clone();
    for (line, row) in &rows {
        let line = *line;
        let source = scratch
            .source_by_name(&row.source)
            .filter(|s| s.kind == SourceKind::Pipeline)
            .map(|s| s.id)
            .ok_or_else(|| StoreError::import(line, format!("unknown pipeline '{}'", row.source)))?;
        let draft = PipelineRateDraft {
            source,
            cost_per_liter: decimal(line, "cost_per_liter", &row.cost_per_liter)?,
            effective_date: date(line, "effective_date", &row.effective_date)?,
        };
        at_line(line, scratch.add_pipeline_rate(draft))?;
    }
    *ledger = scratch;
    info!(rows = rows.len(), "pipeline rates imported");
    Ok(rows.len())
}

/// `entry_date, effective_date, normal_water_rate, drinking_water_rate`.
/// A blank entry date takes the effective date.
pub fn import_general_rates(ledger: &mut Ledger, content: &str) -> Result<usize, StoreError> {
    let rows: Vec<(u64, GeneralRateRow)> = read_rows(content)?;
    let mut scratch = ledger.clone();
    for (line, row) in &rows {
        let line = *line;
        let effective_date = date(line, "effective_date", &row.effective_date)?;
        let entry_date = match row.entry_date.as_deref().filter(|v| !v.is_empty()) {
            Some(v) => date(line, "entry_date", v)?,
            None => effective_date,
        };
        let draft = GeneralRateDraft {
            entry_date,
            effective_date,
            normal_water_rate: decimal(line, "normal_water_rate", &row.normal_water_rate)?,
            drinking_water_rate: decimal(line, "drinking_water_rate", &row.drinking_water_rate)?,
        };
        at_line(line, scratch.add_general_rate(draft))?;
    }
    *ledger = scratch;
    info!(rows = rows.len(), "general water rates imported");
    Ok(rows.len())
}

// ---------------------------------------------------------------------------
// Bulk readings
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct YieldReadingRow {
    location: String,
    #[serde(default)]
    current_reading: Option<i64>,
    #[serde(default)]
    yield_liters: Option<i64>,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
struct ConsumptionReadingRow {
    location: String,
    #[serde(default)]
    consumption_type: Option<String>,
    #[serde(default)]
    current_reading: Option<i64>,
    #[serde(default)]
    comment: String,
}

/// One day of yield readings by location name: `location, current_reading,
/// yield_liters, comment`.
pub fn import_yield_readings(
    ledger: &mut Ledger,
    date: NaiveDate,
    content: &str,
) -> Result<BulkOutcome, StoreError> {
    let rows: Vec<(u64, YieldReadingRow)> = read_rows(content)?;
    let bulk = rows
        .into_iter()
        .map(|(line, row)| {
            let location = ledger
                .yield_location_by_name(&row.location)
                .map(|l| l.id)
                .ok_or_else(|| StoreError::import(line, format!("unknown yield location '{}'", row.location)))?;
            Ok(BulkYieldRow {
                location,
                current_reading: row.current_reading,
                yield_liters: row.yield_liters,
                comment: row.comment,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(ledger.bulk_yield(date, bulk)?)
}

/// One day of consumption readings: `location, consumption_type, current_reading,
/// comment`. A blank type means Normal.
pub fn import_consumption_readings(
    ledger: &mut Ledger,
    date: NaiveDate,
    content: &str,
) -> Result<BulkOutcome, StoreError> {
    let rows: Vec<(u64, ConsumptionReadingRow)> = read_rows(content)?;
    let bulk = rows
        .into_iter()
        .map(|(line, row)| {
            let kind = match row.consumption_type.as_deref().filter(|v| !v.is_empty()) {
                Some(v) => label(line, v)?,
                None => ConsumptionType::Normal,
            };
            let location = ledger
                .consumption_location_by_name(&row.location, kind)
                .map(|l| l.id)
                .ok_or_else(|| {
                    StoreError::import(line, format!("unknown {kind} consumption location '{}'", row.location))
                })?;
            Ok(BulkConsumptionRow { location, current_reading: row.current_reading, comment: row.comment })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(ledger.bulk_consumption(date, bulk)?)
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MovementRow<'a> {
    id: u64,
    entry_date: String,
    source_type: &'static str,
    source: String,
    vehicle: String,
    loading_location: String,
    unloading_location: String,
    shift: &'static str,
    water_type: &'static str,
    load_count: u32,
    meter_previous: Option<i64>,
    meter_current: Option<i64>,
    quantity_liters: String,
    quantity_kl: String,
    total_cost: f64,
    rate_id: Option<u64>,
    cost_per_liter: Option<String>,
    cost_per_kl: Option<String>,
    comments: &'a str,
}

/// Write movements in `range` as CSV. Returns the number of rows written.
pub fn export_movements<W: Write>(ledger: &Ledger, range: &DateRange, out: W) -> Result<usize, StoreError> {
    let mut writer = csv::Writer::from_writer(out);
    let location = |id: Option<LocationId>| {
        id.and_then(|id| ledger.location(id).ok())
            .map(|l| l.name.clone())
            .unwrap_or_default()
    };
    let mut count = 0;
    for m in ledger.movements().filter(|m| range.contains(m.entry_date)) {
        let source = m
            .source
            .source_id()
            .and_then(|id| ledger.source(id).ok())
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let vehicle = m
            .source
            .vehicle_id()
            .and_then(|id| ledger.vehicle(id).ok())
            .map(|v| v.name.clone())
            .unwrap_or_default();
        writer.serialize(MovementRow {
            id: m.id.0,
            entry_date: m.entry_date.format("%Y-%m-%d").to_string(),
            source_type: m.source.type_label(),
            source,
            vehicle,
            loading_location: location(m.loading_location),
            unloading_location: location(m.unloading_location),
            shift: m.shift.map_or("", |s| s.label()),
            water_type: m.water_type.label(),
            load_count: m.load_count,
            meter_previous: m.meter_previous,
            meter_current: m.meter_current,
            quantity_liters: m.quantity.value().normalize().to_string(),
            quantity_kl: m.quantity.to_kl().value().normalize().to_string(),
            total_cost: to_report(m.total_cost, CURRENCY_DP),
            rate_id: m.snapshot.rate_id.map(|r| r.0),
            cost_per_liter: m.snapshot.cost_per_liter.map(|d| d.to_string()),
            cost_per_kl: m.snapshot.cost_per_kl.map(|d| d.to_string()),
            comments: &m.comments,
        })?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                flatten_into(&key, v, out);
            }
        }
        Value::Null => out.push((prefix.to_string(), String::new())),
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Array(_) => out.push((prefix.to_string(), value.to_string())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

/// Rows of a report: an array becomes one row per element, an object of
/// objects one row per key (in a leading `key` column), any other object a
/// single row. Nested arrays are kept as JSON text.
fn report_rows(value: Value) -> Vec<Vec<(String, String)>> {
    let flat = |v: &Value| {
        let mut cells = Vec::new();
        flatten_into("", v, &mut cells);
        cells
    };
    match value {
        Value::Array(items) => items.iter().map(flat).collect(),
        Value::Object(map) if !map.is_empty() && map.values().all(Value::is_object) => map
            .iter()
            .map(|(k, v)| {
                let mut cells = vec![("key".to_string(), k.clone())];
                cells.extend(flat(v));
                cells
            })
            .collect(),
        obj @ Value::Object(_) => vec![flat(&obj)],
        other => vec![flat(&Value::Object(Map::from_iter([("value".to_string(), other)])))],
    }
}

/// Write any serializable report row set as CSV with dotted column names.
/// The header is the union of columns in first-seen order.
pub fn export_report<T: Serialize, W: Write>(report: &T, out: W) -> Result<usize, StoreError> {
    let rows = report_rows(serde_json::to_value(report)?);
    let mut header: Vec<String> = Vec::new();
    for row in &rows {
        for (k, _) in row {
            if !header.contains(k) {
                header.push(k.clone());
            }
        }
    }

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&header)?;
    for row in &rows {
        let record: Vec<&str> = header
            .iter()
            .map(|h| row.iter().find(|(k, _)| k == h).map_or("", |(_, v)| v.as_str()))
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(rows.len())
}
