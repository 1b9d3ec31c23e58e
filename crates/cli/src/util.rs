use std::io::{self, Write};

use aqualedger_core::*;
use aqualedger_engine::request::parse_date;
use aqualedger_engine::{Ledger, LedgerError};
use chrono::NaiveDate;
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::CliError;

// ============================================================================
// Output
// ============================================================================

/// Print one JSON value to stdout. Nothing else goes to stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let stdout = io::stdout();
    Ok(aqualedger_io::json::write_report(value, stdout.lock())?)
}

/// Display width of a string, accounting for wide characters in location names.
pub(crate) fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncate a string to fit within `width` display columns, adding ".." if truncated.
pub(crate) fn truncate_display(s: &str, width: usize) -> String {
    if width < 3 {
        for ch in s.chars() {
            let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
            if cw <= width {
                return ch.to_string();
            }
        }
        return String::new();
    }

    if display_width(s) <= width {
        return s.to_string();
    }

    // Stop at width - 2 to leave room for ".."
    let budget = width - 2;
    let mut used = 0;
    let mut end_byte = 0;
    for (i, ch) in s.char_indices() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + cw > budget {
            end_byte = i;
            break;
        }
        used += cw;
        end_byte = i + ch.len_utf8();
    }

    format!("{}..", &s[..end_byte])
}

/// Pad or truncate a string to exactly `width` display columns.
pub(crate) fn pad_right(s: &str, width: usize) -> String {
    let sw = display_width(s);
    if sw > width {
        truncate_display(s, width)
    } else {
        format!("{}{}", s, " ".repeat(width - sw))
    }
}

const MAX_COL_WIDTH: usize = 32;

/// Plain-text table: header, dashed rule, rows. Columns size to content, capped.
pub(crate) fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| display_width(c))
                .chain(std::iter::once(display_width(h)))
                .max()
                .unwrap_or(0)
                .min(MAX_COL_WIDTH)
        })
        .collect();

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells.iter().zip(&widths).map(|(c, w)| pad_right(c, *w)).collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&line(headers.to_vec()));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&line(rule.iter().map(String::as_str).collect()));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write!(handle, "{}", render_table(headers, rows)).map_err(|e| CliError::io(e.to_string()))
}

// ============================================================================
// Arguments
// ============================================================================

pub(crate) fn date_arg(field: &str, value: &str) -> Result<NaiveDate, CliError> {
    Ok(parse_date(field, value)?)
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

// ============================================================================
// Lookups by name
// ============================================================================

pub(crate) fn source(ledger: &Ledger, name: &str, kind: SourceKind) -> Result<SourceId, CliError> {
    ledger
        .source_by_name(name)
        .filter(|s| s.kind == kind)
        .map(|s| s.id)
        .ok_or_else(|| LedgerError::not_found(source_entity(kind), name).into())
}

fn source_entity(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Vendor => "vendor",
        SourceKind::Pipeline => "pipeline",
        SourceKind::InternalBore | SourceKind::InternalWell => "source",
    }
}

pub(crate) fn location(ledger: &Ledger, name: &str) -> Result<LocationId, CliError> {
    ledger
        .location_by_name(name)
        .map(|l| l.id)
        .ok_or_else(|| LedgerError::not_found("location", name).into())
}

pub(crate) fn vehicle(ledger: &Ledger, name: &str) -> Result<VehicleId, CliError> {
    ledger
        .vehicle_by_name(name)
        .map(|v| v.id)
        .ok_or_else(|| LedgerError::not_found("vehicle", name).into())
}

pub(crate) fn yield_location(ledger: &Ledger, name: &str) -> Result<YieldLocationId, CliError> {
    ledger
        .yield_location_by_name(name)
        .map(|l| l.id)
        .ok_or_else(|| LedgerError::not_found("yield location", name).into())
}

pub(crate) fn consumption_location(
    ledger: &Ledger,
    name: &str,
    kind: ConsumptionType,
) -> Result<ConsumptionLocationId, CliError> {
    ledger
        .consumption_location_by_name(name, kind)
        .map(|l| l.id)
        .ok_or_else(|| LedgerError::not_found("consumption location", format!("{name} ({kind})")).into())
}

pub(crate) fn category(ledger: &Ledger, name: &str) -> Result<CategoryId, CliError> {
    ledger
        .categories()
        .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
        .map(|c| c.id)
        .ok_or_else(|| LedgerError::not_found("category", name).into())
}
