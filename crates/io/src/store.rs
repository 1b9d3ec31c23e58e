// Ledger file: one SQLite database per ledger

use std::path::{Path, PathBuf};
use std::str::FromStr;

use aqualedger_core::*;
use aqualedger_engine::{IdSequences, Ledger, LedgerParts};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::LEDGER_FORMAT_VERSION;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,            -- Internal_Bore, Internal_Well, Pipeline, Vendor
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    location_type TEXT NOT NULL,   -- 'Loading' marks a loading point
    active INTEGER NOT NULL DEFAULT 1,
    sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS vehicles (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    capacity_liters TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS yield_locations (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    yield_type TEXT NOT NULL,
    is_manual_yield INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1,
    sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    student_count INTEGER NOT NULL DEFAULT 0,
    second_count INTEGER NOT NULL DEFAULT 0,
    has_student_count INTEGER NOT NULL DEFAULT 0,
    is_excluded INTEGER NOT NULL DEFAULT 0,
    exclude_value INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS consumption_locations (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    consumption_type TEXT NOT NULL,
    category_id INTEGER,           -- NULL = uncategorized
    active INTEGER NOT NULL DEFAULT 1,
    sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS rates (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,            -- vendor, internal, pipeline, general
    effective_date TEXT NOT NULL,
    body TEXT NOT NULL             -- JSON rate record
);

CREATE TABLE IF NOT EXISTS movements (
    id INTEGER PRIMARY KEY,
    entry_date TEXT NOT NULL,
    source_type TEXT NOT NULL,     -- vendor, pipeline, internal
    source_id INTEGER,
    vehicle_id INTEGER,
    loading_location_id INTEGER,
    unloading_location_id INTEGER,
    shift TEXT,
    water_type TEXT NOT NULL,
    load_count INTEGER NOT NULL,
    meter_current INTEGER,
    meter_previous INTEGER,
    manual_capacity_liters TEXT,
    is_manual_override INTEGER NOT NULL DEFAULT 0,
    quantity_liters TEXT NOT NULL,
    total_cost TEXT NOT NULL,
    rate_id INTEGER,
    cost_per_liter TEXT,
    cost_per_kl TEXT,
    comments TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS yields (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    location_id INTEGER NOT NULL,
    current_reading INTEGER NOT NULL,
    previous_reading INTEGER NOT NULL,
    yield_liters INTEGER NOT NULL,
    comment TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS consumptions (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    location_id INTEGER NOT NULL,
    current_reading INTEGER NOT NULL,
    previous_reading INTEGER NOT NULL,
    consumption_liters INTEGER NOT NULL,
    comment TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS sequences (
    name TEXT PRIMARY KEY,         -- table whose ids it issues
    last_id INTEGER NOT NULL       -- never decreases, even after deletes
);

CREATE INDEX IF NOT EXISTS idx_movements_date ON movements (entry_date);
CREATE INDEX IF NOT EXISTS idx_yields_location ON yields (location_id, date);
CREATE INDEX IF NOT EXISTS idx_consumptions_location ON consumptions (location_id, date);
"#;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

fn parse_col<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_col<T>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        t.parse::<T>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn date_text(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn id_col(row: &Row, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn opt_id_col(row: &Row, idx: usize) -> rusqlite::Result<Option<u64>> {
    let raw: Option<i64> = row.get(idx)?;
    raw.map(|r| {
        u64::try_from(r).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
    })
    .transpose()
}

fn missing(idx: usize, what: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Null,
        format!("{what} is required for this source type").into(),
    )
}

fn sql_id(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

/// Write the whole ledger to `path`. The file is built next to the target
/// and renamed over it, so a failed save leaves the previous file intact.
pub fn save(ledger: &Ledger, path: &Path) -> Result<(), StoreError> {
    let parts = ledger.to_parts();
    let tmp = temp_path(path);
    if tmp.exists() {
        std::fs::remove_file(&tmp)?;
    }

    let result = write_parts(&parts, &tmp);
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)?;
    info!(
        path = %path.display(),
        movements = parts.movements.len(),
        yields = parts.yields.len(),
        consumptions = parts.consumptions.len(),
        rates = parts.rates.len(),
        "ledger saved"
    );
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_parts(parts: &LedgerParts, path: &Path) -> Result<(), StoreError> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)",
        params!["format_version", LEDGER_FORMAT_VERSION.to_string()],
    )?;

    {
        let mut stmt = tx.prepare("INSERT INTO sources (id, name, kind, active) VALUES (?1, ?2, ?3, ?4)")?;
        for s in &parts.sources {
            stmt.execute(params![sql_id(s.id.0), s.name, s.kind.label(), s.active])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO locations (id, name, location_type, active, sort_order) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for l in &parts.locations {
            stmt.execute(params![sql_id(l.id.0), l.name, l.location_type, l.active, l.sort_order])?;
        }

        let mut stmt = tx.prepare("INSERT INTO vehicles (id, name, capacity_liters) VALUES (?1, ?2, ?3)")?;
        for v in &parts.vehicles {
            stmt.execute(params![sql_id(v.id.0), v.name, v.capacity.value().to_string()])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO yield_locations (id, name, yield_type, is_manual_yield, active, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for l in &parts.yield_locations {
            stmt.execute(params![
                sql_id(l.id.0),
                l.name,
                l.yield_type.label(),
                l.is_manual_yield,
                l.active,
                l.sort_order
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO categories (id, name, active, student_count, second_count, has_student_count, is_excluded, exclude_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for c in &parts.categories {
            stmt.execute(params![
                sql_id(c.id.0),
                c.name,
                c.active,
                c.student_count,
                c.second_count,
                c.has_student_count,
                c.is_excluded,
                c.exclude_value
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO consumption_locations (id, name, consumption_type, category_id, active, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for l in &parts.consumption_locations {
            stmt.execute(params![
                sql_id(l.id.0),
                l.name,
                l.consumption_type.label(),
                l.category.map(|c| sql_id(c.0)),
                l.active,
                l.sort_order
            ])?;
        }

        let mut stmt =
            tx.prepare("INSERT INTO rates (id, kind, effective_date, body) VALUES (?1, ?2, ?3, ?4)")?;
        for r in &parts.rates {
            let kind = match r {
                RateRecord::Vendor(_) => "vendor",
                RateRecord::Internal(_) => "internal",
                RateRecord::Pipeline(_) => "pipeline",
                RateRecord::General(_) => "general",
            };
            stmt.execute(params![
                sql_id(r.id().0),
                kind,
                date_text(r.effective_date()),
                serde_json::to_string(r)?
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO movements (id, entry_date, source_type, source_id, vehicle_id, loading_location_id,
                unloading_location_id, shift, water_type, load_count, meter_current, meter_previous,
                manual_capacity_liters, is_manual_override, quantity_liters, total_cost, rate_id,
                cost_per_liter, cost_per_kl, comments)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        )?;
        for m in &parts.movements {
            stmt.execute(params![
                sql_id(m.id.0),
                date_text(m.entry_date),
                m.source.type_label(),
                m.source.source_id().map(|s| sql_id(s.0)),
                m.source.vehicle_id().map(|v| sql_id(v.0)),
                m.loading_location.map(|l| sql_id(l.0)),
                m.unloading_location.map(|l| sql_id(l.0)),
                m.shift.map(|s| s.label()),
                m.water_type.label(),
                m.load_count,
                m.meter_current,
                m.meter_previous,
                m.manual_capacity_liters.map(|c| c.value().to_string()),
                m.is_manual_override,
                m.quantity.value().to_string(),
                m.total_cost.to_string(),
                m.snapshot.rate_id.map(|r| sql_id(r.0)),
                m.snapshot.cost_per_liter.map(|d| d.to_string()),
                m.snapshot.cost_per_kl.map(|d| d.to_string()),
                m.comments
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO yields (id, date, location_id, current_reading, previous_reading, yield_liters, comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for y in &parts.yields {
            stmt.execute(params![
                sql_id(y.id.0),
                date_text(y.date),
                sql_id(y.location.0),
                y.current_reading,
                y.previous_reading,
                y.yield_liters,
                y.comment
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO consumptions (id, date, location_id, current_reading, previous_reading, consumption_liters, comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for c in &parts.consumptions {
            stmt.execute(params![
                sql_id(c.id.0),
                date_text(c.date),
                sql_id(c.location.0),
                c.current_reading,
                c.previous_reading,
                c.consumption_liters,
                c.comment
            ])?;
        }

        let mut stmt = tx.prepare("INSERT INTO sequences (name, last_id) VALUES (?1, ?2)")?;
        for (name, last_id) in parts.sequences.named() {
            stmt.execute(params![name, sql_id(last_id)])?;
        }
    }

    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read a ledger file. A missing file is an empty ledger.
pub fn load(path: &Path) -> Result<Ledger, StoreError> {
    if !path.exists() {
        debug!(path = %path.display(), "no ledger file, starting empty");
        return Ok(Ledger::new());
    }
    let conn = Connection::open(path)?;
    let version: u32 = conn
        .query_row("SELECT value FROM meta WHERE key = 'format_version'", [], |row| parse_col(row, 0))
        .unwrap_or(1);
    if version > LEDGER_FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion { found: version, supported: LEDGER_FORMAT_VERSION });
    }

    let parts = read_parts(&conn)?;
    info!(
        path = %path.display(),
        movements = parts.movements.len(),
        yields = parts.yields.len(),
        consumptions = parts.consumptions.len(),
        "ledger loaded"
    );
    Ok(Ledger::from_parts(parts)?)
}

fn collect<T>(
    conn: &Connection,
    sql: &str,
    map: impl FnMut(&Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map)?;
    Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
}

fn read_parts(conn: &Connection) -> Result<LedgerParts, StoreError> {
    let sources = collect(conn, "SELECT id, name, kind, active FROM sources ORDER BY id", |row| {
        Ok(Source {
            id: SourceId(id_col(row, 0)?),
            name: row.get(1)?,
            kind: parse_col(row, 2)?,
            active: row.get(3)?,
        })
    })?;

    let locations = collect(
        conn,
        "SELECT id, name, location_type, active, sort_order FROM locations ORDER BY id",
        |row| {
            Ok(Location {
                id: LocationId(id_col(row, 0)?),
                name: row.get(1)?,
                location_type: row.get(2)?,
                active: row.get(3)?,
                sort_order: row.get(4)?,
            })
        },
    )?;

    let vehicles = collect(conn, "SELECT id, name, capacity_liters FROM vehicles ORDER BY id", |row| {
        Ok(InternalVehicle {
            id: VehicleId(id_col(row, 0)?),
            name: row.get(1)?,
            capacity: Liters(parse_col(row, 2)?),
        })
    })?;

    let yield_locations = collect(
        conn,
        "SELECT id, name, yield_type, is_manual_yield, active, sort_order FROM yield_locations ORDER BY id",
        |row| {
            Ok(YieldLocation {
                id: YieldLocationId(id_col(row, 0)?),
                name: row.get(1)?,
                yield_type: parse_col(row, 2)?,
                is_manual_yield: row.get(3)?,
                active: row.get(4)?,
                sort_order: row.get(5)?,
            })
        },
    )?;

    let categories = collect(
        conn,
        "SELECT id, name, active, student_count, second_count, has_student_count, is_excluded, exclude_value
         FROM categories ORDER BY id",
        |row| {
            Ok(Category {
                id: CategoryId(id_col(row, 0)?),
                name: row.get(1)?,
                active: row.get(2)?,
                student_count: row.get(3)?,
                second_count: row.get(4)?,
                has_student_count: row.get(5)?,
                is_excluded: row.get(6)?,
                exclude_value: row.get(7)?,
            })
        },
    )?;

    let consumption_locations = collect(
        conn,
        "SELECT id, name, consumption_type, category_id, active, sort_order FROM consumption_locations ORDER BY id",
        |row| {
            Ok(ConsumptionLocation {
                id: ConsumptionLocationId(id_col(row, 0)?),
                name: row.get(1)?,
                consumption_type: parse_col(row, 2)?,
                category: opt_id_col(row, 3)?.map(CategoryId),
                active: row.get(4)?,
                sort_order: row.get(5)?,
            })
        },
    )?;

    let bodies: Vec<String> = collect(conn, "SELECT body FROM rates ORDER BY id", |row| row.get(0))?;
    let rates = bodies
        .iter()
        .map(|b| serde_json::from_str::<RateRecord>(b))
        .collect::<Result<Vec<_>, _>>()?;

    let movements = collect(
        conn,
        "SELECT id, entry_date, source_type, source_id, vehicle_id, loading_location_id,
                unloading_location_id, shift, water_type, load_count, meter_current, meter_previous,
                manual_capacity_liters, is_manual_override, quantity_liters, total_cost, rate_id,
                cost_per_liter, cost_per_kl, comments
         FROM movements ORDER BY id",
        |row| {
            let source_type: String = row.get(2)?;
            let source_id = opt_id_col(row, 3)?.map(SourceId);
            let vehicle_id = opt_id_col(row, 4)?.map(VehicleId);
            let loading_location = opt_id_col(row, 5)?.map(LocationId);
            let source = match source_type.as_str() {
                "vendor" => SourceRef::Vendor { source: source_id.ok_or_else(|| missing(3, "source_id"))? },
                "pipeline" => SourceRef::Pipeline { source: source_id.ok_or_else(|| missing(3, "source_id"))? },
                "internal" => SourceRef::Internal {
                    vehicle: vehicle_id.ok_or_else(|| missing(4, "vehicle_id"))?,
                    loading_location: loading_location.ok_or_else(|| missing(5, "loading_location_id"))?,
                },
                other => {
                    return Err(rusqlite::Error::FromSqlConversionFailure(
                        2,
                        Type::Text,
                        format!("unknown source type '{other}'").into(),
                    ))
                }
            };
            Ok(MovementEntry {
                id: EntryId(id_col(row, 0)?),
                entry_date: parse_col(row, 1)?,
                source,
                loading_location,
                unloading_location: opt_id_col(row, 6)?.map(LocationId),
                shift: parse_opt_col(row, 7)?,
                water_type: parse_col(row, 8)?,
                load_count: row.get(9)?,
                meter_current: row.get(10)?,
                meter_previous: row.get(11)?,
                manual_capacity_liters: parse_opt_col::<Decimal>(row, 12)?.map(Liters),
                is_manual_override: row.get(13)?,
                quantity: Liters(parse_col(row, 14)?),
                total_cost: parse_col(row, 15)?,
                snapshot: RateSnapshot {
                    rate_id: opt_id_col(row, 16)?.map(RateId),
                    cost_per_liter: parse_opt_col(row, 17)?,
                    cost_per_kl: parse_opt_col(row, 18)?,
                },
                comments: row.get(19)?,
            })
        },
    )?;

    let yields = collect(
        conn,
        "SELECT id, date, location_id, current_reading, previous_reading, yield_liters, comment
         FROM yields ORDER BY id",
        |row| {
            Ok(YieldEntry {
                id: EntryId(id_col(row, 0)?),
                date: parse_col(row, 1)?,
                location: YieldLocationId(id_col(row, 2)?),
                current_reading: row.get(3)?,
                previous_reading: row.get(4)?,
                yield_liters: row.get(5)?,
                comment: row.get(6)?,
            })
        },
    )?;

    let consumptions = collect(
        conn,
        "SELECT id, date, location_id, current_reading, previous_reading, consumption_liters, comment
         FROM consumptions ORDER BY id",
        |row| {
            Ok(ConsumptionEntry {
                id: EntryId(id_col(row, 0)?),
                date: parse_col(row, 1)?,
                location: ConsumptionLocationId(id_col(row, 2)?),
                current_reading: row.get(3)?,
                previous_reading: row.get(4)?,
                consumption_liters: row.get(5)?,
                comment: row.get(6)?,
            })
        },
    )?;

    let sequences = read_sequences(conn)?;

    Ok(LedgerParts {
        sources,
        locations,
        vehicles,
        yield_locations,
        consumption_locations,
        categories,
        rates,
        movements,
        yields,
        consumptions,
        sequences,
    })
}

/// Files written before id counters were stored have no `sequences` table;
/// `Ledger::from_parts` then derives the counters from the highest ids.
fn read_sequences(conn: &Connection) -> Result<IdSequences, StoreError> {
    let present: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sequences')",
        [],
        |row| row.get(0),
    )?;
    let mut sequences = IdSequences::default();
    if !present {
        return Ok(sequences);
    }
    let rows = collect(conn, "SELECT name, last_id FROM sequences", |row| {
        Ok((row.get::<_, String>(0)?, id_col(row, 1)?))
    })?;
    for (name, last_id) in rows {
        if !sequences.set_named(&name, last_id) {
            debug!(table = %name, "ignoring unknown id sequence");
        }
    }
    Ok(sequences)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = load(&dir.path().join("none.aqua")).unwrap();
        assert!(ledger.movements().next().is_none());
    }

    #[test]
    fn newer_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.aqua");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute("INSERT INTO meta (key, value) VALUES ('format_version', '99')", []).unwrap();
        drop(conn);
        assert!(matches!(load(&path), Err(StoreError::UnsupportedVersion { found: 99, .. })));
    }

    #[test]
    fn file_without_sequences_table_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.aqua");
        let mut ledger = Ledger::new();
        ledger.add_source("Corporation", SourceKind::Pipeline).unwrap();
        save(&ledger, &path).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("DROP TABLE sequences").unwrap();
        drop(conn);

        let mut back = load(&path).unwrap();
        assert_eq!(back.sequences().sources, 1);
        assert_eq!(back.add_source("Vendor A", SourceKind::Vendor).unwrap().id, SourceId(2));
    }

    #[test]
    fn temp_path_is_sibling() {
        let p = temp_path(Path::new("/data/campus.aqua"));
        assert_eq!(p, Path::new("/data/campus.aqua.tmp"));
    }
}
