//! Yield and consumption write paths.
//!
//! Creating, editing or deleting a reading recomputes the readings on the
//! next date for the same location, since their previous value may have
//! pointed at the changed record.

use aqualedger_core::*;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Ledger;
use crate::error::LedgerError;
use crate::meter::{resolve_delta, Delta, ReadingMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    Yield,
    Consumption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldDraft {
    pub date: NaiveDate,
    pub location: YieldLocationId,
    #[serde(default)]
    pub current_reading: i64,
    /// Required for manual-yield locations, ignored otherwise.
    #[serde(default)]
    pub yield_liters: Option<i64>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionDraft {
    pub date: NaiveDate,
    pub location: ConsumptionLocationId,
    pub current_reading: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkYieldRow {
    pub location: YieldLocationId,
    #[serde(default)]
    pub current_reading: Option<i64>,
    #[serde(default)]
    pub yield_liters: Option<i64>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkConsumptionRow {
    pub location: ConsumptionLocationId,
    #[serde(default)]
    pub current_reading: Option<i64>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkOutcome {
    pub created: Vec<EntryId>,
    pub updated: Vec<EntryId>,
    /// Rows left out for having no usable reading.
    pub skipped: usize,
}

/// Bulk-entry pre-fill for one yield location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldSheetRow {
    pub location: YieldLocation,
    pub previous_reading: i64,
    pub existing: Option<YieldEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionSheetRow {
    pub location: ConsumptionLocation,
    pub previous_reading: i64,
    pub existing: Option<ConsumptionEntry>,
}

impl Ledger {
    // -----------------------------------------------------------------------
    // Yield
    // -----------------------------------------------------------------------

    pub fn record_yield(&mut self, draft: YieldDraft) -> Result<YieldEntry, LedgerError> {
        let id = EntryId(self.sequences.yields + 1);
        let entry = self.build_yield(id, draft)?;
        self.sequences.yields = id.0;
        self.store_yield(entry.clone());
        self.cascade_yield(entry.location, entry.date, Some(entry.id));
        Ok(entry)
    }

    pub fn update_yield(&mut self, id: EntryId, draft: YieldDraft) -> Result<YieldEntry, LedgerError> {
        self.yield_entry(id)?;
        let entry = self.build_yield(id, draft)?;
        let old = self.unstore_yield(id)?;
        self.store_yield(entry.clone());
        self.cascade_yield(old.location, old.date, Some(id));
        self.cascade_yield(entry.location, entry.date, Some(id));
        Ok(entry)
    }

    pub fn delete_yield(&mut self, id: EntryId) -> Result<YieldEntry, LedgerError> {
        let old = self.unstore_yield(id)?;
        self.cascade_yield(old.location, old.date, None);
        Ok(old)
    }

    /// Upsert one day's readings by (date, location) in a single transaction.
    ///
    /// A metered row without a positive reading is skipped; a manual-yield row
    /// is skipped only when it has neither a positive reading nor liters.
    pub fn bulk_yield(&mut self, date: NaiveDate, rows: Vec<BulkYieldRow>) -> Result<BulkOutcome, LedgerError> {
        if rows.is_empty() {
            return Err(LedgerError::invalid("bulk yield needs at least one row"));
        }
        let outcome = self.transaction(|l| {
            let mut outcome = BulkOutcome::default();
            for row in rows {
                let location = l.yield_location(row.location)?.clone();
                let current = row.current_reading.unwrap_or(0);
                let usable = if location.is_manual_yield {
                    current > 0 || row.yield_liters.is_some_and(|v| v != 0)
                } else {
                    current > 0
                };
                if !usable {
                    outcome.skipped += 1;
                    continue;
                }
                let draft = YieldDraft {
                    date,
                    location: location.id,
                    current_reading: current,
                    yield_liters: Some(row.yield_liters.unwrap_or(0)),
                    comment: row.comment,
                };
                match l.yield_index.on_date(location.id, date) {
                    Some((existing, _)) => {
                        l.unstore_yield(existing)?;
                        let entry = l.build_yield(existing, draft)?;
                        l.store_yield(entry);
                        outcome.updated.push(existing);
                    }
                    None => {
                        let id = EntryId(super::bump(&mut l.sequences.yields));
                        let entry = l.build_yield(id, draft)?;
                        l.store_yield(entry);
                        outcome.created.push(id);
                    }
                }
                l.cascade_yield(location.id, date, None);
            }
            Ok(outcome)
        })?;
        info!(
            %date,
            created = outcome.created.len(),
            updated = outcome.updated.len(),
            skipped = outcome.skipped,
            "bulk yield saved"
        );
        Ok(outcome)
    }

    /// Every active yield location with its previous reading (strictly
    /// before `date`) and any reading already recorded on `date`.
    pub fn bulk_yield_sheet(&self, date: NaiveDate) -> Vec<YieldSheetRow> {
        let mut locations: Vec<&YieldLocation> = self.yield_locations().filter(|l| l.active).collect();
        locations.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        locations
            .into_iter()
            .map(|loc| YieldSheetRow {
                location: loc.clone(),
                previous_reading: self
                    .yield_index
                    .prior(loc.id, date, None)
                    .map_or(0, |(_, r)| r),
                existing: self
                    .yield_index
                    .on_date(loc.id, date)
                    .and_then(|(id, _)| self.yields.get(&id).cloned()),
            })
            .collect()
    }

    fn build_yield(&self, id: EntryId, draft: YieldDraft) -> Result<YieldEntry, LedgerError> {
        let location = self.yield_location(draft.location)?;
        let mode = if location.is_manual_yield {
            let liters = draft.yield_liters.ok_or_else(|| {
                LedgerError::invalid(format!(
                    "yield location '{}' is manual: yield_liters is required",
                    location.name
                ))
            })?;
            ReadingMode::Manual { liters }
        } else {
            if draft.current_reading < 0 {
                return Err(LedgerError::invalid("current_reading must not be negative"));
            }
            ReadingMode::Metered
        };
        let prior = self.yield_index.prior(draft.location, draft.date, Some(id)).map(|(_, r)| r);
        let Delta { previous_reading, derived_liters } = resolve_delta(prior, draft.current_reading, mode);
        Ok(YieldEntry {
            id,
            date: draft.date,
            location: draft.location,
            current_reading: draft.current_reading,
            previous_reading,
            yield_liters: derived_liters,
            comment: draft.comment,
        })
    }

    fn store_yield(&mut self, entry: YieldEntry) {
        self.yield_index.insert(entry.location, entry.date, entry.id, entry.current_reading);
        self.yields.insert(entry.id, entry);
    }

    fn unstore_yield(&mut self, id: EntryId) -> Result<YieldEntry, LedgerError> {
        let entry = self.yields.remove(&id).ok_or_else(|| LedgerError::not_found("yield entry", id))?;
        self.yield_index.remove(entry.location, entry.date, id);
        Ok(entry)
    }

    /// Recompute readings on the next date after `date` at `location`.
    fn cascade_yield(&mut self, location: YieldLocationId, date: NaiveDate, skip: Option<EntryId>) {
        let manual = self.yield_locations.get(&location).is_some_and(|l| l.is_manual_yield);
        for id in self.yield_index.successors(location, date) {
            if Some(id) == skip {
                continue;
            }
            let Some(entry_date) = self.yields.get(&id).map(|e| e.date) else {
                continue;
            };
            let prior = self.yield_index.prior(location, entry_date, Some(id)).map(|(_, r)| r);
            if let Some(entry) = self.yields.get_mut(&id) {
                let mode = if manual {
                    ReadingMode::Manual { liters: entry.yield_liters }
                } else {
                    ReadingMode::Metered
                };
                let delta = resolve_delta(prior, entry.current_reading, mode);
                entry.previous_reading = delta.previous_reading;
                entry.yield_liters = delta.derived_liters;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Consumption
    // -----------------------------------------------------------------------

    pub fn record_consumption(&mut self, draft: ConsumptionDraft) -> Result<ConsumptionEntry, LedgerError> {
        let id = EntryId(self.sequences.consumptions + 1);
        let entry = self.build_consumption(id, draft)?;
        self.sequences.consumptions = id.0;
        self.store_consumption(entry.clone());
        self.cascade_consumption(entry.location, entry.date, Some(entry.id));
        Ok(entry)
    }

    pub fn update_consumption(
        &mut self,
        id: EntryId,
        draft: ConsumptionDraft,
    ) -> Result<ConsumptionEntry, LedgerError> {
        self.consumption_entry(id)?;
        let entry = self.build_consumption(id, draft)?;
        let old = self.unstore_consumption(id)?;
        self.store_consumption(entry.clone());
        self.cascade_consumption(old.location, old.date, Some(id));
        self.cascade_consumption(entry.location, entry.date, Some(id));
        Ok(entry)
    }

    pub fn delete_consumption(&mut self, id: EntryId) -> Result<ConsumptionEntry, LedgerError> {
        let old = self.unstore_consumption(id)?;
        self.cascade_consumption(old.location, old.date, None);
        Ok(old)
    }

    /// Upsert one day's readings by (date, location); rows without a
    /// positive reading are skipped. Every row's location must exist.
    pub fn bulk_consumption(
        &mut self,
        date: NaiveDate,
        rows: Vec<BulkConsumptionRow>,
    ) -> Result<BulkOutcome, LedgerError> {
        if rows.is_empty() {
            return Err(LedgerError::invalid("bulk consumption needs at least one row"));
        }
        let outcome = self.transaction(|l| {
            let mut outcome = BulkOutcome::default();
            for row in rows {
                let location = l.consumption_location(row.location)?.id;
                let current = row.current_reading.unwrap_or(0);
                if current <= 0 {
                    outcome.skipped += 1;
                    continue;
                }
                let draft = ConsumptionDraft { date, location, current_reading: current, comment: row.comment };
                match l.consumption_index.on_date(location, date) {
                    Some((existing, _)) => {
                        l.unstore_consumption(existing)?;
                        let entry = l.build_consumption(existing, draft)?;
                        l.store_consumption(entry);
                        outcome.updated.push(existing);
                    }
                    None => {
                        let id = EntryId(super::bump(&mut l.sequences.consumptions));
                        let entry = l.build_consumption(id, draft)?;
                        l.store_consumption(entry);
                        outcome.created.push(id);
                    }
                }
                l.cascade_consumption(location, date, None);
            }
            Ok(outcome)
        })?;
        info!(
            %date,
            created = outcome.created.len(),
            updated = outcome.updated.len(),
            skipped = outcome.skipped,
            "bulk consumption saved"
        );
        Ok(outcome)
    }

    /// Active consumption locations of one type with their previous reading
    /// and any reading already recorded on `date`.
    pub fn bulk_consumption_sheet(
        &self,
        date: NaiveDate,
        consumption_type: ConsumptionType,
    ) -> Vec<ConsumptionSheetRow> {
        let mut locations: Vec<&ConsumptionLocation> = self
            .consumption_locations()
            .filter(|l| l.active && l.consumption_type == consumption_type)
            .collect();
        locations.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        locations
            .into_iter()
            .map(|loc| ConsumptionSheetRow {
                location: loc.clone(),
                previous_reading: self
                    .consumption_index
                    .prior(loc.id, date, None)
                    .map_or(0, |(_, r)| r),
                existing: self
                    .consumption_index
                    .on_date(loc.id, date)
                    .and_then(|(id, _)| self.consumptions.get(&id).cloned()),
            })
            .collect()
    }

    fn build_consumption(&self, id: EntryId, draft: ConsumptionDraft) -> Result<ConsumptionEntry, LedgerError> {
        self.consumption_location(draft.location)?;
        if draft.current_reading < 0 {
            return Err(LedgerError::invalid("current_reading must not be negative"));
        }
        let prior = self
            .consumption_index
            .prior(draft.location, draft.date, Some(id))
            .map(|(_, r)| r);
        let delta = resolve_delta(prior, draft.current_reading, ReadingMode::Metered);
        Ok(ConsumptionEntry {
            id,
            date: draft.date,
            location: draft.location,
            current_reading: draft.current_reading,
            previous_reading: delta.previous_reading,
            consumption_liters: delta.derived_liters,
            comment: draft.comment,
        })
    }

    fn store_consumption(&mut self, entry: ConsumptionEntry) {
        self.consumption_index.insert(entry.location, entry.date, entry.id, entry.current_reading);
        self.consumptions.insert(entry.id, entry);
    }

    fn unstore_consumption(&mut self, id: EntryId) -> Result<ConsumptionEntry, LedgerError> {
        let entry = self
            .consumptions
            .remove(&id)
            .ok_or_else(|| LedgerError::not_found("consumption entry", id))?;
        self.consumption_index.remove(entry.location, entry.date, id);
        Ok(entry)
    }

    fn cascade_consumption(&mut self, location: ConsumptionLocationId, date: NaiveDate, skip: Option<EntryId>) {
        for id in self.consumption_index.successors(location, date) {
            if Some(id) == skip {
                continue;
            }
            let Some(entry_date) = self.consumptions.get(&id).map(|e| e.date) else {
                continue;
            };
            let prior = self.consumption_index.prior(location, entry_date, Some(id)).map(|(_, r)| r);
            if let Some(entry) = self.consumptions.get_mut(&id) {
                let delta = resolve_delta(prior, entry.current_reading, ReadingMode::Metered);
                entry.previous_reading = delta.previous_reading;
                entry.consumption_liters = delta.derived_liters;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Last readings
    // -----------------------------------------------------------------------

    /// Latest reading on or before `date` for a yield or consumption
    /// location, 0 when none exists.
    pub fn last_reading(&self, kind: ReadingKind, location: u64, date: NaiveDate) -> Result<i64, LedgerError> {
        let found = match kind {
            ReadingKind::Yield => {
                let id = YieldLocationId(location);
                self.yield_location(id)?;
                self.yield_index.latest_on_or_before(id, date)
            }
            ReadingKind::Consumption => {
                let id = ConsumptionLocationId(location);
                self.consumption_location(id)?;
                self.consumption_index.latest_on_or_before(id, date)
            }
        };
        Ok(found.map_or(0, |(_, reading)| reading))
    }
}
