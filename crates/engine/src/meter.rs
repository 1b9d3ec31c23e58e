//! Meter/Reading Delta Engine.
//!
//! Meter faces read whole kiloliters. A reading's previous value is the
//! current reading of the latest record for the same location dated strictly
//! before it; the derived volume is the positive delta in liters.

use std::collections::BTreeMap;
use std::ops::Bound;

use aqualedger_core::units::meter_units_to_liters;
use aqualedger_core::EntryId;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingMode {
    Metered,
    /// Volume entered by the operator; meter arithmetic is skipped.
    Manual { liters: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delta {
    pub previous_reading: i64,
    pub derived_liters: i64,
}

/// `max(current - previous, 0) * 1000`, or the manual volume.
pub fn resolve_delta(previous: Option<i64>, current: i64, mode: ReadingMode) -> Delta {
    let previous_reading = previous.unwrap_or(0);
    let derived_liters = match mode {
        ReadingMode::Manual { liters } => liters.max(0),
        ReadingMode::Metered => meter_units_to_liters(current.saturating_sub(previous_reading).max(0)),
    };
    Delta { previous_reading, derived_liters }
}

// ---------------------------------------------------------------------------
// Per-location index
// ---------------------------------------------------------------------------

/// Readings ordered by (location, date, creation order).
#[derive(Debug, Clone)]
pub struct ReadingIndex<L> {
    readings: BTreeMap<(L, NaiveDate, EntryId), i64>,
}

impl<L> Default for ReadingIndex<L> {
    fn default() -> Self {
        Self { readings: BTreeMap::new() }
    }
}

const FIRST: EntryId = EntryId(0);
const LAST: EntryId = EntryId(u64::MAX);

impl<L: Ord + Copy> ReadingIndex<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: L, date: NaiveDate, id: EntryId, current_reading: i64) {
        self.readings.insert((location, date, id), current_reading);
    }

    pub fn remove(&mut self, location: L, date: NaiveDate, id: EntryId) {
        self.readings.remove(&(location, date, id));
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Latest reading dated strictly before `date`, skipping `exclude`.
    pub fn prior(&self, location: L, date: NaiveDate, exclude: Option<EntryId>) -> Option<(EntryId, i64)> {
        self.readings
            .range((location, NaiveDate::MIN, FIRST)..(location, date, FIRST))
            .rev()
            .find(|((_, _, id), _)| Some(*id) != exclude)
            .map(|((_, _, id), reading)| (*id, *reading))
    }

    /// Latest reading dated on or before `date`.
    pub fn latest_on_or_before(&self, location: L, date: NaiveDate) -> Option<(EntryId, i64)> {
        self.readings
            .range((location, NaiveDate::MIN, FIRST)..=(location, date, LAST))
            .next_back()
            .map(|((_, _, id), reading)| (*id, *reading))
    }

    /// Most recent reading recorded on exactly `date`.
    pub fn on_date(&self, location: L, date: NaiveDate) -> Option<(EntryId, i64)> {
        self.readings
            .range((location, date, FIRST)..=(location, date, LAST))
            .next_back()
            .map(|((_, _, id), reading)| (*id, *reading))
    }

    /// Records on the first date after `date` for this location. These are
    /// the readings whose previous value depends on what sits at `date`.
    pub fn successors(&self, location: L, date: NaiveDate) -> Vec<EntryId> {
        let mut after = self.readings.range((
            Bound::Excluded((location, date, LAST)),
            Bound::Included((location, NaiveDate::MAX, LAST)),
        ));
        let Some(((_, next_date, first), _)) = after.next() else {
            return Vec::new();
        };
        let next_date = *next_date;
        let mut ids = vec![*first];
        ids.extend(
            after
                .take_while(|((_, d, _), _)| *d == next_date)
                .map(|((_, _, id), _)| *id),
        );
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn positive_delta_in_liters() {
        let d = resolve_delta(Some(100), 112, ReadingMode::Metered);
        assert_eq!(d, Delta { previous_reading: 100, derived_liters: 12_000 });
    }

    #[test]
    fn rollback_floors_to_zero() {
        let d = resolve_delta(Some(100), 95, ReadingMode::Metered);
        assert_eq!(d.previous_reading, 100);
        assert_eq!(d.derived_liters, 0);
    }

    #[test]
    fn first_reading_measures_from_zero() {
        let d = resolve_delta(None, 40, ReadingMode::Metered);
        assert_eq!(d, Delta { previous_reading: 0, derived_liters: 40_000 });
    }

    #[test]
    fn manual_mode_skips_meter() {
        let d = resolve_delta(Some(100), 0, ReadingMode::Manual { liters: 7_500 });
        assert_eq!(d, Delta { previous_reading: 100, derived_liters: 7_500 });
    }

    #[test]
    fn prior_is_strictly_before() {
        let mut idx = ReadingIndex::new();
        idx.insert(1u64, date("2024-01-01"), EntryId(1), 100);
        idx.insert(1u64, date("2024-01-02"), EntryId(2), 110);
        assert_eq!(idx.prior(1, date("2024-01-02"), None), Some((EntryId(1), 100)));
        assert_eq!(idx.prior(1, date("2024-01-03"), None), Some((EntryId(2), 110)));
        assert_eq!(idx.prior(1, date("2024-01-01"), None), None);
    }

    #[test]
    fn prior_prefers_latest_creation_on_same_date() {
        let mut idx = ReadingIndex::new();
        idx.insert(1u64, date("2024-01-01"), EntryId(4), 100);
        idx.insert(1u64, date("2024-01-01"), EntryId(9), 105);
        assert_eq!(idx.prior(1, date("2024-01-05"), None), Some((EntryId(9), 105)));
    }

    #[test]
    fn prior_skips_excluded_record() {
        let mut idx = ReadingIndex::new();
        idx.insert(1u64, date("2024-01-01"), EntryId(1), 100);
        idx.insert(1u64, date("2024-01-02"), EntryId(2), 110);
        assert_eq!(idx.prior(1, date("2024-01-05"), Some(EntryId(2))), Some((EntryId(1), 100)));
    }

    #[test]
    fn locations_do_not_leak() {
        let mut idx = ReadingIndex::new();
        idx.insert(1u64, date("2024-01-01"), EntryId(1), 100);
        assert_eq!(idx.prior(2, date("2024-02-01"), None), None);
        assert_eq!(idx.latest_on_or_before(2, date("2024-02-01")), None);
    }

    #[test]
    fn latest_on_or_before_includes_date() {
        let mut idx = ReadingIndex::new();
        idx.insert(1u64, date("2024-01-01"), EntryId(1), 100);
        idx.insert(1u64, date("2024-01-03"), EntryId(2), 130);
        assert_eq!(idx.latest_on_or_before(1, date("2024-01-03")), Some((EntryId(2), 130)));
        assert_eq!(idx.latest_on_or_before(1, date("2024-01-02")), Some((EntryId(1), 100)));
        assert_eq!(idx.on_date(1, date("2024-01-02")), None);
    }

    #[test]
    fn successors_are_next_date_only() {
        let mut idx = ReadingIndex::new();
        idx.insert(1u64, date("2024-01-01"), EntryId(1), 100);
        idx.insert(1u64, date("2024-01-03"), EntryId(2), 130);
        idx.insert(1u64, date("2024-01-03"), EntryId(5), 131);
        idx.insert(1u64, date("2024-01-04"), EntryId(3), 140);
        idx.insert(2u64, date("2024-01-02"), EntryId(4), 10);
        assert_eq!(idx.successors(1, date("2024-01-01")), vec![EntryId(2), EntryId(5)]);
        assert_eq!(idx.successors(1, date("2024-01-04")), Vec::<EntryId>::new());
    }
}
