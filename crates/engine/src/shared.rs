//! A ledger shared between callers. Each write holds the lock for the whole
//! find-previous / compute / persist sequence, so concurrent submissions for
//! the same location serialize.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::LedgerError;
use crate::ledger::Ledger;

#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<Mutex<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self { inner: Arc::new(Mutex::new(ledger)) }
    }

    /// Run a write as one transaction under the lock.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&mut Ledger) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut guard = self.inner.lock();
        guard.transaction(f)
    }

    pub fn read<T>(&self, f: impl FnOnce(&Ledger) -> T) -> T {
        let guard = self.inner.lock();
        f(&guard)
    }

    pub fn into_inner(self) -> Result<Ledger, SharedLedger> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| SharedLedger { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::YieldDraft;
    use aqualedger_core::YieldType;
    use chrono::NaiveDate;
    use std::thread;

    #[test]
    fn concurrent_writes_serialize() {
        let mut ledger = Ledger::new();
        let loc = ledger.add_yield_location("Borewell 1", YieldType::Borewell, false, 0).unwrap().id;
        let shared = SharedLedger::new(ledger);

        let handles: Vec<_> = (1..=8)
            .map(|day| {
                let shared = shared.clone();
                thread::spawn(move || {
                    shared
                        .write(|l| {
                            l.record_yield(YieldDraft {
                                date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
                                location: loc,
                                current_reading: 100 + i64::from(day) * 10,
                                yield_liters: None,
                                comment: String::new(),
                            })
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let ledger = shared.into_inner().unwrap();
        let mut entries: Vec<_> = ledger.yields().cloned().collect();
        entries.sort_by_key(|e| e.date);
        assert_eq!(entries.len(), 8);
        for pair in entries.windows(2) {
            assert_eq!(pair[1].previous_reading, pair[0].current_reading);
            assert_eq!(pair[1].yield_liters, 10_000);
        }
    }
}
