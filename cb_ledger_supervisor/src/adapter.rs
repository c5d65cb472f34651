//! Base CB adapter layer: the seam to the upstream CB calculator.
//!
//! The ledger never writes base CB values. It reads them through
//! `BaseCbSource` on every adjusted-CB computation. `CbRecordStore` is the
//! in-memory record store the upstream producer writes into.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Read side of the upstream base CB producer.
pub trait BaseCbSource: Send + Sync {
    /// Unadjusted CB in gCO2e, or `None` when the ship-year is unknown.
    fn base_cb(&self, ship_id: &str, year: i32) -> Option<i64>;

    /// Every ship with a base CB for `year`, sorted.
    fn ships_for_year(&self, year: i32) -> Vec<String>;
}

impl<T: BaseCbSource + ?Sized> BaseCbSource for Arc<T> {
    fn base_cb(&self, ship_id: &str, year: i32) -> Option<i64> {
        (**self).base_cb(ship_id, year)
    }

    fn ships_for_year(&self, year: i32) -> Vec<String> {
        (**self).ships_for_year(year)
    }
}

/// One upstream record, as delivered in bulk loads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseCbRecord {
    pub ship_id: String,
    pub year: i32,
    pub base_cb: i64,
}

/// Keyed storage of one base CB per `(ship, year)`.
#[derive(Debug, Default)]
pub struct CbRecordStore {
    records: RwLock<BTreeMap<(String, i32), i64>>,
}

impl CbRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = BaseCbRecord>,
    {
        let store = Self::new();
        store.load(records);
        store
    }

    /// Insert or replace a base CB. Returns the previous value.
    pub fn upsert(&self, ship_id: impl Into<String>, year: i32, base_cb: i64) -> Option<i64> {
        self.records.write().insert((ship_id.into(), year), base_cb)
    }

    pub fn remove(&self, ship_id: &str, year: i32) -> Option<i64> {
        self.records.write().remove(&(ship_id.to_string(), year))
    }

    /// Bulk upsert; returns how many records were written.
    pub fn load<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = BaseCbRecord>,
    {
        let mut guard = self.records.write();
        let mut n = 0;
        for r in records {
            guard.insert((r.ship_id, r.year), r.base_cb);
            n += 1;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl BaseCbSource for CbRecordStore {
    fn base_cb(&self, ship_id: &str, year: i32) -> Option<i64> {
        self.records.read().get(&(ship_id.to_string(), year)).copied()
    }

    fn ships_for_year(&self, year: i32) -> Vec<String> {
        // BTreeMap order is (ship, year), so the result is already sorted.
        self.records
            .read()
            .keys()
            .filter(|(_, y)| *y == year)
            .map(|(s, _)| s.clone())
            .collect()
    }
}
