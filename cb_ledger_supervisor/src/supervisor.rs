//! Sharded ledger supervisor.
//!
//! Owns every ship's `ShipLedger` and serializes mutations per ship:
//! - ledgers are sharded by `ship_id` (deterministic FNV-1a)
//! - each ledger sits behind its own mutex; shard maps are held only for lookup
//! - lock acquisition is bounded by `LedgerCfg::lock_timeout_ms` and fails with `Busy`
//! - multi-ship reads lock in ascending `ship_id` order
//!
//! No IO. No async. Persistence goes through `snapshot` / `restore`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use cb_ledger_core::{
    allocate_pool, BankedLot, CancelFlag, LedgerCfg, LedgerEntry, LedgerError, PoolResult,
    ShipLedger, ShipYear,
};
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::BaseCbSource;

/// Plain-data export of every non-empty ledger, sorted by `ship_id`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub ledgers: Vec<(String, Vec<LedgerEntry>)>,
}

/// Counters returned by restore operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStats {
    /// Ledgers written from the snapshot.
    pub applied: usize,
    /// Ledgers that already held entries and were replaced.
    pub overwritten: usize,
}

/// A ship's adjusted CB for one year.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipAdjustedCb {
    pub ship_id: String,
    pub adjusted_cb: i64,
}

type LedgerHandle = Arc<Mutex<ShipLedger>>;

#[derive(Default, Debug)]
struct Shard {
    ledgers: HashMap<String, LedgerHandle>,
}

/// Deterministic FNV-1a hash (stable across runs).
fn fnv1a_u64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn shard_index(ship_id: &str, shard_count: usize) -> usize {
    if shard_count <= 1 {
        return 0;
    }
    (fnv1a_u64(ship_id) as usize) % shard_count
}

pub struct LedgerSupervisor {
    cfg: LedgerCfg,
    base: Arc<dyn BaseCbSource>,
    shards: usize,
    state_shards: Vec<Mutex<Shard>>,
}

impl std::fmt::Debug for LedgerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSupervisor")
            .field("cfg", &self.cfg)
            .field("shards", &self.shards)
            .finish_non_exhaustive()
    }
}

impl LedgerSupervisor {
    /// Create a supervisor with `shards` lookup shards (minimum 1).
    pub fn new(shards: usize, cfg: LedgerCfg, base: Arc<dyn BaseCbSource>) -> Result<Self, LedgerError> {
        cfg.validate()?;
        let shards = shards.max(1);
        let mut state_shards = Vec::with_capacity(shards);
        for _ in 0..shards {
            state_shards.push(Mutex::new(Shard::default()));
        }
        Ok(Self {
            cfg,
            base,
            shards,
            state_shards,
        })
    }

    pub fn cfg(&self) -> &LedgerCfg {
        &self.cfg
    }

    fn existing(&self, ship_id: &str) -> Option<LedgerHandle> {
        let idx = shard_index(ship_id, self.shards);
        self.state_shards[idx].lock().ledgers.get(ship_id).cloned()
    }

    fn handle(&self, ship_id: &str) -> LedgerHandle {
        let idx = shard_index(ship_id, self.shards);
        let mut guard = self.state_shards[idx].lock();
        guard
            .ledgers
            .entry(ship_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ShipLedger::new(ship_id, self.cfg.apply_window))))
            .clone()
    }

    fn lock<'a>(&self, ship_id: &str, h: &'a LedgerHandle) -> Result<MutexGuard<'a, ShipLedger>, LedgerError> {
        h.try_lock_for(self.cfg.lock_timeout()).ok_or_else(|| {
            warn!(ship = %ship_id, timeout_ms = self.cfg.lock_timeout_ms, "ledger lock timed out");
            LedgerError::Busy {
                ship: ship_id.to_string(),
            }
        })
    }

    fn base_for(&self, key: &ShipYear) -> Result<i64, LedgerError> {
        self.base
            .base_cb(&key.ship_id, key.year)
            .ok_or_else(|| LedgerError::ShipYearNotFound {
                ship: key.ship_id.clone(),
                year: key.year,
            })
    }

    /// Run `f` against a consistent view of one ship's ledger. Ships without
    /// entries read as an empty ledger and are not materialized.
    fn read<T>(&self, ship_id: &str, f: impl FnOnce(&ShipLedger) -> Result<T, LedgerError>) -> Result<T, LedgerError> {
        match self.existing(ship_id) {
            Some(h) => {
                let guard = self.lock(ship_id, &h)?;
                f(&guard)
            }
            None => f(&ShipLedger::new(ship_id, self.cfg.apply_window)),
        }
    }

    fn write<T>(&self, ship_id: &str, f: impl FnOnce(&mut ShipLedger) -> Result<T, LedgerError>) -> Result<T, LedgerError> {
        let h = self.handle(ship_id);
        let mut guard = self.lock(ship_id, &h)?;
        f(&mut guard)
    }

    pub fn adjusted_cb(&self, ship_id: &str, year: i32) -> Result<i64, LedgerError> {
        let key = ShipYear::new(ship_id, year, &self.cfg)?;
        let v = self.read(ship_id, |l| {
            let base = self.base_for(&key)?;
            l.adjusted_cb(base, year)
        })?;
        debug!(ship = %ship_id, year, adjusted = v, "adjusted CB read");
        Ok(v)
    }

    pub fn banked_balance(&self, ship_id: &str) -> Result<i64, LedgerError> {
        self.read(ship_id, |l| l.banked_balance())
    }

    pub fn banked_lots(&self, ship_id: &str) -> Result<Vec<BankedLot>, LedgerError> {
        self.read(ship_id, |l| l.banked_lots())
    }

    pub fn records(&self, ship_id: &str, year: i32) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.read(ship_id, |l| Ok(l.records(year)))
    }

    pub fn entries(&self, ship_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.read(ship_id, |l| Ok(l.entries().to_vec()))
    }

    pub fn bank(&self, ship_id: &str, year: i32, amount: i64) -> Result<LedgerEntry, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }
        let key = ShipYear::new(ship_id, year, &self.cfg)?;
        let entry = self.write(ship_id, |l| {
            let base = self.base_for(&key)?;
            l.bank(base, year, amount, Utc::now())
        })?;
        info!(ship = %ship_id, year, amount, seq = entry.seq, "surplus banked");
        Ok(entry)
    }

    pub fn bank_all(&self, ship_id: &str, year: i32) -> Result<LedgerEntry, LedgerError> {
        let key = ShipYear::new(ship_id, year, &self.cfg)?;
        let entry = self.write(ship_id, |l| {
            let base = self.base_for(&key)?;
            l.bank_all(base, year, Utc::now())
        })?;
        info!(ship = %ship_id, year, amount = entry.amount, seq = entry.seq, "full surplus banked");
        Ok(entry)
    }

    pub fn apply(&self, ship_id: &str, year: i32, amount: i64) -> Result<LedgerEntry, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }
        let key = ShipYear::new(ship_id, year, &self.cfg)?;
        let entry = self.write(ship_id, |l| {
            let base = self.base_for(&key)?;
            l.apply(base, year, amount, Utc::now())
        })?;
        info!(ship = %ship_id, year, amount, seq = entry.seq, "banked surplus applied");
        Ok(entry)
    }

    pub fn reverse(&self, ship_id: &str, seq: u64) -> Result<LedgerEntry, LedgerError> {
        let entry = match self.existing(ship_id) {
            Some(h) => {
                let mut guard = self.lock(ship_id, &h)?;
                guard.reverse(seq, Utc::now())?
            }
            None => {
                return Err(LedgerError::EntryNotFound {
                    ship: ship_id.to_string(),
                    seq,
                })
            }
        };
        info!(ship = %ship_id, reversed = seq, seq = entry.seq, "ledger entry reversed");
        Ok(entry)
    }

    /// Adjusted CB of every ship with a base CB for `year`, sorted by ship.
    pub fn adjusted_cb_for_year(&self, year: i32) -> Result<Vec<ShipAdjustedCb>, LedgerError> {
        let mut out = Vec::new();
        for ship_id in self.base.ships_for_year(year) {
            let adjusted_cb = self.adjusted_cb(&ship_id, year)?;
            out.push(ShipAdjustedCb { ship_id, adjusted_cb });
        }
        Ok(out)
    }

    /// Pool `ship_ids` for `year` over one consistent read of their ledgers.
    ///
    /// Member ledgers are locked together (ascending `ship_id`) only while
    /// adjusted CBs are read; the allocation runs outside the locks.
    pub fn compute_pool<I, S>(&self, year: i32, ship_ids: I, cancel: &CancelFlag) -> Result<PoolResult, LedgerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: BTreeSet<String> = ship_ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Err(LedgerError::EmptyPool);
        }

        let mut keys = Vec::with_capacity(ids.len());
        for id in &ids {
            let key = ShipYear::new(id.as_str(), year, &self.cfg)?;
            if self.base.base_cb(id, year).is_none() {
                return Err(LedgerError::UnknownShip {
                    ship: id.clone(),
                    year,
                });
            }
            keys.push(key);
        }

        let handles: Vec<Option<LedgerHandle>> = keys.iter().map(|k| self.existing(&k.ship_id)).collect();
        let before: Vec<(String, i64)> = {
            let mut guards: Vec<Option<MutexGuard<'_, ShipLedger>>> = Vec::with_capacity(handles.len());
            for (k, h) in keys.iter().zip(handles.iter()) {
                guards.push(match h {
                    Some(h) => Some(self.lock(&k.ship_id, h)?),
                    None => None,
                });
            }

            let mut before = Vec::with_capacity(keys.len());
            for (k, g) in keys.iter().zip(guards.iter()) {
                if cancel.is_cancelled() {
                    return Err(LedgerError::Cancelled);
                }
                let base = self.base.base_cb(&k.ship_id, year).ok_or_else(|| LedgerError::UnknownShip {
                    ship: k.ship_id.clone(),
                    year,
                })?;
                let adjusted = match g {
                    Some(l) => l.adjusted_cb(base, year)?,
                    None => base,
                };
                before.push((k.ship_id.clone(), adjusted));
            }
            before
        };

        let result = allocate_pool(year, before, cancel, self.cfg.cancel_check_every, Utc::now())?;
        debug!(year, members = result.members.len(), total = result.total_cb, "pool computed");
        Ok(result)
    }

    /// Export every non-empty ledger, sorted by `ship_id`.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        let handles = self.all_handles();
        let mut ledgers = Vec::with_capacity(handles.len());
        for (ship_id, h) in &handles {
            let guard = self.lock(ship_id, h)?;
            if !guard.is_empty() {
                ledgers.push((ship_id.clone(), guard.entries().to_vec()));
            }
        }
        Ok(LedgerSnapshot { ledgers })
    }

    /// Replace all ledger state with `snap`.
    ///
    /// Every ledger in the snapshot is validated before anything is written;
    /// a rejected snapshot leaves the current state untouched.
    pub fn restore(&self, snap: LedgerSnapshot) -> Result<RestoreStats, LedgerError> {
        self.restore_inner(snap, false)
    }

    /// Like `restore`, but ledgers absent from `snap` are kept.
    pub fn restore_merge(&self, snap: LedgerSnapshot) -> Result<RestoreStats, LedgerError> {
        self.restore_inner(snap, true)
    }

    fn restore_inner(&self, snap: LedgerSnapshot, merge: bool) -> Result<RestoreStats, LedgerError> {
        let mut incoming: BTreeMap<String, ShipLedger> = BTreeMap::new();
        for (ship_id, entries) in snap.ledgers {
            let ledger = ShipLedger::from_entries(ship_id.clone(), self.cfg.apply_window, entries).map_err(|e| {
                warn!(ship = %ship_id, error = %e, "snapshot rejected");
                e
            })?;
            if incoming.insert(ship_id.clone(), ledger).is_some() {
                warn!(ship = %ship_id, "snapshot rejected: duplicate ledger");
                return Err(LedgerError::CorruptLedger {
                    ship: ship_id,
                    reason: "duplicate ledger in snapshot".into(),
                });
            }
        }

        // Handles are never removed from the shard maps, so writers that
        // already hold one observe the restored contents.
        let mut targets: BTreeSet<String> = incoming.keys().cloned().collect();
        if !merge {
            targets.extend(self.all_handles().into_iter().map(|(id, _)| id));
        }
        let handles: Vec<(String, LedgerHandle)> = targets
            .into_iter()
            .map(|id| {
                let h = self.handle(&id);
                (id, h)
            })
            .collect();

        let mut guards = Vec::with_capacity(handles.len());
        for (ship_id, h) in &handles {
            guards.push((ship_id, self.lock(ship_id, h)?));
        }

        let mut stats = RestoreStats::default();
        for (ship_id, guard) in guards.iter_mut() {
            match incoming.remove(ship_id.as_str()) {
                Some(ledger) => {
                    if !guard.is_empty() {
                        stats.overwritten += 1;
                    }
                    **guard = ledger;
                    stats.applied += 1;
                }
                None => **guard = ShipLedger::new(ship_id.as_str(), self.cfg.apply_window),
            }
        }

        info!(applied = stats.applied, overwritten = stats.overwritten, merge, "ledger state restored");
        Ok(stats)
    }

    /// All materialized handles, sorted by `ship_id`.
    fn all_handles(&self) -> Vec<(String, LedgerHandle)> {
        let mut out = Vec::new();
        for shard in &self.state_shards {
            let guard = shard.lock();
            for (k, v) in guard.ledgers.iter() {
                out.push((k.clone(), v.clone()));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
