//! Per-ship banking ledger.
//!
//! The ledger is an append-only sequence of `LedgerEntry` records. Nothing
//! derived is stored: adjusted CB, banked balance and the lot table are all
//! recomputed by folding the entries in sequence order.
//!
//! Apply amounts draw on banked lots oldest-first (FIFO by bank sequence),
//! restricted to the lots the `ApplyWindow` admits for the target year.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cfg::ApplyWindow;
use crate::entry::{EntryKind, LedgerEntry};
use crate::error::LedgerError;
use crate::ship::validate_ship_id;

/// Unapplied remainder of one `Bank` entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankedLot {
    pub bank_seq: u64,
    pub origin_year: i32,
    pub remaining: i64,
}

#[derive(Clone, Debug, Default)]
struct Fold {
    banked_from: BTreeMap<i32, i64>,
    applied_to: BTreeMap<i32, i64>,
    /// Bank sequence order.
    lots: Vec<BankedLot>,
}

impl Fold {
    fn net_effect(&self, year: i32) -> i64 {
        let applied = self.applied_to.get(&year).copied().unwrap_or(0);
        let banked = self.banked_from.get(&year).copied().unwrap_or(0);
        applied.saturating_sub(banked)
    }

    fn banked_balance(&self) -> Result<i64, LedgerError> {
        sum_remaining(self.lots.iter(), "banked balance")
    }

    fn eligible_balance(&self, target_year: i32, window: ApplyWindow) -> Result<i64, LedgerError> {
        sum_remaining(
            self.lots.iter().filter(|l| window.admits(l.origin_year, target_year)),
            "eligible banked balance",
        )
    }
}

fn sum_remaining<'a>(mut lots: impl Iterator<Item = &'a BankedLot>, context: &'static str) -> Result<i64, LedgerError> {
    lots.try_fold(0i64, |acc, l| acc.checked_add(l.remaining))
        .ok_or(LedgerError::Overflow { context })
}

fn accumulate(totals: &mut BTreeMap<i32, i64>, year: i32, amount: i64, context: &'static str) -> Result<(), LedgerError> {
    let slot = totals.entry(year).or_insert(0);
    *slot = slot.checked_add(amount).ok_or(LedgerError::Overflow { context })?;
    Ok(())
}

fn fold(ship_id: &str, entries: &[LedgerEntry], window: ApplyWindow) -> Result<Fold, LedgerError> {
    let reversed: HashSet<u64> = entries.iter().filter_map(|e| e.reverses).collect();
    let mut f = Fold::default();

    for e in entries {
        if reversed.contains(&e.seq) {
            continue;
        }
        match e.kind {
            EntryKind::Reversal => {}
            EntryKind::Bank => {
                accumulate(&mut f.banked_from, e.year, e.amount, "banked per year")?;
                f.lots.push(BankedLot {
                    bank_seq: e.seq,
                    origin_year: e.year,
                    remaining: e.amount,
                });
            }
            EntryKind::Apply => {
                let target = e.applied_to_year.unwrap_or(e.year);
                let mut need = e.amount;
                for lot in f
                    .lots
                    .iter_mut()
                    .filter(|l| l.remaining > 0 && window.admits(l.origin_year, target))
                {
                    let take = need.min(lot.remaining);
                    lot.remaining -= take;
                    need -= take;
                    if need == 0 {
                        break;
                    }
                }
                if need > 0 {
                    return Err(LedgerError::CorruptLedger {
                        ship: ship_id.to_string(),
                        reason: format!("apply {} overdraws banked lots by {}", e.seq, need),
                    });
                }
                accumulate(&mut f.applied_to, target, e.amount, "applied per year")?;
            }
        }
    }

    f.lots.retain(|l| l.remaining > 0);
    Ok(f)
}

#[derive(Clone, Debug)]
pub struct ShipLedger {
    ship_id: String,
    window: ApplyWindow,
    entries: Vec<LedgerEntry>,
}

impl ShipLedger {
    pub fn new(ship_id: impl Into<String>, window: ApplyWindow) -> Self {
        Self {
            ship_id: ship_id.into(),
            window,
            entries: Vec::new(),
        }
    }

    /// Rebuild a ledger from persisted entries, checking every structural
    /// rule and that the fold is feasible under `window`.
    pub fn from_entries(
        ship_id: impl Into<String>,
        window: ApplyWindow,
        entries: Vec<LedgerEntry>,
    ) -> Result<Self, LedgerError> {
        let ship_id = ship_id.into();
        let corrupt = |reason: String| LedgerError::CorruptLedger {
            ship: ship_id.clone(),
            reason,
        };
        validate_ship_id(&ship_id, 0).map_err(|e| corrupt(e.to_string()))?;

        let mut reversed: HashSet<u64> = HashSet::new();
        for (idx, e) in entries.iter().enumerate() {
            let expected = idx as u64 + 1;
            if e.seq != expected {
                return Err(corrupt(format!("expected seq {}, found {}", expected, e.seq)));
            }
            if e.ship_id != ship_id {
                return Err(corrupt(format!("entry {} belongs to {}", e.seq, e.ship_id)));
            }
            if e.amount <= 0 {
                return Err(corrupt(format!("entry {} has non-positive amount", e.seq)));
            }
            match e.kind {
                EntryKind::Bank => {
                    if e.applied_to_year.is_some() || e.reverses.is_some() {
                        return Err(corrupt(format!("bank entry {} carries apply fields", e.seq)));
                    }
                }
                EntryKind::Apply => {
                    if e.applied_to_year != Some(e.year) || e.reverses.is_some() {
                        return Err(corrupt(format!("apply entry {} has inconsistent target", e.seq)));
                    }
                }
                EntryKind::Reversal => {
                    let target = e
                        .reverses
                        .filter(|r| *r >= 1 && *r < e.seq)
                        .ok_or_else(|| corrupt(format!("reversal {} has no earlier target", e.seq)))?;
                    let original = &entries[(target - 1) as usize];
                    if original.kind == EntryKind::Reversal || !reversed.insert(target) {
                        return Err(corrupt(format!("reversal {} targets {} twice or a reversal", e.seq, target)));
                    }
                }
            }
        }

        fold(&ship_id, &entries, window)?;
        Ok(Self {
            ship_id,
            window,
            entries,
        })
    }

    pub fn ship_id(&self) -> &str {
        &self.ship_id
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_seq(&self) -> u64 {
        self.entries.last().map(|e| e.seq + 1).unwrap_or(1)
    }

    fn fold(&self) -> Result<Fold, LedgerError> {
        fold(&self.ship_id, &self.entries, self.window)
    }

    /// Base CB plus the net ledger effect on `year`.
    pub fn adjusted_cb(&self, base_cb: i64, year: i32) -> Result<i64, LedgerError> {
        Ok(base_cb.saturating_add(self.fold()?.net_effect(year)))
    }

    pub fn banked_balance(&self) -> Result<i64, LedgerError> {
        self.fold()?.banked_balance()
    }

    /// Lots with an unapplied remainder, oldest first.
    pub fn banked_lots(&self) -> Result<Vec<BankedLot>, LedgerError> {
        Ok(self.fold()?.lots)
    }

    /// Entries that originate in or target `year`, including their reversals.
    pub fn records(&self, year: i32) -> Vec<LedgerEntry> {
        self.entries.iter().filter(|e| e.touches_year(year)).cloned().collect()
    }

    pub fn bank(
        &mut self,
        base_cb: i64,
        year: i32,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }
        let available = self.adjusted_cb(base_cb, year)?;
        if available < amount {
            return Err(LedgerError::InsufficientSurplus {
                ship: self.ship_id.clone(),
                year,
                requested: amount,
                available,
            });
        }
        Ok(self.push(year, EntryKind::Bank, amount, None, None, now))
    }

    /// Bank the whole currently available surplus of `year`.
    pub fn bank_all(
        &mut self,
        base_cb: i64,
        year: i32,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        let adjusted = self.adjusted_cb(base_cb, year)?;
        if adjusted <= 0 {
            return Err(LedgerError::NoSurplusToBank {
                ship: self.ship_id.clone(),
                year,
                adjusted,
            });
        }
        self.bank(base_cb, year, adjusted, now)
    }

    pub fn apply(
        &mut self,
        base_cb: i64,
        year: i32,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }
        let f = self.fold()?;

        let available = f.eligible_balance(year, self.window)?;
        if available < amount {
            return Err(LedgerError::InsufficientBankedBalance {
                ship: self.ship_id.clone(),
                requested: amount,
                available,
            });
        }

        let adjusted = base_cb.saturating_add(f.net_effect(year));
        if adjusted >= 0 {
            return Err(LedgerError::NoDeficitToOffset {
                ship: self.ship_id.clone(),
                year,
                adjusted,
            });
        }
        let deficit = adjusted.saturating_neg();
        if amount > deficit {
            return Err(LedgerError::ExceedsDeficit {
                ship: self.ship_id.clone(),
                year,
                requested: amount,
                deficit,
            });
        }

        Ok(self.push(year, EntryKind::Apply, amount, Some(year), None, now))
    }

    /// Append a compensating entry that cancels entry `seq`.
    pub fn reverse(&mut self, seq: u64, now: DateTime<Utc>) -> Result<LedgerEntry, LedgerError> {
        let original = self
            .entries
            .iter()
            .find(|e| e.seq == seq)
            .cloned()
            .ok_or_else(|| LedgerError::EntryNotFound {
                ship: self.ship_id.clone(),
                seq,
            })?;
        let already = self.entries.iter().any(|e| e.reverses == Some(seq));
        if original.kind == EntryKind::Reversal || already {
            return Err(LedgerError::AlreadyReversed {
                ship: self.ship_id.clone(),
                seq,
            });
        }

        let candidate = LedgerEntry {
            ship_id: self.ship_id.clone(),
            seq: self.next_seq(),
            year: original.year,
            kind: EntryKind::Reversal,
            amount: original.amount,
            applied_to_year: original.applied_to_year,
            reverses: Some(seq),
            recorded_at: now,
        };

        let mut trial = self.entries.clone();
        trial.push(candidate.clone());
        fold(&self.ship_id, &trial, self.window).map_err(|e| LedgerError::ReversalRejected {
            ship: self.ship_id.clone(),
            seq,
            reason: e.to_string(),
        })?;

        self.entries.push(candidate.clone());
        Ok(candidate)
    }

    fn push(
        &mut self,
        year: i32,
        kind: EntryKind,
        amount: i64,
        applied_to_year: Option<i32>,
        reverses: Option<u64>,
        now: DateTime<Utc>,
    ) -> LedgerEntry {
        let entry = LedgerEntry {
            ship_id: self.ship_id.clone(),
            seq: self.next_seq(),
            year,
            kind,
            amount,
            applied_to_year,
            reverses,
            recorded_at: now,
        };
        self.entries.push(entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap()
    }

    #[test]
    fn fifo_draws_oldest_lot_first() {
        let mut l = ShipLedger::new("R001", ApplyWindow::LaterYears);
        l.bank(400, 2024, 400, now()).unwrap();
        l.bank(100, 2025, 100, now()).unwrap();
        l.apply(-450, 2026, 450, now()).unwrap();

        let lots = l.banked_lots().unwrap();
        assert_eq!(
            lots,
            vec![BankedLot {
                bank_seq: 2,
                origin_year: 2025,
                remaining: 50
            }]
        );
        assert_eq!(l.banked_balance().unwrap(), 50);
    }

    #[test]
    fn following_year_window_limits_eligible_lots() {
        let mut l = ShipLedger::new("R001", ApplyWindow::FollowingYear);
        l.bank(300, 2024, 300, now()).unwrap();

        let err = l.apply(-100, 2026, 100, now()).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBankedBalance { available: 0, .. }));

        l.apply(-100, 2025, 100, now()).unwrap();
        assert_eq!(l.banked_balance().unwrap(), 200);
    }

    #[test]
    fn apply_above_deficit_is_rejected_not_truncated() {
        let mut l = ShipLedger::new("R001", ApplyWindow::LaterYears);
        l.bank(500, 2024, 500, now()).unwrap();
        let err = l.apply(-200, 2025, 300, now()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::ExceedsDeficit {
                ship: "R001".into(),
                year: 2025,
                requested: 300,
                deficit: 200
            }
        );
        assert_eq!(l.entries().len(), 1);
    }

    #[test]
    fn reversing_consumed_bank_is_rejected() {
        let mut l = ShipLedger::new("R001", ApplyWindow::LaterYears);
        l.bank(500, 2024, 500, now()).unwrap();
        l.apply(-200, 2025, 200, now()).unwrap();

        let err = l.reverse(1, now()).unwrap_err();
        assert!(matches!(err, LedgerError::ReversalRejected { seq: 1, .. }));

        // Undo the apply first, then the bank goes through.
        l.reverse(2, now()).unwrap();
        l.reverse(1, now()).unwrap();
        assert_eq!(l.banked_balance().unwrap(), 0);
        assert_eq!(l.adjusted_cb(500, 2024).unwrap(), 500);
        assert_eq!(l.adjusted_cb(-200, 2025).unwrap(), -200);
        assert_eq!(l.entries().len(), 4);
    }

    #[test]
    fn double_reversal_rejected() {
        let mut l = ShipLedger::new("R001", ApplyWindow::LaterYears);
        l.bank(10, 2024, 10, now()).unwrap();
        let rev = l.reverse(1, now()).unwrap();
        assert!(matches!(l.reverse(1, now()), Err(LedgerError::AlreadyReversed { .. })));
        assert!(matches!(l.reverse(rev.seq, now()), Err(LedgerError::AlreadyReversed { .. })));
        assert!(matches!(l.reverse(9, now()), Err(LedgerError::EntryNotFound { .. })));
    }

    #[test]
    fn from_entries_rejects_gaps_and_overdrafts() {
        let mut l = ShipLedger::new("R001", ApplyWindow::LaterYears);
        l.bank(500, 2024, 500, now()).unwrap();
        l.apply(-200, 2025, 200, now()).unwrap();

        let mut gap = l.entries().to_vec();
        gap[1].seq = 3;
        assert!(matches!(
            ShipLedger::from_entries("R001", ApplyWindow::LaterYears, gap),
            Err(LedgerError::CorruptLedger { .. })
        ));

        let overdraft = vec![l.entries()[1].clone()];
        let mut overdraft = overdraft;
        overdraft[0].seq = 1;
        assert!(matches!(
            ShipLedger::from_entries("R001", ApplyWindow::LaterYears, overdraft),
            Err(LedgerError::CorruptLedger { .. })
        ));

        let ok = ShipLedger::from_entries("R001", ApplyWindow::LaterYears, l.entries().to_vec()).unwrap();
        assert_eq!(ok.banked_balance().unwrap(), 300);
    }

    #[test]
    fn oversized_balances_fail_with_overflow() {
        let mut l = ShipLedger::new("R001", ApplyWindow::LaterYears);
        l.bank(i64::MAX, 2024, i64::MAX, now()).unwrap();
        l.bank(i64::MAX, 2025, i64::MAX, now()).unwrap();

        assert!(matches!(l.banked_balance(), Err(LedgerError::Overflow { .. })));
        assert!(matches!(l.apply(-1, 2026, 1, now()), Err(LedgerError::Overflow { .. })));
        assert_eq!(l.entries().len(), 2);
    }

    #[test]
    fn from_entries_rejects_overflowing_year_total() {
        let bank = |seq| LedgerEntry {
            ship_id: "R001".into(),
            seq,
            year: 2024,
            kind: EntryKind::Bank,
            amount: i64::MAX,
            applied_to_year: None,
            reverses: None,
            recorded_at: now(),
        };
        assert!(matches!(
            ShipLedger::from_entries("R001", ApplyWindow::LaterYears, vec![bank(1), bank(2)]),
            Err(LedgerError::Overflow { .. })
        ));
    }

    #[test]
    fn records_cover_origin_and_target_years() {
        let mut l = ShipLedger::new("R001", ApplyWindow::LaterYears);
        l.bank(500, 2024, 500, now()).unwrap();
        l.apply(-200, 2025, 200, now()).unwrap();
        assert_eq!(l.records(2024).len(), 1);
        assert_eq!(l.records(2025)[0].kind, EntryKind::Apply);
        assert!(l.records(2023).is_empty());
    }
}
