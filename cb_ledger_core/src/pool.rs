//! Pool allocation.
//!
//! Redistributes adjusted CB across pool members for one year. Deficits are
//! zeroed largest-first and the remaining surplus is shared pro rata, so the
//! pool total is conserved to the unit. A pool with a negative total is
//! returned unchanged.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelFlag;
use crate::error::LedgerError;

/// Descriptor of one pooling request. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub year: i32,
    /// Sorted, deduplicated.
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMember {
    pub ship_id: String,
    pub cb_before: i64,
    pub cb_after: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolResult {
    pub pool: Pool,
    #[serde(rename = "totalCB")]
    pub total_cb: i64,
    /// Same order as `pool.members`.
    pub members: Vec<PoolMember>,
}

impl PoolResult {
    pub fn is_compliant(&self) -> bool {
        self.total_cb >= 0
    }

    pub fn member(&self, ship_id: &str) -> Option<&PoolMember> {
        self.members.iter().find(|m| m.ship_id == ship_id)
    }
}

struct Ticker<'a> {
    cancel: &'a CancelFlag,
    every: usize,
    n: usize,
}

impl Ticker<'_> {
    #[inline]
    fn tick(&mut self) -> Result<(), LedgerError> {
        self.n += 1;
        if self.n % self.every == 0 && self.cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        Ok(())
    }
}

/// Reallocate CB across pool members for one year.
///
/// When the pool total is non-negative, deficits are raised to zero
/// largest-first out of the aggregate surplus, and what remains is shared
/// among surplus members in proportion to their `cb_before`. Integer
/// rounding leftovers go to the largest original surplus (lowest ship id on
/// a tie). A pool with a negative total is returned unchanged.
///
/// `sum(cb_after) == sum(cb_before) == total_cb` on every `Ok`.
pub fn allocate_pool(
    year: i32,
    members: impl IntoIterator<Item = (String, i64)>,
    cancel: &CancelFlag,
    check_every: usize,
    now: DateTime<Utc>,
) -> Result<PoolResult, LedgerError> {
    if cancel.is_cancelled() {
        return Err(LedgerError::Cancelled);
    }

    let by_ship: BTreeMap<String, i64> = members.into_iter().collect();
    if by_ship.is_empty() {
        return Err(LedgerError::EmptyPool);
    }
    let ids: Vec<String> = by_ship.keys().cloned().collect();
    let before: Vec<i64> = by_ship.values().copied().collect();

    let total: i128 = before.iter().map(|v| *v as i128).sum();
    let total_cb = i64::try_from(total).map_err(|_| LedgerError::Overflow { context: "pool total" })?;

    let mut ticker = Ticker {
        cancel,
        every: check_every.max(1),
        n: 0,
    };

    let mut after = before.clone();
    if total >= 0 {
        let surplus_total: i128 = before.iter().filter(|v| **v > 0).map(|v| *v as i128).sum();

        // 1) Zero deficits, largest first. Ties keep ship id order.
        let mut deficits: Vec<usize> = (0..before.len()).filter(|i| before[*i] < 0).collect();
        deficits.sort_by_key(|i| before[*i]);

        let mut available = surplus_total;
        for i in deficits {
            ticker.tick()?;
            let raise = available.min(-(before[i] as i128));
            after[i] = (before[i] as i128 + raise) as i64;
            available -= raise;
        }

        // 2) Share the rest pro rata among surplus members.
        if surplus_total > 0 {
            let mut distributed: i128 = 0;
            let mut largest: Option<usize> = None;
            for i in 0..before.len() {
                if before[i] <= 0 {
                    continue;
                }
                ticker.tick()?;
                let share = available * before[i] as i128 / surplus_total;
                after[i] = share as i64;
                distributed += share;
                if largest.map_or(true, |l| before[i] > before[l]) {
                    largest = Some(i);
                }
            }
            if let Some(l) = largest {
                after[l] += (available - distributed) as i64;
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(LedgerError::Cancelled);
    }

    let members = ids
        .iter()
        .zip(before.iter().zip(after.iter()))
        .map(|(id, (b, a))| PoolMember {
            ship_id: id.clone(),
            cb_before: *b,
            cb_after: *a,
        })
        .collect();

    Ok(PoolResult {
        pool: Pool {
            year,
            members: ids,
            created_at: now,
        },
        total_cb,
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(members: &[(&str, i64)]) -> PoolResult {
        allocate_pool(
            2024,
            members.iter().map(|(s, v)| (s.to_string(), *v)),
            &CancelFlag::new(),
            64,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn remainder_goes_to_largest_surplus() {
        // total 100 shared 3:3:1 -> 42, 42, 14 with 2 left over
        let r = run(&[("C", 100), ("A", 300), ("B", 300), ("D", -600)]);
        assert_eq!(r.total_cb, 100);
        assert_eq!(r.member("A").unwrap().cb_after, 44);
        assert_eq!(r.member("B").unwrap().cb_after, 42);
        assert_eq!(r.member("C").unwrap().cb_after, 14);
        assert_eq!(r.member("D").unwrap().cb_after, 0);
    }

    #[test]
    fn zero_members_stay_zero() {
        let r = run(&[("A", 0), ("B", 0)]);
        assert!(r.members.iter().all(|m| m.cb_after == 0));
    }

    #[test]
    fn cancelled_before_start_yields_nothing() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = allocate_pool(2024, vec![("A".to_string(), 1)], &cancel, 1, Utc::now()).unwrap_err();
        assert_eq!(err, LedgerError::Cancelled);
    }

    #[test]
    fn empty_pool() {
        let err = allocate_pool(2024, Vec::new(), &CancelFlag::new(), 1, Utc::now()).unwrap_err();
        assert_eq!(err, LedgerError::EmptyPool);
    }
}
