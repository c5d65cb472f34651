use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Bank,
    Apply,
    /// Compensating entry; cancels the entry named by `reverses`.
    Reversal,
}

/// One banking transaction. Append-only: never mutated once written.
///
/// - `Bank`: `year` is the originating year, `applied_to_year` is `None`.
/// - `Apply`: `year` and `applied_to_year` are both the target year.
/// - `Reversal`: copies `year`, `amount` and `applied_to_year` of the reversed
///   entry and names it in `reverses`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub ship_id: String,
    /// Monotonic per ship, starting at 1.
    pub seq: u64,
    pub year: i32,
    pub kind: EntryKind,
    /// gCO2e, always > 0.
    pub amount: i64,
    pub applied_to_year: Option<i32>,
    pub reverses: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Whether this entry belongs in the records view of `year`.
    pub fn touches_year(&self, year: i32) -> bool {
        self.year == year || self.applied_to_year == Some(year)
    }
}
