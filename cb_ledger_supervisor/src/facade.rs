//! Compliance query facade: the only surface the dashboard/API layer calls.
//!
//! Delegates to `LedgerSupervisor` and maps `LedgerError` onto the
//! caller-facing `ErrorKind` taxonomy. No business logic lives here.

use std::sync::Arc;

use cb_ledger_core::{BankedLot, CancelFlag, LedgerEntry, LedgerError, PoolResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::supervisor::{LedgerSnapshot, LedgerSupervisor, RestoreStats, ShipAdjustedCb};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidAmount,
    InvalidShipYear,
    InsufficientSurplus,
    InsufficientBankedBalance,
    NoDeficitToOffset,
    ExceedsDeficit,
    ShipYearNotFound,
    UnknownShip,
    EmptyPool,
    EntryNotFound,
    ReversalRejected,
    Busy,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Stable wire code.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidAmount => "INVALID_AMOUNT",
            ErrorKind::InvalidShipYear => "INVALID_SHIP_YEAR",
            ErrorKind::InsufficientSurplus => "INSUFFICIENT_SURPLUS",
            ErrorKind::InsufficientBankedBalance => "INSUFFICIENT_BANKED_BALANCE",
            ErrorKind::NoDeficitToOffset => "NO_DEFICIT_TO_OFFSET",
            ErrorKind::ExceedsDeficit => "EXCEEDS_DEFICIT",
            ErrorKind::ShipYearNotFound => "SHIP_YEAR_NOT_FOUND",
            ErrorKind::UnknownShip => "UNKNOWN_SHIP",
            ErrorKind::EmptyPool => "EMPTY_POOL",
            ErrorKind::EntryNotFound => "ENTRY_NOT_FOUND",
            ErrorKind::ReversalRejected => "REVERSAL_REJECTED",
            ErrorKind::Busy => "BUSY",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl From<&LedgerError> for ErrorKind {
    fn from(e: &LedgerError) -> Self {
        match e {
            LedgerError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            LedgerError::InvalidShipYear { .. } => ErrorKind::InvalidShipYear,
            LedgerError::InsufficientSurplus { .. } | LedgerError::NoSurplusToBank { .. } => {
                ErrorKind::InsufficientSurplus
            }
            LedgerError::InsufficientBankedBalance { .. } => ErrorKind::InsufficientBankedBalance,
            LedgerError::NoDeficitToOffset { .. } => ErrorKind::NoDeficitToOffset,
            LedgerError::ExceedsDeficit { .. } => ErrorKind::ExceedsDeficit,
            LedgerError::ShipYearNotFound { .. } => ErrorKind::ShipYearNotFound,
            LedgerError::UnknownShip { .. } => ErrorKind::UnknownShip,
            LedgerError::EmptyPool => ErrorKind::EmptyPool,
            LedgerError::EntryNotFound { .. } => ErrorKind::EntryNotFound,
            LedgerError::AlreadyReversed { .. } | LedgerError::ReversalRejected { .. } => {
                ErrorKind::ReversalRejected
            }
            LedgerError::Busy { .. } => ErrorKind::Busy,
            LedgerError::Cancelled => ErrorKind::Cancelled,
            LedgerError::CorruptLedger { .. } | LedgerError::Overflow { .. } | LedgerError::InvalidConfig { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

/// Caller-facing error: a taxonomy kind plus the domain error behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {}", .kind.code(), .source)]
pub struct ComplianceError {
    pub kind: ErrorKind,
    #[source]
    pub source: LedgerError,
}

impl ComplianceError {
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Only transient contention is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Busy
    }
}

impl From<LedgerError> for ComplianceError {
    fn from(source: LedgerError) -> Self {
        Self {
            kind: ErrorKind::from(&source),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ComplianceError>;

#[derive(Clone, Debug)]
pub struct ComplianceFacade {
    ledger: Arc<LedgerSupervisor>,
}

impl ComplianceFacade {
    pub fn new(ledger: Arc<LedgerSupervisor>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &LedgerSupervisor {
        &self.ledger
    }

    pub fn get_cb(&self, ship_id: &str, year: i32) -> Result<i64> {
        Ok(self.ledger.adjusted_cb(ship_id, year)?)
    }

    pub fn bank_surplus(&self, ship_id: &str, year: i32, amount: i64) -> Result<LedgerEntry> {
        Ok(self.ledger.bank(ship_id, year, amount)?)
    }

    pub fn bank_all_surplus(&self, ship_id: &str, year: i32) -> Result<LedgerEntry> {
        Ok(self.ledger.bank_all(ship_id, year)?)
    }

    pub fn apply_banked(&self, ship_id: &str, year: i32, amount: i64) -> Result<LedgerEntry> {
        Ok(self.ledger.apply(ship_id, year, amount)?)
    }

    pub fn reverse_entry(&self, ship_id: &str, seq: u64) -> Result<LedgerEntry> {
        Ok(self.ledger.reverse(ship_id, seq)?)
    }

    pub fn banked_balance(&self, ship_id: &str) -> Result<i64> {
        Ok(self.ledger.banked_balance(ship_id)?)
    }

    pub fn banked_lots(&self, ship_id: &str) -> Result<Vec<BankedLot>> {
        Ok(self.ledger.banked_lots(ship_id)?)
    }

    pub fn records(&self, ship_id: &str, year: i32) -> Result<Vec<LedgerEntry>> {
        Ok(self.ledger.records(ship_id, year)?)
    }

    pub fn entries(&self, ship_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self.ledger.entries(ship_id)?)
    }

    pub fn adjusted_cb_for_year(&self, year: i32) -> Result<Vec<ShipAdjustedCb>> {
        Ok(self.ledger.adjusted_cb_for_year(year)?)
    }

    pub fn pool_ships<I, S>(&self, year: i32, ship_ids: I) -> Result<PoolResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pool_ships_cancellable(year, ship_ids, &CancelFlag::new())
    }

    pub fn pool_ships_cancellable<I, S>(&self, year: i32, ship_ids: I, cancel: &CancelFlag) -> Result<PoolResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ledger
            .compute_pool(year, ship_ids, cancel)
            .map_err(|e| match e {
                LedgerError::ShipYearNotFound { ship, year } => LedgerError::UnknownShip { ship, year },
                other => other,
            })
            .map_err(ComplianceError::from)
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        Ok(self.ledger.snapshot()?)
    }

    pub fn restore(&self, snap: LedgerSnapshot) -> Result<RestoreStats> {
        Ok(self.ledger.restore(snap)?)
    }

    /// Restore ledgers from `snap`, keeping ledgers it does not mention.
    pub fn restore_merge(&self, snap: LedgerSnapshot) -> Result<RestoreStats> {
        Ok(self.ledger.restore_merge(snap)?)
    }
}
