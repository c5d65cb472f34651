use thiserror::Error;

/// Errors from the ledger fold and the pooling allocation.
///
/// Every variant is a typed, deterministic outcome for the given ledger
/// state. A failed mutation never leaves an entry behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid amount {amount}: must be > 0")]
    InvalidAmount { amount: i64 },

    #[error("invalid ship-year ({ship}, {year}): {reason}")]
    InvalidShipYear {
        ship: String,
        year: i32,
        reason: String,
    },

    #[error("insufficient surplus for {ship}/{year}: requested {requested}, available {available}")]
    InsufficientSurplus {
        ship: String,
        year: i32,
        requested: i64,
        available: i64,
    },

    #[error("no surplus to bank for {ship}/{year}: adjusted CB is {adjusted}")]
    NoSurplusToBank {
        ship: String,
        year: i32,
        adjusted: i64,
    },

    #[error("insufficient banked balance for {ship}: requested {requested}, available {available}")]
    InsufficientBankedBalance {
        ship: String,
        requested: i64,
        available: i64,
    },

    #[error("no deficit to offset for {ship}/{year}: adjusted CB is {adjusted}")]
    NoDeficitToOffset {
        ship: String,
        year: i32,
        adjusted: i64,
    },

    #[error("apply of {requested} exceeds deficit {deficit} for {ship}/{year}")]
    ExceedsDeficit {
        ship: String,
        year: i32,
        requested: i64,
        deficit: i64,
    },

    #[error("ship-year not found: {ship}/{year}")]
    ShipYearNotFound { ship: String, year: i32 },

    #[error("unknown pool member {ship} for year {year}")]
    UnknownShip { ship: String, year: i32 },

    #[error("pool has no members")]
    EmptyPool,

    #[error("ledger entry {seq} not found for {ship}")]
    EntryNotFound { ship: String, seq: u64 },

    #[error("ledger entry {seq} for {ship} cannot be reversed again")]
    AlreadyReversed { ship: String, seq: u64 },

    #[error("reversal of entry {seq} for {ship} rejected: {reason}")]
    ReversalRejected {
        ship: String,
        seq: u64,
        reason: String,
    },

    #[error("ledger for {ship} is busy")]
    Busy { ship: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("corrupt ledger for {ship}: {reason}")]
    CorruptLedger { ship: String, reason: String },

    #[error("arithmetic overflow in {context}")]
    Overflow { context: &'static str },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}
