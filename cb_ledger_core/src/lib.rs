pub mod cancel;
pub mod cfg;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod pool;
pub mod ship;

pub use cancel::CancelFlag;
pub use cfg::{ApplyWindow, LedgerCfg};
pub use entry::{EntryKind, LedgerEntry};
pub use error::LedgerError;
pub use ledger::{BankedLot, ShipLedger};
pub use pool::{allocate_pool, Pool, PoolMember, PoolResult};
pub use ship::ShipYear;
