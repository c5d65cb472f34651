//! cb_ledger_supervisor
//!
//! Stateful layer around `cb_ledger_core`.
//!
//! Responsibilities:
//! - read base CB values from the upstream producer (`adapter`)
//! - own every ship's ledger, sharded by `ship_id`, with bounded per-ship locks
//! - take consistent multi-ship reads for pooling
//! - expose the compliance facade and its caller-facing error taxonomy
//!
//! Non-goals:
//! - no IO
//! - no async
//! - no allocation policy (lives in core)

pub mod adapter;
pub mod facade;
pub mod supervisor;

pub use adapter::{BaseCbRecord, BaseCbSource, CbRecordStore};

pub use facade::{ComplianceError, ComplianceFacade, ErrorKind};

pub use supervisor::{LedgerSnapshot, LedgerSupervisor, RestoreStats, ShipAdjustedCb};
