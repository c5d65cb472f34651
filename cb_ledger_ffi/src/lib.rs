#![allow(clippy::missing_safety_doc)]

use std::ptr;
use std::sync::Arc;

use cb_ledger_core::{ApplyWindow, EntryKind, LedgerCfg, LedgerEntry};
use cb_ledger_supervisor::{CbRecordStore, ComplianceError, ComplianceFacade, ErrorKind, LedgerSupervisor};

pub mod wire;

/// FFI ABI version for cb_ledger_ffi.
///
/// Bump this when any `#[repr(C)]` struct layout or exported function signature changes.
pub const CB_LEDGER_FFI_VERSION: u32 = 2;

#[no_mangle]
pub extern "C" fn cb_ledger_ffi_version() -> u32 {
    CB_LEDGER_FFI_VERSION
}

// Return codes. Wire decode failures use -2..-9 (see `wire`).
pub const CB_OK: i32 = 0;
pub const CB_ERR_ARG: i32 = -1;
pub const CB_ERR_INVALID_AMOUNT: i32 = -10;
pub const CB_ERR_INVALID_SHIP_YEAR: i32 = -11;
pub const CB_ERR_INSUFFICIENT_SURPLUS: i32 = -12;
pub const CB_ERR_INSUFFICIENT_BANKED_BALANCE: i32 = -13;
pub const CB_ERR_NO_DEFICIT_TO_OFFSET: i32 = -14;
pub const CB_ERR_EXCEEDS_DEFICIT: i32 = -15;
pub const CB_ERR_SHIP_YEAR_NOT_FOUND: i32 = -16;
pub const CB_ERR_UNKNOWN_SHIP: i32 = -17;
pub const CB_ERR_EMPTY_POOL: i32 = -18;
pub const CB_ERR_ENTRY_NOT_FOUND: i32 = -19;
pub const CB_ERR_REVERSAL_REJECTED: i32 = -20;
pub const CB_ERR_BUSY: i32 = -21;
pub const CB_ERR_CANCELLED: i32 = -22;
pub const CB_ERR_INTERNAL: i32 = -23;

fn rc_for(e: &ComplianceError) -> i32 {
    match e.kind {
        ErrorKind::InvalidAmount => CB_ERR_INVALID_AMOUNT,
        ErrorKind::InvalidShipYear => CB_ERR_INVALID_SHIP_YEAR,
        ErrorKind::InsufficientSurplus => CB_ERR_INSUFFICIENT_SURPLUS,
        ErrorKind::InsufficientBankedBalance => CB_ERR_INSUFFICIENT_BANKED_BALANCE,
        ErrorKind::NoDeficitToOffset => CB_ERR_NO_DEFICIT_TO_OFFSET,
        ErrorKind::ExceedsDeficit => CB_ERR_EXCEEDS_DEFICIT,
        ErrorKind::ShipYearNotFound => CB_ERR_SHIP_YEAR_NOT_FOUND,
        ErrorKind::UnknownShip => CB_ERR_UNKNOWN_SHIP,
        ErrorKind::EmptyPool => CB_ERR_EMPTY_POOL,
        ErrorKind::EntryNotFound => CB_ERR_ENTRY_NOT_FOUND,
        ErrorKind::ReversalRejected => CB_ERR_REVERSAL_REJECTED,
        ErrorKind::Busy => CB_ERR_BUSY,
        ErrorKind::Cancelled => CB_ERR_CANCELLED,
        ErrorKind::Internal => CB_ERR_INTERNAL,
    }
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
/// Returns 0 on success, 1 if a global subscriber was already set.
#[no_mangle]
pub extern "C" fn cb_ledger_init_logging() -> i32 {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Opaque handle exposed over FFI. Owns the in-memory base CB record store
/// the host feeds through `cb_ledger_set_base_cb`.
pub struct CbLedgerHandle {
    facade: ComplianceFacade,
    store: Arc<CbRecordStore>,
}

/// FFI string view (UTF-8 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CbStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl CbStr {
    fn as_str(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        std::str::from_utf8(bytes).ok()
    }
}

/// Ledger cfg for FFI.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CbCfg {
    pub first_regulated_year: i32,
    /// 0 = any later year, 1 = following year only
    pub apply_window: u8,
    pub lock_timeout_ms: u64,
    pub cancel_check_every: u32,
}

#[no_mangle]
pub extern "C" fn cb_ledger_cfg_default() -> CbCfg {
    let d = LedgerCfg::default();
    CbCfg {
        first_regulated_year: d.first_regulated_year,
        apply_window: window_to_ffi(d.apply_window),
        lock_timeout_ms: d.lock_timeout_ms,
        cancel_check_every: d.cancel_check_every as u32,
    }
}

fn window_to_ffi(w: ApplyWindow) -> u8 {
    match w {
        ApplyWindow::LaterYears => 0,
        ApplyWindow::FollowingYear => 1,
    }
}

fn cfg_from_ffi(c: CbCfg) -> Option<LedgerCfg> {
    let apply_window = match c.apply_window {
        0 => ApplyWindow::LaterYears,
        1 => ApplyWindow::FollowingYear,
        _ => return None,
    };
    Some(LedgerCfg {
        first_regulated_year: c.first_regulated_year,
        apply_window,
        lock_timeout_ms: c.lock_timeout_ms,
        cancel_check_every: c.cancel_check_every as usize,
    })
}

/// Entry kind as a C-friendly enum.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CbEntryKind {
    Bank = 0,
    Apply = 1,
    Reversal = 2,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CbEntry {
    pub seq: u64,
    pub year: i32,
    pub kind: CbEntryKind,
    pub amount: i64,
    /// `i32::MIN` when absent.
    pub applied_to_year: i32,
    /// 0 when absent.
    pub reverses: u64,
    pub recorded_at_ms: i64,
}

impl CbEntry {
    fn empty() -> Self {
        CbEntry {
            seq: 0,
            year: 0,
            kind: CbEntryKind::Bank,
            amount: 0,
            applied_to_year: i32::MIN,
            reverses: 0,
            recorded_at_ms: 0,
        }
    }
}

fn entry_to_ffi(e: &LedgerEntry) -> CbEntry {
    CbEntry {
        seq: e.seq,
        year: e.year,
        kind: match e.kind {
            EntryKind::Bank => CbEntryKind::Bank,
            EntryKind::Apply => CbEntryKind::Apply,
            EntryKind::Reversal => CbEntryKind::Reversal,
        },
        amount: e.amount,
        applied_to_year: e.applied_to_year.unwrap_or(i32::MIN),
        reverses: e.reverses.unwrap_or(0),
        recorded_at_ms: e.recorded_at.timestamp_millis(),
    }
}

#[repr(C)]
pub struct CbEntryResult {
    pub rc: i32,
    pub entry: CbEntry,
}

impl CbEntryResult {
    fn from_result(r: Result<LedgerEntry, ComplianceError>) -> Self {
        match r {
            Ok(e) => CbEntryResult {
                rc: CB_OK,
                entry: entry_to_ffi(&e),
            },
            Err(e) => CbEntryResult::err(rc_for(&e)),
        }
    }

    fn err(rc: i32) -> Self {
        CbEntryResult {
            rc,
            entry: CbEntry::empty(),
        }
    }
}

#[repr(C)]
pub struct CbI64Result {
    pub rc: i32,
    pub value: i64,
}

#[repr(C)]
pub struct CbPoolMember {
    pub ship_id: CbStr,
    pub cb_before: i64,
    pub cb_after: i64,
}

/// Owned pool result (must be freed with `cb_ledger_pool_free`).
/// `ship_id` pointers point into `strings_ptr`.
#[repr(C)]
pub struct CbPoolArray {
    pub rc: i32,
    pub year: i32,
    pub total_cb: i64,

    pub members_ptr: *mut CbPoolMember,
    pub members_len: usize,

    pub strings_ptr: *mut u8,
    pub strings_len: usize,
}

impl CbPoolArray {
    fn err(rc: i32) -> Self {
        CbPoolArray {
            rc,
            year: 0,
            total_cb: 0,
            members_ptr: ptr::null_mut(),
            members_len: 0,
            strings_ptr: ptr::null_mut(),
            strings_len: 0,
        }
    }
}

/// Owned byte buffer (for snapshot).
#[repr(C)]
pub struct CbBytes {
    pub rc: i32,
    pub ptr: *mut u8,
    pub len: usize,
}

/// Restore result statistics (FFI-safe).
#[repr(C)]
pub struct CbRestoreStats {
    pub applied: u32,
    pub overwritten: u32,
    pub rc: i32,
}

/// Create a new ledger handle. Returns null when `cfg` is invalid.
///
/// The handle may be shared across threads; mutations serialize per ship.
#[no_mangle]
pub extern "C" fn cb_ledger_new(shards: usize, cfg: CbCfg) -> *mut CbLedgerHandle {
    let cfg = match cfg_from_ffi(cfg) {
        Some(c) => c,
        None => return ptr::null_mut(),
    };
    let store = Arc::new(CbRecordStore::new());
    let sup = match LedgerSupervisor::new(shards.max(1), cfg, store.clone()) {
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };
    tracing::debug!(shards, "ledger handle created");
    let handle = CbLedgerHandle {
        facade: ComplianceFacade::new(Arc::new(sup)),
        store,
    };
    Box::into_raw(Box::new(handle))
}

#[no_mangle]
pub unsafe extern "C" fn cb_ledger_free(h: *mut CbLedgerHandle) {
    if !h.is_null() {
        drop(Box::from_raw(h));
    }
}

/// Feed (or replace) one upstream base CB value.
#[no_mangle]
pub unsafe extern "C" fn cb_ledger_set_base_cb(h: *const CbLedgerHandle, ship_id: CbStr, year: i32, base_cb: i64) -> i32 {
    if h.is_null() {
        return CB_ERR_ARG;
    }
    let handle = &*h;
    let ship = match ship_id.as_str() {
        Some(s) => s,
        None => return CB_ERR_ARG,
    };
    handle.store.upsert(ship, year, base_cb);
    CB_OK
}

#[no_mangle]
pub unsafe extern "C" fn cb_ledger_get_cb(h: *const CbLedgerHandle, ship_id: CbStr, year: i32) -> CbI64Result {
    if h.is_null() {
        return CbI64Result { rc: CB_ERR_ARG, value: 0 };
    }
    let handle = &*h;
    let ship = match ship_id.as_str() {
        Some(s) => s,
        None => return CbI64Result { rc: CB_ERR_ARG, value: 0 },
    };
    match handle.facade.get_cb(ship, year) {
        Ok(value) => CbI64Result { rc: CB_OK, value },
        Err(e) => CbI64Result { rc: rc_for(&e), value: 0 },
    }
}

#[no_mangle]
pub unsafe extern "C" fn cb_ledger_banked_balance(h: *const CbLedgerHandle, ship_id: CbStr) -> CbI64Result {
    if h.is_null() {
        return CbI64Result { rc: CB_ERR_ARG, value: 0 };
    }
    let handle = &*h;
    let ship = match ship_id.as_str() {
        Some(s) => s,
        None => return CbI64Result { rc: CB_ERR_ARG, value: 0 },
    };
    match handle.facade.banked_balance(ship) {
        Ok(value) => CbI64Result { rc: CB_OK, value },
        Err(e) => CbI64Result { rc: rc_for(&e), value: 0 },
    }
}

#[no_mangle]
pub unsafe extern "C" fn cb_ledger_bank(h: *const CbLedgerHandle, ship_id: CbStr, year: i32, amount: i64) -> CbEntryResult {
    if h.is_null() {
        return CbEntryResult::err(CB_ERR_ARG);
    }
    let handle = &*h;
    match ship_id.as_str() {
        Some(ship) => CbEntryResult::from_result(handle.facade.bank_surplus(ship, year, amount)),
        None => CbEntryResult::err(CB_ERR_ARG),
    }
}

/// Bank the whole positive adjusted CB of `year`.
#[no_mangle]
pub unsafe extern "C" fn cb_ledger_bank_all(h: *const CbLedgerHandle, ship_id: CbStr, year: i32) -> CbEntryResult {
    if h.is_null() {
        return CbEntryResult::err(CB_ERR_ARG);
    }
    let handle = &*h;
    match ship_id.as_str() {
        Some(ship) => CbEntryResult::from_result(handle.facade.bank_all_surplus(ship, year)),
        None => CbEntryResult::err(CB_ERR_ARG),
    }
}

#[no_mangle]
pub unsafe extern "C" fn cb_ledger_apply(h: *const CbLedgerHandle, ship_id: CbStr, year: i32, amount: i64) -> CbEntryResult {
    if h.is_null() {
        return CbEntryResult::err(CB_ERR_ARG);
    }
    let handle = &*h;
    match ship_id.as_str() {
        Some(ship) => CbEntryResult::from_result(handle.facade.apply_banked(ship, year, amount)),
        None => CbEntryResult::err(CB_ERR_ARG),
    }
}

#[no_mangle]
pub unsafe extern "C" fn cb_ledger_reverse(h: *const CbLedgerHandle, ship_id: CbStr, seq: u64) -> CbEntryResult {
    if h.is_null() {
        return CbEntryResult::err(CB_ERR_ARG);
    }
    let handle = &*h;
    match ship_id.as_str() {
        Some(ship) => CbEntryResult::from_result(handle.facade.reverse_entry(ship, seq)),
        None => CbEntryResult::err(CB_ERR_ARG),
    }
}

/// Pool ships for `year`. Returns an owned array (must be freed with `cb_ledger_pool_free`).
#[no_mangle]
pub unsafe extern "C" fn cb_ledger_pool(
    h: *const CbLedgerHandle,
    year: i32,
    ships_ptr: *const CbStr,
    ships_len: usize,
) -> CbPoolArray {
    if h.is_null() || (ships_ptr.is_null() && ships_len > 0) {
        return CbPoolArray::err(CB_ERR_ARG);
    }
    let handle = &*h;

    let raw = if ships_len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(ships_ptr, ships_len)
    };
    let mut ships: Vec<String> = Vec::with_capacity(raw.len());
    for s in raw {
        match s.as_str() {
            Some(v) => ships.push(v.to_string()),
            None => return CbPoolArray::err(CB_ERR_ARG),
        }
    }

    let result = match handle.facade.pool_ships(year, ships) {
        Ok(r) => r,
        Err(e) => return CbPoolArray::err(rc_for(&e)),
    };

    // Build a single backing blob for ship_id strings
    let mut strings: Vec<u8> = Vec::new();
    let mut out: Vec<CbPoolMember> = Vec::with_capacity(result.members.len());
    let mut offsets: Vec<usize> = Vec::with_capacity(result.members.len());

    for m in &result.members {
        let start = strings.len();
        strings.extend_from_slice(m.ship_id.as_bytes());
        offsets.push(start);
        out.push(CbPoolMember {
            // fixed up after we pin the backing string blob
            ship_id: CbStr { ptr: ptr::null(), len: m.ship_id.len() },
            cb_before: m.cb_before,
            cb_after: m.cb_after,
        });
    }

    // Pin buffers and fix pointers
    let mut strings_box = strings.into_boxed_slice();
    let strings_ptr = strings_box.as_mut_ptr();
    let strings_len = strings_box.len();

    let mut out_box = out.into_boxed_slice();
    let members_ptr = out_box.as_mut_ptr();
    let members_len = out_box.len();

    for (m, off) in out_box.iter_mut().zip(offsets) {
        m.ship_id.ptr = strings_ptr.add(off);
    }

    // Leak boxes to caller; freed by cb_ledger_pool_free
    std::mem::forget(strings_box);
    std::mem::forget(out_box);

    CbPoolArray {
        rc: CB_OK,
        year: result.pool.year,
        total_cb: result.total_cb,
        members_ptr,
        members_len,
        strings_ptr,
        strings_len,
    }
}

#[no_mangle]
pub unsafe extern "C" fn cb_ledger_pool_free(arr: CbPoolArray) {
    if !arr.members_ptr.is_null() {
        let slice_ptr = ptr::slice_from_raw_parts_mut(arr.members_ptr, arr.members_len);
        drop(Box::from_raw(slice_ptr));
    }
    if !arr.strings_ptr.is_null() {
        let slice_ptr = ptr::slice_from_raw_parts_mut(arr.strings_ptr, arr.strings_len);
        drop(Box::from_raw(slice_ptr));
    }
}

/// Export all ledgers in the `wire` format.
#[no_mangle]
pub unsafe extern "C" fn cb_ledger_snapshot(h: *const CbLedgerHandle) -> CbBytes {
    if h.is_null() {
        return CbBytes { rc: CB_ERR_ARG, ptr: ptr::null_mut(), len: 0 };
    }
    let handle = &*h;
    let snap = match handle.facade.snapshot() {
        Ok(s) => s,
        Err(e) => return CbBytes { rc: rc_for(&e), ptr: ptr::null_mut(), len: 0 },
    };

    let mut boxed = wire::encode(&snap).into_boxed_slice();
    let ptr = boxed.as_mut_ptr();
    let len = boxed.len();
    std::mem::forget(boxed);

    CbBytes { rc: CB_OK, ptr, len }
}

#[no_mangle]
pub unsafe extern "C" fn cb_ledger_bytes_free(b: CbBytes) {
    if !b.ptr.is_null() {
        let slice_ptr = ptr::slice_from_raw_parts_mut(b.ptr, b.len);
        drop(Box::from_raw(slice_ptr));
    }
}

/// Restore from `wire` bytes. `merge != 0` keeps ledgers absent from the snapshot.
#[no_mangle]
pub unsafe extern "C" fn cb_ledger_restore(
    h: *const CbLedgerHandle,
    bytes: *const u8,
    len: usize,
    merge: u8,
) -> CbRestoreStats {
    if h.is_null() || bytes.is_null() || len < 12 {
        return CbRestoreStats { applied: 0, overwritten: 0, rc: CB_ERR_ARG };
    }
    let handle = &*h;
    let data = std::slice::from_raw_parts(bytes, len);

    let snap = match wire::decode(data) {
        Ok(s) => s,
        Err(rc) => {
            tracing::warn!(rc, len, "snapshot decode failed");
            return CbRestoreStats { applied: 0, overwritten: 0, rc };
        }
    };

    let res = if merge != 0 {
        handle.facade.restore_merge(snap)
    } else {
        handle.facade.restore(snap)
    };

    match res {
        Ok(stats) => CbRestoreStats {
            applied: stats.applied as u32,
            overwritten: stats.overwritten as u32,
            rc: CB_OK,
        },
        Err(e) => CbRestoreStats { applied: 0, overwritten: 0, rc: rc_for(&e) },
    }
}
