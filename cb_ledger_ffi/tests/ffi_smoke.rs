//! FFI smoke tests.
//!
//! These tests call the exported `extern "C"` functions directly (as an external consumer would),
//! to validate:
//! - ABI surface compiles and links
//! - allocation/free symmetry for returned buffers
//! - snapshot/restore round-trip works

use cb_ledger_core::{EntryKind, LedgerEntry};
use cb_ledger_ffi::*;
use cb_ledger_supervisor::LedgerSnapshot;
use chrono::DateTime;

fn s(s: &str) -> CbStr {
    CbStr {
        ptr: s.as_ptr(),
        len: s.len(),
    }
}

fn member_id(m: &CbPoolMember) -> String {
    let bytes = unsafe { std::slice::from_raw_parts(m.ship_id.ptr, m.ship_id.len) };
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[test]
fn ffi_version_and_default_cfg() {
    assert_eq!(cb_ledger_ffi_version(), CB_LEDGER_FFI_VERSION);

    let cfg = cb_ledger_cfg_default();
    assert_eq!(cfg.first_regulated_year, 2024);
    assert_eq!(cfg.apply_window, 0);
    assert!(cfg.lock_timeout_ms > 0);
    assert!(cfg.cancel_check_every > 0);
}

#[test]
fn ffi_rejects_bad_cfg() {
    let mut cfg = cb_ledger_cfg_default();
    cfg.apply_window = 7;
    assert!(cb_ledger_new(1, cfg).is_null());

    let mut cfg = cb_ledger_cfg_default();
    cfg.cancel_check_every = 0;
    assert!(cb_ledger_new(1, cfg).is_null());
}

#[test]
fn ffi_bank_apply_and_errors() {
    let h = cb_ledger_new(2, cb_ledger_cfg_default());
    assert!(!h.is_null());

    unsafe {
        assert_eq!(cb_ledger_set_base_cb(h, s("R001"), 2024, 500_000), CB_OK);
        assert_eq!(cb_ledger_set_base_cb(h, s("R001"), 2025, -200_000), CB_OK);

        let r = cb_ledger_bank(h, s("R001"), 2024, 500_000);
        assert_eq!(r.rc, CB_OK);
        assert_eq!(r.entry.seq, 1);
        assert_eq!(r.entry.kind, CbEntryKind::Bank);
        assert_eq!(r.entry.applied_to_year, i32::MIN);

        let r = cb_ledger_apply(h, s("R001"), 2025, 200_000);
        assert_eq!(r.rc, CB_OK);
        assert_eq!(r.entry.kind, CbEntryKind::Apply);
        assert_eq!(r.entry.applied_to_year, 2025);

        let cb = cb_ledger_get_cb(h, s("R001"), 2025);
        assert_eq!((cb.rc, cb.value), (CB_OK, 0));
        let bal = cb_ledger_banked_balance(h, s("R001"));
        assert_eq!((bal.rc, bal.value), (CB_OK, 300_000));

        assert_eq!(cb_ledger_bank(h, s("R001"), 2024, 0).rc, CB_ERR_INVALID_AMOUNT);
        assert_eq!(cb_ledger_bank_all(h, s("R001"), 2024).rc, CB_ERR_INSUFFICIENT_SURPLUS);
        assert_eq!(cb_ledger_apply(h, s("R001"), 2025, 1).rc, CB_ERR_NO_DEFICIT_TO_OFFSET);
        assert_eq!(cb_ledger_get_cb(h, s("R001"), 2031).rc, CB_ERR_SHIP_YEAR_NOT_FOUND);
        assert_eq!(cb_ledger_reverse(h, s("R001"), 1).rc, CB_ERR_REVERSAL_REJECTED);

        let rev = cb_ledger_reverse(h, s("R001"), 2);
        assert_eq!(rev.rc, CB_OK);
        assert_eq!(rev.entry.kind, CbEntryKind::Reversal);
        assert_eq!(rev.entry.reverses, 2);
        assert_eq!(cb_ledger_banked_balance(h, s("R001")).value, 500_000);

        let bad = CbStr {
            ptr: std::ptr::null(),
            len: 0,
        };
        assert_eq!(cb_ledger_get_cb(h, bad, 2024).rc, CB_ERR_ARG);
        assert_eq!(cb_ledger_get_cb(std::ptr::null(), s("R001"), 2024).rc, CB_ERR_ARG);

        cb_ledger_free(h);
    }
}

#[test]
fn ffi_pool_array_and_free() {
    let h = cb_ledger_new(1, cb_ledger_cfg_default());
    assert!(!h.is_null());

    unsafe {
        cb_ledger_set_base_cb(h, s("A"), 2024, -100_000);
        cb_ledger_set_base_cb(h, s("B"), 2024, 300_000);

        let ships = [s("B"), s("A")];
        let arr = cb_ledger_pool(h, 2024, ships.as_ptr(), ships.len());
        assert_eq!(arr.rc, CB_OK);
        assert_eq!(arr.year, 2024);
        assert_eq!(arr.total_cb, 200_000);
        assert_eq!(arr.members_len, 2);

        let members = std::slice::from_raw_parts(arr.members_ptr, arr.members_len);
        assert_eq!(member_id(&members[0]), "A");
        assert_eq!(members[0].cb_after, 0);
        assert_eq!(member_id(&members[1]), "B");
        assert_eq!(members[1].cb_after, 200_000);

        cb_ledger_pool_free(arr);

        let empty = cb_ledger_pool(h, 2024, std::ptr::null(), 0);
        assert_eq!(empty.rc, CB_ERR_EMPTY_POOL);
        cb_ledger_pool_free(empty);

        let unknown = [s("A"), s("ZZZ")];
        let arr = cb_ledger_pool(h, 2024, unknown.as_ptr(), unknown.len());
        assert_eq!(arr.rc, CB_ERR_UNKNOWN_SHIP);
        assert!(arr.members_ptr.is_null());
        cb_ledger_pool_free(arr);

        cb_ledger_free(h);
    }
}

#[test]
fn ffi_snapshot_restore_roundtrip() {
    let cfg = cb_ledger_cfg_default();
    let h1 = cb_ledger_new(2, cfg);
    assert!(!h1.is_null());

    unsafe {
        cb_ledger_set_base_cb(h1, s("R001"), 2024, 500);
        cb_ledger_set_base_cb(h1, s("R001"), 2025, -200);
        assert_eq!(cb_ledger_bank(h1, s("R001"), 2024, 500).rc, CB_OK);
        assert_eq!(cb_ledger_apply(h1, s("R001"), 2025, 200).rc, CB_OK);

        let snap = cb_ledger_snapshot(h1);
        assert_eq!(snap.rc, CB_OK);
        assert!(!snap.ptr.is_null());
        assert!(snap.len >= 12);

        let h2 = cb_ledger_new(4, cfg);
        assert!(!h2.is_null());
        cb_ledger_set_base_cb(h2, s("R001"), 2024, 500);
        cb_ledger_set_base_cb(h2, s("R001"), 2025, -200);

        let st = cb_ledger_restore(h2, snap.ptr, snap.len, 0);
        assert_eq!(st.rc, CB_OK);
        assert_eq!(st.applied, 1);
        assert_eq!(st.overwritten, 0);

        assert_eq!(cb_ledger_banked_balance(h2, s("R001")).value, 300);
        assert_eq!(cb_ledger_get_cb(h2, s("R001"), 2025).value, 0);
        assert_eq!(cb_ledger_bank(h2, s("R001"), 2024, 1).rc, CB_ERR_INSUFFICIENT_SURPLUS);

        let st = cb_ledger_restore(h2, snap.ptr, snap.len - 1, 1);
        assert_eq!(st.rc, wire::WIRE_TRUNCATED);

        cb_ledger_bytes_free(snap);
        cb_ledger_free(h1);
        cb_ledger_free(h2);
    }
}

#[test]
fn ffi_restore_rejects_overflowing_snapshot() {
    let h = cb_ledger_new(1, cb_ledger_cfg_default());
    assert!(!h.is_null());

    let bank = |seq| LedgerEntry {
        ship_id: "S".into(),
        seq,
        year: 2024,
        kind: EntryKind::Bank,
        amount: i64::MAX,
        applied_to_year: None,
        reverses: None,
        recorded_at: DateTime::from_timestamp_millis(1_735_689_600_000).unwrap(),
    };
    let bytes = wire::encode(&LedgerSnapshot {
        ledgers: vec![("S".into(), vec![bank(1), bank(2)])],
    });

    unsafe {
        let st = cb_ledger_restore(h, bytes.as_ptr(), bytes.len(), 0);
        assert_eq!(st.rc, CB_ERR_INTERNAL);
        assert_eq!(st.applied, 0);

        let snap = cb_ledger_snapshot(h);
        assert_eq!(snap.rc, CB_OK);
        assert_eq!(snap.len, 12);
        cb_ledger_bytes_free(snap);

        cb_ledger_free(h);
    }
}
