//! Snapshot wire format (binary, little-endian):
//!
//! ```text
//! [u32 magic = "CBL1"][u32 version = 1][u32 ledger_count]
//! repeated ledger_count times:
//!   [u32 id_len][id bytes][u32 entry_count]
//!   repeated entry_count times:
//!     [u64 seq][i32 year][u8 kind][i64 amount]
//!     [i32 applied_to_year | i32::MIN][u64 reverses | 0][i64 recorded_at_ms]
//! ```

use cb_ledger_core::{EntryKind, LedgerEntry};
use cb_ledger_supervisor::LedgerSnapshot;
use chrono::{DateTime, Utc};

pub const SNAP_MAGIC: u32 = 0x314C_4243; // "CBL1" little-endian
pub const SNAP_VERSION: u32 = 1;

pub const WIRE_TRUNCATED: i32 = -2;
pub const WIRE_BAD_STRING: i32 = -5;
pub const WIRE_BAD_KIND: i32 = -6;
pub const WIRE_BAD_TIMESTAMP: i32 = -7;
pub const WIRE_BAD_MAGIC: i32 = -8;
pub const WIRE_BAD_VERSION: i32 = -9;

const NO_YEAR: i32 = i32::MIN;

fn kind_to_u8(k: EntryKind) -> u8 {
    match k {
        EntryKind::Bank => 0,
        EntryKind::Apply => 1,
        EntryKind::Reversal => 2,
    }
}

fn kind_from_u8(v: u8) -> Option<EntryKind> {
    match v {
        0 => Some(EntryKind::Bank),
        1 => Some(EntryKind::Apply),
        2 => Some(EntryKind::Reversal),
        _ => None,
    }
}

pub fn encode(snap: &LedgerSnapshot) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::new();
    buf.extend_from_slice(&SNAP_MAGIC.to_le_bytes());
    buf.extend_from_slice(&SNAP_VERSION.to_le_bytes());
    buf.extend_from_slice(&(snap.ledgers.len() as u32).to_le_bytes());

    for (ship_id, entries) in &snap.ledgers {
        let idb = ship_id.as_bytes();
        buf.extend_from_slice(&(idb.len() as u32).to_le_bytes());
        buf.extend_from_slice(idb);
        buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());

        for e in entries {
            buf.extend_from_slice(&e.seq.to_le_bytes());
            buf.extend_from_slice(&e.year.to_le_bytes());
            buf.push(kind_to_u8(e.kind));
            buf.extend_from_slice(&e.amount.to_le_bytes());
            buf.extend_from_slice(&e.applied_to_year.unwrap_or(NO_YEAR).to_le_bytes());
            buf.extend_from_slice(&e.reverses.unwrap_or(0).to_le_bytes());
            buf.extend_from_slice(&e.recorded_at.timestamp_millis().to_le_bytes());
        }
    }
    buf
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], i32> {
        if self.pos + N > self.data.len() {
            return Err(WIRE_TRUNCATED);
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, i32> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, i32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, i32> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, i32> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn i64(&mut self) -> Result<i64, i32> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    fn string(&mut self) -> Result<String, i32> {
        let len = self.u32()? as usize;
        if self.pos + len > self.data.len() {
            return Err(WIRE_TRUNCATED);
        }
        let s = std::str::from_utf8(&self.data[self.pos..self.pos + len]).map_err(|_| WIRE_BAD_STRING)?;
        self.pos += len;
        Ok(s.to_string())
    }
}

/// Decode a snapshot. Structural ledger rules are checked later by restore.
pub fn decode(data: &[u8]) -> Result<LedgerSnapshot, i32> {
    let mut r = Reader { data, pos: 0 };
    if r.u32()? != SNAP_MAGIC {
        return Err(WIRE_BAD_MAGIC);
    }
    if r.u32()? != SNAP_VERSION {
        return Err(WIRE_BAD_VERSION);
    }

    let count = r.u32()? as usize;
    let mut ledgers = Vec::new();
    for _ in 0..count {
        let ship_id = r.string()?;
        let n = r.u32()? as usize;
        let mut entries = Vec::new();
        for _ in 0..n {
            let seq = r.u64()?;
            let year = r.i32()?;
            let kind = kind_from_u8(r.u8()?).ok_or(WIRE_BAD_KIND)?;
            let amount = r.i64()?;
            let applied_to_year = Some(r.i32()?).filter(|y| *y != NO_YEAR);
            let reverses = Some(r.u64()?).filter(|s| *s != 0);
            let recorded_at: DateTime<Utc> =
                DateTime::from_timestamp_millis(r.i64()?).ok_or(WIRE_BAD_TIMESTAMP)?;
            entries.push(LedgerEntry {
                ship_id: ship_id.clone(),
                seq,
                year,
                kind,
                amount,
                applied_to_year,
                reverses,
                recorded_at,
            });
        }
        ledgers.push((ship_id, entries));
    }
    Ok(LedgerSnapshot { ledgers })
}
