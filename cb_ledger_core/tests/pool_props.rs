use cb_ledger_core::{allocate_pool, CancelFlag};
use chrono::Utc;
use proptest::collection::vec;
use proptest::prelude::*;

fn members(values: &[i64]) -> Vec<(String, i64)> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (format!("S{:03}", i), *v))
        .collect()
}

proptest! {
    #[test]
    fn conservation_holds(values in vec(-1_000_000_000i64..1_000_000_000, 1..40)) {
        let r = allocate_pool(2024, members(&values), &CancelFlag::new(), 8, Utc::now()).unwrap();
        let before: i64 = r.members.iter().map(|m| m.cb_before).sum();
        let after: i64 = r.members.iter().map(|m| m.cb_after).sum();
        prop_assert_eq!(before, r.total_cb);
        prop_assert_eq!(after, r.total_cb);
    }

    #[test]
    fn deficits_never_worsen(values in vec(-1_000_000i64..1_000_000, 1..40)) {
        let r = allocate_pool(2024, members(&values), &CancelFlag::new(), 8, Utc::now()).unwrap();
        for m in &r.members {
            if m.cb_before < 0 {
                prop_assert!(m.cb_after >= m.cb_before);
                if r.total_cb >= 0 {
                    prop_assert!(m.cb_after >= 0);
                }
            }
        }
    }

    #[test]
    fn surplus_members_keep_a_non_negative_share(values in vec(-1_000_000i64..1_000_000, 1..40)) {
        let r = allocate_pool(2024, members(&values), &CancelFlag::new(), 8, Utc::now()).unwrap();
        if r.total_cb >= 0 {
            for m in r.members.iter().filter(|m| m.cb_before > 0) {
                prop_assert!(m.cb_after >= 0);
            }
        }
    }

    #[test]
    fn deficit_pools_are_left_alone(values in vec(-1_000_000i64..0, 1..20), extra in 0i64..1_000) {
        let mut v = values.clone();
        v.push(extra);
        let r = allocate_pool(2024, members(&v), &CancelFlag::new(), 8, Utc::now()).unwrap();
        if r.total_cb < 0 {
            for m in &r.members {
                prop_assert_eq!(m.cb_after, m.cb_before);
            }
        }
    }
}
