// ==========================================
// 并发扣减测试
// ==========================================
// 验证: 同一学员并发扣减不丢更新; 免费课时不会被扣成超额
// ==========================================


use school_credit_ledger::repository::BalanceStore;
use school_credit_ledger::{MembershipStatus, ScholarshipTier};
use std::thread;
use test_helpers::{create_test_state, seed_member, seed_student};

const THREADS: usize = 8;
const DEDUCTIONS_PER_THREAD: usize = 10;

#[test]
fn test_concurrent_deductions_same_student_no_lost_updates() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    seed_member(&state, "s1", "Anny", 200.0);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ledger = state.ledger.clone();
            thread::spawn(move || {
                for _ in 0..DEDUCTIONS_PER_THREAD {
                    ledger.deduct("s1", 1.0).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = (THREADS * DEDUCTIONS_PER_THREAD) as f64;
    let balance = state.student_repo.get_balance("s1").unwrap();
    assert_eq!(balance.credits, 200.0 - total);
    assert_eq!(balance.used_hours, total);
}

#[test]
fn test_concurrent_reward_deductions_never_overdraw_free_hours() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    seed_student(
        &state,
        "s1",
        "Anny",
        100.0,
        ScholarshipTier::Reward {
            free_hours_total: 10.0,
            free_hours_used: 0.0,
        },
        MembershipStatus::Member,
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ledger = state.ledger.clone();
            thread::spawn(move || {
                for _ in 0..DEDUCTIONS_PER_THREAD {
                    ledger.deduct("s1", 1.5).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = THREADS as f64 * DEDUCTIONS_PER_THREAD as f64 * 1.5;
    let balance = state.student_repo.get_balance("s1").unwrap();
    assert_eq!(balance.free_hours_used(), 10.0);
    assert!((balance.used_hours - (total - 10.0)).abs() < 1e-9);
    assert!((balance.credits - (100.0 - (total - 10.0))).abs() < 1e-9);
}

#[test]
fn test_different_students_in_parallel() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    for i in 0..THREADS {
        seed_member(&state, &format!("s{}", i), "Anny", 50.0);
    }

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let ledger = state.ledger.clone();
            let makeups = state.makeups.clone();
            thread::spawn(move || {
                let id = format!("s{}", i);
                ledger.deduct(&id, 2.0).unwrap();
                makeups.create(&id, "Kier", "Phonics A").unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for i in 0..THREADS {
        let id = format!("s{}", i);
        assert_eq!(state.student_repo.get_balance(&id).unwrap().credits, 48.0);
        assert_eq!(state.makeups.list(&id).unwrap().len(), 1);
    }
}
