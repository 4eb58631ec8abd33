// ==========================================
// 补课券生命周期集成测试
// ==========================================
// 覆盖: 生成、安排、核销、删除、过期、并发安排
// ==========================================


use chrono::Duration;
use school_credit_ledger::config::config_keys;
use school_credit_ledger::{AppState, AssignedClass, LedgerError, MakeupStatus};
use std::sync::Arc;
use std::thread;
use test_helpers::{base_time, create_test_db, create_test_state, seed_member};

fn saturday_class() -> AssignedClass {
    AssignedClass {
        day: "Sat".to_string(),
        time: "13:00-15:00".to_string(),
        coach: "Jared".to_string(),
        date: "2026-10-24".to_string(),
        note: String::new(),
    }
}

#[test]
fn test_absence_creates_available_ticket() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    seed_member(&state, "s1", "Anny", 10.0);

    let ticket = state.create_makeup("s1", "Kier", "Phonics A").unwrap();

    assert_eq!(ticket.status, MakeupStatus::Available);
    assert_eq!(ticket.missed_class, "Phonics A");
    assert_eq!(ticket.missed_coach, "Kier");
    assert_eq!(ticket.expiry, base_time() + Duration::days(30));

    let listed = state.makeups.list("s1").unwrap();
    assert_eq!(listed, vec![ticket]);
}

#[test]
fn test_duplicate_absences_are_independent_tickets() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    seed_member(&state, "s1", "Anny", 10.0);

    let a = state.create_makeup("s1", "Kier", "Phonics A").unwrap();
    let b = state.create_makeup("s1", "Kier", "Phonics A").unwrap();

    assert_ne!(a.ticket_id, b.ticket_id);
    assert_eq!(state.makeups.list("s1").unwrap().len(), 2);
}

#[test]
fn test_create_for_unknown_student_fails() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    assert!(matches!(
        state.create_makeup("ghost", "Kier", "Phonics A"),
        Err(LedgerError::NotFound { .. })
    ));
}

#[test]
fn test_assign_reassign_redeem() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    seed_member(&state, "s1", "Anny", 10.0);
    let ticket = state.create_makeup("s1", "Kier", "Phonics A").unwrap();

    let assigned = state
        .assign_makeup("s1", &ticket.ticket_id, saturday_class())
        .unwrap();
    assert_eq!(assigned.status, MakeupStatus::Assigned);

    let mut other = saturday_class();
    other.coach = "Bow".to_string();
    let reassigned = state
        .assign_makeup("s1", &ticket.ticket_id, other.clone())
        .unwrap();
    assert_eq!(reassigned.assigned_class, Some(other));

    let used = state.redeem_makeup("s1", &ticket.ticket_id).unwrap();
    assert_eq!(used.status, MakeupStatus::Used);
    assert!(used.used_at.is_some());

    // 已核销的券保留为历史
    let listed = state.makeups.list("s1").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, MakeupStatus::Used);
}

#[test]
fn test_used_ticket_cannot_go_back() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    seed_member(&state, "s1", "Anny", 10.0);
    let ticket = state.create_makeup("s1", "Kier", "Phonics A").unwrap();
    state.redeem_makeup("s1", &ticket.ticket_id).unwrap();

    assert!(matches!(
        state.assign_makeup("s1", &ticket.ticket_id, saturday_class()),
        Err(LedgerError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        state.redeem_makeup("s1", &ticket.ticket_id),
        Err(LedgerError::InvalidStateTransition { .. })
    ));
    let stored = state.makeup_repo.find("s1", &ticket.ticket_id).unwrap().unwrap();
    assert_eq!(stored.status, MakeupStatus::Used);
}

#[test]
fn test_assign_after_delete_is_ticket_not_found() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    seed_member(&state, "s1", "Anny", 10.0);
    let ticket = state.create_makeup("s1", "Kier", "Phonics A").unwrap();

    state.delete_makeup("s1", &ticket.ticket_id).unwrap();

    assert!(matches!(
        state.assign_makeup("s1", &ticket.ticket_id, saturday_class()),
        Err(LedgerError::TicketNotFound { .. })
    ));
    assert!(state.makeups.list("s1").unwrap().is_empty());
    assert!(matches!(
        state.delete_makeup("s1", &ticket.ticket_id),
        Err(LedgerError::TicketNotFound { .. })
    ));
}

#[test]
fn test_invalid_class_details_rejected_before_write() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    seed_member(&state, "s1", "Anny", 10.0);
    let ticket = state.create_makeup("s1", "Kier", "Phonics A").unwrap();

    let mut bad = saturday_class();
    bad.coach = " ".to_string();
    assert!(matches!(
        state.assign_makeup("s1", &ticket.ticket_id, bad),
        Err(LedgerError::InvalidArgument(_))
    ));
    let stored = state.makeup_repo.find("s1", &ticket.ticket_id).unwrap().unwrap();
    assert_eq!(stored.status, MakeupStatus::Available);
}

#[test]
fn test_expired_ticket_stays_open_but_cannot_be_used() {
    let (_tmp, state, clock) = create_test_state().unwrap();
    seed_member(&state, "s1", "Anny", 10.0);
    let ticket = state.create_makeup("s1", "Kier", "Phonics A").unwrap();

    clock.advance(Duration::days(31));

    // 读取不改变状态
    let listed = state.makeups.list("s1").unwrap();
    assert_eq!(listed[0].status, MakeupStatus::Available);
    assert!(state.makeups.list_redeemable("s1").unwrap().is_empty());

    assert!(matches!(
        state.redeem_makeup("s1", &ticket.ticket_id),
        Err(LedgerError::TicketExpired { .. })
    ));
    assert!(matches!(
        state.assign_makeup("s1", &ticket.ticket_id, saturday_class()),
        Err(LedgerError::TicketExpired { .. })
    ));

    // 过期券仍可删除
    state.delete_makeup("s1", &ticket.ticket_id).unwrap();
}

#[test]
fn test_strict_redeem_requires_assignment() {
    let (_tmp, conn) = create_test_db().unwrap();
    {
        let mgr = school_credit_ledger::config::ConfigManager::from_connection(conn.clone()).unwrap();
        mgr.update_config(config_keys::MAKEUP_STRICT_REDEEM, "true").unwrap();
    }
    let clock = Arc::new(school_credit_ledger::FixedClock::new(base_time()));
    let state = AppState::with_connection(conn, clock).unwrap();
    assert!(state.config.makeup_strict_redeem);

    seed_member(&state, "s1", "Anny", 10.0);
    let ticket = state.create_makeup("s1", "Kier", "Phonics A").unwrap();

    assert!(matches!(
        state.redeem_makeup("s1", &ticket.ticket_id),
        Err(LedgerError::InvalidStateTransition { .. })
    ));
    state
        .assign_makeup("s1", &ticket.ticket_id, saturday_class())
        .unwrap();
    assert_eq!(
        state.redeem_makeup("s1", &ticket.ticket_id).unwrap().status,
        MakeupStatus::Used
    );
}

#[test]
fn test_concurrent_assign_on_different_tickets_keeps_both() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    seed_member(&state, "s1", "Anny", 10.0);
    let tickets: Vec<String> = (0..8)
        .map(|_| state.create_makeup("s1", "Kier", "Phonics A").unwrap().ticket_id)
        .collect();

    let makeups = state.makeups.clone();
    let handles: Vec<_> = tickets
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, id)| {
            let makeups = makeups.clone();
            thread::spawn(move || {
                let mut class = saturday_class();
                class.note = format!("slot {}", i);
                makeups.assign("s1", &id, class).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let listed = state.makeups.list("s1").unwrap();
    assert_eq!(listed.len(), tickets.len());
    assert!(listed.iter().all(|t| t.status == MakeupStatus::Assigned));
    let listed_ids: Vec<_> = listed.iter().map(|t| t.ticket_id.clone()).collect();
    assert_eq!(listed_ids, tickets);
}
