//! Watchdog job rows: one per booking, compare-and-swap transitions.

#[path = "../common/mod.rs"]
mod common;

use classpay::watchdog::{TriggerOutcome, WatchRequest, trigger};
use common::*;

fn settings() -> WatchdogSettings {
    WatchdogSettings {
        interval: std::time::Duration::from_secs(60),
        max_cycles: 10,
    }
}

#[test]
fn test_trigger_creates_one_job_per_booking() {
    let conn = setup_test_db();
    let booking = create_test_booking(&conn, "sofia@students.test");
    let request = WatchRequest::default();

    assert_eq!(trigger(&conn, &booking.id, &request, &settings()).unwrap(), TriggerOutcome::Started);
    assert_eq!(
        trigger(&conn, &booking.id, &request, &settings()).unwrap(),
        TriggerOutcome::AlreadyWatching
    );

    let job = queries::get_watchdog_job(&conn, &booking.id).unwrap().unwrap();
    assert_eq!(job.state, JobState::AwaitingPayment);
    assert_eq!(job.max_cycles, 10);
    assert_eq!(job.next_poll_at, booking.created_at + 60);
}

#[test]
fn test_trigger_unknown_booking_is_not_found() {
    let conn = setup_test_db();
    let result = trigger(&conn, "missing", &WatchRequest::default(), &settings());
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
fn test_advance_is_compare_and_swap() {
    let conn = setup_test_db();
    let booking = create_test_booking(&conn, "sofia@students.test");
    trigger(&conn, &booking.id, &WatchRequest::default(), &settings()).unwrap();

    assert!(queries::try_advance_watchdog_job(&conn, &booking.id, 0, 1, 120).unwrap());
    // A second worker that also read cycles_observed = 0 loses
    assert!(!queries::try_advance_watchdog_job(&conn, &booking.id, 0, 1, 120).unwrap());

    let job = queries::get_watchdog_job(&conn, &booking.id).unwrap().unwrap();
    assert_eq!(job.cycles_observed, 1);
    assert_eq!(job.next_poll_at, 120);
}

#[test]
fn test_finish_only_once() {
    let conn = setup_test_db();
    let booking = create_test_booking(&conn, "sofia@students.test");
    trigger(&conn, &booking.id, &WatchRequest::default(), &settings()).unwrap();

    assert!(queries::try_finish_watchdog_job(&conn, &booking.id, JobState::Cancelled).unwrap());
    assert!(!queries::try_finish_watchdog_job(&conn, &booking.id, JobState::Confirmed).unwrap());
    assert!(
        queries::list_due_watchdog_jobs(&conn, i64::MAX, 100)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_cancel_only_touches_unpaid_pending_bookings() {
    let conn = setup_test_db();
    let unpaid = create_test_booking(&conn, "a@students.test");
    let paid = create_test_booking(&conn, "b@students.test");
    queries::attach_payment_to_booking(&conn, &paid.id, "p-9").unwrap();

    assert!(queries::try_cancel_unpaid_booking(&conn, &unpaid.id).unwrap());
    assert!(!queries::try_cancel_unpaid_booking(&conn, &unpaid.id).unwrap());
    assert!(!queries::try_cancel_unpaid_booking(&conn, &paid.id).unwrap());
}
