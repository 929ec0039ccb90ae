//! Purchase persistence: exactly one record per payment id, even under races.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use classpay::materialize::{build_purchase, persist};
use common::*;

#[test]
fn test_persist_is_idempotent() {
    let mut conn = setup_test_db();
    let purchase = build_purchase("p-1", &class_metadata("sofia@students.test"), 1_000).unwrap();

    assert!(persist(&mut conn, &purchase).unwrap());
    assert!(!persist(&mut conn, &purchase).unwrap());
    assert_eq!(queries::count_purchases(&conn, "p-1").unwrap(), 1);
    assert!(queries::purchase_exists(&conn, "p-1").unwrap());
}

#[test]
fn test_persist_attaches_pending_booking() {
    let mut conn = setup_test_db();
    let booking = create_test_booking(&conn, "sofia@students.test");

    let mut metadata = class_metadata("sofia@students.test");
    metadata["booking_id"] = booking.id.clone().into();
    let purchase = build_purchase("p-2", &metadata, 1_000).unwrap();

    assert!(persist(&mut conn, &purchase).unwrap());
    let booking = queries::get_booking_by_id(&conn, &booking.id).unwrap().unwrap();
    assert_eq!(booking.payment_id.as_deref(), Some("p-2"));
    assert!(!queries::try_cancel_unpaid_booking(&conn, &booking.id).unwrap());
}

#[test]
fn test_scheduling_link_set_once() {
    let mut conn = setup_test_db();
    let purchase = build_purchase("p-3", &class_metadata("sofia@students.test"), 1_000).unwrap();
    persist(&mut conn, &purchase).unwrap();

    assert!(queries::set_scheduling_link(&conn, "p-3", "https://calendly.com/d/one").unwrap());
    assert!(!queries::set_scheduling_link(&conn, "p-3", "https://calendly.com/d/two").unwrap());

    let reservation = queries::get_reservation(&conn, "p-3").unwrap().unwrap();
    assert_eq!(reservation.scheduling_link.as_deref(), Some("https://calendly.com/d/one"));
}

#[test]
fn test_reservations_listed_per_buyer() {
    let mut conn = setup_test_db();
    for id in ["p-a", "p-b"] {
        let purchase = build_purchase(id, &class_metadata("sofia@students.test"), 1_000).unwrap();
        persist(&mut conn, &purchase).unwrap();
    }
    let other = build_purchase("p-c", &class_metadata("leo@students.test"), 1_000).unwrap();
    persist(&mut conn, &other).unwrap();

    let reservations = queries::list_reservations_for_buyer(&conn, "sofia@students.test").unwrap();
    assert_eq!(reservations.len(), 2);
    assert!(reservations.iter().all(|r| r.buyer_email == "sofia@students.test"));
    assert!(
        queries::list_reservations_for_buyer(&conn, "nobody@students.test")
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_concurrent_persist_single_winner() {
    let env = TestEnv::new();
    let purchase = Arc::new(
        build_purchase("p-race", &workshop_metadata("leo@students.test"), 1_000).unwrap(),
    );
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = env.state.db.clone();
            let purchase = purchase.clone();
            let winners = winners.clone();
            std::thread::spawn(move || {
                let mut conn = pool.get().unwrap();
                if persist(&mut conn, &purchase).unwrap() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(queries::count_purchases(&env.conn(), "p-race").unwrap(), 1);
}
