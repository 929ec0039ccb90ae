//! Discount usage ledger: one entry per (code, purchase), counted once.

#[path = "../common/mod.rs"]
mod common;

use classpay::discounts::{UsageOutcome, record_usage};
use common::*;

#[test]
fn test_usage_recorded_once_per_purchase() {
    let mut conn = setup_test_db();
    let code = create_test_discount_code(&conn, "SPRING10", 10.0);

    let first = record_usage(&mut conn, "spring10", "leo@students.test", "p-1", 1500.0).unwrap();
    assert_eq!(first, UsageOutcome::Recorded { usage_count: 1 });

    let again = record_usage(&mut conn, "SPRING10", "leo@students.test", "p-1", 1500.0).unwrap();
    assert_eq!(again, UsageOutcome::AlreadyRecorded);

    let other = record_usage(&mut conn, "SPRING10", "ana@students.test", "p-2", 1000.0).unwrap();
    assert_eq!(other, UsageOutcome::Recorded { usage_count: 2 });

    let usages = queries::list_discount_usages(&conn, &code.id).unwrap();
    assert_eq!(usages.len(), 2);
    let stored = queries::get_discount_code_by_code(&conn, "SPRING10").unwrap().unwrap();
    assert_eq!(stored.usage_count, 2);
}

#[test]
fn test_unknown_code_records_nothing() {
    let mut conn = setup_test_db();
    let outcome = record_usage(&mut conn, "GHOST", "leo@students.test", "p-1", 100.0).unwrap();
    assert_eq!(outcome, UsageOutcome::UnknownCode);
}

#[test]
fn test_usage_beyond_limit_is_still_recorded() {
    let mut conn = setup_test_db();
    queries::create_discount_code(
        &conn,
        &CreateDiscountCode {
            code: "ONCE".into(),
            kind: DiscountKind::Fixed,
            value: 500.0,
            usage_limit: Some(1),
            expires_at: None,
        },
    )
    .unwrap();

    record_usage(&mut conn, "ONCE", "a@students.test", "p-1", 500.0).unwrap();
    let second = record_usage(&mut conn, "ONCE", "b@students.test", "p-2", 500.0).unwrap();
    assert_eq!(second, UsageOutcome::Recorded { usage_count: 2 });
}

#[test]
fn test_codes_are_case_insensitive_and_unique() {
    let conn = setup_test_db();
    let code = create_test_discount_code(&conn, "welcome", 20.0);
    assert_eq!(code.code, "WELCOME");
    assert!(queries::get_discount_code_by_code(&conn, " Welcome ").unwrap().is_some());

    let duplicate = queries::create_discount_code(
        &conn,
        &CreateDiscountCode {
            code: "WELCOME".into(),
            kind: DiscountKind::Fixed,
            value: 1.0,
            usage_limit: None,
            expires_at: None,
        },
    );
    assert!(duplicate.is_err());
}
