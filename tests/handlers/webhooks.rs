//! Payment notification handling end to end: parsing, idempotency,
//! materialization and the best-effort follow-ups.

#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use common::*;

// ============ Scenario A: class payment ============

#[tokio::test]
async fn test_approved_class_payment_creates_reservation() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);
    env.gateway
        .insert(approved_payment("1001", class_metadata("sofia@students.test")));

    let (status, body) = send(env.app(), payment_notification("1001", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let reservation = queries::get_reservation(&env.conn(), "1001")
        .unwrap()
        .expect("reservation should exist");
    assert_eq!(reservation.buyer_email, "sofia@students.test");
    assert_eq!(reservation.teacher_email, "ana@teachers.test");
    assert_eq!(reservation.subject, "Calculus I");
    assert_eq!(reservation.duration_minutes, 90);
    assert_eq!(reservation.program, "UBA Engineering");
    assert_eq!(reservation.price, 15000.0);
    assert_eq!(reservation.original_price, 15000.0);
    assert_eq!(reservation.status, PurchaseStatus::Paid);
    assert!(reservation.discount.is_none());
    assert_eq!(reservation.scheduling_link.as_deref(), Some(SCHEDULING_LINK));

    let sent = env.outbox.sent();
    assert_eq!(sent.len(), 1, "exactly one confirmation email");
    assert_eq!(sent[0].to, "sofia@students.test");
    assert_eq!(sent[0].template, TemplateId::ClassPaid);
    assert!(
        sent[0]
            .text
            .contains("https://classpay.test/confirm-booking?payment_id=1001&status=approved"),
        "confirmation should link to the booking confirmation page: {}",
        sent[0].text
    );
    assert_eq!(env.scheduler.link_count(), 1);
}

#[tokio::test]
async fn test_ipn_query_string_notification() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);
    env.gateway
        .insert(approved_payment("1002", class_metadata("sofia@students.test")));

    let (status, _) = send(env.app(), ipn_notification("1002", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(queries::get_reservation(&env.conn(), "1002").unwrap().is_some());
}

#[tokio::test]
async fn test_payment_settles_pending_booking() {
    let env = TestEnv::new();
    let (seller, booking) = {
        let conn = env.conn();
        (
            create_test_seller(&conn, None),
            create_test_booking(&conn, "sofia@students.test"),
        )
    };

    let mut metadata = class_metadata("sofia@students.test");
    metadata["booking_id"] = booking.id.clone().into();
    env.gateway.insert(approved_payment("1003", metadata));

    let (status, _) = send(env.app(), payment_notification("1003", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);

    let booking = queries::get_booking_by_id(&env.conn(), &booking.id)
        .unwrap()
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_id.as_deref(), Some("1003"));
    assert!(booking.is_paid());
}

// ============ Scenario B: duplicate delivery ============

#[tokio::test]
async fn test_duplicate_delivery_is_idempotent() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);
    env.gateway
        .insert(approved_payment("2001", class_metadata("sofia@students.test")));

    let (first, body) = send(env.app(), payment_notification("2001", &seller.id)).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(body, "OK");

    let (second, body) = send(env.app(), payment_notification("2001", &seller.id)).await;
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body, "Already processed");

    assert_eq!(queries::count_purchases(&env.conn(), "2001").unwrap(), 1);
    assert_eq!(env.outbox.sent().len(), 1, "no second email on redelivery");
    assert_eq!(env.scheduler.link_count(), 1, "no second scheduling link");
    assert_eq!(env.gateway.fetch_count(), 1, "redelivery short-circuits before the gateway");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_materialize_once() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);
    env.gateway
        .insert(approved_payment("2002", class_metadata("sofia@students.test")));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = env.app();
        let request = payment_notification("2002", &seller.id);
        handles.push(tokio::spawn(async move { send(app, request).await }));
    }

    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK, "every delivery is acknowledged");
    }

    assert_eq!(queries::count_purchases(&env.conn(), "2002").unwrap(), 1);
    assert_eq!(env.outbox.sent().len(), 1, "only the winning delivery sends mail");
    assert_eq!(env.scheduler.link_count(), 1);
}

#[tokio::test]
async fn test_payment_id_aliases_never_create_extra_records() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);
    env.gateway
        .insert(approved_payment("7001", class_metadata("sofia@students.test")));
    env.gateway.alias("007001", "7001");

    // "7001/", "7001?x" and "7001#a", percent-encoded into the query string
    for alias in ["7001%2F", "7001%3Fx", "7001%23a"] {
        let (status, body) = send(env.app(), ipn_notification(alias, &seller.id)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "alias {}", alias);
        assert_eq!(body, "Invalid payment id");
    }
    assert_eq!(env.gateway.fetch_count(), 0, "malformed ids never reach the gateway");

    let (status, body) = send(env.app(), ipn_notification("007001", &seller.id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Payment id mismatch");
    assert_eq!(queries::count_purchases(&env.conn(), "007001").unwrap(), 0);

    let (status, body) = send(env.app(), ipn_notification("7001", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let (status, body) = send(env.app(), ipn_notification("7001", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Already processed");

    let reservations =
        queries::list_reservations_for_buyer(&env.conn(), "sofia@students.test").unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].payment_id, "7001");
    assert_eq!(env.outbox.sent().len(), 1);
    assert_eq!(env.scheduler.link_count(), 1);
}

// ============ Scenario C: workshop with discount ============

#[tokio::test]
async fn test_workshop_purchase_with_discount_records_usage() {
    let env = TestEnv::new();
    let (seller, code) = {
        let conn = env.conn();
        (
            create_test_seller(&conn, None),
            create_test_discount_code(&conn, "SPRING10", 10.0),
        )
    };

    let mut metadata = workshop_metadata("leo@students.test");
    metadata["price"] = 13500.into();
    metadata["original_price"] = 15000.into();
    metadata["discount"] = serde_json::json!({"code": "spring10", "kind": "percentage", "value": 10});
    env.gateway.insert(approved_payment("3001", metadata));

    let (status, _) = send(env.app(), payment_notification("3001", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);

    let purchase = queries::get_workshop_purchase(&env.conn(), "3001")
        .unwrap()
        .expect("workshop purchase should exist");
    assert_eq!(purchase.workshop_id, "ws-1");
    assert_eq!(purchase.sessions.len(), 2);
    assert_eq!(purchase.price, 13500.0);
    let discount = purchase.discount.expect("discount should be recorded");
    assert_eq!(discount.code, "SPRING10");
    assert_eq!(discount.amount, 1500.0);
    assert_eq!(discount.summary, "SPRING10 (-10%)");

    let usages = queries::list_discount_usages(&env.conn(), &code.id).unwrap();
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].purchase_id, "3001");
    assert_eq!(usages[0].buyer_email, "leo@students.test");
    assert_eq!(usages[0].amount_discounted, 1500.0);

    let code = queries::get_discount_code_by_code(&env.conn(), "SPRING10")
        .unwrap()
        .unwrap();
    assert_eq!(code.usage_count, 1);

    let sent = env.outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, TemplateId::WorkshopPaid);
    assert_eq!(env.scheduler.link_count(), 0, "workshops get no scheduling link");
}

#[tokio::test]
async fn test_unknown_discount_code_does_not_block_purchase() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);

    let mut metadata = class_metadata("sofia@students.test");
    metadata["price"] = 12000.into();
    metadata["original_price"] = 15000.into();
    metadata["discount"] = serde_json::json!({"code": "GHOST", "kind": "fixed", "value": 3000});
    env.gateway.insert(approved_payment("3002", metadata));

    let (status, body) = send(env.app(), payment_notification("3002", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let reservation = queries::get_reservation(&env.conn(), "3002").unwrap().unwrap();
    assert_eq!(reservation.discount.unwrap().amount, 3000.0);
}

// ============ Scenario D: best-effort isolation ============

#[tokio::test]
async fn test_follow_up_failures_do_not_fail_delivery() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);
    env.scheduler.fail.store(true, Ordering::SeqCst);
    env.outbox.fail.store(true, Ordering::SeqCst);
    env.gateway
        .insert(approved_payment("4001", class_metadata("sofia@students.test")));

    let (status, body) = send(env.app(), payment_notification("4001", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let reservation = queries::get_reservation(&env.conn(), "4001").unwrap().unwrap();
    assert!(reservation.scheduling_link.is_none());
    assert_eq!(env.scheduler.link_count(), 1, "the link was attempted");
}

#[tokio::test]
async fn test_email_failure_keeps_reservation_and_link() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);
    env.outbox.fail.store(true, Ordering::SeqCst);
    env.gateway
        .insert(approved_payment("4003", class_metadata("sofia@students.test")));

    let (status, body) = send(env.app(), payment_notification("4003", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let reservation = queries::get_reservation(&env.conn(), "4003").unwrap().unwrap();
    assert_eq!(reservation.price, 15000.0);
    assert_eq!(reservation.scheduling_link.as_deref(), Some(SCHEDULING_LINK));
    assert!(env.outbox.sent().is_empty());
}

#[tokio::test]
async fn test_discount_ledger_failure_keeps_priced_purchase() {
    let env = TestEnv::new();
    let (seller, code) = {
        let conn = env.conn();
        let seller = create_test_seller(&conn, None);
        let code = create_test_discount_code(&conn, "SPRING10", 10.0);
        // Every usage insert now fails
        conn.execute_batch("DROP TABLE discount_code_usages").unwrap();
        (seller, code)
    };

    let mut metadata = class_metadata("sofia@students.test");
    metadata["price"] = 13500.into();
    metadata["original_price"] = 15000.into();
    metadata["discount"] = serde_json::json!({"code": "SPRING10", "kind": "percentage", "value": 10});
    env.gateway.insert(approved_payment("4004", metadata));

    let (status, body) = send(env.app(), payment_notification("4004", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let reservation = queries::get_reservation(&env.conn(), "4004").unwrap().unwrap();
    assert_eq!(reservation.price, 13500.0);
    assert_eq!(reservation.original_price, 15000.0);
    let discount = reservation.discount.expect("discount stays on the reservation");
    assert_eq!(discount.code, "SPRING10");
    assert_eq!(discount.amount, 1500.0);
    assert_eq!(reservation.scheduling_link.as_deref(), Some(SCHEDULING_LINK));
    assert_eq!(env.outbox.sent().len(), 1);

    let code = queries::get_discount_code_by_code(&env.conn(), &code.code)
        .unwrap()
        .unwrap();
    assert_eq!(code.usage_count, 0, "the failed ledger write rolled back");
}

#[tokio::test]
async fn test_missing_teacher_scheduling_credentials_skips_link() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);

    let mut metadata = class_metadata("sofia@students.test");
    metadata["teacher"] = serde_json::json!({"email": "ana@teachers.test"});
    env.gateway.insert(approved_payment("4002", metadata));

    let (status, _) = send(env.app(), payment_notification("4002", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(env.scheduler.link_count(), 0);
    assert_eq!(env.outbox.sent().len(), 1, "email still goes out");
}

// ============ Rejections and no-ops ============

#[tokio::test]
async fn test_non_payment_notification_is_ignored() {
    let env = TestEnv::new();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/webhook/mercadopago?topic=merchant_order&id=77")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, body) = send(env.app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Notification ignored");
    assert_eq!(env.gateway.fetch_count(), 0);
}

#[tokio::test]
async fn test_missing_parameters_rejected() {
    let env = TestEnv::new();

    // Payment notification without credential_ref
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/webhook/mercadopago?type=payment&data.id=5001")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = send(env.app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Payment notification without a payment id
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/webhook/mercadopago?type=payment&credential_ref=abc")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = send(env.app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(env.gateway.fetch_count(), 0, "no external calls on bad input");
}

#[tokio::test]
async fn test_unknown_credential_reference_rejected() {
    let env = TestEnv::new();
    let (status, body) = send(env.app(), payment_notification("5002", "no-such-seller")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Unknown credential reference");
    assert_eq!(env.gateway.fetch_count(), 0);
}

#[tokio::test]
async fn test_gateway_failure_returns_500_and_stores_nothing() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);
    env.gateway.fail.store(true, Ordering::SeqCst);

    let (status, _) = send(env.app(), payment_notification("5003", &seller.id)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(queries::count_purchases(&env.conn(), "5003").unwrap(), 0);
    assert!(env.outbox.sent().is_empty());
}

#[tokio::test]
async fn test_pending_payment_is_not_materialized() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);
    env.gateway.insert(payment(
        "5004",
        PaymentStatus::Pending,
        class_metadata("sofia@students.test"),
    ));

    let (status, body) = send(env.app(), payment_notification("5004", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Payment not approved");
    assert_eq!(queries::count_purchases(&env.conn(), "5004").unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_metadata_acknowledged_without_record() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), None);

    let mut metadata = class_metadata("sofia@students.test");
    metadata["student"] = serde_json::json!({"name": "No Email"});
    env.gateway.insert(approved_payment("5005", metadata));

    let (status, body) = send(env.app(), payment_notification("5005", &seller.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Invalid payment metadata");
    assert_eq!(queries::count_purchases(&env.conn(), "5005").unwrap(), 0);
    assert!(env.outbox.sent().is_empty());
}

// ============ Signatures ============

fn sign(secret: &str, data_id: &str, request_id: &str, ts: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let manifest = format!("id:{};request-id:{};ts:{};", data_id, request_id, ts);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(manifest.as_bytes());
    format!("ts={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
}

fn signed_notification(
    payment_id: &str,
    seller_id: &str,
    signature: Option<String>,
) -> axum::http::Request<axum::body::Body> {
    let mut request = payment_notification(payment_id, seller_id);
    request
        .headers_mut()
        .insert("x-request-id", "req-42".parse().unwrap());
    if let Some(signature) = signature {
        request
            .headers_mut()
            .insert("x-signature", signature.parse().unwrap());
    }
    request
}

#[tokio::test]
async fn test_signed_seller_accepts_valid_signature() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), Some("whsec-mp"));
    env.gateway
        .insert(approved_payment("6001", class_metadata("sofia@students.test")));

    let signature = sign("whsec-mp", "6001", "req-42", "1760000000");
    let (status, body) = send(env.app(), signed_notification("6001", &seller.id, Some(signature))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_signed_seller_rejects_bad_or_missing_signature() {
    let env = TestEnv::new();
    let seller = create_test_seller(&env.conn(), Some("whsec-mp"));
    env.gateway
        .insert(approved_payment("6002", class_metadata("sofia@students.test")));

    let forged = sign("wrong-secret", "6002", "req-42", "1760000000");
    let (status, _) = send(env.app(), signed_notification("6002", &seller.id, Some(forged))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(env.app(), signed_notification("6002", &seller.id, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        env.app(),
        signed_notification("6002", &seller.id, Some("garbage".into())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(env.gateway.fetch_count(), 0);
    assert_eq!(queries::count_purchases(&env.conn(), "6002").unwrap(), 0);
}
