use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::{AppState, queries};
use crate::extractors::Query;
use crate::payments::verify_webhook_signature;

use super::common::{WebhookResult, db_conn, db_lookup, materialize_payment, run_follow_ups};
use super::parser::{self, MalformedNotification, Notification};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Check `x-signature` when the seller has a webhook secret configured.
fn check_signature(
    secret: Option<&str>,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    payment_id: &str,
) -> Result<(), WebhookResult> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return Ok(());
    };

    let signature =
        header(headers, "x-signature").ok_or((StatusCode::BAD_REQUEST, "Missing signature"))?;
    let data_id = query.get("data.id").map(String::as_str).unwrap_or(payment_id);

    match verify_webhook_signature(secret, signature, header(headers, "x-request-id"), data_id) {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!(payment_id, "Rejected notification with invalid signature");
            Err((StatusCode::BAD_REQUEST, "Invalid signature"))
        }
        Err(e) => {
            tracing::warn!(payment_id, "Rejected notification: {}", e);
            Err((StatusCode::BAD_REQUEST, "Invalid signature format"))
        }
    }
}

async fn process_notification(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    body: &Bytes,
) -> Result<WebhookResult, WebhookResult> {
    let body_json: Option<serde_json::Value> = serde_json::from_slice(body).ok();

    let (payment_id, credential_ref) = match parser::parse(query, body_json.as_ref()) {
        Ok(Notification::Payment {
            payment_id,
            credential_ref,
        }) => (payment_id, credential_ref),
        Ok(Notification::Ignored { kind }) => {
            tracing::debug!(kind = ?kind, "Ignoring non-payment notification");
            return Ok((StatusCode::OK, "Notification ignored"));
        }
        Err(MalformedNotification::InvalidPaymentId(id)) => {
            tracing::warn!(payment_id = %id, "Rejected notification with invalid payment id");
            return Err((StatusCode::BAD_REQUEST, "Invalid payment id"));
        }
        Err(e) => {
            tracing::warn!("Malformed payment notification: {}", e);
            return Err((StatusCode::BAD_REQUEST, "Missing required parameters"));
        }
    };

    let seller = {
        let conn = db_conn(state)?;

        let seller = db_lookup(
            queries::get_seller_by_id(&conn, &credential_ref),
            (StatusCode::BAD_REQUEST, "Unknown credential reference"),
        )?;

        check_signature(seller.webhook_secret.as_deref(), headers, query, &payment_id)?;

        // Cheap early exit; the insert in materialize_payment is what actually guards
        match queries::purchase_exists(&conn, &payment_id) {
            Ok(true) => return Ok((StatusCode::OK, "Already processed")),
            Ok(false) => {}
            Err(e) => {
                tracing::error!("DB error: {}", e);
                return Err((StatusCode::INTERNAL_SERVER_ERROR, "Database error"));
            }
        }

        seller
    };

    let payment = state
        .gateway
        .get_payment(&payment_id, &seller.access_token)
        .await
        .map_err(|e| {
            tracing::error!(payment_id = %payment_id, "Failed to fetch payment: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error fetching payment")
        })?;

    // The record is keyed by the gateway's id; a payment answering to another id is refused
    if payment.id != payment_id {
        tracing::warn!(
            requested = %payment_id,
            returned = %payment.id,
            "Gateway returned a different payment than requested"
        );
        return Err((StatusCode::BAD_REQUEST, "Payment id mismatch"));
    }

    if !payment.is_approved() {
        tracing::info!(
            payment_id = %payment.id,
            status = payment.status.as_ref(),
            "Payment not approved yet, waiting for a later notification"
        );
        return Ok((StatusCode::OK, "Payment not approved"));
    }

    let purchase = {
        let mut conn = db_conn(state)?;
        materialize_payment(
            &mut conn,
            &payment.id,
            &payment.metadata,
            chrono::Utc::now().timestamp(),
        )?
    };

    tracing::info!(
        payment_id = %payment.id,
        seller_id = %seller.id,
        buyer = purchase.buyer_email(),
        "Purchase materialized"
    );

    run_follow_ups(state, &purchase, &payment.metadata).await;

    Ok((StatusCode::OK, "OK"))
}

/// Axum handler for Mercado Pago notifications (IPN and webhooks, GET or POST).
pub async fn handle_mercadopago_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    process_notification(&state, &headers, &query, &body)
        .await
        .unwrap_or_else(|e| e)
}
