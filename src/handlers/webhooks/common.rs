//! Shared pieces of payment notification handling.

use axum::http::StatusCode;
use rusqlite::Connection;

use crate::db::{AppState, queries};
use crate::discounts::{self, UsageOutcome};
use crate::email;
use crate::error::AppError;
use crate::materialize;
use crate::models::{NewPurchase, PurchaseMetadata, TemplateId};
use crate::scheduling;

/// Result type for webhook operations.
///
/// The gateway only looks at the status code; the text is for humans reading logs.
pub type WebhookResult = (StatusCode, &'static str);

/// Helper to unwrap DB query results with consistent error handling.
pub(crate) fn db_lookup<T>(
    result: Result<Option<T>, AppError>,
    not_found: WebhookResult,
) -> Result<T, WebhookResult> {
    match result {
        Ok(Some(v)) => Ok(v),
        Ok(None) => Err(not_found),
        Err(e) => {
            tracing::error!("DB error: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Database error"))
        }
    }
}

pub(crate) fn db_conn(
    state: &AppState,
) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, WebhookResult> {
    state.db.get().map_err(|e| {
        tracing::error!("DB connection error: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })
}

/// Build and atomically store the purchase for an approved payment.
///
/// Returns the stored record, or the response to send when there is nothing
/// further to do (duplicate, unusable metadata, storage failure).
pub fn materialize_payment(
    conn: &mut Connection,
    payment_id: &str,
    metadata: &serde_json::Value,
    now: i64,
) -> Result<NewPurchase, WebhookResult> {
    let purchase = match materialize::build_purchase(payment_id, metadata, now) {
        Ok(p) => p,
        Err(e) => {
            // Redelivery cannot fix this; acknowledge so the gateway stops retrying
            tracing::warn!(payment_id, "Unusable payment metadata: {}", e);
            return Err((StatusCode::OK, "Invalid payment metadata"));
        }
    };

    match materialize::persist(conn, &purchase) {
        Ok(true) => Ok(purchase),
        Ok(false) => Err((StatusCode::OK, "Already processed")),
        Err(e) => {
            // Rolled back; the gateway will redeliver
            tracing::error!(payment_id, "Failed to store purchase: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Error processing payment"))
        }
    }
}

async fn provision_scheduling_link(
    state: &AppState,
    reservation_id: &str,
    metadata: &serde_json::Value,
) {
    let Ok(PurchaseMetadata::Class(m)) = PurchaseMetadata::from_value(metadata) else {
        return;
    };
    let teacher = m.teacher.unwrap_or_default();

    let Some(link) = scheduling::provision_link(
        state.scheduling.as_ref(),
        teacher.scheduling_owner.as_deref(),
        teacher.scheduling_token.as_deref(),
    )
    .await
    else {
        return;
    };

    let stored = state
        .db
        .get()
        .map_err(AppError::from)
        .and_then(|conn| queries::set_scheduling_link(&conn, reservation_id, &link));
    match stored {
        Ok(true) => tracing::info!(payment_id = reservation_id, "Scheduling link stored"),
        Ok(false) => tracing::debug!(payment_id = reservation_id, "Scheduling link already set"),
        Err(e) => tracing::warn!(payment_id = reservation_id, "Failed to store scheduling link: {}", e),
    }
}

fn send_confirmation(state: &AppState, purchase: &NewPurchase) {
    let (template, fields) = match purchase {
        NewPurchase::Class(r) => (TemplateId::ClassPaid, email::class_paid(r, &state.site_url)),
        NewPurchase::Workshop(w) => (TemplateId::WorkshopPaid, email::workshop_paid(w)),
    };

    if let Err(e) = email::enqueue(state.outbox.as_ref(), purchase.buyer_email(), template, &fields) {
        tracing::warn!(
            payment_id = purchase.payment_id(),
            "Failed to queue confirmation email: {}",
            e
        );
    }
}

fn record_discount(state: &AppState, purchase: &NewPurchase) {
    let Some(discount) = purchase.discount() else {
        return;
    };

    let outcome = state.db.get().map_err(AppError::from).and_then(|mut conn| {
        discounts::record_usage(
            &mut conn,
            &discount.code,
            purchase.buyer_email(),
            purchase.payment_id(),
            discount.amount,
        )
    });

    match outcome {
        Ok(UsageOutcome::Recorded { .. }) | Ok(UsageOutcome::UnknownCode) => {}
        Ok(UsageOutcome::AlreadyRecorded) => {
            tracing::debug!(payment_id = purchase.payment_id(), "Discount usage already recorded");
        }
        Err(e) => tracing::warn!(
            payment_id = purchase.payment_id(),
            "Failed to record discount usage: {}",
            e
        ),
    }
}

/// Scheduling link, confirmation email and discount ledger.
///
/// Run concurrently; each failure is logged and none affects the others or
/// the response.
pub async fn run_follow_ups(
    state: &AppState,
    purchase: &NewPurchase,
    metadata: &serde_json::Value,
) {
    let link = async {
        if let NewPurchase::Class(r) = purchase {
            provision_scheduling_link(state, &r.payment_id, metadata).await;
        }
    };
    let mail = async { send_confirmation(state, purchase) };
    let discount = async { record_discount(state, purchase) };

    tokio::join!(link, mail, discount);
}
