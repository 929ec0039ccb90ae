use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::discounts;
use crate::error::{ApiError, AppError, msg};
use crate::extractors::Json;
use crate::models::{DiscountInfo, PurchaseMetadata};
use crate::payments::{PreferenceItem, PreferenceRequest};

const CURRENCY_ID: &str = "ARS";

/// A checkout request for one class or workshop seat.
///
/// `offering` is the purchase metadata bag (`kind` = `class` or `workshop`).
/// It is sent to the gateway with the final price filled in and comes back
/// untouched on the payment, where the webhook materializes it.
#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequest {
    pub seller_id: String,
    pub offering: serde_json::Value,
    #[serde(default)]
    pub discount_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePurchaseResponse {
    pub preference_id: String,
    pub init_point: String,
}

fn list_price(metadata: &PurchaseMetadata) -> Option<f64> {
    let price = match metadata {
        PurchaseMetadata::Class(m) => m.price,
        PurchaseMetadata::Workshop(m) => m.price,
    };
    price.filter(|p| p.is_finite() && *p > 0.0)
}

fn checkout_item(metadata: &PurchaseMetadata, unit_price: f64) -> PreferenceItem {
    let (title, description) = match metadata {
        PurchaseMetadata::Class(m) => {
            let subject = m.subject.as_deref().unwrap_or("Tutoring");
            let teacher = m.teacher.as_ref().and_then(|t| t.name.as_deref());
            (
                format!("Class: {}", subject),
                match teacher {
                    Some(name) => format!("{} with {}", subject, name),
                    None => subject.to_string(),
                },
            )
        }
        PurchaseMetadata::Workshop(m) => {
            let title = m
                .workshop
                .as_ref()
                .and_then(|w| w.title.as_deref())
                .unwrap_or("Workshop");
            (
                format!("Workshop: {}", title),
                format!("{} ({} sessions)", title, m.sessions.len()),
            )
        }
    };

    PreferenceItem {
        title,
        description,
        currency_id: CURRENCY_ID.to_string(),
        unit_price,
        quantity: 1,
    }
}

fn apply_price(
    metadata: &mut PurchaseMetadata,
    original: f64,
    price: f64,
    discount: Option<DiscountInfo>,
) {
    match metadata {
        PurchaseMetadata::Class(m) => {
            m.original_price = Some(original);
            m.price = Some(price);
            m.discount = discount;
        }
        PurchaseMetadata::Workshop(m) => {
            m.original_price = Some(original);
            m.price = Some(price);
            m.discount = discount;
        }
    }
}

/// POST /purchases - open a hosted checkout with the seller's gateway account.
///
/// Nothing is stored here; the purchase only exists once the payment is approved.
pub async fn create_purchase(
    State(state): State<AppState>,
    payload: Result<Json<CreatePurchaseRequest>, AppError>,
) -> Result<Json<CreatePurchaseResponse>, ApiError> {
    let Json(request) = payload?;
    let now = Utc::now().timestamp();

    let (seller, discount_code) = {
        let conn = state.db.get()?;

        let seller = queries::get_seller_by_id(&conn, &request.seller_id)?
            .ok_or_else(|| ApiError::CredentialNotFound(request.seller_id.clone()))?;

        let discount_code = match request.discount_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(
                queries::get_discount_code_by_code(&conn, code)?
                    .ok_or_else(|| ApiError::InvalidArgument(msg::INVALID_DISCOUNT_CODE.into()))?,
            ),
            _ => None,
        };

        (seller, discount_code)
    };

    if seller.access_token.trim().is_empty() {
        return Err(ApiError::CredentialEmpty(seller.id));
    }

    let mut metadata = PurchaseMetadata::from_value(&request.offering)
        .map_err(|e| ApiError::InvalidArgument(format!("Invalid offering: {}", e)))?;
    let original = list_price(&metadata)
        .ok_or_else(|| ApiError::InvalidArgument("Offering must have a positive price".into()))?;

    let (price, discount) = match discount_code {
        Some(code) => {
            let price = discounts::quote(&code, original, now)
                .ok_or_else(|| ApiError::InvalidArgument(msg::INVALID_DISCOUNT_CODE.into()))?;
            let info = DiscountInfo {
                code: code.code,
                kind: code.kind,
                value: code.value,
            };
            (price, Some(info))
        }
        None => (original, None),
    };
    apply_price(&mut metadata, original, price, discount);

    let preference_request = PreferenceRequest {
        item: checkout_item(&metadata, price),
        metadata: serde_json::to_value(&metadata).map_err(AppError::from)?,
        notification_url: format!(
            "{}/webhook/mercadopago?credential_ref={}",
            state.base_url, seller.id
        ),
        success_url: format!("{}/confirm-booking", state.site_url),
        failure_url: format!("{}/book", state.site_url),
        pending_url: format!("{}/book", state.site_url),
    };

    let preference = state
        .gateway
        .create_preference(&seller.access_token, &preference_request)
        .await
        .map_err(|e| {
            tracing::error!(seller_id = %seller.id, "Failed to create checkout: {}", e);
            ApiError::Internal(msg::CHECKOUT_FAILED.into())
        })?;

    tracing::info!(
        seller_id = %seller.id,
        preference_id = %preference.id,
        price,
        "Checkout created"
    );

    Ok(Json(CreatePurchaseResponse {
        preference_id: preference.id,
        init_point: preference.init_point,
    }))
}
