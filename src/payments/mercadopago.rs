use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{GatewayError, PaymentGateway, Preference, PreferenceRequest};
use crate::error::{AppError, Result, msg};
use crate::models::Payment;

type HmacSha256 = Hmac<Sha256>;

/// Cash-like methods settle days later; checkout is card/wallet only.
const EXCLUDED_PAYMENT_METHODS: &[&str] =
    &["cash", "ticket", "atm", "bank_transfer", "pagofacil", "rapipago"];
const EXCLUDED_PAYMENT_TYPES: &[&str] = &["ticket", "atm"];

#[derive(Debug, Deserialize)]
struct CreatePreferenceResponse {
    id: String,
    init_point: String,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    api_url: String,
}

impl MercadoPagoClient {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// API URL with `segments` appended, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, GatewayError> {
        let invalid = || GatewayError::Unavailable(format!("invalid API URL: {}", self.api_url));
        let mut url = Url::parse(&self.api_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn unavailable(e: reqwest::Error) -> GatewayError {
    GatewayError::Unavailable(e.to_string())
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn get_payment(
        &self,
        payment_id: &str,
        access_token: &str,
    ) -> std::result::Result<Payment, GatewayError> {
        let response = self
            .client
            .get(self.endpoint(&["v1", "payments", payment_id])?)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            s if s.is_success() => response.json::<Payment>().await.map_err(unavailable),
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound(payment_id.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(GatewayError::Unavailable(format!("HTTP {}: {}", status, body)))
            }
        }
    }

    async fn create_preference(
        &self,
        access_token: &str,
        request: &PreferenceRequest,
    ) -> std::result::Result<Preference, GatewayError> {
        let excluded_methods: Vec<_> = EXCLUDED_PAYMENT_METHODS
            .iter()
            .map(|id| json!({ "id": id }))
            .collect();
        let excluded_types: Vec<_> = EXCLUDED_PAYMENT_TYPES
            .iter()
            .map(|id| json!({ "id": id }))
            .collect();

        let body = json!({
            "items": [request.item],
            "metadata": request.metadata,
            "notification_url": request.notification_url,
            "back_urls": {
                "success": request.success_url,
                "failure": request.failure_url,
                "pending": request.pending_url,
            },
            "auto_return": "approved",
            "binary_mode": true,
            "payment_methods": {
                "excluded_payment_methods": excluded_methods,
                "excluded_payment_types": excluded_types,
            },
        });

        let response = self
            .client
            .post(self.endpoint(&["checkout", "preferences"])?)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            s if s.is_success() => {
                let created: CreatePreferenceResponse = response.json().await.map_err(unavailable)?;
                Ok(Preference {
                    id: created.id,
                    init_point: created.init_point,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(GatewayError::Unavailable(format!("HTTP {}: {}", status, body)))
            }
        }
    }
}

/// Verify a Mercado Pago `x-signature` header (`ts=...,v1=...`).
///
/// The signed manifest is `id:{data.id};request-id:{x-request-id};ts:{ts};`,
/// where the id is lower-cased and absent parts are omitted.
pub fn verify_webhook_signature(
    secret: &str,
    signature: &str,
    request_id: Option<&str>,
    data_id: &str,
) -> Result<bool> {
    let mut ts = None;
    let mut v1 = None;

    for part in signature.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim() {
            "ts" => ts = Some(value.trim()),
            "v1" => v1 = Some(value.trim()),
            _ => {}
        }
    }

    let ts = ts.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
    let v1 = v1.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;

    let mut manifest = String::new();
    if !data_id.is_empty() {
        manifest.push_str(&format!("id:{};", data_id.to_lowercase()));
    }
    if let Some(request_id) = request_id.filter(|r| !r.is_empty()) {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
    mac.update(manifest.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    // Signature length is not secret (always 64 hex chars)
    let expected_bytes = expected.as_bytes();
    let provided_bytes = v1.as_bytes();
    if expected_bytes.len() != provided_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(provided_bytes).into())
}
