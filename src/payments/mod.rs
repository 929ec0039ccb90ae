mod mercadopago;

pub use mercadopago::*;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::Payment;

/// Failure talking to the payment gateway.
///
/// Every variant is fatal to a webhook delivery: the gateway redelivers,
/// so there is no local retry.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("payment not found: {0}")]
    NotFound(String),

    #[error("gateway rejected the access token")]
    Unauthorized,

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Checkout item shown to the buyer on the gateway's hosted page.
#[derive(Debug, Clone, Serialize)]
pub struct PreferenceItem {
    pub title: String,
    pub description: String,
    pub currency_id: String,
    pub unit_price: f64,
    pub quantity: u32,
}

/// Everything needed to open a hosted checkout for one purchase.
#[derive(Debug, Clone)]
pub struct PreferenceRequest {
    pub item: PreferenceItem,
    /// Echoed back verbatim as `Payment::metadata`
    pub metadata: serde_json::Value,
    pub notification_url: String,
    pub success_url: String,
    pub failure_url: String,
    pub pending_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preference {
    pub id: String,
    pub init_point: String,
}

/// Read and checkout operations against a payment gateway.
///
/// Every call takes the seller's own access token; payments land in the
/// seller's account, not ours.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetch the authoritative payment record. Single attempt.
    async fn get_payment(
        &self,
        payment_id: &str,
        access_token: &str,
    ) -> Result<Payment, GatewayError>;

    async fn create_preference(
        &self,
        access_token: &str,
        request: &PreferenceRequest,
    ) -> Result<Preference, GatewayError>;
}
