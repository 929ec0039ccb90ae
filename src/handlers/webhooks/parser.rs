//! Extracting what a gateway notification is about.
//!
//! Mercado Pago delivers the same event in several shapes (legacy IPN query
//! strings, v1 webhooks with a JSON body, feed-style `resource` URLs), so
//! every field is looked up in a fixed order of places.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

const PAYMENT_KIND: &str = "payment";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Payment {
        payment_id: String,
        credential_ref: String,
    },
    /// Anything that is not a payment (merchant orders, chargebacks, ...)
    Ignored { kind: Option<String> },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedNotification {
    #[error("payment notification without a payment id")]
    MissingPaymentId,

    #[error("payment notification without a credential reference")]
    MissingCredentialRef,

    #[error("payment id is not a gateway payment id: {0}")]
    InvalidPaymentId(String),
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Query `topic`, query `type`, body `type`, then the body `action` prefix
/// (`"payment.created"` -> `"payment"`).
fn notification_kind(query: &HashMap<String, String>, body: Option<&Value>) -> Option<String> {
    non_empty(query.get("topic").map(String::as_str))
        .or_else(|| non_empty(query.get("type").map(String::as_str)))
        .or_else(|| non_empty(body.and_then(|b| b.get("type")).and_then(Value::as_str)))
        .or_else(|| {
            body.and_then(|b| b.get("action"))
                .and_then(Value::as_str)
                .and_then(|action| non_empty(action.split('.').next()))
        })
}

/// `resource` is either a bare id or a URL ending in the id.
fn resource_id(resource: &str) -> Option<String> {
    let resource = resource.trim().trim_end_matches('/');
    if resource.contains("://") {
        non_empty(resource.rsplit('/').next())
    } else {
        non_empty(Some(resource))
    }
}

/// Gateway payment ids are plain decimal numbers.
fn is_gateway_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Query `id`, query `data.id`, body `data.id`, then body `resource`.
fn payment_id(query: &HashMap<String, String>, body: Option<&Value>) -> Option<String> {
    non_empty(query.get("id").map(String::as_str))
        .or_else(|| non_empty(query.get("data.id").map(String::as_str)))
        .or_else(|| {
            body.and_then(|b| b.get("data"))
                .and_then(|d| d.get("id"))
                .and_then(value_as_id)
        })
        .or_else(|| {
            body.and_then(|b| b.get("resource"))
                .and_then(Value::as_str)
                .and_then(resource_id)
        })
}

pub fn parse(
    query: &HashMap<String, String>,
    body: Option<&Value>,
) -> Result<Notification, MalformedNotification> {
    let kind = notification_kind(query, body);
    if kind.as_deref() != Some(PAYMENT_KIND) {
        return Ok(Notification::Ignored { kind });
    }

    let payment_id = payment_id(query, body).ok_or(MalformedNotification::MissingPaymentId)?;
    if !is_gateway_id(&payment_id) {
        return Err(MalformedNotification::InvalidPaymentId(payment_id));
    }
    let credential_ref = non_empty(query.get("credential_ref").map(String::as_str))
        .ok_or(MalformedNotification::MissingCredentialRef)?;

    Ok(Notification::Payment {
        payment_id,
        credential_ref,
    })
}
