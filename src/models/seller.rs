use serde::{Deserialize, Serialize};

/// A teacher or organizer who receives payments through their own gateway account.
///
/// Notification URLs carry the seller id as the credential reference, so the
/// access token itself never appears in a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seller {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    /// Secret for `x-signature` verification; unsigned notifications are accepted when unset
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSeller {
    pub name: String,
    pub email: String,
    pub access_token: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}
