use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is a percentage of the original price (0-100)
    Percentage,
    /// `value` is an absolute amount in the offering's currency
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: String,
    /// Always stored upper-case
    pub code: String,
    pub kind: DiscountKind,
    pub value: f64,
    /// Soft limit; overuse is logged, never refused
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    pub active: bool,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl DiscountCode {
    pub fn is_redeemable(&self, now: i64) -> bool {
        self.active && self.expires_at.is_none_or(|exp| exp > now)
    }
}

/// Amount taken off `original_price`, never more than the price itself.
pub fn discount_amount(kind: DiscountKind, value: f64, original_price: f64) -> f64 {
    let raw = match kind {
        DiscountKind::Percentage => original_price * value.clamp(0.0, 100.0) / 100.0,
        DiscountKind::Fixed => value.max(0.0),
    };
    round_cents(raw.min(original_price))
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDiscountCode {
    pub code: String,
    pub kind: DiscountKind,
    pub value: f64,
    #[serde(default)]
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// One entry in a discount code's append-only usage history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountUsage {
    pub id: String,
    pub discount_code_id: String,
    pub buyer_email: String,
    pub purchase_id: String,
    pub amount_discounted: f64,
    pub created_at: i64,
}
