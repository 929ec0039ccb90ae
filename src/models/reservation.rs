use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::{DiscountKind, WorkshopSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseStatus {
    Paid,
}

/// Discount recorded on a purchase, fixed at payment time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub code: String,
    pub kind: DiscountKind,
    pub value: f64,
    pub amount: f64,
    /// e.g. "WELCOME20 (-20%)"
    pub summary: String,
}

/// A paid tutoring class. Primary key is the gateway payment id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub payment_id: String,
    pub buyer_email: String,
    pub buyer_name: String,
    pub teacher_email: String,
    pub teacher_name: String,
    pub subject: String,
    pub scheduled_at: String,
    pub duration_minutes: i64,
    pub student_count: i64,
    pub university: String,
    /// "{university code} {degree name}"
    pub program: String,
    pub price: f64,
    pub original_price: f64,
    pub discount: Option<AppliedDiscount>,
    pub status: PurchaseStatus,
    pub scheduling_link: Option<String>,
    pub booking_id: Option<String>,
    pub created_at: i64,
}

/// A paid workshop seat. Primary key is the gateway payment id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkshopPurchase {
    pub payment_id: String,
    pub buyer_email: String,
    pub buyer_name: String,
    pub workshop_id: String,
    pub workshop_title: String,
    pub sessions: Vec<WorkshopSession>,
    pub price: f64,
    pub original_price: f64,
    pub discount: Option<AppliedDiscount>,
    pub status: PurchaseStatus,
    pub created_at: i64,
}

/// Either kind of record produced from a payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NewPurchase {
    Class(Reservation),
    Workshop(WorkshopPurchase),
}

impl NewPurchase {
    pub fn payment_id(&self) -> &str {
        match self {
            NewPurchase::Class(r) => &r.payment_id,
            NewPurchase::Workshop(w) => &w.payment_id,
        }
    }

    pub fn buyer_email(&self) -> &str {
        match self {
            NewPurchase::Class(r) => &r.buyer_email,
            NewPurchase::Workshop(w) => &w.buyer_email,
        }
    }

    pub fn discount(&self) -> Option<&AppliedDiscount> {
        match self {
            NewPurchase::Class(r) => r.discount.as_ref(),
            NewPurchase::Workshop(w) => w.discount.as_ref(),
        }
    }
}
