use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// A tentative slot held before payment.
///
/// Created by the booking flow; `payment_id` stays empty until a payment
/// settles it. A booking with a payment id is never cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub user_email: String,
    pub user_name: Option<String>,
    pub subject: Option<String>,
    /// External scheduled-event reference used for cancellation
    pub scheduled_event: Option<String>,
    pub payment_id: Option<String>,
    pub status: BookingStatus,
    pub created_at: i64,
    pub cancelled_at: Option<i64>,
}

impl Booking {
    pub fn is_paid(&self) -> bool {
        self.payment_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBooking {
    pub user_email: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub scheduled_event: Option<String>,
}
