use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    AwaitingPayment,
    Confirmed,
    Cancelled,
    /// Booking disappeared before the deadline
    Gone,
}

/// Durable deadline for one pending booking. Keyed by booking id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogJob {
    pub booking_id: String,
    pub state: JobState,
    pub interval_secs: i64,
    pub max_cycles: i64,
    pub cycles_observed: i64,
    pub next_poll_at: i64,
    pub subject: Option<String>,
    pub session_label: Option<String>,
    #[serde(skip_serializing)]
    pub scheduling_token: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateWatchdogJob {
    pub booking_id: String,
    pub interval_secs: i64,
    pub max_cycles: i64,
    /// First poll; booking creation time plus one interval
    pub first_poll_at: i64,
    pub subject: Option<String>,
    pub session_label: Option<String>,
    pub scheduling_token: Option<String>,
}
