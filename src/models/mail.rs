use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TemplateId {
    ClassPaid,
    WorkshopPaid,
    BookingCancelled,
}

/// Rendered message ready for the outbound queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub template: TemplateId,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// A row of the append-only mail queue consumed by the external mailer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEmail {
    pub id: String,
    pub to: String,
    pub template: TemplateId,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub created_at: i64,
}
