use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, EnumString};

use super::DiscountKind;

/// Payment status as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
    Pending,
    Authorized,
    InProcess,
    InMediation,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    #[serde(other)]
    #[strum(disabled)]
    Unknown,
}

/// Authoritative payment details fetched from the gateway.
///
/// The gateway owns this record; `metadata` is the bag attached when the
/// purchase intent was created and is the only description of what was bought.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
    #[serde(default)]
    pub currency_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Payment {
    pub fn is_approved(&self) -> bool {
        self.status == PaymentStatus::Approved
    }
}

/// Accepts `"123"` or `123`; gateway ids arrive as either depending on the API.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Accepts numbers or numeric strings ("15000", "15000.50").
pub(crate) fn opt_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid amount: {}", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected amount, got {}",
            other
        ))),
    }
}

fn opt_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_amount(deserializer)?.and_then(|v| {
        if v >= 1.0 && v.fract() == 0.0 {
            Some(v as u32)
        } else {
            None
        }
    }))
}

// ============ Purchase metadata ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonInfo {
    #[serde(default, alias = "mail")]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeacherInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Scheduling event-type URI that owns generated booking links
    #[serde(default)]
    pub scheduling_owner: Option<String>,
    /// Teacher's scheduling API token
    #[serde(default)]
    pub scheduling_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniversityInfo {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DegreeInfo {
    #[serde(default)]
    pub university_code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Discount already applied to the price when the intent was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountInfo {
    pub code: String,
    pub kind: DiscountKind,
    #[serde(deserialize_with = "amount")]
    pub value: f64,
}

fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    opt_amount(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing amount"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetadata {
    #[serde(default)]
    pub teacher: Option<TeacherInfo>,
    #[serde(default)]
    pub student: Option<PersonInfo>,
    #[serde(default)]
    pub subject: Option<String>,
    /// ISO-8601 start time of the class
    #[serde(default)]
    pub scheduled_at: Option<String>,
    #[serde(default, deserialize_with = "opt_amount")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "opt_amount")]
    pub original_price: Option<f64>,
    #[serde(default, deserialize_with = "opt_count")]
    pub student_count: Option<u32>,
    #[serde(default)]
    pub university: Option<UniversityInfo>,
    #[serde(default)]
    pub degree: Option<DegreeInfo>,
    #[serde(default)]
    pub discount: Option<DiscountInfo>,
    /// Pending booking this payment settles, if the class was booked first
    #[serde(default)]
    pub booking_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkshopInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkshopSession {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub starts_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkshopMetadata {
    #[serde(default)]
    pub buyer: Option<PersonInfo>,
    #[serde(default)]
    pub workshop: Option<WorkshopInfo>,
    #[serde(default)]
    pub sessions: Vec<WorkshopSession>,
    #[serde(default, deserialize_with = "opt_amount")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "opt_amount")]
    pub original_price: Option<f64>,
    #[serde(default)]
    pub discount: Option<DiscountInfo>,
}

/// What a payment paid for. Serialized with a `kind` tag; bags without one
/// decode as classes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseMetadata {
    Class(ClassMetadata),
    Workshop(WorkshopMetadata),
}

impl PurchaseMetadata {
    /// Decode the gateway's metadata bag.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let kind = value.get("kind").and_then(|k| k.as_str()).unwrap_or("class");
        match kind {
            "workshop" => serde_json::from_value(value.clone()).map(PurchaseMetadata::Workshop),
            _ => serde_json::from_value(value.clone()).map(PurchaseMetadata::Class),
        }
    }
}
