//! Turning an approved payment into a durable purchase record.
//!
//! [`build_purchase`] is a pure transform of the gateway's metadata bag;
//! [`persist`] is the only write and is safe to race.

use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;

use crate::db::queries;
use crate::discounts;
use crate::error::Result;
use crate::models::{
    ClassMetadata, NewPurchase, PurchaseMetadata, PurchaseStatus, Reservation, WorkshopMetadata,
    WorkshopPurchase,
};

/// Stored in place of absent optional text.
pub const PLACEHOLDER: &str = "-";

/// Every class is booked as a 90-minute slot.
pub const CLASS_DURATION_MINUTES: i64 = 90;

#[derive(Error, Debug, PartialEq)]
pub enum MetadataError {
    #[error("payment metadata is malformed: {0}")]
    Malformed(String),

    #[error("payment metadata is missing {0}")]
    MissingField(&'static str),
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn or_placeholder(value: Option<&str>) -> String {
    present(value).unwrap_or(PLACEHOLDER).to_string()
}

fn required(
    value: Option<&str>,
    field: &'static str,
) -> std::result::Result<String, MetadataError> {
    present(value)
        .map(str::to_string)
        .ok_or(MetadataError::MissingField(field))
}

/// Build the record a payment should produce. Same inputs, same record.
pub fn build_purchase(
    payment_id: &str,
    metadata: &serde_json::Value,
    created_at: i64,
) -> std::result::Result<NewPurchase, MetadataError> {
    let metadata =
        PurchaseMetadata::from_value(metadata).map_err(|e| MetadataError::Malformed(e.to_string()))?;

    match metadata {
        PurchaseMetadata::Class(m) => build_reservation(payment_id, &m, created_at).map(NewPurchase::Class),
        PurchaseMetadata::Workshop(m) => {
            build_workshop_purchase(payment_id, &m, created_at).map(NewPurchase::Workshop)
        }
    }
}

fn build_reservation(
    payment_id: &str,
    m: &ClassMetadata,
    created_at: i64,
) -> std::result::Result<Reservation, MetadataError> {
    let student = m.student.clone().unwrap_or_default();
    let teacher = m.teacher.clone().unwrap_or_default();

    let buyer_email = required(student.email.as_deref(), "student email")?;
    let teacher_email = required(teacher.email.as_deref(), "teacher email")?;
    let price = m.price.ok_or(MetadataError::MissingField("price"))?;
    let original_price = m.original_price.unwrap_or(price);

    let university = m.university.as_ref().and_then(|u| u.code.as_deref());
    let program = m
        .degree
        .as_ref()
        .map(|d| {
            format!(
                "{} {}",
                d.university_code.as_deref().unwrap_or_default(),
                d.name.as_deref().unwrap_or_default()
            )
        })
        .unwrap_or_default();

    Ok(Reservation {
        payment_id: payment_id.to_string(),
        buyer_email,
        buyer_name: or_placeholder(student.name.as_deref()),
        teacher_email,
        teacher_name: or_placeholder(teacher.name.as_deref()),
        subject: or_placeholder(m.subject.as_deref()),
        scheduled_at: or_placeholder(m.scheduled_at.as_deref()),
        duration_minutes: CLASS_DURATION_MINUTES,
        student_count: i64::from(m.student_count.unwrap_or(1)),
        university: or_placeholder(university),
        program: or_placeholder(Some(program.as_str())),
        price,
        original_price,
        discount: m
            .discount
            .as_ref()
            .map(|d| discounts::applied(d, original_price, price)),
        status: PurchaseStatus::Paid,
        scheduling_link: None,
        booking_id: present(m.booking_id.as_deref()).map(str::to_string),
        created_at,
    })
}

fn build_workshop_purchase(
    payment_id: &str,
    m: &WorkshopMetadata,
    created_at: i64,
) -> std::result::Result<WorkshopPurchase, MetadataError> {
    let buyer = m.buyer.clone().unwrap_or_default();
    let workshop = m.workshop.clone().unwrap_or_default();

    let buyer_email = required(buyer.email.as_deref(), "buyer email")?;
    let workshop_id = required(workshop.id.as_deref(), "workshop id")?;
    let price = m.price.ok_or(MetadataError::MissingField("price"))?;
    let original_price = m.original_price.unwrap_or(price);

    Ok(WorkshopPurchase {
        payment_id: payment_id.to_string(),
        buyer_email,
        buyer_name: or_placeholder(buyer.name.as_deref()),
        workshop_id,
        workshop_title: or_placeholder(workshop.title.as_deref()),
        sessions: m.sessions.clone(),
        price,
        original_price,
        discount: m
            .discount
            .as_ref()
            .map(|d| discounts::applied(d, original_price, price)),
        status: PurchaseStatus::Paid,
        created_at,
    })
}

/// Create the record if no record exists for its payment id.
///
/// Returns `Ok(false)` when an earlier or concurrent delivery already created
/// it. A class that settles a pending booking marks the booking paid in the
/// same transaction, so the watchdog can never cancel a paid booking.
pub fn persist(conn: &mut Connection, purchase: &NewPurchase) -> Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let created = match purchase {
        NewPurchase::Class(r) => queries::try_insert_reservation(&tx, r)?,
        NewPurchase::Workshop(w) => queries::try_insert_workshop_purchase(&tx, w)?,
    };
    if !created {
        return Ok(false);
    }

    if let NewPurchase::Class(Reservation {
        booking_id: Some(booking_id),
        payment_id,
        ..
    }) = purchase
    {
        if !queries::attach_payment_to_booking(&tx, booking_id, payment_id)? {
            tracing::warn!(
                booking_id = %booking_id,
                payment_id = %payment_id,
                "Paid booking was no longer pending"
            );
        }
    }

    tx.commit()?;
    Ok(true)
}
