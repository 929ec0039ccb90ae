//! Notification emails.
//!
//! Messages are rendered here and placed on the `mail_queue` table; an
//! external mailer drains the queue. Every template goes through one HTML
//! layout, so a message is described entirely by [`EmailFields`].

use chrono::{DateTime, NaiveDateTime};

use crate::db::{DbPool, queries};
use crate::error::Result;
use crate::models::{OutboundEmail, Reservation, TemplateId, WorkshopPurchase};

const DATE_UNAVAILABLE: &str = "date to be confirmed";

/// Format an ISO-8601 start time as e.g. "Monday 2 November 2026 at 18:00".
///
/// The wall-clock time is kept as written; no timezone conversion.
pub fn format_session_time(iso: &str) -> String {
    let iso = iso.trim();
    let parsed = DateTime::parse_from_rfc3339(iso)
        .map(|dt| dt.naive_local())
        .or_else(|_| NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M"));

    match parsed {
        Ok(dt) => dt.format("%A %-d %B %Y at %H:%M").to_string(),
        Err(_) => DATE_UNAVAILABLE.to_string(),
    }
}

/// Button rendered under the message body.
#[derive(Debug, Clone, PartialEq)]
pub struct CallToAction {
    pub label: String,
    pub url: String,
}

/// Content slots of the shared layout.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailFields {
    pub subject: String,
    pub title: String,
    /// Paragraphs, rendered in order
    pub body: Vec<String>,
    /// Boxed block for the one thing the reader must not miss
    pub highlight: Option<String>,
    pub cta: Option<CallToAction>,
}

/// Destination for rendered messages.
pub trait MailOutbox: Send + Sync {
    fn push(&self, email: &OutboundEmail) -> Result<()>;
}

/// Outbox backed by the `mail_queue` table.
#[derive(Clone)]
pub struct SqliteOutbox {
    db: DbPool,
}

impl SqliteOutbox {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl MailOutbox for SqliteOutbox {
    fn push(&self, email: &OutboundEmail) -> Result<()> {
        let conn = self.db.get()?;
        let queued = queries::enqueue_mail(&conn, email)?;
        tracing::debug!(mail_id = %queued.id, template = email.template.as_ref(), "Mail queued");
        Ok(())
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the shared layout.
pub fn render(fields: &EmailFields) -> (String, String) {
    let paragraphs: String = fields
        .body
        .iter()
        .map(|p| format!("<p>{}</p>\n", escape(p)))
        .collect();

    let highlight = fields
        .highlight
        .as_deref()
        .map(|h| {
            format!(
                r#"<div style="background: #f5f5f5; padding: 20px; border-radius: 8px; text-align: center; margin-bottom: 24px;"><strong>{}</strong></div>
"#,
                escape(h)
            )
        })
        .unwrap_or_default();

    let cta = fields
        .cta
        .as_ref()
        .map(|c| {
            format!(
                r#"<p style="text-align: center; margin: 30px 0;"><a href="{}" style="background: #4f46e5; color: #fff; padding: 12px 24px; border-radius: 6px; text-decoration: none;">{}</a></p>
"#,
                escape(&c.url),
                escape(&c.label)
            )
        })
        .unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">{}</h2>
{}{}{}<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">Thanks for learning with us.</p>
</body>
</html>"#,
        escape(&fields.title),
        paragraphs,
        highlight,
        cta
    );

    let mut text = format!("{}\n\n", fields.title);
    for p in &fields.body {
        text.push_str(p);
        text.push_str("\n\n");
    }
    if let Some(h) = &fields.highlight {
        text.push_str(h);
        text.push_str("\n\n");
    }
    if let Some(c) = &fields.cta {
        text.push_str(&format!("{}: {}\n", c.label, c.url));
    }

    (html, text.trim_end().to_string())
}

/// Render `fields` and hand the message to the outbox.
pub fn enqueue(
    outbox: &dyn MailOutbox,
    recipient: &str,
    template: TemplateId,
    fields: &EmailFields,
) -> Result<()> {
    let (html, text) = render(fields);
    outbox.push(&OutboundEmail {
        to: recipient.to_string(),
        template,
        subject: fields.subject.clone(),
        html,
        text,
    })
}

// ============ Templates ============

fn greeting(name: &str) -> String {
    if name.trim().is_empty() || name == "-" {
        "Hi,".to_string()
    } else {
        format!("Hi {},", name)
    }
}

/// Payment confirmation for a class, with the link the student uses to confirm the booking.
pub fn class_paid(reservation: &Reservation, site_url: &str) -> EmailFields {
    let confirm_url = format!(
        "{}/confirm-booking?payment_id={}&status=approved",
        site_url.trim_end_matches('/'),
        reservation.payment_id
    );

    let mut body = vec![
        greeting(&reservation.buyer_name),
        format!(
            "Your payment for the {} class on {} has been confirmed.",
            reservation.subject,
            format_session_time(&reservation.scheduled_at)
        ),
        "To confirm your booking, open the link below. Once confirmed you will receive another email with the link to join the class.".to_string(),
        "If you already confirmed your booking, there is nothing else to do.".to_string(),
    ];
    if let Some(discount) = &reservation.discount {
        body.push(format!("Discount applied: {}", discount.summary));
    }

    EmailFields {
        subject: format!("Payment received for your {} class", reservation.subject),
        title: "Booking paid".to_string(),
        body,
        highlight: None,
        cta: Some(CallToAction {
            label: "Confirm booking".to_string(),
            url: confirm_url,
        }),
    }
}

pub fn workshop_paid(purchase: &WorkshopPurchase) -> EmailFields {
    let schedule = purchase
        .sessions
        .iter()
        .filter_map(|s| s.starts_at.as_deref())
        .map(format_session_time)
        .collect::<Vec<_>>()
        .join("\n");

    let mut body = vec![
        greeting(&purchase.buyer_name),
        format!(
            "Your seat in {} is confirmed. We will send the joining details before the first session.",
            purchase.workshop_title
        ),
    ];
    if let Some(discount) = &purchase.discount {
        body.push(format!("Discount applied: {}", discount.summary));
    }

    EmailFields {
        subject: format!("You're in: {}", purchase.workshop_title),
        title: "Workshop seat confirmed".to_string(),
        body,
        highlight: (!schedule.is_empty()).then_some(schedule),
        cta: None,
    }
}

/// Sent when the watchdog cancels an unpaid booking.
pub fn booking_cancelled(
    user_name: Option<&str>,
    subject: &str,
    session_label: &str,
) -> EmailFields {
    EmailFields {
        subject: format!("Your {} booking was cancelled", subject),
        title: "Booking cancelled".to_string(),
        body: vec![
            greeting(user_name.unwrap_or_default()),
            format!(
                "We did not receive payment for your {} class ({}) in time, so the slot has been released.",
                subject, session_label
            ),
            "You can book again at any time.".to_string(),
        ],
        highlight: None,
        cta: None,
    }
}
