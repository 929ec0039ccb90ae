//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse an optional JSON text column.
fn parse_json_opt<T: serde::de::DeserializeOwned>(
    row: &Row,
    col: usize,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(col)? {
        Some(s) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const SELLER_COLS: &str = "id, name, email, access_token, webhook_secret, created_at";

pub const RESERVATION_COLS: &str = "payment_id, buyer_email, buyer_name, teacher_email, teacher_name, subject, scheduled_at, duration_minutes, student_count, university, program, price, original_price, discount, status, scheduling_link, booking_id, created_at";

pub const WORKSHOP_PURCHASE_COLS: &str = "payment_id, buyer_email, buyer_name, workshop_id, workshop_title, sessions, price, original_price, discount, status, created_at";

pub const BOOKING_COLS: &str =
    "id, user_email, user_name, subject, scheduled_event, payment_id, status, created_at, cancelled_at";

pub const WATCHDOG_JOB_COLS: &str = "booking_id, state, interval_secs, max_cycles, cycles_observed, next_poll_at, subject, session_label, scheduling_token, created_at, updated_at";

pub const DISCOUNT_CODE_COLS: &str =
    "id, code, kind, value, usage_limit, usage_count, active, expires_at, created_at";

pub const DISCOUNT_USAGE_COLS: &str =
    "id, discount_code_id, buyer_email, purchase_id, amount_discounted, created_at";

pub const MAIL_COLS: &str = "id, recipient, template, subject, html, text, created_at";

// ============ FromRow Implementations ============

impl FromRow for Seller {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Seller {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            access_token: row.get(3)?,
            webhook_secret: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for Reservation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Reservation {
            payment_id: row.get(0)?,
            buyer_email: row.get(1)?,
            buyer_name: row.get(2)?,
            teacher_email: row.get(3)?,
            teacher_name: row.get(4)?,
            subject: row.get(5)?,
            scheduled_at: row.get(6)?,
            duration_minutes: row.get(7)?,
            student_count: row.get(8)?,
            university: row.get(9)?,
            program: row.get(10)?,
            price: row.get(11)?,
            original_price: row.get(12)?,
            discount: parse_json_opt(row, 13)?,
            status: parse_enum(row, 14, "status")?,
            scheduling_link: row.get(15)?,
            booking_id: row.get(16)?,
            created_at: row.get(17)?,
        })
    }
}

impl FromRow for WorkshopPurchase {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WorkshopPurchase {
            payment_id: row.get(0)?,
            buyer_email: row.get(1)?,
            buyer_name: row.get(2)?,
            workshop_id: row.get(3)?,
            workshop_title: row.get(4)?,
            sessions: parse_json_opt(row, 5)?.unwrap_or_default(),
            price: row.get(6)?,
            original_price: row.get(7)?,
            discount: parse_json_opt(row, 8)?,
            status: parse_enum(row, 9, "status")?,
            created_at: row.get(10)?,
        })
    }
}

impl FromRow for Booking {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Booking {
            id: row.get(0)?,
            user_email: row.get(1)?,
            user_name: row.get(2)?,
            subject: row.get(3)?,
            scheduled_event: row.get(4)?,
            payment_id: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            created_at: row.get(7)?,
            cancelled_at: row.get(8)?,
        })
    }
}

impl FromRow for WatchdogJob {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WatchdogJob {
            booking_id: row.get(0)?,
            state: parse_enum(row, 1, "state")?,
            interval_secs: row.get(2)?,
            max_cycles: row.get(3)?,
            cycles_observed: row.get(4)?,
            next_poll_at: row.get(5)?,
            subject: row.get(6)?,
            session_label: row.get(7)?,
            scheduling_token: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for DiscountCode {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DiscountCode {
            id: row.get(0)?,
            code: row.get(1)?,
            kind: parse_enum(row, 2, "kind")?,
            value: row.get(3)?,
            usage_limit: row.get(4)?,
            usage_count: row.get(5)?,
            active: row.get::<_, i32>(6)? != 0,
            expires_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl FromRow for DiscountUsage {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DiscountUsage {
            id: row.get(0)?,
            discount_code_id: row.get(1)?,
            buyer_email: row.get(2)?,
            purchase_id: row.get(3)?,
            amount_discounted: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for QueuedEmail {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(QueuedEmail {
            id: row.get(0)?,
            to: row.get(1)?,
            template: parse_enum(row, 2, "template")?,
            subject: row.get(3)?,
            html: row.get(4)?,
            text: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}
