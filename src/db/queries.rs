use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{
    BOOKING_COLS, DISCOUNT_CODE_COLS, DISCOUNT_USAGE_COLS, MAIL_COLS, RESERVATION_COLS,
    SELLER_COLS, WATCHDOG_JOB_COLS, WORKSHOP_PURCHASE_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

fn to_json_opt<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

// ============ Sellers ============

pub fn create_seller(conn: &Connection, input: &CreateSeller) -> Result<Seller> {
    let id = gen_id();
    let now = now();
    let email = input.email.trim().to_lowercase();

    conn.execute(
        "INSERT INTO sellers (id, name, email, access_token, webhook_secret, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &id,
            &input.name,
            &email,
            &input.access_token,
            &input.webhook_secret,
            now
        ],
    )?;

    Ok(Seller {
        id,
        name: input.name.clone(),
        email,
        access_token: input.access_token.clone(),
        webhook_secret: input.webhook_secret.clone(),
        created_at: now,
    })
}

pub fn get_seller_by_id(conn: &Connection, id: &str) -> Result<Option<Seller>> {
    query_one(
        conn,
        &format!("SELECT {} FROM sellers WHERE id = ?1", SELLER_COLS),
        &[&id],
    )
}

// ============ Purchases (reservations + workshop seats) ============

/// Whether a payment has already been materialized into either purchase table.
///
/// Advisory only: the insert below is what actually enforces one record per payment.
pub fn purchase_exists(conn: &Connection, payment_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM reservations WHERE payment_id = ?1)
             OR EXISTS(SELECT 1 FROM workshop_purchases WHERE payment_id = ?1)",
        params![payment_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Atomically create a reservation, returning true if this call created it.
/// Returns false if a reservation for the same payment already exists.
pub fn try_insert_reservation(conn: &Connection, r: &Reservation) -> Result<bool> {
    let discount = to_json_opt(r.discount.as_ref())?;
    let affected = conn.execute(
        "INSERT OR IGNORE INTO reservations
            (payment_id, buyer_email, buyer_name, teacher_email, teacher_name, subject,
             scheduled_at, duration_minutes, student_count, university, program, price,
             original_price, discount, status, scheduling_link, booking_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            &r.payment_id,
            &r.buyer_email,
            &r.buyer_name,
            &r.teacher_email,
            &r.teacher_name,
            &r.subject,
            &r.scheduled_at,
            r.duration_minutes,
            r.student_count,
            &r.university,
            &r.program,
            r.price,
            r.original_price,
            discount,
            r.status.as_ref(),
            &r.scheduling_link,
            &r.booking_id,
            r.created_at,
        ],
    )?;
    Ok(affected > 0)
}

pub fn get_reservation(conn: &Connection, payment_id: &str) -> Result<Option<Reservation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM reservations WHERE payment_id = ?1",
            RESERVATION_COLS
        ),
        &[&payment_id],
    )
}

pub fn list_reservations_for_buyer(
    conn: &Connection,
    buyer_email: &str,
) -> Result<Vec<Reservation>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM reservations WHERE buyer_email = ?1 ORDER BY created_at DESC",
            RESERVATION_COLS
        ),
        &[&buyer_email],
    )
}

/// Store a provisioned scheduling link. Only the first link ever written sticks.
pub fn set_scheduling_link(conn: &Connection, payment_id: &str, link: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE reservations SET scheduling_link = ?1
         WHERE payment_id = ?2 AND scheduling_link IS NULL",
        params![link, payment_id],
    )?;
    Ok(affected > 0)
}

/// Atomically create a workshop purchase, returning true if this call created it.
pub fn try_insert_workshop_purchase(conn: &Connection, w: &WorkshopPurchase) -> Result<bool> {
    let sessions = serde_json::to_string(&w.sessions)?;
    let discount = to_json_opt(w.discount.as_ref())?;
    let affected = conn.execute(
        "INSERT OR IGNORE INTO workshop_purchases
            (payment_id, buyer_email, buyer_name, workshop_id, workshop_title, sessions,
             price, original_price, discount, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &w.payment_id,
            &w.buyer_email,
            &w.buyer_name,
            &w.workshop_id,
            &w.workshop_title,
            sessions,
            w.price,
            w.original_price,
            discount,
            w.status.as_ref(),
            w.created_at,
        ],
    )?;
    Ok(affected > 0)
}

pub fn get_workshop_purchase(
    conn: &Connection,
    payment_id: &str,
) -> Result<Option<WorkshopPurchase>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM workshop_purchases WHERE payment_id = ?1",
            WORKSHOP_PURCHASE_COLS
        ),
        &[&payment_id],
    )
}

pub fn count_purchases(conn: &Connection, payment_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM reservations WHERE payment_id = ?1)
              + (SELECT COUNT(*) FROM workshop_purchases WHERE payment_id = ?1)",
        params![payment_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Bookings ============

pub fn create_booking(conn: &Connection, input: &CreateBooking) -> Result<Booking> {
    let id = gen_id();
    let now = now();
    let email = input.user_email.trim().to_lowercase();

    conn.execute(
        "INSERT INTO bookings (id, user_email, user_name, subject, scheduled_event, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
        params![
            &id,
            &email,
            &input.user_name,
            &input.subject,
            &input.scheduled_event,
            now
        ],
    )?;

    Ok(Booking {
        id,
        user_email: email,
        user_name: input.user_name.clone(),
        subject: input.subject.clone(),
        scheduled_event: input.scheduled_event.clone(),
        payment_id: None,
        status: BookingStatus::Pending,
        created_at: now,
        cancelled_at: None,
    })
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> Result<Option<Booking>> {
    query_one(
        conn,
        &format!("SELECT {} FROM bookings WHERE id = ?1", BOOKING_COLS),
        &[&id],
    )
}

/// Settle a pending booking with the payment that paid for it.
///
/// Returns false if the booking is unknown or no longer pending (already
/// settled, or cancelled by the watchdog first).
pub fn attach_payment_to_booking(
    conn: &Connection,
    booking_id: &str,
    payment_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE bookings SET payment_id = ?1, status = 'confirmed'
         WHERE id = ?2 AND status = 'pending'",
        params![payment_id, booking_id],
    )?;
    Ok(affected > 0)
}

/// Cancel a booking only if it is still pending and unpaid.
///
/// Returns:
/// - `Ok(true)` if this call cancelled the booking
/// - `Ok(false)` if the booking was paid, confirmed, already cancelled or missing
pub fn try_cancel_unpaid_booking(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE bookings SET status = 'cancelled', cancelled_at = ?1
         WHERE id = ?2 AND status = 'pending' AND (payment_id IS NULL OR payment_id = '')",
        params![now(), id],
    )?;
    Ok(affected > 0)
}

// ============ Discount Codes ============

pub fn create_discount_code(conn: &Connection, input: &CreateDiscountCode) -> Result<DiscountCode> {
    let id = gen_id();
    let now = now();
    let code = input.code.trim().to_uppercase();

    conn.execute(
        "INSERT INTO discount_codes (id, code, kind, value, usage_limit, usage_count, active, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, 1, ?6, ?7)",
        params![
            &id,
            &code,
            input.kind.as_ref(),
            input.value,
            input.usage_limit,
            input.expires_at,
            now
        ],
    )?;

    Ok(DiscountCode {
        id,
        code,
        kind: input.kind,
        value: input.value,
        usage_limit: input.usage_limit,
        usage_count: 0,
        active: true,
        expires_at: input.expires_at,
        created_at: now,
    })
}

/// Look up a code case-insensitively (codes are stored upper-case).
pub fn get_discount_code_by_code(conn: &Connection, code: &str) -> Result<Option<DiscountCode>> {
    let normalized = code.trim().to_uppercase();
    query_one(
        conn,
        &format!(
            "SELECT {} FROM discount_codes WHERE code = ?1",
            DISCOUNT_CODE_COLS
        ),
        &[&normalized],
    )
}

pub fn set_discount_code_active(conn: &Connection, id: &str, active: bool) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE discount_codes SET active = ?1 WHERE id = ?2",
        params![active as i32, id],
    )?;
    Ok(affected > 0)
}

/// Append a usage entry unless this purchase already used the code.
/// Returns true if the entry is new.
pub fn try_insert_discount_usage(
    conn: &Connection,
    discount_code_id: &str,
    buyer_email: &str,
    purchase_id: &str,
    amount_discounted: f64,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO discount_code_usages
            (id, discount_code_id, buyer_email, purchase_id, amount_discounted, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            gen_id(),
            discount_code_id,
            buyer_email,
            purchase_id,
            amount_discounted,
            now()
        ],
    )?;
    Ok(affected > 0)
}

/// Increment a code's usage count in place and return the new count.
pub fn increment_discount_usage(conn: &Connection, discount_code_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "UPDATE discount_codes SET usage_count = usage_count + 1 WHERE id = ?1 RETURNING usage_count",
        params![discount_code_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn list_discount_usages(
    conn: &Connection,
    discount_code_id: &str,
) -> Result<Vec<DiscountUsage>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM discount_code_usages WHERE discount_code_id = ?1 ORDER BY created_at, id",
            DISCOUNT_USAGE_COLS
        ),
        &[&discount_code_id],
    )
}

// ============ Mail Queue ============

pub fn enqueue_mail(conn: &Connection, email: &OutboundEmail) -> Result<QueuedEmail> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO mail_queue (id, recipient, template, subject, html, text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &id,
            &email.to,
            email.template.as_ref(),
            &email.subject,
            &email.html,
            &email.text,
            now
        ],
    )?;

    Ok(QueuedEmail {
        id,
        to: email.to.clone(),
        template: email.template,
        subject: email.subject.clone(),
        html: email.html.clone(),
        text: email.text.clone(),
        created_at: now,
    })
}

pub fn list_mail_for_recipient(conn: &Connection, recipient: &str) -> Result<Vec<QueuedEmail>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM mail_queue WHERE recipient = ?1 ORDER BY created_at, rowid",
            MAIL_COLS
        ),
        &[&recipient],
    )
}

// ============ Watchdog Jobs ============

/// Register a deadline for a booking. Returns false if one already exists,
/// so repeated triggers for the same booking never start a second clock.
pub fn try_create_watchdog_job(conn: &Connection, input: &CreateWatchdogJob) -> Result<bool> {
    let now = now();
    let affected = conn.execute(
        "INSERT OR IGNORE INTO watchdog_jobs
            (booking_id, state, interval_secs, max_cycles, cycles_observed, next_poll_at,
             subject, session_label, scheduling_token, created_at, updated_at)
         VALUES (?1, 'awaiting_payment', ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            &input.booking_id,
            input.interval_secs,
            input.max_cycles,
            input.first_poll_at,
            &input.subject,
            &input.session_label,
            &input.scheduling_token,
            now
        ],
    )?;
    Ok(affected > 0)
}

pub fn get_watchdog_job(conn: &Connection, booking_id: &str) -> Result<Option<WatchdogJob>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM watchdog_jobs WHERE booking_id = ?1",
            WATCHDOG_JOB_COLS
        ),
        &[&booking_id],
    )
}

/// Jobs still awaiting payment whose next poll is at or before `now`.
pub fn list_due_watchdog_jobs(conn: &Connection, now: i64, limit: i64) -> Result<Vec<WatchdogJob>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM watchdog_jobs
             WHERE state = 'awaiting_payment' AND next_poll_at <= ?1
             ORDER BY next_poll_at LIMIT ?2",
            WATCHDOG_JOB_COLS
        ),
        &[&now, &limit],
    )
}

/// Record unpaid observations. Compare-and-swap on the previous cycle
/// count so two workers polling the same job cannot both advance it.
pub fn try_advance_watchdog_job(
    conn: &Connection,
    booking_id: &str,
    observed_before: i64,
    observed_now: i64,
    next_poll_at: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE watchdog_jobs
         SET cycles_observed = ?1, next_poll_at = ?2, updated_at = ?3
         WHERE booking_id = ?4 AND state = 'awaiting_payment' AND cycles_observed = ?5",
        params![observed_now, next_poll_at, now(), booking_id, observed_before],
    )?;
    Ok(affected > 0)
}

/// Move a job out of `awaiting_payment`. Only one caller ever wins.
pub fn try_finish_watchdog_job(
    conn: &Connection,
    booking_id: &str,
    state: JobState,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE watchdog_jobs SET state = ?1, updated_at = ?2
         WHERE booking_id = ?3 AND state = 'awaiting_payment'",
        params![state.as_ref(), now(), booking_id],
    )?;
    Ok(affected > 0)
}

/// Purge finished watchdog jobs beyond the retention period.
/// Jobs still awaiting payment are never purged.
pub fn purge_finished_watchdog_jobs(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM watchdog_jobs WHERE state != 'awaiting_payment' AND updated_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
