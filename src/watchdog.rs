//! Deadline cancellation for bookings that are never paid.
//!
//! Each watched booking has a row in `watchdog_jobs`. A background worker
//! polls due jobs; the job fires once the booking has stayed unpaid for
//! `max_cycles` intervals counted from booking creation. State lives in the
//! database, so a restart resumes every deadline where it left off.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;

use crate::config::WatchdogSettings;
use crate::db::{AppState, queries};
use crate::email;
use crate::error::{OptionExt, Result, msg};
use crate::models::{Booking, BookingStatus, CreateWatchdogJob, JobState, TemplateId, WatchdogJob};

/// Jobs examined per worker tick.
const BATCH_SIZE: i64 = 100;

const CANCELLATION_REASON: &str = "Payment was not received before the deadline";

/// Caller-supplied descriptors used when the booking is cancelled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchRequest {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub session_label: Option<String>,
    /// Token for the external cancellation API, passed through untouched
    #[serde(default)]
    pub scheduling_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A deadline already exists for this booking; the original clock keeps running
    AlreadyWatching,
}

/// Start watching `booking_id`. Idempotent per booking.
pub fn trigger(
    conn: &Connection,
    booking_id: &str,
    request: &WatchRequest,
    settings: &WatchdogSettings,
) -> Result<TriggerOutcome> {
    let booking = queries::get_booking_by_id(conn, booking_id)?.or_not_found(msg::BOOKING_NOT_FOUND)?;

    let interval_secs = settings.interval.as_secs().max(1) as i64;
    let created = queries::try_create_watchdog_job(
        conn,
        &CreateWatchdogJob {
            booking_id: booking.id.clone(),
            interval_secs,
            max_cycles: i64::from(settings.max_cycles.max(1)),
            first_poll_at: booking.created_at + interval_secs,
            subject: request.subject.clone(),
            session_label: request.session_label.clone(),
            scheduling_token: request.scheduling_token.clone(),
        },
    )?;

    if created {
        tracing::info!(
            booking_id = %booking.id,
            deadline = booking.created_at + interval_secs * i64::from(settings.max_cycles.max(1)),
            "Watchdog started"
        );
        Ok(TriggerOutcome::Started)
    } else {
        Ok(TriggerOutcome::AlreadyWatching)
    }
}

/// What a single poll decided for one job.
#[derive(Debug)]
enum PollOutcome {
    /// Still unpaid, deadline not reached
    Waiting,
    Confirmed,
    Gone,
    /// Booking cancelled in this poll; side effects still to run
    Cancelled(Booking, WatchdogJob),
    /// Another worker advanced or finished the job first
    Lost,
}

/// Counts from one pass over due jobs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogReport {
    pub polled: usize,
    pub waiting: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub gone: usize,
}

fn finish(conn: &Connection, job: &WatchdogJob, state: JobState) -> Result<PollOutcome> {
    if !queries::try_finish_watchdog_job(conn, &job.booking_id, state)? {
        return Ok(PollOutcome::Lost);
    }
    tracing::info!(booking_id = %job.booking_id, state = state.as_ref(), "Watchdog finished");
    Ok(match state {
        JobState::Gone => PollOutcome::Gone,
        _ => PollOutcome::Confirmed,
    })
}

fn poll(conn: &mut Connection, job: WatchdogJob, now: i64) -> Result<PollOutcome> {
    let Some(booking) = queries::get_booking_by_id(conn, &job.booking_id)? else {
        return finish(conn, &job, JobState::Gone);
    };

    if booking.is_paid() || booking.status == BookingStatus::Confirmed {
        return finish(conn, &job, JobState::Confirmed);
    }
    if booking.status == BookingStatus::Cancelled {
        return finish(conn, &job, JobState::Gone);
    }

    // Cycles elapsed since booking creation, so downtime counts toward the deadline
    let elapsed = (now - booking.created_at).div_euclid(job.interval_secs.max(1));
    let observed = elapsed.max(job.cycles_observed + 1).min(job.max_cycles);

    if observed < job.max_cycles {
        let next_poll_at = booking.created_at + (observed + 1) * job.interval_secs;
        return Ok(
            if queries::try_advance_watchdog_job(
                conn,
                &job.booking_id,
                job.cycles_observed,
                observed,
                next_poll_at,
            )? {
                PollOutcome::Waiting
            } else {
                PollOutcome::Lost
            },
        );
    }

    // Deadline reached: cancel only if the booking is still unpaid right now
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let cancelled = queries::try_cancel_unpaid_booking(&tx, &job.booking_id)?;
    let state = if cancelled {
        JobState::Cancelled
    } else if queries::get_booking_by_id(&tx, &job.booking_id)?.is_none() {
        JobState::Gone
    } else {
        JobState::Confirmed
    };

    if !queries::try_finish_watchdog_job(&tx, &job.booking_id, state)? {
        return Ok(PollOutcome::Lost);
    }
    tx.commit()?;

    tracing::info!(booking_id = %job.booking_id, state = state.as_ref(), "Watchdog deadline reached");
    Ok(match state {
        JobState::Cancelled => PollOutcome::Cancelled(booking, job),
        JobState::Gone => PollOutcome::Gone,
        _ => PollOutcome::Confirmed,
    })
}

/// External cancellation and the user notification. Independent and best-effort.
async fn run_cancellation_side_effects(state: &AppState, booking: &Booking, job: &WatchdogJob) {
    let cancel_event = async {
        let (Some(event), Some(token)) = (
            booking.scheduled_event.as_deref().filter(|e| !e.is_empty()),
            job.scheduling_token.as_deref().filter(|t| !t.is_empty()),
        ) else {
            tracing::warn!(booking_id = %booking.id, "No scheduled event or token, skipping external cancellation");
            return;
        };
        if let Err(e) = state.scheduling.cancel_event(event, token, CANCELLATION_REASON).await {
            tracing::warn!(booking_id = %booking.id, "External cancellation failed: {}", e);
        }
    };

    let notify = async {
        let subject = job
            .subject
            .as_deref()
            .or(booking.subject.as_deref())
            .unwrap_or("tutoring");
        let session_label = job.session_label.as_deref().unwrap_or("scheduled session");
        let fields = email::booking_cancelled(booking.user_name.as_deref(), subject, session_label);
        if let Err(e) = email::enqueue(
            state.outbox.as_ref(),
            &booking.user_email,
            TemplateId::BookingCancelled,
            &fields,
        ) {
            tracing::warn!(booking_id = %booking.id, "Failed to queue cancellation email: {}", e);
        }
    };

    tokio::join!(cancel_event, notify);
}

/// Poll every job due at `now`.
pub async fn run_due(state: &AppState, now: i64) -> Result<WatchdogReport> {
    let mut report = WatchdogReport::default();
    let mut to_cancel = Vec::new();

    {
        let mut conn = state.db.get()?;
        for job in queries::list_due_watchdog_jobs(&conn, now, BATCH_SIZE)? {
            report.polled += 1;
            let booking_id = job.booking_id.clone();
            match poll(&mut conn, job, now) {
                Ok(PollOutcome::Waiting) => report.waiting += 1,
                Ok(PollOutcome::Confirmed) => report.confirmed += 1,
                Ok(PollOutcome::Gone) => report.gone += 1,
                Ok(PollOutcome::Cancelled(booking, job)) => {
                    report.cancelled += 1;
                    to_cancel.push((booking, job));
                }
                Ok(PollOutcome::Lost) => {}
                Err(e) => tracing::error!(booking_id = %booking_id, "Watchdog poll failed: {}", e),
            }
        }
    }

    for (booking, job) in &to_cancel {
        run_cancellation_side_effects(state, booking, job).await;
    }

    Ok(report)
}

/// Spawns the background worker that drives all deadlines.
pub fn spawn_watchdog_task(state: AppState) {
    let tick = state
        .watchdog
        .interval
        .clamp(Duration::from_secs(1), Duration::from_secs(60));
    let deadline = state.watchdog.deadline();

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tick).await;

            let result = AssertUnwindSafe(run_due(&state, Utc::now().timestamp()))
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(report)) if report.polled > 0 => {
                    tracing::debug!(?report, "Watchdog pass complete");
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("Watchdog pass failed: {}", e),
                Err(panic) => {
                    let panic_msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!("Watchdog pass panicked: {}", panic_msg);
                }
            }
        }
    });

    tracing::info!(
        "Watchdog worker started (checks every {}s, deadline {}s)",
        tick.as_secs(),
        deadline.as_secs()
    );
}
