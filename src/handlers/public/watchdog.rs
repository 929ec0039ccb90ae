use axum::{extract::State, http::StatusCode};
use serde::Serialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::watchdog::{self, TriggerOutcome, WatchRequest};

#[derive(Debug, Serialize)]
pub struct WatchResponse {
    pub booking_id: String,
    pub status: &'static str,
}

/// POST /bookings/{id}/watchdog - start the unpaid-booking deadline.
///
/// Answers right away; the cancellation itself happens in the background
/// worker. Repeating the call keeps the original deadline.
pub async fn watch_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
    Json(request): Json<WatchRequest>,
) -> Result<(StatusCode, Json<WatchResponse>)> {
    let conn = state.db.get()?;

    let status = match watchdog::trigger(&conn, &booking_id, &request, &state.watchdog)? {
        TriggerOutcome::Started => "watching",
        TriggerOutcome::AlreadyWatching => "already_watching",
    };

    Ok((StatusCode::ACCEPTED, Json(WatchResponse { booking_id, status })))
}
