mod purchases;
mod watchdog;

pub use purchases::*;
pub use watchdog::*;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;
use crate::middleware::api_token_auth;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/purchases", post(create_purchase))
        .route("/bookings/{id}/watchdog", post(watch_booking))
        .layer(middleware::from_fn_with_state(state, api_token_auth));

    Router::new().route("/health", get(health)).merge(protected)
}
