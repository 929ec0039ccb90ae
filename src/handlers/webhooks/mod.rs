pub mod common;
pub mod mercadopago;
pub mod parser;

pub use mercadopago::handle_mercadopago_webhook;

use axum::{Router, routing::get};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    // IPN notifications arrive as GET, webhooks as POST
    Router::new().route(
        "/webhook/mercadopago",
        get(handle_mercadopago_webhook).post(handle_mercadopago_webhook),
    )
}
