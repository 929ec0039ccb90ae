//! classpay - payment fulfilment for a tutoring marketplace
//!
//! Turns payment-gateway notifications into paid class reservations and
//! workshop purchases, provisions scheduling links, queues confirmation
//! emails, keeps the discount ledger, and cancels bookings that are never paid.

pub mod config;
pub mod db;
pub mod discounts;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod materialize;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod scheduling;
pub mod util;
pub mod watchdog;
