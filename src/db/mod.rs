mod from_row;
mod schema;
pub mod queries;

pub use from_row::FromRow;
pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::WatchdogSettings;
use crate::email::MailOutbox;
use crate::payments::PaymentGateway;
use crate::scheduling::SchedulingApi;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by handlers and background workers
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Public URL of this service (used in gateway notification URLs)
    pub base_url: String,
    /// Front-end URL for checkout back URLs and confirmation links
    pub site_url: String,
    /// Bearer token for the purchase and watchdog endpoints (None = endpoints disabled)
    pub api_token: Option<String>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub scheduling: Arc<dyn SchedulingApi>,
    pub outbox: Arc<dyn MailOutbox>,
    pub watchdog: WatchdogSettings,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(10).build(manager)
}
