use std::env;
use std::time::Duration;

const DEFAULT_MERCADOPAGO_API_URL: &str = "https://api.mercadopago.com";
const DEFAULT_CALENDLY_API_URL: &str = "https://api.calendly.com";

/// Polling cadence and cycle budget for the cancellation watchdog.
///
/// A booking left unpaid is cancelled once it has been observed unpaid for
/// `max_cycles` polls spaced `interval` apart, counted from booking creation.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogSettings {
    pub interval: Duration,
    pub max_cycles: u32,
}

impl WatchdogSettings {
    pub fn deadline(&self) -> Duration {
        self.interval * self.max_cycles
    }
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_cycles: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Public URL of this service, embedded in gateway notification URLs
    pub base_url: String,
    /// Front-end URL used for checkout back URLs and confirmation links
    pub site_url: String,
    /// Bearer token required by the purchase and watchdog endpoints
    pub api_token: Option<String>,
    pub mercadopago_api_url: String,
    pub calendly_api_url: String,
    pub watchdog: WatchdogSettings,
    pub dev_mode: bool,
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a strictly positive count; zero and garbage fall back to the default.
fn parse_positive<T>(value: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    value.trim().parse().ok().filter(|v| *v > T::default())
}

fn env_positive<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    env::var(key).ok().as_deref().and_then(parse_positive::<T>)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("CLASSPAY_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let defaults = WatchdogSettings::default();
        let watchdog = WatchdogSettings {
            interval: env_positive("WATCHDOG_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            max_cycles: env_positive("WATCHDOG_MAX_CYCLES").unwrap_or(defaults.max_cycles),
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "classpay.db".to_string()),
            base_url,
            site_url: env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_token: env_opt("CLASSPAY_API_TOKEN"),
            mercadopago_api_url: env::var("MERCADOPAGO_API_URL")
                .unwrap_or_else(|_| DEFAULT_MERCADOPAGO_API_URL.to_string()),
            calendly_api_url: env::var("CALENDLY_API_URL")
                .unwrap_or_else(|_| DEFAULT_CALENDLY_API_URL.to_string()),
            watchdog,
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
