use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;
use std::time::Duration;

use classpay::config::Config;
use classpay::db::{AppState, create_pool, init_db, queries};
use classpay::email::SqliteOutbox;
use classpay::handlers;
use classpay::models::{CreateDiscountCode, CreateSeller, DiscountKind};
use classpay::payments::MercadoPagoClient;
use classpay::scheduling::CalendlyClient;
use classpay::watchdog::spawn_watchdog_task;

/// Finished watchdog jobs are kept this long for inspection.
const WATCHDOG_RETENTION_DAYS: i64 = 30;

#[derive(Parser, Debug)]
#[command(name = "classpay")]
#[command(about = "Payment fulfilment for tutoring classes and workshops")]
struct Cli {
    /// Seed the database with dev data (seller, discount code)
    #[arg(long)]
    seed: bool,
}

/// Seeds a seller and a discount code. Only runs in dev mode on an empty database.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    if queries::get_discount_code_by_code(&conn, "WELCOME10")
        .expect("Failed to check seed data")
        .is_some()
    {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    let access_token = std::env::var("MERCADOPAGO_ACCESS_TOKEN")
        .unwrap_or_else(|_| "TEST-dev-access-token".to_string());

    let seller = queries::create_seller(
        &conn,
        &CreateSeller {
            name: "Dev Teacher".to_string(),
            email: "teacher@classpay.local".to_string(),
            access_token,
            webhook_secret: None,
        },
    )
    .expect("Failed to create dev seller");

    let code = queries::create_discount_code(
        &conn,
        &CreateDiscountCode {
            code: "WELCOME10".to_string(),
            kind: DiscountKind::Percentage,
            value: 10.0,
            usage_limit: Some(100),
            expires_at: None,
        },
    )
    .expect("Failed to create dev discount code");

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("Seller: {} (id: {})", seller.name, seller.id);
    tracing::info!("Discount code: {} ({}%)", code.code, code.value);
    tracing::info!("============================================");

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  seller_id: {}", seller.id);
    println!("  discount_code: {}", code.code);
    println!("--- END COPY ---");
    println!();
}

/// Spawns a background task that purges old finished watchdog jobs once a day.
fn spawn_cleanup_task(state: AppState) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(24 * 60 * 60);

        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => match queries::purge_finished_watchdog_jobs(&conn, WATCHDOG_RETENTION_DAYS) {
                    Ok(count) if count > 0 => {
                        tracing::debug!("Purged {} finished watchdog jobs", count);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to purge watchdog jobs: {}", e),
                },
                Err(e) => tracing::warn!("Failed to get db connection for cleanup: {}", e),
            }
        }
    });

    tracing::info!("Background cleanup task started (runs daily)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classpay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.api_token.is_none() {
        tracing::warn!("CLASSPAY_API_TOKEN not set: /purchases and /bookings/{{id}}/watchdog will reject all requests");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool.clone(),
        base_url: config.base_url.clone(),
        site_url: config.site_url.clone(),
        api_token: config.api_token.clone(),
        gateway: Arc::new(MercadoPagoClient::new(&config.mercadopago_api_url)),
        scheduling: Arc::new(CalendlyClient::new(&config.calendly_api_url)),
        outbox: Arc::new(SqliteOutbox::new(db_pool)),
        watchdog: config.watchdog,
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set CLASSPAY_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    // Resumes every pending deadline from the database
    spawn_watchdog_task(state.clone());
    spawn_cleanup_task(state.clone());

    let app = Router::new()
        .merge(handlers::public::router(state.clone()))
        .merge(handlers::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("classpay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
