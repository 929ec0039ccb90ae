use rusqlite::Connection;

/// Initialize the database schema
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Sellers (gateway account owners; id doubles as the webhook credential reference)
        CREATE TABLE IF NOT EXISTS sellers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            access_token TEXT NOT NULL,
            webhook_secret TEXT,
            created_at INTEGER NOT NULL
        );

        -- Paid classes, keyed by gateway payment id (the idempotency key)
        CREATE TABLE IF NOT EXISTS reservations (
            payment_id TEXT PRIMARY KEY,
            buyer_email TEXT NOT NULL,
            buyer_name TEXT NOT NULL,
            teacher_email TEXT NOT NULL,
            teacher_name TEXT NOT NULL,
            subject TEXT NOT NULL,
            scheduled_at TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            student_count INTEGER NOT NULL,
            university TEXT NOT NULL,
            program TEXT NOT NULL,
            price REAL NOT NULL,
            original_price REAL NOT NULL,
            discount TEXT,
            status TEXT NOT NULL CHECK (status IN ('paid')),
            scheduling_link TEXT,
            booking_id TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_reservations_buyer ON reservations(buyer_email);
        CREATE INDEX IF NOT EXISTS idx_reservations_teacher ON reservations(teacher_email);

        -- Paid workshop seats, keyed by gateway payment id
        CREATE TABLE IF NOT EXISTS workshop_purchases (
            payment_id TEXT PRIMARY KEY,
            buyer_email TEXT NOT NULL,
            buyer_name TEXT NOT NULL,
            workshop_id TEXT NOT NULL,
            workshop_title TEXT NOT NULL,
            sessions TEXT NOT NULL,
            price REAL NOT NULL,
            original_price REAL NOT NULL,
            discount TEXT,
            status TEXT NOT NULL CHECK (status IN ('paid')),
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_workshop_purchases_workshop ON workshop_purchases(workshop_id);

        -- Tentative bookings held before payment
        CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            user_email TEXT NOT NULL,
            user_name TEXT,
            subject TEXT,
            scheduled_event TEXT,
            payment_id TEXT,
            status TEXT NOT NULL CHECK (status IN ('pending', 'confirmed', 'cancelled')),
            created_at INTEGER NOT NULL,
            cancelled_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_bookings_payment ON bookings(payment_id) WHERE payment_id IS NOT NULL;

        -- Cancellation deadlines (one per booking, survives restarts)
        CREATE TABLE IF NOT EXISTS watchdog_jobs (
            booking_id TEXT PRIMARY KEY,
            state TEXT NOT NULL CHECK (state IN ('awaiting_payment', 'confirmed', 'cancelled', 'gone')),
            interval_secs INTEGER NOT NULL,
            max_cycles INTEGER NOT NULL,
            cycles_observed INTEGER NOT NULL DEFAULT 0,
            next_poll_at INTEGER NOT NULL,
            subject TEXT,
            session_label TEXT,
            scheduling_token TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_watchdog_jobs_due ON watchdog_jobs(next_poll_at) WHERE state = 'awaiting_payment';

        -- Discount codes (code is stored upper-case)
        CREATE TABLE IF NOT EXISTS discount_codes (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL CHECK (kind IN ('percentage', 'fixed')),
            value REAL NOT NULL,
            usage_limit INTEGER,
            usage_count INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            expires_at INTEGER,
            created_at INTEGER NOT NULL
        );

        -- Append-only usage history; one row per purchase per code
        CREATE TABLE IF NOT EXISTS discount_code_usages (
            id TEXT PRIMARY KEY,
            discount_code_id TEXT NOT NULL REFERENCES discount_codes(id),
            buyer_email TEXT NOT NULL,
            purchase_id TEXT NOT NULL,
            amount_discounted REAL NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(discount_code_id, purchase_id)
        );

        -- Outbound mail queue, consumed by an external mailer
        CREATE TABLE IF NOT EXISTS mail_queue (
            id TEXT PRIMARY KEY,
            recipient TEXT NOT NULL,
            template TEXT NOT NULL,
            subject TEXT NOT NULL,
            html TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_mail_queue_created ON mail_queue(created_at);

        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        "#,
    )?;
    Ok(())
}
