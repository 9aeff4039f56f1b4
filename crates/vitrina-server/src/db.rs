//! Database pool, migrations and shared persistence helpers

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price_cents INTEGER,
            currency TEXT NOT NULL DEFAULT 'USD',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS catalogs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS analytics_events (
            id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            product_id TEXT,
            catalog_id TEXT,
            request_id TEXT,
            page_path TEXT NOT NULL,
            source TEXT NOT NULL,
            session_id TEXT NOT NULL,
            visitor_id TEXT,
            idempotency_key TEXT UNIQUE,
            key_id TEXT,
            occurred_at TEXT NOT NULL,
            received_at TEXT NOT NULL,
            utm_source TEXT,
            utm_medium TEXT,
            utm_campaign TEXT,
            referrer TEXT
        );

        CREATE TABLE IF NOT EXISTS product_requests (
            id TEXT PRIMARY KEY,
            idempotency_key TEXT NOT NULL UNIQUE,
            session_id TEXT NOT NULL,
            visitor_id TEXT,
            status TEXT NOT NULL DEFAULT 'submitted',
            status_reason TEXT,
            status_updated_by TEXT,
            status_updated_at TEXT,
            page_path TEXT NOT NULL,
            source TEXT NOT NULL,
            customer_name TEXT,
            customer_email TEXT,
            customer_phone TEXT,
            notes TEXT,
            utm_source TEXT,
            utm_medium TEXT,
            utm_campaign TEXT,
            referrer TEXT,
            total_amount_cents INTEGER,
            created_at TEXT NOT NULL,
            contacted_at TEXT,
            paid_at TEXT,
            delivered_at TEXT,
            resolved_at TEXT
        );

        CREATE TABLE IF NOT EXISTS product_request_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL REFERENCES product_requests(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            variant_size TEXT,
            variant_color TEXT,
            unit_price_cents INTEGER
        );

        CREATE TABLE IF NOT EXISTS product_request_status_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL REFERENCES product_requests(id) ON DELETE CASCADE,
            previous_status TEXT NOT NULL,
            new_status TEXT NOT NULL,
            reason TEXT,
            changed_by TEXT NOT NULL,
            changed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id TEXT PRIMARY KEY,
            actor_id TEXT,
            actor_name TEXT,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            action TEXT NOT NULL,
            before_state TEXT,
            after_state TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_type ON analytics_events(event_type);
        CREATE INDEX IF NOT EXISTS idx_events_session ON analytics_events(session_id);
        CREATE INDEX IF NOT EXISTS idx_events_occurred ON analytics_events(occurred_at);
        CREATE INDEX IF NOT EXISTS idx_requests_session ON product_requests(session_id);
        CREATE INDEX IF NOT EXISTS idx_requests_status ON product_requests(status);
        CREATE INDEX IF NOT EXISTS idx_requests_created ON product_requests(created_at);
        CREATE INDEX IF NOT EXISTS idx_request_items_request ON product_request_items(request_id);
        CREATE INDEX IF NOT EXISTS idx_status_history_request ON product_request_status_history(request_id);
        CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_log(created_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// True when `err` is the uniqueness-constraint violation the idempotent
/// dedup contract recovers from; every other persistence failure
/// propagates.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}
