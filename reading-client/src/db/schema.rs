use sqlx::SqlitePool;

use crate::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meters (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT    NOT NULL,
    meter_type      TEXT    NOT NULL CHECK (meter_type IN ('hot', 'cold')),
    user_id         TEXT    NOT NULL,
    cost_per_unit   REAL    NOT NULL DEFAULT 0.005,
    created_at_us   INTEGER NOT NULL,
    is_active       INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_meters_user ON meters (user_id);

CREATE TABLE IF NOT EXISTS readings (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    meter_id        INTEGER NOT NULL REFERENCES meters (id) ON DELETE CASCADE,
    image_path      TEXT    NOT NULL,
    reading_value   REAL,
    ts_us           INTEGER NOT NULL,
    utc_offset_s    INTEGER NOT NULL,
    processed       INTEGER NOT NULL DEFAULT 0,
    notes           TEXT    NOT NULL DEFAULT '',
    created_at_us   INTEGER NOT NULL,
    UNIQUE (meter_id, ts_us)
);

CREATE TABLE IF NOT EXISTS usage_records (
    meter_id        INTEGER NOT NULL REFERENCES meters (id) ON DELETE CASCADE,
    date            TEXT    NOT NULL,
    start_reading   REAL    NOT NULL,
    end_reading     REAL    NOT NULL,
    usage_amount    REAL    NOT NULL,
    cost_per_unit   REAL    NOT NULL,
    calculated_cost REAL    NOT NULL,
    PRIMARY KEY (meter_id, date)
);
"#;

/// Create tables and indexes if they do not exist yet. Safe to run on every start.
pub async fn apply(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
