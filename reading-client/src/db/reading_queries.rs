use sqlx::SqlitePool;
use time::OffsetDateTime;

use super::{from_micros, to_micros};
use crate::{
    domain::{NewReading, Reading},
    StoreError,
};

#[derive(Debug, sqlx::FromRow)]
struct ReadingRow {
    id: i64,
    meter_id: i64,
    image_path: String,
    reading_value: Option<f64>,
    ts_us: i64,
    utc_offset_s: i32,
    processed: bool,
    notes: String,
    created_at_us: i64,
}

impl TryFrom<ReadingRow> for Reading {
    type Error = StoreError;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        Ok(Reading {
            id: row.id,
            meter_id: row.meter_id,
            image_path: row.image_path,
            reading_value: row.reading_value,
            ts: from_micros(row.ts_us, row.utc_offset_s)?,
            processed: row.processed,
            notes: row.notes,
            created_at: from_micros(row.created_at_us, 0)?,
        })
    }
}

const READING_COLUMNS: &str = "r.id, r.meter_id, r.image_path, r.reading_value, r.ts_us, r.utc_offset_s, \
     r.processed, r.notes, r.created_at_us";

fn collect(rows: Vec<ReadingRow>) -> Result<Vec<Reading>, StoreError> {
    rows.into_iter().map(Reading::try_from).collect()
}

/// Insert a reading. A second reading of the same meter at the same instant
/// fails with [`StoreError::DuplicateReading`].
pub async fn insert_reading(pool: &SqlitePool, reading: &NewReading) -> Result<Reading, StoreError> {
    let id = sqlx::query(
        "INSERT INTO readings \
         (meter_id, image_path, reading_value, ts_us, utc_offset_s, processed, notes, created_at_us) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(reading.meter_id)
    .bind(&reading.image_path)
    .bind(reading.reading_value)
    .bind(to_micros(reading.ts))
    .bind(reading.ts.offset().whole_seconds())
    .bind(reading.processed)
    .bind(&reading.notes)
    .bind(to_micros(OffsetDateTime::now_utc()))
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_reading_write(e, reading.meter_id, reading.ts))?
    .last_insert_rowid();

    get_reading(pool, id).await
}

pub async fn get_reading(pool: &SqlitePool, id: i64) -> Result<Reading, StoreError> {
    let sql = format!("SELECT {READING_COLUMNS} FROM readings r WHERE r.id = ?");
    sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound("reading"))?
        .try_into()
}

/// Every reading on meters owned by `user_id`, newest first.
pub async fn list_readings_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Reading>, StoreError> {
    let sql = format!(
        "SELECT {READING_COLUMNS} FROM readings r \
         JOIN meters m ON m.id = r.meter_id \
         WHERE m.user_id = ? \
         ORDER BY r.ts_us DESC, r.id DESC"
    );
    let rows = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    collect(rows)
}

/// Processed readings of a meter carrying a value, oldest first, optionally
/// restricted to `ts >= since`.
pub async fn list_processed_readings(
    pool: &SqlitePool,
    meter_id: i64,
    since: Option<OffsetDateTime>,
) -> Result<Vec<Reading>, StoreError> {
    let sql = format!(
        "SELECT {READING_COLUMNS} FROM readings r \
         WHERE r.meter_id = ? \
           AND r.processed = 1 \
           AND r.reading_value IS NOT NULL \
           AND r.ts_us >= ? \
         ORDER BY r.ts_us, r.id"
    );
    let rows = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(meter_id)
        .bind(since.map(to_micros).unwrap_or(i64::MIN))
        .fetch_all(pool)
        .await?;
    collect(rows)
}

/// Overwrite the editable fields of an existing reading.
pub async fn update_reading(pool: &SqlitePool, reading: &Reading) -> Result<(), StoreError> {
    let res = sqlx::query(
        "UPDATE readings SET meter_id = ?, image_path = ?, reading_value = ?, ts_us = ?, \
         utc_offset_s = ?, processed = ?, notes = ? WHERE id = ?",
    )
    .bind(reading.meter_id)
    .bind(&reading.image_path)
    .bind(reading.reading_value)
    .bind(to_micros(reading.ts))
    .bind(reading.ts.offset().whole_seconds())
    .bind(reading.processed)
    .bind(&reading.notes)
    .bind(reading.id)
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_reading_write(e, reading.meter_id, reading.ts))?;

    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound("reading"));
    }
    Ok(())
}

/// Record the outcome of extraction or manual correction.
pub async fn set_reading_value(
    pool: &SqlitePool,
    id: i64,
    value: Option<f64>,
    processed: bool,
) -> Result<(), StoreError> {
    let res = sqlx::query("UPDATE readings SET reading_value = ?, processed = ? WHERE id = ?")
        .bind(value)
        .bind(processed)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound("reading"));
    }
    Ok(())
}

pub async fn delete_reading(pool: &SqlitePool, id: i64) -> Result<(), StoreError> {
    let res = sqlx::query("DELETE FROM readings WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound("reading"));
    }
    Ok(())
}
