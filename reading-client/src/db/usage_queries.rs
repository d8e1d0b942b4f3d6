use sqlx::SqlitePool;
use time::Date;

use crate::{domain::UsageRecord, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    meter_id: i64,
    date: Date,
    start_reading: f64,
    end_reading: f64,
    usage_amount: f64,
    cost_per_unit: f64,
    calculated_cost: f64,
}

impl From<UsageRow> for UsageRecord {
    fn from(row: UsageRow) -> Self {
        UsageRecord {
            meter_id: row.meter_id,
            date: row.date,
            start_reading: row.start_reading,
            end_reading: row.end_reading,
            usage_amount: row.usage_amount,
            cost_per_unit: row.cost_per_unit,
            calculated_cost: row.calculated_cost,
        }
    }
}

/// Swap the derived usage records of one meter for `records` in a single transaction.
pub async fn replace_usage_records(
    pool: &SqlitePool,
    meter_id: i64,
    records: &[UsageRecord],
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM usage_records WHERE meter_id = ?")
        .bind(meter_id)
        .execute(&mut *tx)
        .await?;

    for rec in records {
        sqlx::query(
            "INSERT INTO usage_records \
             (meter_id, date, start_reading, end_reading, usage_amount, cost_per_unit, calculated_cost) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(meter_id)
        .bind(rec.date)
        .bind(rec.start_reading)
        .bind(rec.end_reading)
        .bind(rec.usage_amount)
        .bind(rec.cost_per_unit)
        .bind(rec.calculated_cost)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Usage records of a meter, most recent date first.
pub async fn usage_records_for_meter(pool: &SqlitePool, meter_id: i64) -> Result<Vec<UsageRecord>, StoreError> {
    let rows = sqlx::query_as::<_, UsageRow>(
        "SELECT meter_id, date, start_reading, end_reading, usage_amount, cost_per_unit, calculated_cost \
         FROM usage_records WHERE meter_id = ? ORDER BY date DESC",
    )
    .bind(meter_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(UsageRecord::from).collect())
}
