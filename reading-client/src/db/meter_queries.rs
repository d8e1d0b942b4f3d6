use sqlx::SqlitePool;
use time::OffsetDateTime;

use super::{from_micros, to_micros};
use crate::{
    domain::{Meter, MeterType, NewMeter},
    StoreError,
};

#[derive(Debug, sqlx::FromRow)]
struct MeterRow {
    id: i64,
    name: String,
    meter_type: String,
    user_id: String,
    cost_per_unit: f64,
    created_at_us: i64,
    is_active: bool,
}

impl TryFrom<MeterRow> for Meter {
    type Error = StoreError;

    fn try_from(row: MeterRow) -> Result<Self, Self::Error> {
        Ok(Meter {
            id: row.id,
            name: row.name,
            meter_type: row.meter_type.parse::<MeterType>().map_err(StoreError::Corrupt)?,
            user_id: row.user_id,
            cost_per_unit: row.cost_per_unit,
            created_at: from_micros(row.created_at_us, 0)?,
            is_active: row.is_active,
        })
    }
}

const METER_COLUMNS: &str = "id, name, meter_type, user_id, cost_per_unit, created_at_us, is_active";

pub async fn insert_meter(pool: &SqlitePool, meter: &NewMeter) -> Result<Meter, StoreError> {
    let created_at = OffsetDateTime::now_utc();
    let id = sqlx::query(
        "INSERT INTO meters (name, meter_type, user_id, cost_per_unit, created_at_us, is_active) \
         VALUES (?, ?, ?, ?, ?, 1)",
    )
    .bind(&meter.name)
    .bind(meter.meter_type.as_str())
    .bind(&meter.user_id)
    .bind(meter.cost_per_unit)
    .bind(to_micros(created_at))
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_meter(pool, id).await
}

pub async fn get_meter(pool: &SqlitePool, id: i64) -> Result<Meter, StoreError> {
    let sql = format!("SELECT {METER_COLUMNS} FROM meters WHERE id = ?");
    sqlx::query_as::<_, MeterRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound("meter"))?
        .try_into()
}

/// Meters owned by `user_id`, ordered by name.
pub async fn list_meters_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Meter>, StoreError> {
    let sql = format!("SELECT {METER_COLUMNS} FROM meters WHERE user_id = ? ORDER BY name, id");
    sqlx::query_as::<_, MeterRow>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Meter::try_from)
        .collect()
}

pub async fn list_all_meters(pool: &SqlitePool) -> Result<Vec<Meter>, StoreError> {
    let sql = format!("SELECT {METER_COLUMNS} FROM meters ORDER BY id");
    sqlx::query_as::<_, MeterRow>(&sql)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Meter::try_from)
        .collect()
}

/// Persist the mutable fields of `meter` (name, type, rate, active flag).
pub async fn update_meter(pool: &SqlitePool, meter: &Meter) -> Result<(), StoreError> {
    let res = sqlx::query(
        "UPDATE meters SET name = ?, meter_type = ?, cost_per_unit = ?, is_active = ? WHERE id = ?",
    )
    .bind(&meter.name)
    .bind(meter.meter_type.as_str())
    .bind(meter.cost_per_unit)
    .bind(meter.is_active)
    .bind(meter.id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound("meter"));
    }
    Ok(())
}

pub async fn count_readings(pool: &SqlitePool, meter_id: i64) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings WHERE meter_id = ?")
        .bind(meter_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Delete a meter together with its readings and usage records.
///
/// Returns how many readings went with it.
pub async fn delete_meter(pool: &SqlitePool, id: i64) -> Result<i64, StoreError> {
    let readings = count_readings(pool, id).await?;
    let res = sqlx::query("DELETE FROM meters WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound("meter"));
    }
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{reading_queries, test_support::*};

    #[tokio::test]
    async fn insert_and_list_meters_per_user() {
        let pool = memory_pool().await;
        let m = insert_meter(&pool, &new_meter("alice")).await.unwrap();
        insert_meter(&pool, &new_meter("bob")).await.unwrap();

        assert!(m.is_active);
        assert_eq!(m.meter_type, MeterType::Cold);

        let alice = list_meters_for_user(&pool, "alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].id, m.id);
        assert_eq!(list_all_meters(&pool).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_meter_persists_rate_and_active_flag() {
        let pool = memory_pool().await;
        let mut m = insert_meter(&pool, &new_meter("alice")).await.unwrap();
        m.cost_per_unit = 0.01;
        m.is_active = false;
        m.meter_type = MeterType::Hot;
        update_meter(&pool, &m).await.unwrap();

        let back = get_meter(&pool, m.id).await.unwrap();
        assert_eq!(back.cost_per_unit, 0.01);
        assert!(!back.is_active);
        assert_eq!(back.meter_type, MeterType::Hot);
    }

    #[tokio::test]
    async fn deleting_meter_cascades_to_readings() {
        let pool = memory_pool().await;
        let m = insert_meter(&pool, &new_meter("alice")).await.unwrap();
        let r = reading_queries::insert_reading(&pool, &new_reading(m.id, Some(1.0)))
            .await
            .unwrap();

        assert_eq!(delete_meter(&pool, m.id).await.unwrap(), 1);
        assert!(matches!(
            reading_queries::get_reading(&pool, r.id).await,
            Err(StoreError::NotFound("reading"))
        ));
        assert!(matches!(get_meter(&pool, m.id).await, Err(StoreError::NotFound("meter"))));
    }

    #[tokio::test]
    async fn missing_meter_is_not_found() {
        let pool = memory_pool().await;
        assert!(matches!(delete_meter(&pool, 42).await, Err(StoreError::NotFound("meter"))));
    }
}
