use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use time::{OffsetDateTime, UtcOffset};

use crate::StoreError;

pub mod meter_queries;
pub mod reading_queries;
pub mod schema;
pub mod usage_queries;

/// Open (creating if needed) the readings database with foreign keys enforced.
///
/// Idle connections are kept so `sqlite::memory:` databases survive between queries.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub(crate) fn to_micros(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000) as i64
}

pub(crate) fn from_micros(micros: i64, offset_secs: i32) -> Result<OffsetDateTime, StoreError> {
    let offset = UtcOffset::from_whole_seconds(offset_secs)
        .map_err(|e| StoreError::Corrupt(format!("utc offset {offset_secs}: {e}")))?;
    let ts = OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .map_err(|e| StoreError::Corrupt(format!("timestamp {micros}: {e}")))?;
    Ok(ts.to_offset(offset))
}


#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn micros_round_trip_keeps_offset_and_instant() {
        let ts = datetime!(2024-01-05 08:00:00.123456 -05:00);
        let back = from_micros(to_micros(ts), ts.offset().whole_seconds()).unwrap();
        assert_eq!(back, ts);
        assert_eq!(back.offset(), ts.offset());
    }

    #[test]
    fn same_instant_in_different_offsets_has_same_micros() {
        let a = datetime!(2024-01-05 10:00:00 +02:00);
        let b = datetime!(2024-01-05 08:00:00 UTC);
        assert_eq!(to_micros(a), to_micros(b));
    }
}
