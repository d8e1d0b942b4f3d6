use time::OffsetDateTime;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("a reading for meter {meter_id} already exists at {ts}")]
    DuplicateReading { meter_id: i64, ts: OffsetDateTime },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Maps a unique-constraint failure on the readings table to `DuplicateReading`.
    pub(crate) fn from_reading_write(err: sqlx::Error, meter_id: i64, ts: OffsetDateTime) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateReading { meter_id, ts }
            }
            _ => StoreError::Database(err),
        }
    }
}
