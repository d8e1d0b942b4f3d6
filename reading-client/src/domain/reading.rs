use time::OffsetDateTime;

/// One photographed observation of a meter.
///
/// `ts` keeps the offset it was resolved with; storage compares instants,
/// so two readings of a meter can never share `ts` regardless of offset.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Reading {
    pub id: i64,
    pub meter_id: i64,
    pub image_path: String,
    pub reading_value: Option<f64>,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub ts: OffsetDateTime,
    pub processed: bool,
    pub notes: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
}

impl Reading {
    /// Value of a processed reading, `None` while it awaits extraction or correction.
    pub fn processed_value(&self) -> Option<f64> {
        if self.processed {
            self.reading_value
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewReading {
    pub meter_id: i64,
    pub image_path: String,
    pub reading_value: Option<f64>,
    pub ts: OffsetDateTime,
    pub processed: bool,
    pub notes: String,
}
