//! Storing photographed readings: timestamp resolution, media, extraction
//! and derived usage. Shared by the HTTP API and the bulk importer.

use std::{path::PathBuf, sync::Arc};

use reading_client::{
    db::{meter_queries, reading_queries, usage_queries},
    domain::{Meter, NewReading, Reading},
    StoreError,
};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    extract::{Extraction, ReadingExtractor},
    media::MediaStore,
    timestamp::{client, ClientHints, ResolveRequest, TimestampResolver, TimestampSource, ZoneChain},
    usage,
};

pub const UNRECOGNIZED_NOTICE: &str =
    "Could not extract a reading from the image. Edit the reading to add the value manually.";

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("meter {0} is not active")]
    InactiveMeter(i64),
    #[error("invalid reading value: {0}")]
    InvalidValue(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("media storage error: {0}")]
    Media(#[from] std::io::Error),
    #[error("timestamp resolution task failed: {0}")]
    Resolve(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub image: Vec<u8>,
    pub file_name: Option<String>,
    /// Only set for files that live on disk, so their mtime can be used.
    pub path: Option<PathBuf>,
    pub notes: String,
    pub manual_value: Option<f64>,
    pub hints: ClientHints,
}

/// Replacement image for an existing reading.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadingEdit {
    pub image: Option<NewImage>,
    pub notes: Option<String>,
    pub manual_value: Option<f64>,
    /// Explicit capture time, interpreted like the browser's ISO timestamp.
    pub timestamp: Option<String>,
    pub hints: ClientHints,
}

#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub reading: Reading,
    pub timestamp_source: Option<TimestampSource>,
    pub notice: Option<String>,
}

#[derive(Clone)]
pub struct ReadingIngest {
    pool: SqlitePool,
    media: MediaStore,
    resolver: Arc<TimestampResolver>,
    extractor: Arc<dyn ReadingExtractor>,
}

impl ReadingIngest {
    pub fn new(
        pool: SqlitePool,
        media: MediaStore,
        resolver: Arc<TimestampResolver>,
        extractor: Arc<dyn ReadingExtractor>,
    ) -> Self {
        Self {
            pool,
            media,
            resolver,
            extractor,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn zones(&self) -> &ZoneChain {
        self.resolver.zones()
    }

    /// Store a new reading of `meter` and refresh its usage records. The
    /// caller has already checked ownership.
    pub async fn upload(&self, meter: &Meter, upload: Upload) -> Result<Outcome, IngestError> {
        let outcome = self.store(meter, upload).await?;
        if outcome.reading.processed {
            recompute_usage(&self.pool, meter, self.zones()).await?;
        }
        Ok(outcome)
    }

    /// Like [`upload`](Self::upload) without touching usage records.
    ///
    /// Without a manual value the reading is saved unprocessed first and
    /// only marked processed when extraction recognizes a number.
    pub async fn store(&self, meter: &Meter, upload: Upload) -> Result<Outcome, IngestError> {
        if !meter.is_active {
            return Err(IngestError::InactiveMeter(meter.id));
        }
        let manual_value = upload.manual_value.map(validate_value).transpose()?;

        // EXIF parsing and file metadata are blocking work.
        let resolver = Arc::clone(&self.resolver);
        let (resolved, upload) = tokio::task::spawn_blocking(move || {
            let resolved = resolver.resolve(&ResolveRequest {
                image: Some(&upload.image),
                path: upload.path.as_deref(),
                hints: &upload.hints,
            });
            (resolved, upload)
        })
        .await?;

        let photo = self
            .media
            .save(&upload.image, resolved.ts, upload.file_name.as_deref())
            .await?;

        let inserted = reading_queries::insert_reading(
            &self.pool,
            &NewReading {
                meter_id: meter.id,
                image_path: photo.relative.clone(),
                reading_value: manual_value,
                ts: resolved.ts,
                processed: manual_value.is_some(),
                notes: upload.notes,
            },
        )
        .await;
        let mut reading = match inserted {
            Ok(reading) => reading,
            Err(e) => {
                self.media.discard(&photo).await;
                return Err(count_duplicate(e).into());
            }
        };
        metrics::counter!("readings_uploaded_total").increment(1);

        let mut notice = None;
        if manual_value.is_none() {
            match self.extractor.extract(&upload.image, meter.meter_type).await {
                Extraction::Value(value) => {
                    reading_queries::set_reading_value(&self.pool, reading.id, Some(value), true).await?;
                    reading.reading_value = Some(value);
                    reading.processed = true;
                }
                Extraction::Unrecognized => {
                    metrics::counter!("reading_extraction_unrecognized_total").increment(1);
                    notice = Some(UNRECOGNIZED_NOTICE.to_string());
                }
            }
        }

        tracing::info!(
            reading_id = reading.id,
            meter_id = meter.id,
            ts = %reading.ts,
            source = resolved.source.as_str(),
            processed = reading.processed,
            "reading stored"
        );

        Ok(Outcome {
            reading,
            timestamp_source: Some(resolved.source),
            notice,
        })
    }

    /// Apply `edit` to `reading`, moving it to `target` (which may be its
    /// current meter). Extraction re-runs only for a replaced image without a
    /// manual value.
    pub async fn edit(&self, mut reading: Reading, target: &Meter, edit: ReadingEdit) -> Result<Outcome, IngestError> {
        let previous_meter = reading.meter_id;
        if target.id != previous_meter && !target.is_active {
            return Err(IngestError::InactiveMeter(target.id));
        }
        let manual_value = edit.manual_value.map(validate_value).transpose()?;

        let mut timestamp_source = None;
        if let Some(raw) = edit.timestamp.as_deref().filter(|s| !s.trim().is_empty()) {
            reading.ts = client::parse_client_iso(raw, edit.hints.offset(), self.zones())
                .ok_or_else(|| IngestError::InvalidTimestamp(raw.to_string()))?;
            timestamp_source = Some(TimestampSource::ClientTimestamp);
        }

        let mut photo = None;
        if let Some(image) = &edit.image {
            let stored = self
                .media
                .save(&image.bytes, reading.ts, image.file_name.as_deref())
                .await?;
            reading.image_path = stored.relative.clone();
            photo = Some(stored);
        }
        if let Some(notes) = edit.notes {
            reading.notes = notes;
        }
        reading.meter_id = target.id;

        let mut notice = None;
        if let Some(value) = manual_value {
            reading.reading_value = Some(value);
            reading.processed = true;
        } else if let Some(image) = &edit.image {
            match self.extractor.extract(&image.bytes, target.meter_type).await {
                Extraction::Value(value) => {
                    reading.reading_value = Some(value);
                    reading.processed = true;
                }
                Extraction::Unrecognized => {
                    metrics::counter!("reading_extraction_unrecognized_total").increment(1);
                    notice = Some(UNRECOGNIZED_NOTICE.to_string());
                }
            }
        }

        if let Err(e) = reading_queries::update_reading(&self.pool, &reading).await {
            if let Some(photo) = &photo {
                self.media.discard(photo).await;
            }
            return Err(count_duplicate(e).into());
        }
        tracing::info!(reading_id = reading.id, meter_id = target.id, "reading updated");

        recompute_usage(&self.pool, target, self.zones()).await?;
        if previous_meter != target.id {
            let previous = meter_queries::get_meter(&self.pool, previous_meter).await?;
            recompute_usage(&self.pool, &previous, self.zones()).await?;
        }

        Ok(Outcome {
            reading,
            timestamp_source,
            notice,
        })
    }
}

fn validate_value(value: f64) -> Result<f64, IngestError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(IngestError::InvalidValue(value.to_string()))
    }
}

fn count_duplicate(err: StoreError) -> StoreError {
    if let StoreError::DuplicateReading { meter_id, ts } = &err {
        metrics::counter!("readings_duplicate_rejected_total").increment(1);
        tracing::info!(meter_id, %ts, "duplicate reading rejected");
    }
    err
}

/// Rebuild the derived daily usage records of one meter. Returns how many were written.
pub async fn recompute_usage(pool: &SqlitePool, meter: &Meter, zones: &ZoneChain) -> Result<usize, StoreError> {
    let readings = reading_queries::list_processed_readings(pool, meter.id, None).await?;
    let records = usage::daily_records(meter, &readings, zones);
    usage_queries::replace_usage_records(pool, meter.id, &records).await?;
    tracing::debug!(meter_id = meter.id, records = records.len(), "usage records recomputed");
    Ok(records.len())
}
