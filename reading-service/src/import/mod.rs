//! Bulk import of meter photos from disk.

use std::{io, path::PathBuf};

use futures::{Stream, StreamExt};
use reading_client::{domain::Meter, StoreError};
use serde::Serialize;

use crate::ingest::{self, IngestError, ReadingIngest, Upload};

pub mod photo_dir;

pub use photo_dir::{PendingPhoto, PhotoDirSource};

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("cannot read photo directory {}: {source}", path.display())]
    Dir { path: PathBuf, source: io::Error },
    #[error("cannot read photo {}: {source}", path.display())]
    Photo { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Imported, but extraction did not recognize a value.
    pub unprocessed: usize,
}

pub struct ReadingImporter {
    ingest: ReadingIngest,
}

impl ReadingImporter {
    pub fn new(ingest: ReadingIngest) -> Self {
        Self { ingest }
    }

    /// Store every photo of `photos` as a reading of `meter`.
    ///
    /// Duplicates and unreadable photos are counted and skipped. Usage
    /// records are rebuilt once after the last photo.
    pub async fn run<S>(&self, meter: &Meter, photos: S) -> Result<ImportSummary, ImportError>
    where
        S: Stream<Item = Result<PendingPhoto, ImportError>> + Send + Unpin,
    {
        if !meter.is_active {
            return Err(IngestError::InactiveMeter(meter.id).into());
        }

        let mut summary = ImportSummary::default();
        let mut photos = photos;
        while let Some(item) = photos.next().await {
            let photo = match item {
                Ok(photo) => photo,
                Err(ImportError::Dir { path, source }) => return Err(ImportError::Dir { path, source }),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping photo");
                    summary.failed += 1;
                    metrics::counter!("import_photos_total", "outcome" => "failed").increment(1);
                    continue;
                }
            };

            let file_name = photo.file_name().map(str::to_string);
            let upload = Upload {
                notes: file_name
                    .as_deref()
                    .map(|n| format!("imported from {n}"))
                    .unwrap_or_default(),
                file_name,
                image: photo.bytes,
                path: Some(photo.path.clone()),
                ..Upload::default()
            };

            let outcome = match self.ingest.store(meter, upload).await {
                Ok(outcome) => outcome,
                Err(IngestError::Store(StoreError::DuplicateReading { ts, .. })) => {
                    tracing::info!(path = %photo.path.display(), %ts, "already imported");
                    summary.duplicates += 1;
                    metrics::counter!("import_photos_total", "outcome" => "duplicate").increment(1);
                    continue;
                }
                Err(e) => {
                    tracing::error!(path = %photo.path.display(), error = %e, "failed to import photo");
                    summary.failed += 1;
                    metrics::counter!("import_photos_total", "outcome" => "failed").increment(1);
                    continue;
                }
            };

            summary.imported += 1;
            if !outcome.reading.processed {
                summary.unprocessed += 1;
            }
            metrics::counter!("import_photos_total", "outcome" => "imported").increment(1);
        }

        if summary.imported > 0 {
            ingest::recompute_usage(self.ingest.pool(), meter, self.ingest.zones()).await?;
        }
        tracing::info!(
            meter_id = meter.id,
            imported = summary.imported,
            duplicates = summary.duplicates,
            failed = summary.failed,
            unprocessed = summary.unprocessed,
            "photo import finished"
        );
        Ok(summary)
    }
}
