//! Capture-time resolution for uploaded meter photos.
//!
//! Sources are tried in a fixed order and the first one that yields a
//! timestamp wins:
//!
//! 1. EXIF capture tags embedded in the image
//! 2. the ISO timestamp reported by the browser
//! 3. the browser's `lastModified` epoch milliseconds
//! 4. the modification time of the file on disk
//! 5. the current time
//!
//! Every failure inside a source just moves on to the next one, so
//! [`TimestampResolver::resolve`] always returns an offset-aware timestamp.

use std::{borrow::Cow, path::Path, time::SystemTime};

use serde::Serialize;
use time::OffsetDateTime;

pub mod client;
pub mod embedded;
pub mod zone;

pub use client::{parse_offset, ClientHints};
pub use embedded::CaptureTags;
pub use zone::ZoneChain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    EmbeddedMetadata,
    ClientTimestamp,
    ClientLastModified,
    FileModified,
    Now,
}

impl TimestampSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddedMetadata => "embedded_metadata",
            Self::ClientTimestamp => "client_timestamp",
            Self::ClientLastModified => "client_last_modified",
            Self::FileModified => "file_modified",
            Self::Now => "now",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTimestamp {
    pub ts: OffsetDateTime,
    pub source: TimestampSource,
}

/// What is known about one photo. Either `image` or `path` may be missing.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub image: Option<&'a [u8]>,
    pub path: Option<&'a Path>,
    pub hints: &'a ClientHints,
}

/// One link of the resolution chain.
pub trait TimestampStrategy: Send + Sync {
    fn source(&self) -> TimestampSource;

    fn resolve(&self, request: &ResolveRequest<'_>, zones: &ZoneChain) -> Option<OffsetDateTime>;
}

pub struct EmbeddedMetadata;

impl TimestampStrategy for EmbeddedMetadata {
    fn source(&self) -> TimestampSource {
        TimestampSource::EmbeddedMetadata
    }

    fn resolve(&self, request: &ResolveRequest<'_>, zones: &ZoneChain) -> Option<OffsetDateTime> {
        let image: Cow<'_, [u8]> = match (request.image, request.path) {
            (Some(bytes), _) => Cow::Borrowed(bytes),
            (None, Some(path)) => match std::fs::read(path) {
                Ok(bytes) => Cow::Owned(bytes),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "cannot read image for exif");
                    return None;
                }
            },
            (None, None) => return None,
        };

        match CaptureTags::read(&image) {
            Ok(tags) => tags.capture_time(zones),
            Err(e) => {
                tracing::debug!(error = %e, "no readable exif in image");
                None
            }
        }
    }
}

pub struct ClientTimestamp;

impl TimestampStrategy for ClientTimestamp {
    fn source(&self) -> TimestampSource {
        TimestampSource::ClientTimestamp
    }

    fn resolve(&self, request: &ResolveRequest<'_>, zones: &ZoneChain) -> Option<OffsetDateTime> {
        let raw = request.hints.iso_timestamp.as_deref()?;
        let parsed = client::parse_client_iso(raw, request.hints.offset(), zones);
        if parsed.is_none() {
            tracing::debug!(raw, "unparseable client timestamp");
        }
        parsed
    }
}

pub struct ClientLastModified;

impl TimestampStrategy for ClientLastModified {
    fn source(&self) -> TimestampSource {
        TimestampSource::ClientLastModified
    }

    fn resolve(&self, request: &ResolveRequest<'_>, zones: &ZoneChain) -> Option<OffsetDateTime> {
        let raw = request.hints.last_modified_ms.as_deref()?;
        client::parse_last_modified(raw, request.hints.offset(), zones)
    }
}

pub struct FileModified;

impl TimestampStrategy for FileModified {
    fn source(&self) -> TimestampSource {
        TimestampSource::FileModified
    }

    fn resolve(&self, request: &ResolveRequest<'_>, zones: &ZoneChain) -> Option<OffsetDateTime> {
        let path = request.path?;
        let modified: SystemTime = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
        Some(zones.at_instant(OffsetDateTime::from(modified)))
    }
}

/// The built-in order: embedded tags, client ISO, client epoch millis, file mtime.
pub fn default_chain() -> Vec<Box<dyn TimestampStrategy>> {
    vec![
        Box::new(EmbeddedMetadata),
        Box::new(ClientTimestamp),
        Box::new(ClientLastModified),
        Box::new(FileModified),
    ]
}

pub struct TimestampResolver {
    zones: ZoneChain,
    chain: Vec<Box<dyn TimestampStrategy>>,
}

impl TimestampResolver {
    pub fn new(zones: ZoneChain) -> Self {
        Self::with_chain(zones, default_chain())
    }

    pub fn with_chain(zones: ZoneChain, chain: Vec<Box<dyn TimestampStrategy>>) -> Self {
        Self { zones, chain }
    }

    pub fn zones(&self) -> &ZoneChain {
        &self.zones
    }

    pub fn resolve(&self, request: &ResolveRequest<'_>) -> ResolvedTimestamp {
        for strategy in &self.chain {
            if let Some(ts) = strategy.resolve(request, &self.zones) {
                return self.resolved(ts, strategy.source());
            }
        }

        tracing::warn!("no timestamp found for image, using current time");
        self.resolved(self.zones.at_instant(OffsetDateTime::now_utc()), TimestampSource::Now)
    }

    fn resolved(&self, ts: OffsetDateTime, source: TimestampSource) -> ResolvedTimestamp {
        metrics::counter!("timestamp_resolved_total", "source" => source.as_str()).increment(1);
        tracing::debug!(source = source.as_str(), %ts, "reading timestamp resolved");
        ResolvedTimestamp { ts, source }
    }
}

impl Default for TimestampResolver {
    fn default() -> Self {
        Self::new(ZoneChain::default())
    }
}
