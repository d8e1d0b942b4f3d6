pub mod auth;
pub mod config;
pub mod extract;
pub mod http;
pub mod import;
pub mod ingest;
pub mod media;
pub mod metrics_server;
pub mod observability;
pub mod timestamp;
pub mod usage;

pub use ingest::{recompute_usage, ReadingIngest};
pub use timestamp::{TimestampResolver, ZoneChain};

use std::sync::Arc;

use extract::{DisabledExtractor, HttpExtractor, ReadingExtractor};

/// Wire up the ingest services from configuration and an open pool.
pub fn build_ingest(cfg: &config::AppConfig, pool: sqlx::SqlitePool) -> Result<ReadingIngest, reqwest::Error> {
    let zones = ZoneChain::from_config(cfg.time.zone.as_deref(), cfg.time.system_fallback);
    tracing::info!(
        zone = ?zones.configured(),
        system_fallback = cfg.time.system_fallback,
        "timestamp zone chain"
    );
    let extractor: Arc<dyn ReadingExtractor> = match &cfg.extractor {
        Some(x) => {
            tracing::info!(endpoint = %x.endpoint, "reading extractor enabled");
            Arc::new(HttpExtractor::new(x.endpoint.clone(), x.timeout())?)
        }
        None => {
            tracing::info!("no reading extractor configured, uploads without a value stay unprocessed");
            Arc::new(DisabledExtractor)
        }
    };

    Ok(ReadingIngest::new(
        pool,
        media::MediaStore::new(&cfg.storage.media_dir),
        Arc::new(TimestampResolver::new(zones)),
        extractor,
    ))
}
