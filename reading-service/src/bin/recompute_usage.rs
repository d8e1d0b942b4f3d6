use anyhow::Result;
use reading_client::db::{self, meter_queries, schema};
use reading_service::{config::AppConfig, observability, recompute_usage, ZoneChain};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let pool = db::connect(&cfg.database.url, cfg.database.max_connections).await?;
    schema::apply(&pool).await?;
    let zones = ZoneChain::from_config(cfg.time.zone.as_deref(), cfg.time.system_fallback);

    let mut total = 0;
    for meter in meter_queries::list_all_meters(&pool).await? {
        let written = recompute_usage(&pool, &meter, &zones).await?;
        tracing::info!(meter_id = meter.id, name = %meter.name, records = written, "usage recomputed");
        total += written;
    }

    tracing::info!(records = total, "usage recompute finished");
    Ok(())
}
