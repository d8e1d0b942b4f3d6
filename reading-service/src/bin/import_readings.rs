use anyhow::{bail, Context, Result};
use reading_client::db::{self, meter_queries, schema};
use reading_service::{
    build_ingest,
    config::AppConfig,
    import::{PhotoDirSource, ReadingImporter},
    observability,
};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: import_readings <meter_id> <photo_dir>");
    }
    let meter_id: i64 = args[1]
        .parse()
        .with_context(|| format!("invalid meter id '{}'", args[1]))?;
    let photo_dir = &args[2];

    // READINGS_CONFIG selects the same config file as the server.
    let cfg = AppConfig::load()?;
    let pool = db::connect(&cfg.database.url, cfg.database.max_connections).await?;
    schema::apply(&pool).await?;

    let meter = meter_queries::get_meter(&pool, meter_id).await?;
    let importer = ReadingImporter::new(build_ingest(&cfg, pool)?);
    let summary = importer.run(&meter, PhotoDirSource::new(photo_dir).stream()).await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
