use anyhow::{Context, Result};
use reading_client::db::{self, schema};
use reading_service::{
    auth::UserDirectory,
    build_ingest,
    config::AppConfig,
    http::{self, AppState},
    metrics_server, observability,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = db::connect(&cfg.database.url, cfg.database.max_connections).await?;
    schema::apply(&pool).await?;

    if cfg.users.is_empty() {
        tracing::warn!("no [[users]] configured, every request will be rejected");
    }
    let state = AppState::new(build_ingest(&cfg, pool)?, UserDirectory::from_config(&cfg.users));
    let app = http::router(state, cfg.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.bind_addr))?;
    tracing::info!(addr = %cfg.server.bind_addr, "reading service listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
