//! JSON API over meters, readings and usage.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, put},
    Router,
};
use reading_client::{
    db::{meter_queries, reading_queries},
    domain::{Meter, Reading},
};
use sqlx::SqlitePool;

use crate::{auth::UserDirectory, ingest::ReadingIngest, timestamp::ZoneChain};

pub mod analytics;
pub mod error;
pub mod meters;
pub mod readings;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub ingest: ReadingIngest,
    pub users: Arc<UserDirectory>,
}

impl AppState {
    pub fn new(ingest: ReadingIngest, users: UserDirectory) -> Self {
        Self {
            ingest,
            users: Arc::new(users),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.ingest.pool()
    }

    pub fn zones(&self) -> &ZoneChain {
        self.ingest.zones()
    }
}

impl FromRef<AppState> for Arc<UserDirectory> {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/meters", get(meters::list).post(meters::create))
        .route("/meters/:id", put(meters::update).delete(meters::delete))
        .route("/meters/:id/usage", get(meters::usage))
        .route("/readings", get(readings::list).post(readings::upload))
        .route("/readings/:id", put(readings::edit).delete(readings::delete))
        .route("/api/usage-data", get(analytics::usage_data))
        .route("/analytics", get(analytics::overview))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Meter `id`, provided it belongs to `user_id`.
pub(crate) async fn owned_meter(pool: &SqlitePool, id: i64, user_id: &str) -> Result<Meter, ApiError> {
    let meter = meter_queries::get_meter(pool, id).await?;
    if !meter.is_owned_by(user_id) {
        return Err(ApiError::Forbidden(format!("meter {id} belongs to another user")));
    }
    Ok(meter)
}

/// Reading `id` with its meter, provided the meter belongs to `user_id`.
pub(crate) async fn owned_reading(pool: &SqlitePool, id: i64, user_id: &str) -> Result<(Reading, Meter), ApiError> {
    let reading = reading_queries::get_reading(pool, id).await?;
    let meter = meter_queries::get_meter(pool, reading.meter_id).await?;
    if !meter.is_owned_by(user_id) {
        return Err(ApiError::Forbidden(format!("reading {id} belongs to another user")));
    }
    Ok((reading, meter))
}
