use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use reading_client::{
    db::{meter_queries, usage_queries},
    domain::{Meter, MeterType, NewMeter, UsageRecord, DEFAULT_COST_PER_UNIT},
};
use serde::{Deserialize, Serialize};

use super::{owned_meter, ApiError, AppState};
use crate::{
    auth::{AuthUser, Role},
    ingest,
};

#[derive(Debug, Deserialize)]
pub struct CreateMeter {
    pub name: String,
    pub meter_type: MeterType,
    pub cost_per_unit: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMeter {
    pub name: Option<String>,
    pub meter_type: Option<MeterType>,
    pub cost_per_unit: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DeletedMeter {
    pub id: i64,
    pub readings_deleted: i64,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::Validation(e.body_text()))
}

fn check_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(ApiError::Validation("meter name must be 1 to 100 characters".into()));
    }
    Ok(name.to_string())
}

fn check_rate(rate: f64) -> Result<f64, ApiError> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(rate)
    } else {
        Err(ApiError::Validation(format!("invalid cost_per_unit {rate}")))
    }
}

pub async fn list(AuthUser(user): AuthUser, State(state): State<AppState>) -> Result<Json<Vec<Meter>>, ApiError> {
    user.require(Role::Viewer)?;
    Ok(Json(meter_queries::list_meters_for_user(state.pool(), &user.id).await?))
}

pub async fn create(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CreateMeter>, JsonRejection>,
) -> Result<(StatusCode, Json<Meter>), ApiError> {
    user.require(Role::Reader)?;
    let req = body(payload)?;

    let meter = meter_queries::insert_meter(
        state.pool(),
        &NewMeter {
            name: check_name(&req.name)?,
            meter_type: req.meter_type,
            user_id: user.id.clone(),
            cost_per_unit: check_rate(req.cost_per_unit.unwrap_or(DEFAULT_COST_PER_UNIT))?,
        },
    )
    .await?;

    tracing::info!(meter_id = meter.id, user = %user.id, "meter created");
    Ok((StatusCode::CREATED, Json(meter)))
}

pub async fn update(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateMeter>, JsonRejection>,
) -> Result<Json<Meter>, ApiError> {
    user.require(Role::Reader)?;
    let mut meter = owned_meter(state.pool(), id, &user.id).await?;
    let req = body(payload)?;

    if let Some(name) = req.name.as_deref() {
        meter.name = check_name(name)?;
    }
    if let Some(meter_type) = req.meter_type {
        meter.meter_type = meter_type;
    }
    if let Some(rate) = req.cost_per_unit {
        meter.cost_per_unit = check_rate(rate)?;
    }
    if let Some(active) = req.is_active {
        meter.is_active = active;
    }

    meter_queries::update_meter(state.pool(), &meter).await?;
    ingest::recompute_usage(state.pool(), &meter, state.zones()).await?;
    Ok(Json(meter))
}

pub async fn delete(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeletedMeter>, ApiError> {
    user.require(Role::Reader)?;
    owned_meter(state.pool(), id, &user.id).await?;

    let readings_deleted = meter_queries::delete_meter(state.pool(), id).await?;
    tracing::info!(meter_id = id, readings_deleted, "meter deleted");
    Ok(Json(DeletedMeter { id, readings_deleted }))
}

pub async fn usage(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<UsageRecord>>, ApiError> {
    user.require(Role::Viewer)?;
    owned_meter(state.pool(), id, &user.id).await?;
    Ok(Json(usage_queries::usage_records_for_meter(state.pool(), id).await?))
}
