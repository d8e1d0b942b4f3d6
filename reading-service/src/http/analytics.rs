use std::collections::BTreeMap;

use axum::{extract::State, Json};
use reading_client::db::{meter_queries, reading_queries};
use time::{Duration, OffsetDateTime};

use super::{ApiError, AppState};
use crate::{
    auth::{AuthUser, Role},
    usage::{self, MeterAnalytics, UsagePoint},
};

const USAGE_WINDOW: Duration = Duration::days(30);

/// Chart data of the last 30 days, keyed by meter name.
pub async fn usage_data(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Vec<UsagePoint>>>, ApiError> {
    user.require(Role::Viewer)?;
    let since = OffsetDateTime::now_utc() - USAGE_WINDOW;

    let mut data = BTreeMap::new();
    for meter in meter_queries::list_meters_for_user(state.pool(), &user.id).await? {
        let readings = reading_queries::list_processed_readings(state.pool(), meter.id, Some(since)).await?;
        data.insert(meter.name, usage::usage_series(&readings, state.zones()));
    }
    Ok(Json(data))
}

/// Per-meter analytics keyed by meter name. Meters with fewer than two
/// processed readings are left out.
pub async fn overview(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, MeterAnalytics>>, ApiError> {
    user.require(Role::Viewer)?;

    let mut data = BTreeMap::new();
    for meter in meter_queries::list_meters_for_user(state.pool(), &user.id).await? {
        let readings = reading_queries::list_processed_readings(state.pool(), meter.id, None).await?;
        if let Some(analytics) = usage::meter_analytics(&readings, meter.cost_per_unit, state.zones()) {
            data.insert(meter.name, analytics);
        }
    }
    Ok(Json(data))
}
