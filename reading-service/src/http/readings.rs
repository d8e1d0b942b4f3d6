use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use reading_client::{db::reading_queries, domain::Reading};

use super::{owned_meter, owned_reading, ApiError, AppState};
use crate::{
    auth::{AuthUser, Role},
    ingest::{self, NewImage, Outcome, ReadingEdit, Upload},
    timestamp::ClientHints,
};

/// Fields shared by the upload and edit forms. Blank text fields count as absent.
#[derive(Debug, Default)]
pub(crate) struct ReadingForm {
    image: Option<NewImage>,
    meter: Option<i64>,
    notes: Option<String>,
    manual_value: Option<f64>,
    timestamp: Option<String>,
    hints: ClientHints,
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, value: Option<String>) -> Result<Option<T>, ApiError> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| ApiError::Validation(format!("{name} must be a number")))
        })
        .transpose()
}

impl ReadingForm {
    pub(crate) async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.image = Some(NewImage {
                        bytes: bytes.to_vec(),
                        file_name,
                    });
                }
                continue;
            }

            let value = non_blank(field.text().await?);
            match name.as_str() {
                "meter" => form.meter = parse_field("meter", value)?,
                "notes" => form.notes = value,
                "reading_value_manual" => form.manual_value = parse_field("reading_value_manual", value)?,
                "timestamp" => form.timestamp = value,
                "original_timestamp" => form.hints.iso_timestamp = value,
                "original_tz_offset" => form.hints.tz_offset = value,
                "original_last_modified_ms" => form.hints.last_modified_ms = value,
                other => tracing::debug!(field = other, "ignoring unknown form field"),
            }
        }
        Ok(form)
    }
}

pub async fn list(AuthUser(user): AuthUser, State(state): State<AppState>) -> Result<Json<Vec<Reading>>, ApiError> {
    user.require(Role::Viewer)?;
    Ok(Json(reading_queries::list_readings_for_user(state.pool(), &user.id).await?))
}

pub async fn upload(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Outcome>), ApiError> {
    user.require(Role::Reader)?;
    let form = ReadingForm::read(multipart).await?;

    let meter_id = form
        .meter
        .ok_or_else(|| ApiError::Validation("meter is required".into()))?;
    let image = form
        .image
        .ok_or_else(|| ApiError::Validation("image is required".into()))?;
    let meter = owned_meter(state.pool(), meter_id, &user.id).await?;

    let outcome = state
        .ingest
        .upload(
            &meter,
            Upload {
                image: image.bytes,
                file_name: image.file_name,
                path: None,
                notes: form.notes.unwrap_or_default(),
                manual_value: form.manual_value,
                hints: form.hints,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn edit(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<Outcome>, ApiError> {
    user.require(Role::Reader)?;
    let (reading, current) = owned_reading(state.pool(), id, &user.id).await?;
    let form = ReadingForm::read(multipart).await?;

    let target = match form.meter {
        Some(meter_id) if meter_id != current.id => owned_meter(state.pool(), meter_id, &user.id).await?,
        _ => current,
    };

    let outcome = state
        .ingest
        .edit(
            reading,
            &target,
            ReadingEdit {
                image: form.image,
                notes: form.notes,
                manual_value: form.manual_value,
                timestamp: form.timestamp,
                hints: form.hints,
            },
        )
        .await?;
    Ok(Json(outcome))
}

pub async fn delete(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    user.require(Role::Reader)?;
    let (_, meter) = owned_reading(state.pool(), id, &user.id).await?;

    reading_queries::delete_reading(state.pool(), id).await?;
    ingest::recompute_usage(state.pool(), &meter, state.zones()).await?;
    tracing::info!(reading_id = id, meter_id = meter.id, "reading deleted");
    Ok(StatusCode::NO_CONTENT)
}
