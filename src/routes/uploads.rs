use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::sse::{Event, Sse},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::UploadTask;
use crate::services::upload_tracker::ProgressReporter;
use crate::state::AppState;

pub async fn start_upload(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<UploadTask>), AppError> {
    let upload_id = Uuid::new_v4();
    state.uploads.start_tracking(upload_id)?;
    let task = state.uploads.snapshot(upload_id)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
) -> Result<Json<UploadTask>, AppError> {
    Ok(Json(state.uploads.snapshot(upload_id)?))
}

#[derive(Deserialize)]
pub struct ProgressUpdateRequest {
    pub progress: f32,
}

pub async fn update_progress(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
    Json(body): Json<ProgressUpdateRequest>,
) -> Result<StatusCode, AppError> {
    if !body.progress.is_finite() || !(0.0..=1.0).contains(&body.progress) {
        return Err(AppError::BadRequest("progress must be within [0, 1]".into()));
    }
    state.uploads.update_progress(upload_id, body.progress)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn complete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.uploads.mark_completed(upload_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct FailUploadRequest {
    pub error: String,
}

pub async fn fail_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
    Json(body): Json<FailUploadRequest>,
) -> Result<StatusCode, AppError> {
    state.uploads.mark_failed(upload_id, body.error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.uploads.cancel(upload_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn acknowledge_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
) -> Result<Json<UploadTask>, AppError> {
    Ok(Json(state.uploads.acknowledge(upload_id)?))
}

/// Server-sent progress events. Finite: the connection closes after the
/// terminal event. The underlying stream is single-consumption, so a second
/// subscriber gets a 400 rather than a restarted stream.
pub async fn upload_events(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let events = state
        .uploads
        .get_stream(upload_id)?
        .map(|event| Event::default().json_data(&event));
    Ok(Sse::new(events))
}

#[derive(Serialize)]
pub struct MediaUploadResponse {
    pub upload_id: Uuid,
    pub media_key: String,
}

/// Server-side media push: the blob lands in the store under an opaque key
/// while byte-level progress is visible through the upload-progress API.
pub async fn upload_media(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<MediaUploadResponse>), AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("empty media payload".into()));
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let upload_id = Uuid::new_v4();
    state.uploads.start_tracking(upload_id)?;
    let key = format!("media/{chat_id}/{upload_id}");
    let reporter = ProgressReporter::new(state.uploads.clone(), upload_id);

    match state
        .media
        .upload(body, &key, &content_type, Some(reporter))
        .await
    {
        Ok(media_key) => {
            let _ = state.uploads.mark_completed(upload_id);
            Ok((
                StatusCode::CREATED,
                Json(MediaUploadResponse {
                    upload_id,
                    media_key,
                }),
            ))
        }
        Err(e) => {
            let _ = state.uploads.mark_failed(upload_id, e.to_string());
            Err(AppError::MediaStore(e.to_string()))
        }
    }
}
