use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::completion::{AckOutcome, CompletionDetector};
use crate::services::ledger::DeliveryLedger;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReceiptRequest {
    pub recipient_id: Uuid,
    /// Client-observed timestamp; defaults to the server clock.
    pub at: Option<DateTime<Utc>>,
}

pub async fn acknowledge_delivery(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ReceiptRequest>,
) -> Result<Json<AckOutcome>, AppError> {
    ensure_message_in_chat(&state.db, chat_id, message_id).await?;
    let at = body.at.unwrap_or_else(Utc::now);
    let outcome =
        CompletionDetector::on_delivery_ack(&state, message_id, body.recipient_id, at).await?;
    Ok(Json(outcome))
}

pub async fn acknowledge_read(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ReceiptRequest>,
) -> Result<StatusCode, AppError> {
    ensure_message_in_chat(&state.db, chat_id, message_id).await?;
    let at = body.at.unwrap_or_else(Utc::now);
    DeliveryLedger::mark_read(&state.db, message_id, body.recipient_id, at).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_message_in_chat(
    db: &PgPool,
    chat_id: Uuid,
    message_id: Uuid,
) -> Result<(), AppError> {
    let row = sqlx::query("SELECT chat_id FROM messages WHERE id = $1")
        .bind(message_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("message"))?;
    if row.get::<Uuid, _>("chat_id") != chat_id {
        return Err(AppError::NotFound("message"));
    }
    Ok(())
}
