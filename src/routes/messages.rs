use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{DeletionReason, DeliveryStatus, Message};
use crate::services::{ledger::DeliveryLedger, notifier};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub sender_id: Uuid,
    pub body: Option<String>,
    pub media_key: Option<String>,
    /// Recipient set of the chat at send time, resolved by the caller.
    pub recipient_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub id: Uuid,
    pub expires_at: DateTime<Utc>,
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), AppError> {
    if body.recipient_ids.is_empty() {
        return Err(AppError::BadRequest("recipient_ids must not be empty".into()));
    }
    if body.body.as_deref().map_or(true, str::is_empty) && body.media_key.is_none() {
        return Err(AppError::BadRequest("message must carry text or media".into()));
    }

    let mut seen = HashSet::new();
    let recipients: Vec<Uuid> = body
        .recipient_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect();

    let id = Uuid::new_v4();
    let created_at = Utc::now();
    let expires_at = created_at + state.config.message_ttl;

    let mut tx = state.db.begin().await?;
    sqlx::query(
        "INSERT INTO messages (id, chat_id, sender_id, body, media_key, created_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(chat_id)
    .bind(body.sender_id)
    .bind(&body.body)
    .bind(&body.media_key)
    .bind(created_at)
    .bind(expires_at)
    .execute(&mut *tx)
    .await?;
    DeliveryLedger::create(&mut *tx, id, &recipients).await?;
    tx.commit().await?;

    // fire-and-forget; a dispatch failure never rolls back the send
    notifier::dispatch_message_created(state.notifier.clone(), chat_id, id, recipients);

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse { id, expires_at }),
    ))
}

#[derive(Serialize)]
pub struct MessageResponse {
    #[serde(flatten)]
    pub message: Message,
    pub delivery: DeliveryStatus,
}

pub async fn get_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MessageResponse>, AppError> {
    let row = sqlx::query(
        "SELECT id, chat_id, sender_id, body, media_key, created_at, expires_at, \
                is_deleted, deleted_at, deletion_reason \
         FROM messages WHERE id = $1 AND chat_id = $2",
    )
    .bind(message_id)
    .bind(chat_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("message"))?;

    let message = message_from_row(&row);
    let delivery = DeliveryLedger::delivery_status(&state.db, message_id).await?;
    Ok(Json(MessageResponse { message, delivery }))
}

fn message_from_row(row: &PgRow) -> Message {
    Message {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        sender_id: row.get("sender_id"),
        body: row.get("body"),
        media_key: row.get("media_key"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        is_deleted: row.get("is_deleted"),
        deleted_at: row.get("deleted_at"),
        deletion_reason: row
            .get::<Option<String>, _>("deletion_reason")
            .and_then(|value| DeletionReason::parse(&value)),
    }
}
