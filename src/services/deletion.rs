use std::sync::Arc;

use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::DeletionReason;
use crate::services::media_store::MediaStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyDeleted,
}

/// The single removal path shared by the grace-delay job and the expiry
/// sweeper. Idempotence here is what makes the two triggers safe to race
/// against each other and against retries, without a distributed lock.
pub struct DeletionCoordinator;

impl DeletionCoordinator {
    pub async fn delete(
        db: &PgPool,
        media: &Arc<dyn MediaStore>,
        message_id: Uuid,
        reason: DeletionReason,
    ) -> AppResult<DeleteOutcome> {
        let row = sqlx::query("SELECT is_deleted, media_key FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound("message"))?;

        if row.get::<bool, _>("is_deleted") {
            return Ok(DeleteOutcome::AlreadyDeleted);
        }

        if let Some(media_key) = row.get::<Option<String>, _>("media_key") {
            // A stuck blob costs storage and shows up in metrics; a message
            // that can never be cleaned up costs availability. The tombstone
            // always proceeds.
            if let Err(e) = media.delete(&media_key).await {
                metrics::record_media_delete_failure();
                tracing::warn!(
                    %message_id,
                    media_key = %media_key,
                    error = %e,
                    "media delete failed; leaving blob behind"
                );
            }
        }

        // Single atomic write: tombstone flag, deletion metadata, and payload
        // clearing land together. The is_deleted guard makes concurrent
        // callers converge on whoever wrote first.
        let result = sqlx::query(
            "UPDATE messages \
             SET is_deleted = TRUE, deleted_at = $2, deletion_reason = $3, \
                 body = NULL, media_key = NULL \
             WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(message_id)
        .bind(Utc::now())
        .bind(reason.as_str())
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(DeleteOutcome::AlreadyDeleted);
        }

        metrics::record_message_deleted(reason.as_str());
        tracing::info!(%message_id, %reason, "message deleted");
        Ok(DeleteOutcome::Deleted)
    }
}
