use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{DeliveryStatus, RecipientStatus};

/// Persisted per-message delivery record. One row per recipient; slots are
/// created once at send time and only ever move from NULL to a timestamp.
pub struct DeliveryLedger;

impl DeliveryLedger {
    /// Seed the ledger for a freshly created message. Runs on the caller's
    /// connection so it can share the send transaction.
    pub async fn create(
        conn: &mut PgConnection,
        message_id: Uuid,
        recipient_ids: &[Uuid],
    ) -> AppResult<()> {
        if recipient_ids.is_empty() {
            // zero recipients would make the message vacuously complete
            return Err(AppError::BadRequest("recipient set must not be empty".into()));
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM message_recipients WHERE message_id = $1)",
        )
        .bind(message_id)
        .fetch_one(&mut *conn)
        .await?;
        if exists {
            return Err(AppError::AlreadyExists("delivery ledger"));
        }

        sqlx::query(
            "INSERT INTO message_recipients (message_id, recipient_id) \
             SELECT $1, unnest($2::uuid[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(message_id)
        .bind(recipient_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn message_is_deleted(db: &PgPool, message_id: Uuid) -> AppResult<bool> {
        let row = sqlx::query("SELECT is_deleted FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound("message"))?;
        Ok(row.get("is_deleted"))
    }

    /// Record a delivery acknowledgment. Idempotent: a slot that already holds
    /// a timestamp keeps it (COALESCE), so re-acknowledgment is a no-op rather
    /// than an error. An unknown recipient is a logic error and is surfaced.
    pub async fn mark_delivered(
        db: &PgPool,
        message_id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        if Self::message_is_deleted(db, message_id).await? {
            // late ack racing deletion; the record is terminal
            tracing::debug!(%message_id, %recipient_id, "delivery ack for deleted message ignored");
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE message_recipients \
             SET delivered_at = COALESCE(delivered_at, $3) \
             WHERE message_id = $1 AND recipient_id = $2",
        )
        .bind(message_id)
        .bind(recipient_id)
        .bind(at)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("recipient"));
        }
        Ok(())
    }

    /// Record a read acknowledgment. Read-without-delivery-ack is tolerated;
    /// the two slots are independent.
    pub async fn mark_read(
        db: &PgPool,
        message_id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        if Self::message_is_deleted(db, message_id).await? {
            tracing::debug!(%message_id, %recipient_id, "read ack for deleted message ignored");
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE message_recipients \
             SET read_at = COALESCE(read_at, $3) \
             WHERE message_id = $1 AND recipient_id = $2",
        )
        .bind(message_id)
        .bind(recipient_id)
        .bind(at)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("recipient"));
        }
        Ok(())
    }

    /// True iff every recipient slot holds a delivered timestamp. Side-effect
    /// free.
    pub async fn is_fully_delivered(db: &PgPool, message_id: Uuid) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(delivered_at) AS delivered \
             FROM message_recipients WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_one(db)
        .await?;

        let total: i64 = row.get("total");
        let delivered: i64 = row.get("delivered");
        if total == 0 {
            return Err(AppError::NotFound("message"));
        }
        Ok(total == delivered)
    }

    pub async fn delivery_status(db: &PgPool, message_id: Uuid) -> AppResult<DeliveryStatus> {
        let rows = sqlx::query(
            "SELECT recipient_id, delivered_at, read_at \
             FROM message_recipients WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_all(db)
        .await?;

        if rows.is_empty() {
            return Err(AppError::NotFound("message"));
        }

        let mut delivery = DeliveryStatus::default();
        for row in rows {
            delivery.recipients.insert(
                row.get("recipient_id"),
                RecipientStatus {
                    delivered_at: row.get("delivered_at"),
                    read_at: row.get("read_at"),
                },
            );
        }
        Ok(delivery)
    }
}
