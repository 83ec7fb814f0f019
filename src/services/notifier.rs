use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

/// Push/notification boundary. The lifecycle core calls it fire-and-forget
/// after a successful send; a dispatch failure never rolls back the send.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn message_created(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        recipient_ids: &[Uuid],
    ) -> Result<(), NotifyError>;
}

/// Default dispatcher: structured log only. Real transports (APNs, FCM) hang
/// off the same trait.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn message_created(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        recipient_ids: &[Uuid],
    ) -> Result<(), NotifyError> {
        tracing::debug!(
            %chat_id,
            %message_id,
            recipients = recipient_ids.len(),
            "message-created notification dispatched"
        );
        Ok(())
    }
}

pub fn dispatch_message_created(
    notifier: Arc<dyn Notifier>,
    chat_id: Uuid,
    message_id: Uuid,
    recipient_ids: Vec<Uuid>,
) {
    tokio::spawn(async move {
        if let Err(e) = notifier
            .message_created(chat_id, message_id, &recipient_ids)
            .await
        {
            tracing::warn!(%message_id, error = %e, "notification dispatch failed");
        }
    });
}
