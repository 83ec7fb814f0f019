use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::ledger::DeliveryLedger;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AckOutcome {
    pub fully_delivered: bool,
    pub deletion_scheduled: bool,
}

pub struct CompletionDetector;

impl CompletionDetector {
    /// Runs synchronously after every delivery acknowledgment: record the ack,
    /// re-read the ledger, and when the last recipient has confirmed, queue
    /// the grace-delayed deletion. Duplicate detections collapse inside the
    /// scheduler, so at most one job is pending per message.
    pub async fn on_delivery_ack(
        state: &AppState,
        message_id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<AckOutcome> {
        DeliveryLedger::mark_delivered(&state.db, message_id, recipient_id, at).await?;

        let fully_delivered = DeliveryLedger::is_fully_delivered(&state.db, message_id).await?;
        let mut deletion_scheduled = false;
        if fully_delivered {
            deletion_scheduled = state.scheduler.schedule(message_id);
            if deletion_scheduled {
                tracing::info!(
                    %message_id,
                    grace_secs = state.config.deletion_grace.as_secs(),
                    "all recipients confirmed delivery; deletion scheduled"
                );
            }
        }

        Ok(AckOutcome {
            fully_delivered,
            deletion_scheduled,
        })
    }
}
