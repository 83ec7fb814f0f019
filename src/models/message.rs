use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a message reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    AllRecipientsReceived,
    Expired,
}

impl DeletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionReason::AllRecipientsReceived => "all_recipients_received",
            DeletionReason::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all_recipients_received" => Some(DeletionReason::AllRecipientsReceived),
            "expired" => Some(DeletionReason::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for DeletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message addressed by (chat_id, id). Payload columns (`body`, `media_key`)
/// are cleared in the same write that sets the tombstone; a deleted record is
/// terminal apart from its deletion metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub body: Option<String>,
    pub media_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deletion_reason: Option<DeletionReason>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RecipientStatus {
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Per-recipient delivery state for one message. The recipient set is fixed at
/// send time; slots only ever move from empty to a timestamp.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryStatus {
    pub recipients: HashMap<Uuid, RecipientStatus>,
}

impl DeliveryStatus {
    pub fn is_fully_delivered(&self) -> bool {
        !self.recipients.is_empty()
            && self
                .recipients
                .values()
                .all(|status| status.delivered_at.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(delivered: bool) -> RecipientStatus {
        RecipientStatus {
            delivered_at: delivered.then(Utc::now),
            read_at: None,
        }
    }

    #[test]
    fn fully_delivered_requires_every_slot() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let mut delivery = DeliveryStatus::default();
        assert!(!delivery.is_fully_delivered(), "empty set is never complete");

        delivery.recipients.insert(a, status(true));
        delivery.recipients.insert(b, status(false));
        assert!(!delivery.is_fully_delivered());

        delivery.recipients.insert(b, status(true));
        assert!(delivery.is_fully_delivered());
    }

    #[test]
    fn read_does_not_imply_delivered() {
        let mut delivery = DeliveryStatus::default();
        delivery.recipients.insert(
            Uuid::new_v4(),
            RecipientStatus {
                delivered_at: None,
                read_at: Some(Utc::now()),
            },
        );
        assert!(!delivery.is_fully_delivered());
    }

    #[test]
    fn deletion_reason_round_trips_as_snake_case() {
        for reason in [DeletionReason::AllRecipientsReceived, DeletionReason::Expired] {
            assert_eq!(DeletionReason::parse(reason.as_str()), Some(reason));
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
        assert_eq!(DeletionReason::parse("recalled"), None);
    }
}
