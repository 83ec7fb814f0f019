use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    InProgress,
    Completed,
    Failed,
}

/// Snapshot of one in-flight blob transfer. Lives in memory only; the task is
/// destroyed once the owning caller acknowledges completion or failure.
#[derive(Debug, Clone, Serialize)]
pub struct UploadTask {
    pub upload_id: Uuid,
    pub progress: f32,
    pub status: UploadStatus,
    pub error: Option<String>,
}

impl UploadTask {
    pub fn new(upload_id: Uuid) -> Self {
        Self {
            upload_id,
            progress: 0.0,
            status: UploadStatus::InProgress,
            error: None,
        }
    }
}
