use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{UploadStatus, UploadTask};

/// Error string used when a transfer is cancelled by its owner, so callers
/// can tell cancellation apart from a network fault.
pub const CANCELLED_ERROR: &str = "upload cancelled";

/// Event emitted on an upload's progress stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum UploadEvent {
    Progress { fraction: f32 },
    Completed,
    Failed { error: String },
}

struct TrackedUpload {
    task: UploadTask,
    // dropped on the terminal transition, which ends the stream
    events: Option<mpsc::Sender<UploadEvent>>,
    // taken by the first get_stream call; the stream is not restartable
    stream: Option<mpsc::Receiver<UploadEvent>>,
}

/// In-process registry of in-flight blob transfers. Tasks are created by the
/// caller that owns the transfer and destroyed when that caller acknowledges
/// the terminal state.
#[derive(Default)]
pub struct UploadTracker {
    uploads: DashMap<Uuid, TrackedUpload>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_tracking(&self, upload_id: Uuid) -> AppResult<()> {
        match self.uploads.entry(upload_id) {
            Entry::Occupied(_) => Err(AppError::AlreadyExists("upload task")),
            Entry::Vacant(slot) => {
                let (events, stream) = mpsc::channel(32);
                slot.insert(TrackedUpload {
                    task: UploadTask::new(upload_id),
                    events: Some(events),
                    stream: Some(stream),
                });
                Ok(())
            }
        }
    }

    pub fn update_progress(&self, upload_id: Uuid, fraction: f32) -> AppResult<()> {
        let mut entry = self
            .uploads
            .get_mut(&upload_id)
            .ok_or(AppError::NotFound("upload task"))?;
        if entry.task.status != UploadStatus::InProgress {
            // terminal tasks keep their final state
            return Ok(());
        }
        let fraction = fraction.clamp(0.0, 1.0);
        entry.task.progress = fraction;
        if let Some(events) = &entry.events {
            // progress is lossy under backpressure; the terminal event is not
            let _ = events.try_send(UploadEvent::Progress { fraction });
        }
        Ok(())
    }

    pub fn mark_completed(&self, upload_id: Uuid) -> AppResult<()> {
        self.finish(upload_id, UploadStatus::Completed, None)
    }

    pub fn mark_failed(&self, upload_id: Uuid, error: impl Into<String>) -> AppResult<()> {
        self.finish(upload_id, UploadStatus::Failed, Some(error.into()))
    }

    /// Cancellation is a failure with a dedicated error, distinct from a
    /// network fault, and it releases the progress stream.
    pub fn cancel(&self, upload_id: Uuid) -> AppResult<()> {
        self.finish(upload_id, UploadStatus::Failed, Some(CANCELLED_ERROR.to_string()))
    }

    fn finish(
        &self,
        upload_id: Uuid,
        status: UploadStatus,
        error: Option<String>,
    ) -> AppResult<()> {
        let mut entry = self
            .uploads
            .get_mut(&upload_id)
            .ok_or(AppError::NotFound("upload task"))?;
        if entry.task.status != UploadStatus::InProgress {
            return Ok(());
        }
        entry.task.status = status;
        if status == UploadStatus::Completed {
            entry.task.progress = 1.0;
        }
        entry.task.error = error.clone();
        if let Some(events) = entry.events.take() {
            let terminal = match status {
                UploadStatus::Completed => UploadEvent::Completed,
                _ => UploadEvent::Failed {
                    error: error.unwrap_or_default(),
                },
            };
            let _ = events.try_send(terminal);
            // sender dropped here; the stream terminates after the buffered events
        }
        Ok(())
    }

    pub fn snapshot(&self, upload_id: Uuid) -> AppResult<UploadTask> {
        self.uploads
            .get(&upload_id)
            .map(|entry| entry.task.clone())
            .ok_or(AppError::NotFound("upload task"))
    }

    /// Lazy, finite sequence of progress values, terminating on completion or
    /// failure. Single-consumption: a second call fails instead of restarting.
    pub fn get_stream(&self, upload_id: Uuid) -> AppResult<ReceiverStream<UploadEvent>> {
        let mut entry = self
            .uploads
            .get_mut(&upload_id)
            .ok_or(AppError::NotFound("upload task"))?;
        let receiver = entry
            .stream
            .take()
            .ok_or_else(|| AppError::BadRequest("progress stream already consumed".into()))?;
        Ok(ReceiverStream::new(receiver))
    }

    /// Destroy a terminal task (the owner's completion/failure
    /// acknowledgment). Refuses while the transfer is still running.
    pub fn acknowledge(&self, upload_id: Uuid) -> AppResult<UploadTask> {
        {
            let entry = self
                .uploads
                .get(&upload_id)
                .ok_or(AppError::NotFound("upload task"))?;
            if entry.task.status == UploadStatus::InProgress {
                return Err(AppError::BadRequest("upload still in progress".into()));
            }
        }
        let (_, tracked) = self
            .uploads
            .remove(&upload_id)
            .ok_or(AppError::NotFound("upload task"))?;
        Ok(tracked.task)
    }
}

/// Handle a transfer passes to the media store so byte-level progress lands
/// in the tracker.
#[derive(Clone)]
pub struct ProgressReporter {
    tracker: Arc<UploadTracker>,
    upload_id: Uuid,
}

impl ProgressReporter {
    pub fn new(tracker: Arc<UploadTracker>, upload_id: Uuid) -> Self {
        Self { tracker, upload_id }
    }

    pub fn report(&self, transferred: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            transferred as f32 / total as f32
        };
        let _ = self.tracker.update_progress(self.upload_id, fraction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn progress_flows_through_to_snapshot() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();

        tracker.start_tracking(id).unwrap();
        assert!(matches!(
            tracker.start_tracking(id),
            Err(AppError::AlreadyExists(_))
        ));

        tracker.update_progress(id, 0.4).unwrap();
        let task = tracker.snapshot(id).unwrap();
        assert_eq!(task.status, UploadStatus::InProgress);
        assert!((task.progress - 0.4).abs() < f32::EPSILON);

        tracker.update_progress(id, 7.0).unwrap();
        assert!((tracker.snapshot(id).unwrap().progress - 1.0).abs() < f32::EPSILON);

        tracker.mark_completed(id).unwrap();
        let task = tracker.snapshot(id).unwrap();
        assert_eq!(task.status, UploadStatus::Completed);
        assert_eq!(task.error, None);
    }

    #[tokio::test]
    async fn unknown_upload_is_surfaced() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            tracker.update_progress(id, 0.5),
            Err(AppError::NotFound("upload task"))
        ));
        assert!(matches!(
            tracker.snapshot(id),
            Err(AppError::NotFound("upload task"))
        ));
    }

    #[tokio::test]
    async fn stream_terminates_on_completion() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        tracker.start_tracking(id).unwrap();
        let mut stream = tracker.get_stream(id).unwrap();

        tracker.update_progress(id, 0.5).unwrap();
        tracker.mark_completed(id).unwrap();

        assert_eq!(
            stream.next().await,
            Some(UploadEvent::Progress { fraction: 0.5 })
        );
        assert_eq!(stream.next().await, Some(UploadEvent::Completed));
        assert_eq!(stream.next().await, None, "stream is finite");
    }

    #[tokio::test]
    async fn stream_is_single_consumption() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        tracker.start_tracking(id).unwrap();
        let _stream = tracker.get_stream(id).unwrap();
        assert!(matches!(
            tracker.get_stream(id),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn cancellation_is_distinguishable_from_failure() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        tracker.start_tracking(id).unwrap();
        let mut stream = tracker.get_stream(id).unwrap();

        tracker.cancel(id).unwrap();
        let task = tracker.snapshot(id).unwrap();
        assert_eq!(task.status, UploadStatus::Failed);
        assert_eq!(task.error.as_deref(), Some(CANCELLED_ERROR));

        assert_eq!(
            stream.next().await,
            Some(UploadEvent::Failed {
                error: CANCELLED_ERROR.to_string()
            })
        );
        assert_eq!(stream.next().await, None);

        // terminal state is sticky; later updates and completions are no-ops
        tracker.update_progress(id, 0.9).unwrap();
        tracker.mark_completed(id).unwrap();
        let task = tracker.snapshot(id).unwrap();
        assert_eq!(task.status, UploadStatus::Failed);
        assert_eq!(task.error.as_deref(), Some(CANCELLED_ERROR));
    }

    #[tokio::test]
    async fn acknowledge_destroys_terminal_tasks_only() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        tracker.start_tracking(id).unwrap();

        assert!(matches!(
            tracker.acknowledge(id),
            Err(AppError::BadRequest(_))
        ));

        tracker.mark_failed(id, "connection reset").unwrap();
        let task = tracker.acknowledge(id).unwrap();
        assert_eq!(task.status, UploadStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("connection reset"));

        assert!(matches!(
            tracker.snapshot(id),
            Err(AppError::NotFound("upload task"))
        ));
    }
}
