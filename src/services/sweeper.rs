use std::sync::Arc;
use std::time::Duration;

use sqlx::{PgPool, Row};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::metrics;
use crate::models::DeletionReason;
use crate::services::deletion::{DeleteOutcome, DeletionCoordinator};
use crate::services::media_store::MediaStore;

#[derive(Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub batch_size: i64,
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            batch_size: 200,
            retry_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl SweeperConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.sweep_interval,
            batch_size: config.sweep_batch_size,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub deleted: u64,
    pub already_deleted: u64,
    pub failed: u64,
}

/// Spawn the periodic expiry sweep. Runs until aborted; cycle-level store
/// failures back off exponentially, per-message failures are contained inside
/// the cycle.
pub fn spawn_expiry_sweeper(
    db: PgPool,
    media: Arc<dyn MediaStore>,
    config: SweeperConfig,
) -> JoinHandle<()> {
    tracing::info!(
        interval_secs = config.interval.as_secs(),
        batch_size = config.batch_size,
        "starting expiry sweeper"
    );

    tokio::spawn(async move {
        let mut consecutive_failures: u32 = 0;
        loop {
            match sweep_cycle(&db, &media, config.batch_size).await {
                Ok(stats) => {
                    consecutive_failures = 0;
                    metrics::record_sweep_run("success");
                    if stats.deleted > 0 || stats.failed > 0 {
                        tracing::info!(
                            deleted = stats.deleted,
                            already_deleted = stats.already_deleted,
                            failed = stats.failed,
                            "expiry sweep finished"
                        );
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    metrics::record_sweep_run("error");
                    let backoff =
                        calculate_backoff(config.retry_backoff, config.max_backoff, consecutive_failures);
                    tracing::error!(
                        error = %e,
                        consecutive_failures,
                        backoff_secs = backoff.as_secs(),
                        "expiry sweep cycle failed"
                    );
                    sleep(backoff).await;
                }
            }
            sleep(config.interval).await;
        }
    })
}

/// One pass over expired, still-live messages. Every message is handled
/// independently: one failure is logged and skipped, never aborting the rest
/// of the sweep. At-least-once overall; re-discovered messages no-op in the
/// coordinator.
pub async fn sweep_cycle(
    db: &PgPool,
    media: &Arc<dyn MediaStore>,
    batch_size: i64,
) -> Result<SweepStats, AppError> {
    let mut stats = SweepStats::default();
    // failed ids are excluded for the rest of the cycle: logged and skipped,
    // retried on the next tick rather than inside this one
    let mut failed_ids: Vec<Uuid> = Vec::new();
    loop {
        let rows = sqlx::query(
            "SELECT id FROM messages \
             WHERE expires_at < NOW() AND is_deleted = FALSE AND NOT (id = ANY($2)) \
             ORDER BY expires_at \
             LIMIT $1",
        )
        .bind(batch_size)
        .bind(&failed_ids)
        .fetch_all(db)
        .await?;

        if rows.is_empty() {
            break;
        }
        let full_batch = rows.len() as i64 == batch_size;

        for row in rows {
            let message_id: Uuid = row.get("id");
            match DeletionCoordinator::delete(db, media, message_id, DeletionReason::Expired).await
            {
                Ok(DeleteOutcome::Deleted) => stats.deleted += 1,
                Ok(DeleteOutcome::AlreadyDeleted) => stats.already_deleted += 1,
                Err(e) => {
                    failed_ids.push(message_id);
                    stats.failed += 1;
                    tracing::warn!(
                        %message_id,
                        error = %e,
                        "failed to expire message; will retry next cycle"
                    );
                }
            }
        }

        if !full_batch {
            break;
        }
    }
    Ok(stats)
}

fn calculate_backoff(base: Duration, max: Duration, failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        assert_eq!(calculate_backoff(base, max, 1), Duration::from_secs(5));
        assert_eq!(calculate_backoff(base, max, 2), Duration::from_secs(10));
        assert_eq!(calculate_backoff(base, max, 4), Duration::from_secs(40));
        assert_eq!(calculate_backoff(base, max, 10), max);
        assert_eq!(calculate_backoff(base, max, 60), max, "shift is clamped");
    }
}
