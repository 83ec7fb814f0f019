use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    config::Config,
    services::{
        media_store::MediaStore, notifier::Notifier, scheduler::DeletionScheduler,
        upload_tracker::UploadTracker,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub media: Arc<dyn MediaStore>,
    pub scheduler: DeletionScheduler,
    pub uploads: Arc<UploadTracker>,
    pub notifier: Arc<dyn Notifier>,
}
