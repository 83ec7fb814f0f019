use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::metrics;
use crate::state::AppState;

pub mod messages;
pub mod receipts;
pub mod uploads;

use messages::{get_message, send_message};
use receipts::{acknowledge_delivery, acknowledge_read};
use uploads::{
    acknowledge_upload, cancel_upload, complete_upload, fail_upload, get_upload, start_upload,
    update_progress, upload_events, upload_media,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/chats/:chat_id/messages", post(send_message))
        .route(
            "/api/v1/chats/:chat_id/messages/:message_id",
            get(get_message),
        )
        .route(
            "/api/v1/chats/:chat_id/messages/:message_id/delivered",
            post(acknowledge_delivery),
        )
        .route(
            "/api/v1/chats/:chat_id/messages/:message_id/read",
            post(acknowledge_read),
        )
        .route("/api/v1/chats/:chat_id/media", post(upload_media))
        .route("/api/v1/uploads", post(start_upload))
        .route(
            "/api/v1/uploads/:upload_id",
            get(get_upload).delete(acknowledge_upload),
        )
        .route("/api/v1/uploads/:upload_id/events", get(upload_events))
        .route("/api/v1/uploads/:upload_id/progress", put(update_progress))
        .route("/api/v1/uploads/:upload_id/complete", post(complete_upload))
        .route("/api/v1/uploads/:upload_id/fail", post(fail_upload))
        .route("/api/v1/uploads/:upload_id/cancel", post(cancel_upload))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(middleware::from_fn(metrics::track_http_metrics))
        .with_state(state)
}
