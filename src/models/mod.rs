pub mod message;
pub mod upload;

pub use message::{DeletionReason, DeliveryStatus, Message, RecipientStatus};
pub use upload::{UploadStatus, UploadTask};
