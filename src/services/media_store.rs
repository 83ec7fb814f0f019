use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use thiserror::Error;

use crate::config::S3Config;
use crate::services::upload_tracker::ProgressReporter;

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("media upload failed: {0}")]
    Upload(String),

    #[error("media delete failed: {0}")]
    Delete(String),
}

/// Opaque blob storage boundary. The lifecycle core only ever uploads and
/// deletes by reference; the store owns the bytes.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store a blob under `key` and return the reference to persist. Progress
    /// is reported as bytes-transferred over total in [0, 1].
    async fn upload(
        &self,
        bytes: Bytes,
        key: &str,
        content_type: &str,
        progress: Option<ProgressReporter>,
    ) -> Result<String, MediaStoreError>;

    /// Delete by reference. A blob that is already gone counts as success.
    async fn delete(&self, key: &str) -> Result<(), MediaStoreError>;
}

/// Uploads switch to the multipart API above this size so progress is
/// reported per part instead of all-at-once.
const MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;

pub struct S3MediaStore {
    client: Client,
    bucket: String,
}

impl S3MediaStore {
    pub async fn new(config: &S3Config) -> Self {
        use aws_sdk_s3::config::{Credentials, Region};

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        // explicit credentials when provided, default chain otherwise
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "chat_service_s3",
            ));
        }

        // custom endpoint for S3-compatible storage like MinIO
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let shared = loader.load().await;
        Self {
            client: Client::new(&shared),
            bucket: config.bucket.clone(),
        }
    }

    async fn upload_multipart(
        &self,
        bytes: Bytes,
        key: &str,
        content_type: &str,
        progress: Option<&ProgressReporter>,
    ) -> Result<(), MediaStoreError> {
        let total = bytes.len() as u64;

        let multipart = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| MediaStoreError::Upload(e.to_string()))?;
        let upload_id = multipart
            .upload_id()
            .ok_or_else(|| MediaStoreError::Upload("missing multipart upload id".into()))?
            .to_string();

        let mut completed_parts = Vec::new();
        let mut transferred: u64 = 0;
        for (index, chunk) in bytes.chunks(MULTIPART_PART_SIZE).enumerate() {
            let part_number = (index + 1) as i32;
            let part = match self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await
            {
                Ok(part) => part,
                Err(e) => {
                    let _ = self
                        .client
                        .abort_multipart_upload()
                        .bucket(&self.bucket)
                        .key(key)
                        .upload_id(&upload_id)
                        .send()
                        .await;
                    return Err(MediaStoreError::Upload(e.to_string()));
                }
            };
            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(part.e_tag().map(str::to_string))
                    .build(),
            );
            transferred += chunk.len() as u64;
            if let Some(reporter) = progress {
                reporter.report(transferred, total);
            }
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| MediaStoreError::Upload(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn upload(
        &self,
        bytes: Bytes,
        key: &str,
        content_type: &str,
        progress: Option<ProgressReporter>,
    ) -> Result<String, MediaStoreError> {
        let total = bytes.len() as u64;

        if bytes.len() <= MULTIPART_PART_SIZE {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(bytes))
                .send()
                .await
                .map_err(|e| MediaStoreError::Upload(e.to_string()))?;
            if let Some(reporter) = &progress {
                reporter.report(total, total);
            }
        } else {
            self.upload_multipart(bytes, key, content_type, progress.as_ref())
                .await?;
        }

        tracing::debug!(media_key = %key, bytes = total, "media uploaded");
        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> Result<(), MediaStoreError> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                // already-gone counts as success
                if message.contains("NoSuchKey")
                    || message.contains("NotFound")
                    || message.contains("404")
                {
                    Ok(())
                } else {
                    Err(MediaStoreError::Delete(message))
                }
            }
        }
    }
}

/// Stand-in used when no blob storage is configured (and in tests): uploads
/// are refused, deletes are no-ops so message cleanup still proceeds.
pub struct NullMediaStore;

#[async_trait]
impl MediaStore for NullMediaStore {
    async fn upload(
        &self,
        _bytes: Bytes,
        _key: &str,
        _content_type: &str,
        _progress: Option<ProgressReporter>,
    ) -> Result<String, MediaStoreError> {
        Err(MediaStoreError::Upload("no media store configured".into()))
    }

    async fn delete(&self, key: &str) -> Result<(), MediaStoreError> {
        tracing::debug!(media_key = %key, "media store disabled; skipping delete");
        Ok(())
    }
}
