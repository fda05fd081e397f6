use crate::config::StorageConfig;
use crate::domain::{AttachmentRef, MediaKind};
use crate::error::{AppError, Result};
use crate::storage::BlobStore;
use bytes::Bytes;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    uploaded_bytes: Counter<u64>,
    upload_size_bytes: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("cove-messaging");
        Self {
            uploaded_bytes: meter
                .u64_counter("cove_attachments_uploaded_bytes")
                .with_description("Total bytes of attachments uploaded")
                .build(),
            upload_size_bytes: meter
                .u64_histogram("cove_attachments_upload_size_bytes")
                .with_description("Distribution of attachment upload sizes")
                .build(),
        }
    }
}

/// Uploads message attachments to the blob store and hands back a public
/// reference plus a coarse media kind.
#[derive(Clone)]
pub struct AttachmentService {
    store: Arc<dyn BlobStore>,
    max_size_bytes: usize,
    metrics: Metrics,
}

impl AttachmentService {
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, config: &StorageConfig) -> Self {
        Self { store, max_size_bytes: config.attachment_max_size_bytes, metrics: Metrics::new() }
    }

    /// Uploads one attachment.
    ///
    /// # Errors
    /// Returns `AppError::UploadTooLarge` when the payload exceeds the
    /// configured cap; the check runs before any network call. Returns
    /// `AppError::UploadFailed` when the blob store rejects the object.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, bytes),
        fields(actor = %actor_id, conversation = %conversation_id, size = bytes.len())
    )]
    pub async fn upload(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        filename: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<AttachmentRef> {
        let size = bytes.len();
        if size > self.max_size_bytes {
            return Err(AppError::UploadTooLarge { size, limit: self.max_size_bytes });
        }

        let kind = MediaKind::from_mime(content_type);
        let key = storage_key(actor_id, conversation_id, filename);
        let url = self.store.put(&key, content_type, bytes).await?;

        self.metrics.uploaded_bytes.add(size as u64, &[]);
        self.metrics.upload_size_bytes.record(size as u64, &[]);
        tracing::debug!(key = %key, kind = kind.as_str(), "Attachment uploaded");

        Ok(AttachmentRef { url, kind })
    }
}

impl std::fmt::Debug for AttachmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentService").field("max_size_bytes", &self.max_size_bytes).finish_non_exhaustive()
    }
}

/// Key convention: `{actor_id}/{conversation_id}/{timestamp}-{random}.{ext}`.
fn storage_key(actor_id: Uuid, conversation_id: Uuid, filename: &str) -> String {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("bin");
    let timestamp = OffsetDateTime::now_utc().unix_timestamp();
    let random: String =
        rand::thread_rng().sample_iter(&Alphanumeric).take(8).map(char::from).collect();

    format!("{actor_id}/{conversation_id}/{timestamp}-{random}.{ext}")
}
