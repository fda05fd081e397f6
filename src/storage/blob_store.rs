use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::storage::BlobStore;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

/// Builds an S3 client from the storage config, honoring custom endpoints
/// and static credentials for MinIO-style deployments.
pub async fn init_s3_client(config: &StorageConfig) -> Client {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
        loader = loader
            .credentials_provider(Credentials::new(access_key, secret_key, None, None, "cove-static"));
    }

    let sdk_config = loader.load().await;
    let s3_config =
        aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style).build();

    Client::from_conf(s3_config)
}

#[derive(Clone, Debug)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl S3BlobStore {
    #[must_use]
    pub fn new(client: Client, config: &StorageConfig) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        }
    }

    fn public_url(&self, key: &str) -> String {
        self.endpoint.as_ref().map_or_else(
            || format!("https://{}.s3.{}.amazonaws.com/{key}", self.bucket, self.region),
            |endpoint| format!("{endpoint}/{}/{key}", self.bucket),
        )
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, key = %key, "S3 upload failed");
                AppError::UploadFailed(e.to_string())
            })?;

        Ok(self.public_url(key))
    }
}
