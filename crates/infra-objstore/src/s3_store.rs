// S3-compatible object store (MinIO)
// reason: aws-sdk-s3 with path-style addressing and static credentials
use async_trait::async_trait;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use proctor_core::port::{ObjectStore, StoreError};

const CREDENTIALS_PROVIDER: &str = "proctor-static";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// e.g. `http://localhost:9000`; the scheme selects TLS
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// MinIO needs `true`
    pub force_path_style: bool,
}

impl StoreConfig {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: DEFAULT_REGION.to_string(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            force_path_style: true,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

/// `ObjectStore` over the S3 PutObject API
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client for `config`
    ///
    /// No request is made here; an unreachable endpoint surfaces on the
    /// first `put`.
    pub async fn connect(config: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let sdk_config = aws_config::from_env()
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = S3ConfigBuilder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        info!(
            endpoint = %config.endpoint,
            region = %config.region,
            path_style = config.force_path_style,
            "S3 object store configured"
        );

        Self::from_client(Client::from_conf(s3_config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let bytes = body.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StoreError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(bucket = %bucket, key = %key, bytes = bytes, "PutObject succeeded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults_to_path_style() {
        let config = StoreConfig::new("http://localhost:9000", "minio", "minio123");
        assert!(config.force_path_style);
        assert_eq!(config.region, DEFAULT_REGION);

        let config = config.with_region("eu-west-1");
        assert_eq!(config.region, "eu-west-1");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_put_error() {
        // Port 1 on loopback refuses connections
        let config = StoreConfig::new("http://127.0.0.1:1", "minio", "minio123");
        let store = S3ObjectStore::connect(&config).await;

        let result = store
            .put("logs", "log", b"{}".to_vec(), "application/json")
            .await;
        match result {
            Err(StoreError::Put { bucket, key, .. }) => {
                assert_eq!(bucket, "logs");
                assert_eq!(key, "log");
            }
            other => panic!("expected put error, got {:?}", other),
        }
    }
}
