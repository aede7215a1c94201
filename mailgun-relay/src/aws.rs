//! AWS clients behind the dispatch traits.
//!
//! SNS backs [`TopicPublisher`] and S3 backs [`ObjectStore`]. Clients are
//! built once at startup and shared by every request; the SDK clients are
//! cheap to clone and safe to use concurrently.

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::dispatch::{ObjectStore, TopicPublisher};
use crate::error::BackendError;

/// Build an AWS SDK configuration for the configured region.
///
/// Credentials come from the standard environment chain. An endpoint
/// override (e.g. LocalStack) applies to every client built from it.
pub async fn build_sdk_config(config: &Config) -> aws_config::SdkConfig {
    let mut loader = aws_config::from_env().region(aws_config::Region::new(config.region.clone()));

    if let Some(endpoint) = &config.endpoint_url {
        debug!(endpoint = %endpoint, "using custom AWS endpoint");
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;
    info!(region = %config.region, "aws_sdk_config_loaded");
    sdk_config
}

/// SNS topic publisher.
#[derive(Clone)]
pub struct SnsPublisher {
    client: aws_sdk_sns::Client,
}

impl std::fmt::Debug for SnsPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnsPublisher")
            .field("client", &"<SnsClient>")
            .finish()
    }
}

impl SnsPublisher {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_sns::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl TopicPublisher for SnsPublisher {
    async fn publish(
        &self,
        topic_id: &str,
        subject: &str,
        message: &str,
    ) -> Result<Option<String>, BackendError> {
        debug!(topic_arn = %topic_id, "publishing to SNS topic");

        let result = self
            .client
            .publish()
            .topic_arn(topic_id)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|e| {
                let err_str = aws_sdk_sns::error::DisplayErrorContext(&e).to_string();
                error!(error = %err_str, topic_arn = %topic_id, "sns_publish_failed");
                BackendError::new(err_str)
            })?;

        Ok(result.message_id().map(str::to_owned))
    }
}

/// S3 object writer.
#[derive(Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("client", &"<S3Client>")
            .finish()
    }
}

impl S3Store {
    /// Path-style addressing is forced when an endpoint override is set,
    /// since LocalStack does not serve virtual-hosted buckets.
    pub fn new(sdk_config: &aws_config::SdkConfig, path_style: bool) -> Self {
        let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(path_style)
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        bucket_id: &str,
        key: &str,
        content: &str,
    ) -> Result<Option<String>, BackendError> {
        debug!(bucket = %bucket_id, key = %key, size = content.len(), "uploading object to S3");

        let result = self
            .client
            .put_object()
            .bucket(bucket_id)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(
                content.as_bytes().to_vec(),
            ))
            .send()
            .await
            .map_err(|e| {
                let err_str = aws_sdk_s3::error::DisplayErrorContext(&e).to_string();
                error!(error = %err_str, bucket = %bucket_id, key = %key, "s3_put_object_failed");
                BackendError::new(err_str)
            })?;

        Ok(result.e_tag().map(str::to_owned))
    }
}
