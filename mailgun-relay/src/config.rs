//! Configuration module for environment variable parsing.
//!
//! Loading never fails: every value is optional here. Presence of the
//! values the handler needs is checked by [`Config::validate`], which the
//! handler runs before touching the request.

use std::env;
use tracing::warn;

use crate::error::WebhookError;

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Mailgun HTTP webhook signing key
    pub signing_key: Option<String>,

    /// Notification backend identifier (e.g. "sns")
    pub notification_service: Option<String>,

    /// Storage backend identifier (e.g. "s3")
    pub storage_service: Option<String>,

    /// SNS topic ARN for the "sns" notification backend
    pub sns_topic_arn: Option<String>,

    /// S3 bucket for the "s3" storage backend
    pub s3_bucket_name: Option<String>,

    /// AWS region for the backend clients
    pub region: String,

    /// Endpoint override for local development (LocalStack)
    pub endpoint_url: Option<String>,

    /// Maximum age in seconds of the signature timestamp. Unset disables the check.
    pub signature_max_age: Option<u64>,

    /// Port for the web server to listen on
    pub port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("signing_key", &self.signing_key.as_ref().map(|_| "[REDACTED]"))
            .field("notification_service", &self.notification_service)
            .field("storage_service", &self.storage_service)
            .field("sns_topic_arn", &self.sns_topic_arn)
            .field("s3_bucket_name", &self.s3_bucket_name)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("signature_max_age", &self.signature_max_age)
            .field("port", &self.port)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signing_key: None,
            notification_service: None,
            storage_service: None,
            sns_topic_arn: None,
            s3_bucket_name: None,
            region: "us-east-1".to_string(),
            endpoint_url: None,
            signature_max_age: None,
            port: 8080,
        }
    }
}

/// Configuration after the required values have been checked.
#[derive(Clone)]
pub struct HandlerSettings {
    pub signing_key: String,
    pub notification_service: String,
    pub storage_service: String,
    pub signature_max_age: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Config {
            signing_key: non_blank(lookup("SIGNING_KEY")),
            notification_service: non_blank(lookup("NOTIFICATION_SERVICE")),
            storage_service: non_blank(lookup("STORAGE_SERVICE")),
            sns_topic_arn: non_blank(lookup("SNS_ARN")),
            s3_bucket_name: non_blank(lookup("S3_BUCKET_NAME")),
            region: non_blank(lookup("REGION")).unwrap_or(defaults.region),
            endpoint_url: non_blank(lookup("AWS_ENDPOINT_URL")),
            signature_max_age: parse_number(&lookup, "MAILGUN_SIGNATURE_MAX_AGE"),
            port: parse_number(&lookup, "PORT").unwrap_or(defaults.port),
        }
    }

    /// Check that the signing key and both backend identifiers are present.
    pub fn validate(&self) -> Result<HandlerSettings, WebhookError> {
        let signing_key = self
            .signing_key
            .clone()
            .ok_or_else(|| WebhookError::Configuration("Please provide a signing key".into()))?;
        let notification_service = self.notification_service.clone().ok_or_else(|| {
            WebhookError::Configuration("Please specify notification service".into())
        })?;
        let storage_service = self
            .storage_service
            .clone()
            .ok_or_else(|| WebhookError::Configuration("Please specify storage service".into()))?;

        Ok(HandlerSettings {
            signing_key,
            notification_service,
            storage_service,
            signature_max_age: self.signature_max_age,
        })
    }
}

/// Treat empty and whitespace-only values as unset.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a numeric variable, warning and ignoring it when invalid.
fn parse_number<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = non_blank(lookup(name))?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(env_var = name, value = %raw, "invalid_number_ignored");
            None
        }
    }
}
