//! Webhook request orchestration.
//!
//! One call to [`WebhookHandler::handle`] takes a request through:
//! 1. Configuration check
//! 2. Payload parsing
//! 3. Signature verification
//! 4. Notification, then storage dispatch (POST only)
//!
//! Every outcome, including failures, is packaged as a [`WebhookResponse`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info, warn};

use crate::config::{Config, HandlerSettings};
use crate::dispatch::{Dispatcher, ObjectStore, TopicPublisher};
use crate::error::WebhookError;
use crate::event::{parse_event, EventEnvelope, EventRecord, Signature};
use crate::web::signature::{is_timestamp_fresh, verify_mailgun_signature};

/// Inbound request as delivered by the hosting runtime.
///
/// Gateway events send `null` for an absent body or header map; both read
/// as empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub http_method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response object returned to the hosting runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status_code: String,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl WebhookResponse {
    fn new(status_code: &str, body: String) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            status_code: status_code.to_string(),
            body,
            headers,
        }
    }

    pub(crate) fn from_error(status_code: &str, err: &WebhookError) -> Self {
        match err {
            // Sent as plain text, unlike every other body
            WebhookError::Unauthorized => Self::new(status_code, err.to_string()),
            _ => Self::new(status_code, json_string(&err.to_string())),
        }
    }
}

/// Encode a message as a JSON string literal.
fn json_string(message: &str) -> String {
    serde_json::Value::String(message.to_string()).to_string()
}

/// Verifies and dispatches Mailgun webhook events.
///
/// Immutable after construction, so one instance can serve concurrent
/// requests.
#[derive(Clone)]
pub struct WebhookHandler {
    config: Config,
    dispatcher: Dispatcher,
}

impl WebhookHandler {
    pub fn new(config: Config, sns: Arc<dyn TopicPublisher>, s3: Arc<dyn ObjectStore>) -> Self {
        let dispatcher = Dispatcher::new(
            sns,
            s3,
            config.sns_topic_arn.clone(),
            config.s3_bucket_name.clone(),
        );
        Self { config, dispatcher }
    }

    /// Handle one webhook request.
    pub async fn handle(&self, request: &InboundRequest) -> WebhookResponse {
        info!(
            method = %request.http_method,
            body_length = request.body.len(),
            header_count = request.headers.len(),
            "webhook_received"
        );

        let response = match self.admit(request) {
            Err(err) => {
                match &err {
                    WebhookError::Configuration(_) => error!(error = %err, "webhook_misconfigured"),
                    _ => warn!(error = %err, "webhook_rejected"),
                }
                WebhookResponse::from_error(err.status_code(), &err)
            }
            Ok((settings, record)) => match self.dispatch(&settings, &record).await {
                Ok(body) => WebhookResponse::new("200", json_string(&body)),
                // Any dispatch failure is a 400, whatever its kind
                Err(err) => {
                    warn!(event_id = %record.id, error = %err, "webhook_dispatch_failed");
                    WebhookResponse::from_error("400", &err)
                }
            },
        };

        info!(status_code = %response.status_code, "webhook_completed");
        response
    }

    /// Run every check that must pass before a backend is contacted.
    fn admit(
        &self,
        request: &InboundRequest,
    ) -> Result<(HandlerSettings, EventRecord), WebhookError> {
        let settings = self.config.validate()?;

        let (record, signature) = parse_event(&request.body)?;

        authenticate(&settings, &signature)?;

        if request.http_method != "POST" {
            return Err(WebhookError::UnsupportedMethod(request.http_method.clone()));
        }

        Ok((settings, record))
    }

    /// Notify, then store. The first failure skips whatever is left.
    async fn dispatch(
        &self,
        settings: &HandlerSettings,
        record: &EventRecord,
    ) -> Result<String, WebhookError> {
        let envelope = EventEnvelope::from_record(record);

        let mut body = self
            .dispatcher
            .dispatch_notification(&settings.notification_service, &envelope)
            .await?;
        info!(event_id = %record.id, "notification_dispatched");

        body.push_str(
            &self
                .dispatcher
                .dispatch_storage(&settings.storage_service, &envelope, record)
                .await?,
        );
        info!(event_id = %record.id, "storage_dispatched");

        Ok(body)
    }
}

fn authenticate(settings: &HandlerSettings, signature: &Signature) -> Result<(), WebhookError> {
    if let Some(max_age) = settings.signature_max_age {
        if !is_timestamp_fresh(&signature.timestamp, max_age) {
            return Err(WebhookError::Unauthorized);
        }
    }

    if !verify_mailgun_signature(
        &settings.signing_key,
        &signature.timestamp,
        &signature.token,
        &signature.signature,
    ) {
        return Err(WebhookError::Unauthorized);
    }

    Ok(())
}
