//! Dispatch of a verified event to the notification and storage backends.
//!
//! Backends are chosen by configured identifier. Each category has a closed
//! set of supported services; an identifier outside that set is rejected
//! before any backend is touched.
//!
//! ## Dispatch Flow
//!
//! ```text
//! EventEnvelope → dispatch_notification() → TopicPublisher::publish
//!               → dispatch_storage()      → ObjectStore::put
//! ```

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{BackendError, ServiceCategory, WebhookError};
use crate::event::{EventEnvelope, EventRecord};

/// Subject line of every published notification.
pub const NOTIFICATION_SUBJECT: &str = "Mailgun Webhook notification";

pub const NOTIFICATION_SENT: &str = "Notification sent successfully.";
pub const EVENT_STORED: &str = "Event stored successfully.";

/// Publishes a message to a pub/sub topic.
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    /// Returns the message id assigned by the backend, if any.
    async fn publish(
        &self,
        topic_id: &str,
        subject: &str,
        message: &str,
    ) -> Result<Option<String>, BackendError>;
}

/// Writes an object to a bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the object's etag, if the backend reports one.
    async fn put(
        &self,
        bucket_id: &str,
        key: &str,
        content: &str,
    ) -> Result<Option<String>, BackendError>;
}

/// Supported notification backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationService {
    Sns,
}

impl FromStr for NotificationService {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sns" => Ok(NotificationService::Sns),
            other => {
                warn!(category = "notification", service = %other, "unsupported_service");
                Err(WebhookError::UnsupportedService {
                    category: ServiceCategory::Notification,
                    name: other.to_string(),
                })
            }
        }
    }
}

/// Supported storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageService {
    S3,
}

impl FromStr for StorageService {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s3" => Ok(StorageService::S3),
            other => {
                warn!(category = "storage", service = %other, "unsupported_service");
                Err(WebhookError::UnsupportedService {
                    category: ServiceCategory::Storage,
                    name: other.to_string(),
                })
            }
        }
    }
}

/// Object key under which an event is stored.
pub fn storage_key(record: &EventRecord) -> String {
    format!("{}.txt", record.id)
}

/// Routes envelopes to the backend clients.
///
/// Holds one client per supported service plus that service's settings.
#[derive(Clone)]
pub struct Dispatcher {
    sns: Arc<dyn TopicPublisher>,
    s3: Arc<dyn ObjectStore>,
    sns_topic_arn: Option<String>,
    s3_bucket_name: Option<String>,
}

impl Dispatcher {
    pub fn new(
        sns: Arc<dyn TopicPublisher>,
        s3: Arc<dyn ObjectStore>,
        sns_topic_arn: Option<String>,
        s3_bucket_name: Option<String>,
    ) -> Self {
        Self {
            sns,
            s3,
            sns_topic_arn,
            s3_bucket_name,
        }
    }

    /// Send the envelope to the configured notification backend.
    pub async fn dispatch_notification(
        &self,
        service: &str,
        envelope: &EventEnvelope,
    ) -> Result<String, WebhookError> {
        match service.parse::<NotificationService>()? {
            NotificationService::Sns => {
                let topic_arn = self
                    .sns_topic_arn
                    .as_deref()
                    .ok_or_else(|| WebhookError::Configuration("Please specify SNS ARN".into()))?;
                let message = render(envelope)?;

                let message_id = self
                    .sns
                    .publish(topic_arn, NOTIFICATION_SUBJECT, &message)
                    .await?;

                match message_id {
                    Some(id) => info!(
                        service = "sns",
                        topic_arn = %topic_arn,
                        message_id = %id,
                        "notification_published"
                    ),
                    None => warn!(
                        service = "sns",
                        topic_arn = %topic_arn,
                        "notification_published_without_message_id"
                    ),
                }
            }
        }

        Ok(NOTIFICATION_SENT.to_string())
    }

    /// Persist the envelope with the configured storage backend.
    pub async fn dispatch_storage(
        &self,
        service: &str,
        envelope: &EventEnvelope,
        record: &EventRecord,
    ) -> Result<String, WebhookError> {
        match service.parse::<StorageService>()? {
            StorageService::S3 => {
                let bucket = self.s3_bucket_name.as_deref().ok_or_else(|| {
                    WebhookError::Configuration("Please specify S3 bucket name".into())
                })?;
                let key = storage_key(record);
                let content = render(envelope)?;

                let etag = self.s3.put(bucket, &key, &content).await?;

                match etag {
                    Some(etag) => info!(
                        service = "s3",
                        bucket = %bucket,
                        key = %key,
                        etag = %etag,
                        "event_stored"
                    ),
                    None => warn!(
                        service = "s3",
                        bucket = %bucket,
                        key = %key,
                        "event_stored_without_etag"
                    ),
                }
            }
        }

        Ok(EVENT_STORED.to_string())
    }
}

fn render(envelope: &EventEnvelope) -> Result<String, WebhookError> {
    envelope
        .to_pretty_json()
        .map_err(|e| WebhookError::Backend(format!("Failed to serialize event: {e}")))
}

/// Recording backends for tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// A single backend invocation as seen by the doubles.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Publish {
            topic_id: String,
            subject: String,
            message: String,
        },
        Put {
            bucket_id: String,
            key: String,
            content: String,
        },
    }

    /// Shared call log, so ordering across both backends is observable.
    pub type CallLog = Arc<Mutex<Vec<Call>>>;

    pub struct RecordingPublisher {
        pub calls: CallLog,
        pub fail_with: Option<String>,
    }

    #[async_trait]
    impl TopicPublisher for RecordingPublisher {
        async fn publish(
            &self,
            topic_id: &str,
            subject: &str,
            message: &str,
        ) -> Result<Option<String>, BackendError> {
            self.calls.lock().unwrap().push(Call::Publish {
                topic_id: topic_id.to_string(),
                subject: subject.to_string(),
                message: message.to_string(),
            });
            match &self.fail_with {
                Some(msg) => Err(BackendError::new(msg.clone())),
                None => Ok(Some("msg-1".to_string())),
            }
        }
    }

    pub struct RecordingStore {
        pub calls: CallLog,
        pub fail_with: Option<String>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn put(
            &self,
            bucket_id: &str,
            key: &str,
            content: &str,
        ) -> Result<Option<String>, BackendError> {
            self.calls.lock().unwrap().push(Call::Put {
                bucket_id: bucket_id.to_string(),
                key: key.to_string(),
                content: content.to_string(),
            });
            match &self.fail_with {
                Some(msg) => Err(BackendError::new(msg.clone())),
                None => Ok(Some("\"etag-1\"".to_string())),
            }
        }
    }

    /// Recording backends sharing one call log.
    pub fn recording_backends(
        publish_error: Option<&str>,
        put_error: Option<&str>,
    ) -> (Arc<RecordingPublisher>, Arc<RecordingStore>, CallLog) {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let publisher = Arc::new(RecordingPublisher {
            calls: calls.clone(),
            fail_with: publish_error.map(str::to_string),
        });
        let store = Arc::new(RecordingStore {
            calls: calls.clone(),
            fail_with: put_error.map(str::to_string),
        });
        (publisher, store, calls)
    }

    /// Build a dispatcher over recording backends.
    pub fn recording_dispatcher(
        publish_error: Option<&str>,
        put_error: Option<&str>,
    ) -> (Dispatcher, CallLog) {
        let (publisher, store, calls) = recording_backends(publish_error, put_error);
        let dispatcher = Dispatcher::new(
            publisher,
            store,
            Some("arn:aws:sns:us-east-1:123456789012:mailgun".to_string()),
            Some("receeve-mailgun".to_string()),
        );
        (dispatcher, calls)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::event::EventTimestamp;

    fn sample_record() -> EventRecord {
        EventRecord {
            event_type: "opened".to_string(),
            timestamp: Some(EventTimestamp::Text("1529006854".to_string())),
            id: "XYZ".to_string(),
        }
    }

    #[test]
    fn test_service_parsing() {
        assert_eq!("sns".parse::<NotificationService>().unwrap(), NotificationService::Sns);
        assert_eq!("s3".parse::<StorageService>().unwrap(), StorageService::S3);
        assert!("SNS".parse::<NotificationService>().is_err());
        assert!("dropbox".parse::<StorageService>().is_err());
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(storage_key(&sample_record()), "XYZ.txt");
    }

    #[tokio::test]
    async fn test_dispatch_notification_publishes_envelope() {
        let (dispatcher, calls) = recording_dispatcher(None, None);
        let record = sample_record();
        let envelope = EventEnvelope::from_record(&record);

        let message = dispatcher
            .dispatch_notification("sns", &envelope)
            .await
            .unwrap();

        assert_eq!(message, NOTIFICATION_SENT);
        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![Call::Publish {
                topic_id: "arn:aws:sns:us-east-1:123456789012:mailgun".to_string(),
                subject: NOTIFICATION_SUBJECT.to_string(),
                message: envelope.to_pretty_json().unwrap(),
            }]
        );
    }

    #[tokio::test]
    async fn test_dispatch_storage_puts_envelope() {
        let (dispatcher, calls) = recording_dispatcher(None, None);
        let record = sample_record();
        let envelope = EventEnvelope::from_record(&record);

        let message = dispatcher
            .dispatch_storage("s3", &envelope, &record)
            .await
            .unwrap();

        assert_eq!(message, EVENT_STORED);
        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![Call::Put {
                bucket_id: "receeve-mailgun".to_string(),
                key: "XYZ.txt".to_string(),
                content: envelope.to_pretty_json().unwrap(),
            }]
        );
    }

    #[tokio::test]
    async fn test_unsupported_notification_service_makes_no_calls() {
        let (dispatcher, calls) = recording_dispatcher(None, None);
        let envelope = EventEnvelope::from_record(&sample_record());

        let err = dispatcher
            .dispatch_notification("pagerDuty", &envelope)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WebhookError::UnsupportedService {
                category: ServiceCategory::Notification,
                ..
            }
        ));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_storage_service_makes_no_calls() {
        let (dispatcher, calls) = recording_dispatcher(None, None);
        let record = sample_record();
        let envelope = EventEnvelope::from_record(&record);

        let err = dispatcher
            .dispatch_storage("drive", &envelope, &record)
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::UnsupportedService { .. }));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_carries_message() {
        let (dispatcher, _calls) = recording_dispatcher(Some("AuthorizationError"), None);
        let envelope = EventEnvelope::from_record(&sample_record());

        let err = dispatcher
            .dispatch_notification("sns", &envelope)
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::Backend(ref m) if m == "AuthorizationError"));
    }

    #[tokio::test]
    async fn test_missing_topic_arn() {
        let (dispatcher, calls) = recording_dispatcher(None, None);
        let dispatcher = Dispatcher {
            sns_topic_arn: None,
            ..dispatcher
        };
        let envelope = EventEnvelope::from_record(&sample_record());

        let err = dispatcher
            .dispatch_notification("sns", &envelope)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Please specify SNS ARN");
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_bucket_name() {
        let (dispatcher, calls) = recording_dispatcher(None, None);
        let dispatcher = Dispatcher {
            s3_bucket_name: None,
            ..dispatcher
        };
        let record = sample_record();
        let envelope = EventEnvelope::from_record(&record);

        let err = dispatcher
            .dispatch_storage("s3", &envelope, &record)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Please specify S3 bucket name");
        assert!(calls.lock().unwrap().is_empty());
    }
}
