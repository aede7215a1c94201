//! Mailgun event payload parsing.
//!
//! Mailgun posts a JSON document with two sections: `signature`, used to
//! authenticate the sender, and `event-data`, the event itself. Only the
//! fields the relay forwards are modelled; everything else is ignored.
//!
//! ```text
//! raw body → parse_event() → (EventRecord, Signature) → EventEnvelope
//! ```

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::WebhookError;

/// Provider name stamped on every envelope.
pub const PROVIDER_NAME: &str = "Mailgun";

/// Authentication proof sent alongside every Mailgun event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub timestamp: String,
    pub token: String,
    pub signature: String,
}

/// Event timestamp, re-emitted exactly as Mailgun sent it.
///
/// Mailgun uses a fractional epoch number, but a string is accepted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTimestamp {
    Number(serde_json::Number),
    Text(String),
}

impl std::fmt::Display for EventTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventTimestamp::Number(n) => write!(f, "{n}"),
            EventTimestamp::Text(s) => f.write_str(s),
        }
    }
}

/// The business event from the `event-data` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event type, e.g. "opened" or "delivered"
    #[serde(rename = "event")]
    pub event_type: String,
    #[serde(default)]
    pub timestamp: Option<EventTimestamp>,
    pub id: String,
}

/// Normalized event shipped to both the notification and storage backends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    #[serde(rename = "Provider")]
    pub provider: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<EventTimestamp>,
    #[serde(rename = "type")]
    pub event_type: String,
}

impl EventEnvelope {
    pub fn from_record(record: &EventRecord) -> Self {
        Self {
            provider: PROVIDER_NAME,
            timestamp: record.timestamp.clone(),
            event_type: format!("email {}", record.event_type),
        }
    }

    /// Pretty JSON with two-space indentation, the body both backends receive.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    signature: Option<Signature>,
    #[serde(default, rename = "event-data")]
    event_data: Option<EventRecord>,
}

/// Parse a raw webhook body into its event record and signature.
pub fn parse_event(raw_body: &str) -> Result<(EventRecord, Signature), WebhookError> {
    let payload: WebhookPayload = serde_json::from_str(raw_body).map_err(|e| {
        warn!(error = %e, body_length = raw_body.len(), "mailgun_payload_parse_failed");
        WebhookError::MalformedPayload(e.to_string())
    })?;

    let signature = payload.signature.ok_or_else(|| {
        warn!("mailgun_payload_missing_signature");
        WebhookError::MalformedPayload("missing \"signature\" section".to_string())
    })?;

    let record = payload.event_data.ok_or_else(|| {
        warn!("mailgun_payload_missing_event_data");
        WebhookError::MalformedPayload("missing \"event-data\" section".to_string())
    })?;

    info!(
        event_id = %record.id,
        event_type = %record.event_type,
        "mailgun_event_parsed"
    );

    Ok((record, signature))
}
