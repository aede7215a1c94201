//! Mailgun Relay - verified fan-out of Mailgun webhook events.
//!
//! Each webhook is authenticated against the Mailgun signing key, then the
//! event is published to a notification backend and written to a storage
//! backend, in that order.
//!
//! ## Architecture
//!
//! ```text
//! Webhook → parse_event → verify signature → notify (SNS) → store (S3) → response
//! ```

pub mod aws;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handler;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{Dispatcher, ObjectStore, TopicPublisher};
pub use error::{BackendError, WebhookError};
pub use event::{parse_event, EventEnvelope, EventRecord, Signature};
pub use handler::{InboundRequest, WebhookHandler, WebhookResponse};
pub use web::AppState;
