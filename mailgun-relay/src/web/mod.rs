//! Web server module for handling inbound webhooks.
//!
//! This module provides the HTTP host for the webhook handler:
//! - Adapts each HTTP request into an `InboundRequest`
//! - Runs verification and dispatch
//! - Copies the handler's status, headers and body back onto the wire

pub mod routes;
pub mod signature;

pub use routes::{health, mailgun_webhook, router, AppState, HealthResponse};
pub use signature::{compute_signature, is_timestamp_fresh, verify_mailgun_signature};
