//! Application State

use std::sync::Arc;

use billing_relay::{CheckoutInitiator, WebhookProcessor};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checkout session creation
    pub checkout: Arc<CheckoutInitiator>,

    /// Webhook verify/normalize/forward pipeline
    pub webhooks: Arc<WebhookProcessor>,
}
