//! Relay Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors raised while initiating checkouts or relaying webhook events
#[derive(Error, Debug)]
pub enum PaymentError {
    /// No plan key or price id supplied
    #[error("plan or priceId is required")]
    MissingPlan,

    /// Plan key or price id not present in the catalog
    #[error("Unknown plan: {0}")]
    InvalidPlan(String),

    /// Caller-supplied origin is not an absolute http(s) URL
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// Request body could not be understood
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Forwarding to the sheet sink failed
    #[error("Sink error: {0}")]
    Sink(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Whether the caller sent something we cannot act on
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PaymentError::MissingPlan
                | PaymentError::InvalidPlan(_)
                | PaymentError::InvalidOrigin(_)
                | PaymentError::InvalidRequest(_)
                | PaymentError::WebhookSignature(_)
                | PaymentError::WebhookParse(_)
        )
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::MissingPlan => "MISSING_PLAN",
            PaymentError::InvalidPlan(_) => "INVALID_PLAN",
            PaymentError::InvalidOrigin(_) => "INVALID_ORIGIN",
            PaymentError::InvalidRequest(_) => "INVALID_REQUEST",
            PaymentError::Stripe(_) => "STRIPE_ERROR",
            PaymentError::WebhookSignature(_) => "INVALID_SIGNATURE",
            PaymentError::WebhookParse(_) => "INVALID_EVENT",
            PaymentError::Sink(_) => "SINK_ERROR",
            PaymentError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Message safe to return to the caller.
    ///
    /// Provider messages are relayed as-is; sink and configuration details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Stripe(msg) => msg.clone(),
            PaymentError::Sink(_) => "Failed to forward event".into(),
            PaymentError::Config(_) => "Service configuration error.".into(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(PaymentError::MissingPlan.is_client_error());
        assert!(PaymentError::WebhookSignature("bad".into()).is_client_error());
        assert!(!PaymentError::Stripe("down".into()).is_client_error());
        assert!(!PaymentError::Sink("503".into()).is_client_error());
    }

    #[test]
    fn test_user_message_relays_provider_text() {
        let err = PaymentError::Stripe("No such price: 'price_x'".into());
        assert_eq!(err.user_message(), "No such price: 'price_x'");

        let err = PaymentError::Sink("connection refused to 10.0.0.1".into());
        assert_eq!(err.user_message(), "Failed to forward event");
    }
}
