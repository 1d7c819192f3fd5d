//! Payment Provider Integration
//!
//! The outbound Stripe calls the relay makes: create a hosted checkout
//! session, and look up a subscription or customer when a webhook payload
//! does not carry the fields we need.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
};

use crate::checkout::{CheckoutRequest, CheckoutSession};
use crate::error::{PaymentError, Result};
use crate::extract;
use crate::record::PeriodBound;
use crate::webhook::EventClass;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Subscription fields the relay cares about
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub status: Option<String>,
    pub price_id: Option<String>,
    pub customer_id: Option<String>,
    pub period_start: Option<PeriodBound>,
    pub period_end: Option<PeriodBound>,
}

impl SubscriptionSnapshot {
    /// Read a snapshot from a subscription object embedded in a payload
    pub fn from_object(object: &Value) -> Self {
        let class = EventClass::Subscription;
        Self {
            id: extract::subscription_id(object, class).unwrap_or_default(),
            status: extract::status(object, class),
            price_id: extract::price_id(object, class),
            customer_id: extract::customer_id(object),
            period_start: extract::period_start(object, class),
            period_end: extract::period_end(object, class),
        }
    }
}

/// Customer contact details
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Billing provider seam
///
/// `StripeClient` talks to the real API; `MockBillingProvider` backs tests.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a hosted checkout session
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// Fetch a subscription by id
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionSnapshot>;

    /// Fetch a customer by id
    async fn retrieve_customer(&self, customer_id: &str) -> Result<CustomerContact>;
}

/// Stripe client wrapper
///
/// Checkout sessions go through `async-stripe`. Lookups fetch raw JSON and
/// read it with the same fallback paths as webhook payloads, so they keep
/// working across API versions that move fields around.
pub struct StripeClient {
    client: Client,
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            http: reqwest::Client::new(),
            secret_key: secret_key.to_string(),
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    /// Point REST lookups at another base URL (a local stub, a proxy)
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret_key = lookup("STRIPE_SECRET_KEY")
            .or_else(|| lookup("STRIPE_KEY"))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;

        Ok(Self::new(secret_key.trim()))
    }

    /// Get the underlying Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// GET a Stripe object as untyped JSON
    async fn fetch_object(&self, resource: &str, id: &str) -> Result<Value> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PaymentError::Stripe(format!("invalid {resource} id: '{id}'")));
        }

        let response = self
            .http
            .get(format!("{}/{resource}/{id}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| PaymentError::Stripe(format!("Stripe request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PaymentError::Stripe(format!("Failed to parse Stripe response: {e}")))?;

        if !status.is_success() {
            let message = extract::first_text(&body, &["error.message", "error.type"])
                .map_or_else(|| format!("Stripe API error: {status}"), str::to_string);
            tracing::error!(status = %status, resource, id, error = %message, "Stripe API error");
            return Err(PaymentError::Stripe(message));
        }

        Ok(body)
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.success_url = Some(request.success_url.as_str());
        params.cancel_url = Some(request.cancel_url.as_str());
        params.allow_promotion_codes = Some(true);
        params.customer_email = request.customer_email.as_deref();

        let mut metadata = HashMap::new();
        metadata.insert("plan".to_string(), request.plan_key.clone());
        if let Some(ref email) = request.customer_email {
            metadata.insert("email".to_string(), email.clone());
        }
        params.metadata = Some(metadata);

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        Ok(CheckoutSession {
            id: session.id.to_string(),
            url,
            plan_key: request.plan_key.clone(),
            price_id: request.price_id.clone(),
        })
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionSnapshot> {
        let object = self.fetch_object("subscriptions", subscription_id).await?;
        Ok(SubscriptionSnapshot::from_object(&object))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Result<CustomerContact> {
        let object = self.fetch_object("customers", customer_id).await?;
        Ok(CustomerContact {
            email: extract::first_text(&object, &["email"]).map(str::to_string),
            name: extract::first_text(&object, &["name"]).map(str::to_string),
        })
    }
}
