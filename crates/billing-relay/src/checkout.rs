//! Stripe Checkout Initiation
//!
//! Resolves a plan key or price id against the catalog and asks Stripe for a
//! hosted, subscription-mode checkout session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PaymentError, Result};
use crate::plan::PlanCatalog;
use crate::provider::BillingProvider;

/// Client-supplied checkout parameters (JSON body or query string)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutInput {
    /// Plan key from the catalog
    #[serde(default, alias = "planKey")]
    pub plan: Option<String>,

    /// Stripe price id, accepted when it is in the catalog
    #[serde(default, alias = "priceId")]
    pub price_id: Option<String>,

    /// Prefills the checkout form
    #[serde(default)]
    pub email: Option<String>,

    /// Site the customer returns to after checkout
    #[serde(default)]
    pub origin: Option<String>,
}

impl CheckoutInput {
    fn selector(&self) -> Option<&str> {
        [self.plan.as_deref(), self.price_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    fn email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
    }
}

/// Request handed to the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub price_id: String,
    pub plan_key: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect user to
    pub url: String,

    pub plan_key: String,
    pub price_id: String,
}

/// Return URLs for the hosted checkout page
#[derive(Clone, Debug)]
pub struct CheckoutUrls {
    pub default_origin: String,
    pub success_path: String,
    pub cancel_path: String,
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self {
            default_origin: "http://localhost:3000".into(),
            success_path: "/welcome?session_id={CHECKOUT_SESSION_ID}".into(),
            cancel_path: "/paywall".into(),
        }
    }
}

impl CheckoutUrls {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let default_origin = match lookup("APP_ORIGIN") {
            Some(raw) => normalize_origin(&raw)
                .map_err(|_| PaymentError::Config(format!("APP_ORIGIN '{raw}' is not an http(s) URL")))?,
            None => defaults.default_origin,
        };

        Ok(Self {
            default_origin,
            success_path: lookup("CHECKOUT_SUCCESS_PATH").unwrap_or(defaults.success_path),
            cancel_path: lookup("CHECKOUT_CANCEL_PATH").unwrap_or(defaults.cancel_path),
        })
    }

    /// Success and cancel URLs for an optional caller origin
    pub fn for_origin(&self, origin: Option<&str>) -> Result<(String, String)> {
        let origin = match origin.map(str::trim).filter(|o| !o.is_empty()) {
            Some(raw) => normalize_origin(raw)?,
            None => self.default_origin.clone(),
        };

        Ok((
            join_path(&origin, &self.success_path),
            join_path(&origin, &self.cancel_path),
        ))
    }
}

fn normalize_origin(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim()).map_err(|_| PaymentError::InvalidOrigin(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(PaymentError::InvalidOrigin(raw.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}

fn join_path(origin: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{origin}{path}")
    } else {
        format!("{origin}/{path}")
    }
}

/// Validates checkout input and creates sessions
pub struct CheckoutInitiator {
    provider: Arc<dyn BillingProvider>,
    catalog: Arc<PlanCatalog>,
    urls: CheckoutUrls,
}

impl CheckoutInitiator {
    pub fn new(provider: Arc<dyn BillingProvider>, catalog: Arc<PlanCatalog>, urls: CheckoutUrls) -> Self {
        Self {
            provider,
            catalog,
            urls,
        }
    }

    /// Build the provider request; fails before any provider call on bad input
    pub fn prepare(&self, input: &CheckoutInput) -> Result<CheckoutRequest> {
        let selector = input.selector().ok_or(PaymentError::MissingPlan)?;
        let selection = self.catalog.resolve(selector)?;
        let (success_url, cancel_url) = self.urls.for_origin(input.origin.as_deref())?;

        Ok(CheckoutRequest {
            price_id: selection.price_id,
            plan_key: selection.plan_key,
            customer_email: input.email(),
            success_url,
            cancel_url,
        })
    }

    /// Create a hosted checkout session
    pub async fn start(&self, input: &CheckoutInput) -> Result<CheckoutSession> {
        let request = self.prepare(input)?;

        tracing::info!(plan = %request.plan_key, price_id = %request.price_id, "Creating checkout session");

        let session = self.provider.create_checkout_session(&request).await?;

        tracing::info!(session_id = %session.id, plan = %session.plan_key, "Checkout session created");

        Ok(session)
    }
}
