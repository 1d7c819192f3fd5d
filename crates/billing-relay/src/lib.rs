//! # billing-relay
//!
//! Stripe checkout initiation and webhook relaying to a spreadsheet sink.
//!
//! ## Checkout
//!
//! **Flow:** client sends a plan key → catalog lookup → Stripe hosted page
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────────┐
//! │   Client    │────▶│ PlanCatalog  │────▶│  Stripe Hosted  │
//! │ plan/price  │     │ key → price  │     │  Checkout Page  │
//! └─────────────┘     └──────────────┘     └─────────────────┘
//! ```
//!
//! Unknown plans are rejected before Stripe is called.
//!
//! ## Webhooks
//!
//! ```text
//! raw body + Stripe-Signature
//!        │ verify (HMAC-SHA256, 5 min tolerance)
//!        ▼
//!   StripeEvent ── classify ──▶ ignored (unhandled type)
//!        │ extract (ordered fallback paths)
//!        ▼
//!   SubscriptionRecord ── forward ──▶ sheet web app
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use billing_relay::{
//!     CheckoutInitiator, CheckoutInput, CheckoutUrls, HttpSink, PlanCatalog,
//!     SignatureVerifier, StripeClient, WebhookProcessor,
//! };
//!
//! let provider = Arc::new(StripeClient::from_env()?);
//! let catalog = Arc::new(PlanCatalog::from_env()?);
//!
//! let checkout = CheckoutInitiator::new(provider.clone(), catalog.clone(), CheckoutUrls::from_env()?);
//! let session = checkout.start(&CheckoutInput {
//!     plan: Some("starter_monthly".into()),
//!     ..Default::default()
//! }).await?;
//! // Redirect user to: session.url
//!
//! let webhooks = WebhookProcessor::new(
//!     SignatureVerifier::from_env()?,
//!     provider,
//!     Arc::new(HttpSink::from_env()?),
//!     catalog,
//! );
//! webhooks.receive(&body, signature_header).await?;
//! ```

mod checkout;
mod error;
pub mod extract;
pub mod mock;
mod plan;
mod provider;
mod record;
pub mod signature;
mod sink;
mod webhook;

pub use checkout::{CheckoutInitiator, CheckoutInput, CheckoutRequest, CheckoutSession, CheckoutUrls};
pub use error::{PaymentError, Result};
pub use plan::{PlanCatalog, PlanSelection, DEFAULT_FALLBACK_LABEL};
pub use provider::{BillingProvider, CustomerContact, StripeClient, SubscriptionSnapshot};
pub use record::{PeriodBound, SubscriptionRecord};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};
pub use sink::{HttpSink, RecordSink, API_KEY_HEADER};
pub use webhook::{EventClass, EventData, StripeEvent, WebhookOutcome, WebhookProcessor};
