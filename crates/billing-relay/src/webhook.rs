//! Stripe Webhook Handling
//!
//! Relays subscription lifecycle events to the sheet sink:
//! verify → classify → extract → normalize → forward.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{PaymentError, Result};
use crate::extract;
use crate::plan::PlanCatalog;
use crate::provider::{BillingProvider, SubscriptionSnapshot};
use crate::record::SubscriptionRecord;
use crate::signature::SignatureVerifier;
use crate::sink::RecordSink;

/// Which extraction path an event takes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventClass {
    /// Checkout session finished
    Checkout,
    /// `customer.subscription.*`
    Subscription,
    /// Recurring invoice payment outcome
    Invoice,
}

impl EventClass {
    /// Classify an event type; `None` means acknowledge and drop
    pub fn classify(event_type: &str) -> Option<Self> {
        match event_type {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                Some(EventClass::Checkout)
            }
            "invoice.paid" | "invoice.payment_succeeded" | "invoice.payment_failed" => {
                Some(EventClass::Invoice)
            }
            t if t.starts_with("customer.subscription.") => Some(EventClass::Subscription),
            _ => None,
        }
    }
}

/// Stripe event envelope; the object stays untyped for path lookups
#[derive(Clone, Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub created: Option<i64>,

    #[serde(default)]
    pub livemode: bool,

    pub data: EventData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventData {
    pub object: Value,
}

impl StripeEvent {
    /// Parse a verified payload
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))
    }
}

/// What happened to a verified event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Normalized and accepted by the sink
    Forwarded(SubscriptionRecord),

    /// Unhandled event type
    Ignored { event_type: String },
}

/// Webhook pipeline
pub struct WebhookProcessor {
    verifier: SignatureVerifier,
    provider: Arc<dyn BillingProvider>,
    sink: Arc<dyn RecordSink>,
    catalog: Arc<PlanCatalog>,
}

impl WebhookProcessor {
    pub fn new(
        verifier: SignatureVerifier,
        provider: Arc<dyn BillingProvider>,
        sink: Arc<dyn RecordSink>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            verifier,
            provider,
            sink,
            catalog,
        }
    }

    /// Verify, normalize and forward a raw webhook delivery
    pub async fn receive(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        self.receive_at(payload, signature, Utc::now().timestamp()).await
    }

    /// Same as [`receive`](Self::receive) with an explicit clock (unix seconds)
    pub async fn receive_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<WebhookOutcome> {
        if let Err(e) = self.verifier.verify_at(payload, signature, now) {
            tracing::warn!(error = %e, "Rejected webhook delivery");
            return Err(e);
        }

        let event = StripeEvent::from_slice(payload)?;
        tracing::info!(event_id = %event.id, event_type = %event.event_type, livemode = event.livemode, "Webhook verified");

        self.handle(&event).await
    }

    /// Process a verified event
    pub async fn handle(&self, event: &StripeEvent) -> Result<WebhookOutcome> {
        let Some(class) = EventClass::classify(&event.event_type) else {
            tracing::debug!(event_type = %event.event_type, "Unhandled webhook event");
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type.clone(),
            });
        };

        let record = self.normalize(event, class).await?;

        tracing::info!(
            event_id = %record.event_id,
            status = %record.status,
            plan = %record.plan_name,
            subscription_id = ?record.stripe_subscription_id,
            "Forwarding record to sheet"
        );

        self.sink.forward(&record).await.inspect_err(|e| {
            tracing::error!(error = %e, event_id = %record.event_id, "Sheet forwarding failed");
        })?;

        Ok(WebhookOutcome::Forwarded(record))
    }

    /// Build the flat record for an event
    pub async fn normalize(&self, event: &StripeEvent, class: EventClass) -> Result<SubscriptionRecord> {
        let object = &event.data.object;

        let subscription = match class {
            EventClass::Checkout => self.checkout_subscription(object).await?,
            EventClass::Subscription => Some(SubscriptionSnapshot::from_object(object)),
            EventClass::Invoice => None,
        };
        let sub = subscription.as_ref();

        let price_id = sub
            .and_then(|s| s.price_id.clone())
            .or_else(|| extract::price_id(object, class));
        let plan_name = price_id
            .as_deref()
            .map_or(self.catalog.fallback_label(), |id| self.catalog.plan_for_price(id));

        let mut record = SubscriptionRecord::new(&event.id, &event.event_type, plan_name);
        record.status = normalized_status(&event.event_type, class, object, sub);
        record.price_id = price_id;
        record.stripe_customer_id =
            extract::customer_id(object).or_else(|| sub.and_then(|s| s.customer_id.clone()));
        record.stripe_subscription_id = sub
            .map(|s| s.id.clone())
            .filter(|id| !id.is_empty())
            .or_else(|| extract::subscription_id(object, class));
        record.period_start = sub
            .and_then(|s| s.period_start.clone())
            .or_else(|| extract::period_start(object, class));
        record.period_end = sub
            .and_then(|s| s.period_end.clone())
            .or_else(|| extract::period_end(object, class));
        record.customer_email = extract::customer_email(object);
        record.customer_name = extract::customer_name(object);

        // Contact enrichment only; the event is forwarded without it on failure
        if record.customer_email.is_none() {
            if let Some(ref customer_id) = record.stripe_customer_id {
                match self.provider.retrieve_customer(customer_id).await {
                    Ok(contact) => {
                        record.customer_email = contact.email.filter(|e| !e.is_empty());
                        record.customer_name = record.customer_name.or(contact.name);
                    }
                    Err(e) => tracing::warn!(
                        error = %e,
                        event_id = %event.id,
                        customer_id = %customer_id,
                        "Customer lookup failed, forwarding without contact details"
                    ),
                }
            }
        }

        Ok(record)
    }

    /// Subscription behind a checkout session, fetched when only its id is present
    async fn checkout_subscription(&self, session: &Value) -> Result<Option<SubscriptionSnapshot>> {
        match extract::lookup(session, "subscription") {
            Some(Value::String(id)) if !id.trim().is_empty() => {
                let snapshot = self.provider.retrieve_subscription(id.trim()).await?;
                Ok(Some(snapshot))
            }
            Some(obj @ Value::Object(_)) => Ok(Some(SubscriptionSnapshot::from_object(obj))),
            _ => Ok(None),
        }
    }
}

fn normalized_status(
    event_type: &str,
    class: EventClass,
    object: &Value,
    subscription: Option<&SubscriptionSnapshot>,
) -> String {
    let status = match class {
        EventClass::Checkout => subscription
            .and_then(|s| s.status.clone())
            .or_else(|| extract::status(object, class)),
        EventClass::Subscription => extract::status(object, class)
            .or_else(|| event_type.ends_with(".deleted").then(|| "canceled".to_string())),
        EventClass::Invoice if event_type == "invoice.payment_failed" => Some("payment_failed".into()),
        EventClass::Invoice => extract::status(object, class).or_else(|| Some("paid".into())),
    };
    status.unwrap_or_else(|| event_type.to_string())
}
