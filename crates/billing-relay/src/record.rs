//! Normalized Subscription Event Record
//!
//! The flat row forwarded to the sheet sink, one per relayed webhook event.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Billing period boundary exactly as Stripe supplied it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeriodBound {
    /// Unix epoch seconds
    Epoch(i64),
    /// ISO 8601 string
    Iso(String),
}

impl From<i64> for PeriodBound {
    fn from(secs: i64) -> Self {
        PeriodBound::Epoch(secs)
    }
}

impl std::fmt::Display for PeriodBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodBound::Epoch(secs) => write!(f, "{secs}"),
            PeriodBound::Iso(s) => write!(f, "{s}"),
        }
    }
}

/// Normalized record forwarded to the sink
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub event_id: String,
    pub event_type: String,
    pub status: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub price_id: Option<String>,
    pub plan_name: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub period_start: Option<PeriodBound>,
    pub period_end: Option<PeriodBound>,
    pub updated_at: String,
}

impl SubscriptionRecord {
    /// Start a record for an event; remaining fields are filled by the caller
    pub fn new(event_id: impl Into<String>, event_type: impl Into<String>, plan_name: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            status: String::new(),
            customer_email: None,
            customer_name: None,
            price_id: None,
            plan_name: plan_name.into(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            period_start: None,
            period_end: None,
            updated_at: format_timestamp(Utc::now()),
        }
    }

    /// Restamp `updated_at`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = format_timestamp(now);
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
