//! In-Memory Test Doubles
//!
//! For tests and local demos. `MockBillingProvider` answers with canned
//! Stripe data and counts calls; `MemorySink` keeps forwarded records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::checkout::{CheckoutRequest, CheckoutSession};
use crate::error::{PaymentError, Result};
use crate::provider::{BillingProvider, CustomerContact, SubscriptionSnapshot};
use crate::record::SubscriptionRecord;
use crate::sink::RecordSink;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock billing provider with static data
#[derive(Default)]
pub struct MockBillingProvider {
    subscriptions: HashMap<String, SubscriptionSnapshot>,
    customers: HashMap<String, CustomerContact>,
    failure: Option<String>,
    checkout_calls: AtomicUsize,
    subscription_calls: AtomicUsize,
    customer_calls: AtomicUsize,
    last_checkout: Mutex<Option<CheckoutRequest>>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with the given provider message
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_subscription(mut self, snapshot: SubscriptionSnapshot) -> Self {
        self.subscriptions.insert(snapshot.id.clone(), snapshot);
        self
    }

    #[must_use]
    pub fn with_customer(mut self, customer_id: impl Into<String>, contact: CustomerContact) -> Self {
        self.customers.insert(customer_id.into(), contact);
        self
    }

    pub fn checkout_calls(&self) -> usize {
        self.checkout_calls.load(Ordering::SeqCst)
    }

    pub fn subscription_calls(&self) -> usize {
        self.subscription_calls.load(Ordering::SeqCst)
    }

    pub fn customer_calls(&self) -> usize {
        self.customer_calls.load(Ordering::SeqCst)
    }

    /// Total outbound calls of any kind
    pub fn total_calls(&self) -> usize {
        self.checkout_calls() + self.subscription_calls() + self.customer_calls()
    }

    pub fn last_checkout(&self) -> Option<CheckoutRequest> {
        guard(&self.last_checkout).clone()
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure {
            Some(ref msg) => Err(PaymentError::Stripe(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let n = self.checkout_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *guard(&self.last_checkout) = Some(request.clone());
        self.check_failure()?;

        let id = format!("cs_test_{n}");
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.com/c/pay/{id}"),
            id,
            plan_key: request.plan_key.clone(),
            price_id: request.price_id.clone(),
        })
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionSnapshot> {
        self.subscription_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        self.subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| PaymentError::Stripe(format!("No such subscription: '{subscription_id}'")))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Result<CustomerContact> {
        self.customer_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        self.customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| PaymentError::Stripe(format!("No such customer: '{customer_id}'")))
    }
}

/// Sink that keeps records in memory
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<SubscriptionRecord>>,
    failure: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every forward fails with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    pub fn records(&self) -> Vec<SubscriptionRecord> {
        guard(&self.records).clone()
    }

    pub fn len(&self) -> usize {
        guard(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn forward(&self, record: &SubscriptionRecord) -> Result<()> {
        if let Some(ref msg) = self.failure {
            return Err(PaymentError::Sink(msg.clone()));
        }
        guard(&self.records).push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_counts_calls() {
        let provider = MockBillingProvider::new().with_customer(
            "cus_1",
            CustomerContact {
                email: Some("a@example.com".into()),
                name: None,
            },
        );

        let contact = provider.retrieve_customer("cus_1").await.unwrap();
        assert_eq!(contact.email.as_deref(), Some("a@example.com"));
        assert!(provider.retrieve_subscription("sub_missing").await.is_err());

        assert_eq!(provider.customer_calls(), 1);
        assert_eq!(provider.subscription_calls(), 1);
        assert_eq!(provider.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let sink = MemorySink::new();
        sink.forward(&SubscriptionRecord::new("evt_1", "invoice.paid", "pro")).await.unwrap();
        assert_eq!(sink.len(), 1);

        let failing = MemorySink::failing("503");
        assert!(failing.forward(&SubscriptionRecord::new("evt_2", "invoice.paid", "pro")).await.is_err());
        assert!(failing.is_empty());
    }
}
