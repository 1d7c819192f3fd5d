//! Plan Catalog
//!
//! Maps human-readable plan keys (`starter_monthly`, `business_yearly`, ...)
//! to Stripe price ids and back.

use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// Label used when a price id has no plan in the catalog
pub const DEFAULT_FALLBACK_LABEL: &str = "unknown";

/// A resolved catalog entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSelection {
    pub plan_key: String,
    pub price_id: String,
}

/// Fixed plan key <-> price id mapping
#[derive(Clone, Debug)]
pub struct PlanCatalog {
    entries: Vec<PlanSelection>,
    fallback_label: String,
}

impl PlanCatalog {
    /// Build a catalog from `(plan_key, price_id)` pairs
    pub fn new<K, P>(entries: impl IntoIterator<Item = (K, P)>) -> Result<Self>
    where
        K: Into<String>,
        P: Into<String>,
    {
        let mut catalog = Self {
            entries: Vec::new(),
            fallback_label: DEFAULT_FALLBACK_LABEL.into(),
        };

        for (key, price) in entries {
            catalog.insert(key.into(), price.into())?;
        }

        if catalog.entries.is_empty() {
            return Err(PaymentError::Config("plan catalog is empty".into()));
        }

        Ok(catalog)
    }

    /// Parse `key=price_id` pairs separated by commas
    pub fn parse(raw: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, price) = entry.split_once('=').ok_or_else(|| {
                PaymentError::Config(format!("plan entry '{entry}' is not key=price_id"))
            })?;
            pairs.push((key.trim().to_string(), price.trim().to_string()));
        }
        Self::new(pairs)
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = lookup("PLAN_PRICES")
            .ok_or_else(|| PaymentError::Config("PLAN_PRICES not set".into()))?;
        let catalog = Self::parse(&raw)?;

        Ok(match lookup("PLAN_FALLBACK_LABEL") {
            Some(label) if !label.trim().is_empty() => catalog.with_fallback_label(label.trim()),
            _ => catalog,
        })
    }

    /// Override the label used for unmapped price ids
    #[must_use]
    pub fn with_fallback_label(mut self, label: impl Into<String>) -> Self {
        self.fallback_label = label.into();
        self
    }

    fn insert(&mut self, key: String, price_id: String) -> Result<()> {
        let plan_key = key.to_lowercase();
        if plan_key.is_empty() || price_id.is_empty() {
            return Err(PaymentError::Config(format!(
                "plan entry '{key}={price_id}' has an empty side"
            )));
        }
        if self.entries.iter().any(|e| e.plan_key == plan_key) {
            return Err(PaymentError::Config(format!("duplicate plan key '{plan_key}'")));
        }

        self.entries.push(PlanSelection { plan_key, price_id });
        Ok(())
    }

    /// Resolve a plan key or a known price id
    pub fn resolve(&self, selector: &str) -> Result<PlanSelection> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(PaymentError::MissingPlan);
        }

        let key = selector.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.plan_key == key)
            .or_else(|| self.entries.iter().find(|e| e.price_id == selector))
            .cloned()
            .ok_or_else(|| PaymentError::InvalidPlan(selector.to_string()))
    }

    /// Price id for a plan key
    pub fn price_for(&self, plan_key: &str) -> Option<&str> {
        let key = plan_key.trim().to_lowercase();
        self.entries
            .iter()
            .find(|e| e.plan_key == key)
            .map(|e| e.price_id.as_str())
    }

    /// Plan name for a price id, or the fallback label
    pub fn plan_for_price(&self, price_id: &str) -> &str {
        self.entries
            .iter()
            .find(|e| e.price_id == price_id)
            .map_or(self.fallback_label.as_str(), |e| e.plan_key.as_str())
    }

    pub fn fallback_label(&self) -> &str {
        &self.fallback_label
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanSelection> {
        self.entries.iter()
    }
}
