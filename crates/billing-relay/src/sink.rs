//! Sheet Sink
//!
//! Forwards normalized records to the spreadsheet web app that acts as the
//! system of record.

use async_trait::async_trait;

use crate::error::{PaymentError, Result};
use crate::record::SubscriptionRecord;

/// Header carrying the sink API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Destination for normalized records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Deliver one record; any failure is reported, never retried here
    async fn forward(&self, record: &SubscriptionRecord) -> Result<()>;
}

/// JSON-over-HTTP sink (Google Apps Script web app or similar)
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup("SHEETS_WEBAPP_URL")
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| PaymentError::Config("SHEETS_WEBAPP_URL not set".into()))?;
        url::Url::parse(url.trim())
            .map_err(|e| PaymentError::Config(format!("SHEETS_WEBAPP_URL is invalid: {e}")))?;

        let api_key = lookup("SHEETS_API_KEY").or_else(|| lookup("ADMIN_KEY"));

        Ok(Self::new(url.trim(), api_key))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RecordSink for HttpSink {
    async fn forward(&self, record: &SubscriptionRecord) -> Result<()> {
        let mut request = self.client.post(&self.url).json(record);
        if let Some(ref key) = self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, event_id = %record.event_id, "Sheet sink unreachable");
            PaymentError::Sink(e.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            tracing::info!(status = %status, event_id = %record.event_id, response = %body, "Sheet sink accepted record");
            Ok(())
        } else {
            tracing::error!(status = %status, event_id = %record.event_id, response = %body, "Sheet sink rejected record");
            Err(PaymentError::Sink(format!("sink responded {status}")))
        }
    }
}
