//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use billing_relay::{CheckoutInput, PaymentError, WebhookOutcome, SIGNATURE_HEADER};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub forwarded: bool,
    pub event_type: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn reject(err: &PaymentError) -> ApiError {
    let status = if err.is_client_error() {
        tracing::warn!(error = %err, "Rejected request");
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!(error = %err, "Request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.code().into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Create a checkout session from a JSON body
///
/// An empty body is treated as `{}` and fails plan validation.
pub async fn create_checkout(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let input: CheckoutInput = if body.iter().all(u8::is_ascii_whitespace) {
        CheckoutInput::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| reject(&PaymentError::InvalidRequest(format!("body is not valid JSON: {e}"))))?
    };

    let session = state.checkout.start(&input).await.map_err(|e| reject(&e))?;

    Ok(Json(CheckoutResponse {
        url: session.url,
        session_id: session.id,
    }))
}

/// Create a checkout session from query parameters and redirect to it
pub async fn checkout_redirect(
    State(state): State<AppState>,
    Query(input): Query<CheckoutInput>,
) -> Result<Response, ApiError> {
    let session = state.checkout.start(&input).await.map_err(|e| reject(&e))?;

    Ok((StatusCode::FOUND, [(header::LOCATION, session.url)]).into_response())
}

/// CORS preflight without an `Access-Control-Request-Method`
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let outcome = state
        .webhooks
        .receive(&body, signature)
        .await
        .map_err(|e| reject(&e))?;

    let ack = match outcome {
        WebhookOutcome::Forwarded(record) => WebhookAck {
            received: true,
            forwarded: true,
            event_type: record.event_type,
        },
        WebhookOutcome::Ignored { event_type } => WebhookAck {
            received: true,
            forwarded: false,
            event_type,
        },
    };

    Ok(Json(ack))
}

/// Fallback for unsupported methods on known routes
pub async fn method_not_allowed() -> ApiError {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse {
            error: "Method Not Allowed".into(),
            code: "METHOD_NOT_ALLOWED".into(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use billing_relay::{
        mock::{MemorySink, MockBillingProvider},
        signature::{sign, DEFAULT_TOLERANCE_SECS},
        CheckoutInitiator, CheckoutUrls, PlanCatalog, SignatureVerifier, SubscriptionSnapshot,
        WebhookProcessor,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SECRET: &str = "whsec_server_test";

    struct TestApp {
        router: Router,
        provider: Arc<MockBillingProvider>,
        sink: Arc<MemorySink>,
    }

    fn test_app_with(provider: MockBillingProvider, sink: MemorySink) -> TestApp {
        let provider = Arc::new(provider);
        let sink = Arc::new(sink);
        let catalog = Arc::new(PlanCatalog::parse("starter_monthly=price_sm,business_yearly=price_by").unwrap());

        let state = AppState {
            checkout: Arc::new(CheckoutInitiator::new(
                provider.clone(),
                catalog.clone(),
                CheckoutUrls::default(),
            )),
            webhooks: Arc::new(WebhookProcessor::new(
                SignatureVerifier::new(SECRET, DEFAULT_TOLERANCE_SECS).unwrap(),
                provider.clone(),
                sink.clone(),
                catalog,
            )),
        };

        TestApp {
            router: crate::router(state),
            provider,
            sink,
        }
    }

    fn test_app() -> TestApp {
        test_app_with(MockBillingProvider::new(), MemorySink::new())
    }

    fn now() -> i64 {
        let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        i64::try_from(secs).unwrap()
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn webhook_request(payload: &[u8], signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/api/webhook");
        if let Some(sig) = signature {
            builder = builder.header(SIGNATURE_HEADER, sig);
        }
        builder.body(Body::from(payload.to_vec())).unwrap()
    }

    fn subscription_event(event_type: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_srv",
            "type": event_type,
            "data": {"object": {
                "id": "sub_1",
                "status": "active",
                "customer_email": "sub@example.com",
                "items": {"data": [{"price": {"id": "price_by"}}]},
            }},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_post_checkout_returns_url() {
        let app = test_app();
        let request = Request::post("/api/checkout")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"priceId":"price_sm","email":"a@example.com"}"#))
            .unwrap();

        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["url"].as_str().unwrap().starts_with("https://checkout.stripe.com/"));
        assert_eq!(body["session_id"], "cs_test_1");
        assert_eq!(app.provider.checkout_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_checkout_redirects() {
        let app = test_app();
        let request = Request::get("/api/checkout?plan=business_yearly&origin=https://app.example.com")
            .body(Body::empty())
            .unwrap();

        let (status, headers, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[header::LOCATION], "https://checkout.stripe.com/c/pay/cs_test_1");
        assert_eq!(
            app.provider.last_checkout().unwrap().cancel_url,
            "https://app.example.com/paywall"
        );
    }

    #[tokio::test]
    async fn test_unmapped_plan_is_client_error() {
        let app = test_app();

        let request = Request::post("/api/checkout")
            .body(Body::from(r#"{"plan":"platinum"}"#))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PLAN");

        let request = Request::post("/api/checkout").body(Body::empty()).unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_PLAN");

        let request = Request::post("/api/checkout").body(Body::from("{oops")).unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::get("/api/checkout?plan=platinum").body(Body::empty()).unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(app.provider.checkout_calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_relays_message() {
        let app = test_app_with(MockBillingProvider::failing("Invalid API Key provided"), MemorySink::new());
        let request = Request::post("/api/checkout")
            .body(Body::from(r#"{"plan":"starter_monthly"}"#))
            .unwrap();

        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Invalid API Key provided");
    }

    #[tokio::test]
    async fn test_unsupported_methods() {
        let app = test_app();

        for (method, uri) in [
            ("PUT", "/api/checkout"),
            ("DELETE", "/api/checkout"),
            ("GET", "/api/webhook"),
            ("PUT", "/api/stripe-webhook"),
        ] {
            let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
            let (status, _, body) = send(&app, request).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
            assert_eq!(body["code"], "METHOD_NOT_ALLOWED");
        }

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/checkout")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(app.provider.total_calls(), 0);
        assert!(app.sink.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_forwards_record() {
        let app = test_app();
        let payload = subscription_event("customer.subscription.created");
        let signature = sign(&payload, SECRET, now()).unwrap();

        let (status, _, body) = send(&app, webhook_request(&payload, Some(signature))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], true);
        assert_eq!(body["forwarded"], true);

        let records = app.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].plan_name, "business_yearly");
        assert_eq!(records[0].customer_email.as_deref(), Some("sub@example.com"));
    }

    #[tokio::test]
    async fn test_webhook_alias_route() {
        let app = test_app();
        let payload = subscription_event("customer.subscription.updated");
        let signature = sign(&payload, SECRET, now()).unwrap();
        let request = Request::post("/api/stripe-webhook")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(payload))
            .unwrap();

        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.sink.len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_bad_signature_is_400_without_forwarding() {
        let app = test_app_with(
            MockBillingProvider::new().with_subscription(SubscriptionSnapshot {
                id: "sub_1".into(),
                ..Default::default()
            }),
            MemorySink::new(),
        );
        let payload = subscription_event("customer.subscription.created");

        let forged = sign(&payload, "whsec_attacker", now()).unwrap();
        let (status, _, body) = send(&app, webhook_request(&payload, Some(forged))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_SIGNATURE");

        let (status, _, _) = send(&app, webhook_request(&payload, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(app.sink.is_empty());
        assert_eq!(app.provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_webhook_ignored_event_acknowledged() {
        let app = test_app();
        let payload = serde_json::to_vec(&json!({
            "id": "evt_x",
            "type": "payment_intent.created",
            "data": {"object": {"id": "pi_1"}},
        }))
        .unwrap();
        let signature = sign(&payload, SECRET, now()).unwrap();

        let (status, _, body) = send(&app, webhook_request(&payload, Some(signature))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["forwarded"], false);
        assert_eq!(body["event_type"], "payment_intent.created");
        assert!(app.sink.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_sink_failure_is_500() {
        let app = test_app_with(MockBillingProvider::new(), MemorySink::failing("sheet down"));
        let payload = subscription_event("customer.subscription.created");
        let signature = sign(&payload, SECRET, now()).unwrap();

        let (status, _, body) = send(&app, webhook_request(&payload, Some(signature))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "SINK_ERROR");
    }
}
