//! billing-relay HTTP Server
//!
//! Axum server exposing Stripe checkout creation and the webhook relay that
//! feeds the subscription sheet.

mod handlers;
mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use billing_relay::{
    BillingProvider, CheckoutInitiator, CheckoutUrls, HttpSink, PlanCatalog, SignatureVerifier,
    StripeClient, WebhookProcessor,
};

use crate::handlers::{
    checkout_redirect, create_checkout, health_check, method_not_allowed, preflight,
    stripe_webhook,
};
use crate::state::AppState;

/// Routes without the transport layers
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/checkout",
            get(checkout_redirect)
                .post(create_checkout)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route("/api/webhook", post(stripe_webhook).fallback(method_not_allowed))
        .route("/api/stripe-webhook", post(stripe_webhook).fallback(method_not_allowed))
        .with_state(state)
}

/// CORS for the checkout endpoint; `*` or unset allows any origin
fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Ok(match origin.map(str::trim) {
        None | Some("" | "*") => cors.allow_origin(Any),
        Some(origin) => cors.allow_origin(
            HeaderValue::from_str(origin).with_context(|| format!("CORS_ORIGIN '{origin}' is not a valid header value"))?,
        ),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Everything below is required; a missing signing secret must stop start-up
    let provider: Arc<dyn BillingProvider> =
        Arc::new(StripeClient::from_env().context("Stripe is not configured")?);
    let catalog = Arc::new(PlanCatalog::from_env().context("plan catalog is not configured")?);
    let verifier = SignatureVerifier::from_env().context("webhook verification is not configured")?;
    let sink = HttpSink::from_env().context("sheet sink is not configured")?;
    let urls = CheckoutUrls::from_env().context("checkout URLs are invalid")?;

    tracing::info!("✓ Stripe configured");
    tracing::info!("Loaded {} plans:", catalog.len());
    for plan in catalog.iter() {
        tracing::info!("  • {} → {}", plan.plan_key, plan.price_id);
    }
    tracing::info!(sink = %sink.url(), "✓ Sheet sink configured");

    // Build application state
    let state = AppState {
        checkout: Arc::new(CheckoutInitiator::new(provider.clone(), catalog.clone(), urls)),
        webhooks: Arc::new(WebhookProcessor::new(verifier, provider, Arc::new(sink), catalog)),
    };

    let cors = cors_layer(std::env::var("CORS_ORIGIN").ok().as_deref())?;

    let app = router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 billing-relay running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health              - Health check");
    tracing::info!("  POST /api/checkout        - Create checkout session (JSON)");
    tracing::info!("  GET  /api/checkout        - Create checkout session (302 redirect)");
    tracing::info!("  POST /api/webhook         - Stripe webhook relay");

    axum::serve(listener, app).await?;

    Ok(())
}
