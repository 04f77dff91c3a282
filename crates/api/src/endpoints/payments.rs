//! Payment endpoints: Stripe and PayPal subscription lifecycle plus
//! webhook receivers.

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use founder_common::{AppError, AppResult};
use founder_core::{BillingService, BillingStatus, PayPalWebhookHeaders};
use founder_db::entities::user::Plan;
use serde::{Deserialize, Serialize};

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Create-subscription request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub plan: Plan,
}

/// Start a Stripe subscription.
async fn stripe_create_subscription(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> AppResult<ApiResponse<founder_core::StripeSubscriptionResponse>> {
    let response = state
        .billing_service
        .create_stripe_subscription(&user, req.plan)
        .await?;

    Ok(ApiResponse::ok(response))
}

/// Start a PayPal subscription.
async fn paypal_create_subscription(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> AppResult<ApiResponse<founder_core::PayPalSubscriptionResponse>> {
    let response = state
        .billing_service
        .create_paypal_subscription(&user, req.plan)
        .await?;

    Ok(ApiResponse::ok(response))
}

/// Subscription status for the caller.
async fn status(AuthUser(user): AuthUser) -> AppResult<ApiResponse<BillingStatus>> {
    Ok(ApiResponse::ok(BillingService::status(&user)))
}

/// Cancel response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub ok: bool,
}

/// Cancel the caller's subscription.
async fn cancel_subscription(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CancelResponse>> {
    state.billing_service.cancel_subscription(&user).await?;
    Ok(ApiResponse::ok(CancelResponse { ok: true }))
}

/// Stripe webhook envelope.
#[derive(Debug, Deserialize)]
struct StripeWebhook {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

/// Webhook acknowledgement.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
}

/// Receive a Stripe webhook.
///
/// The signature is verified against the raw body before any parsing of the
/// payload.
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<ApiResponse<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe signature".to_string()))?;

    state
        .billing_service
        .verify_stripe_signature(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid Stripe webhook signature");
            e
        })?;

    let webhook: StripeWebhook =
        serde_json::from_str(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %webhook.event_type,
        event_id = %webhook.id,
        "Received Stripe webhook"
    );

    state
        .billing_service
        .handle_stripe_event(&webhook.id, &webhook.event_type, &webhook.data.object)
        .await?;

    Ok(ApiResponse::ok(WebhookAck { received: true }))
}

/// PayPal webhook envelope.
#[derive(Debug, Deserialize)]
struct PayPalWebhook {
    id: String,
    event_type: String,
    resource: serde_json::Value,
}

fn paypal_headers(headers: &HeaderMap) -> AppResult<PayPalWebhookHeaders> {
    let get = |name: &str| -> AppResult<String> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .ok_or_else(|| AppError::BadRequest(format!("Missing header: {name}")))
    };

    Ok(PayPalWebhookHeaders {
        transmission_id: get("paypal-transmission-id")?,
        transmission_time: get("paypal-transmission-time")?,
        transmission_sig: get("paypal-transmission-sig")?,
        cert_url: get("paypal-cert-url")?,
        auth_algo: get("paypal-auth-algo")?,
    })
}

/// Receive a PayPal webhook.
async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<ApiResponse<WebhookAck>> {
    let event_body: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let transmission = paypal_headers(&headers)?;
    state
        .billing_service
        .verify_paypal_transmission(&transmission, &event_body)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid PayPal webhook transmission");
            e
        })?;

    let webhook: PayPalWebhook =
        serde_json::from_value(event_body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %webhook.event_type,
        event_id = %webhook.id,
        "Received PayPal webhook"
    );

    state
        .billing_service
        .handle_paypal_event(&webhook.id, &webhook.event_type, &webhook.resource)
        .await?;

    Ok(ApiResponse::ok(WebhookAck { received: true }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stripe/create-subscription", post(stripe_create_subscription))
        .route("/stripe/webhook", post(stripe_webhook))
        .route("/paypal/create-subscription", post(paypal_create_subscription))
        .route("/paypal/webhook", post(paypal_webhook))
        .route("/status", get(status))
        .route("/cancel-subscription", post(cancel_subscription))
}
