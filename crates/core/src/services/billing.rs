//! Billing service: Stripe and PayPal subscription lifecycle plus
//! webhook-driven state synchronization.
//!
//! Webhook mutations are idempotent sets on the user row, and every event id
//! passes through the processed-event ledger first, so provider redeliveries
//! are acknowledged without being re-applied.

use chrono::Utc;
use founder_common::{AppError, AppResult, config::BillingConfig};
use founder_db::{
    entities::{user, user::Plan},
    repositories::{ProcessedWebhookEventRepository, UserRepository},
};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::crypto::{constant_time_eq, hmac_sha256_hex};
use crate::services::email::EmailService;
use crate::services::sso::SsoService;

/// Accepted clock skew for Stripe signatures, in seconds.
const STRIPE_SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Monthly prompt quota granted to standard-plan subscribers.
const STANDARD_PLAN_QUOTA: i32 = 50;

// ==================== Stripe client ====================

/// Minimal Stripe REST client (form-encoded, basic-auth).
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_key: String,
    webhook_secret: Option<String>,
}

/// Stripe customer.
#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    /// Customer id (`cus_...`).
    pub id: String,
}

/// Stripe subscription.
#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    /// Subscription id (`sub_...`).
    pub id: String,
    /// Subscription status (`active`, `incomplete`, ...).
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

impl StripeClient {
    const BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a new Stripe client.
    #[must_use]
    pub fn new(api_key: impl Into<String>, webhook_secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.into(),
            webhook_secret,
        }
    }

    /// Create a customer carrying our user id as metadata.
    pub async fn create_customer(
        &self,
        user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> AppResult<StripeCustomer> {
        let mut params = vec![("metadata[user_id]", user_id.to_string())];
        if let Some(email) = email {
            params.push(("email", email.to_string()));
        }
        if let Some(name) = name {
            params.push(("name", name.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/customers", Self::BASE_URL))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("Stripe request failed: {e}")))?;

        Self::handle_response(response).await
    }

    /// Create a subscription on a price.
    pub async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
    ) -> AppResult<StripeSubscription> {
        let params = vec![
            ("customer", customer_id.to_string()),
            ("items[0][price]", price_id.to_string()),
            ("payment_behavior", "default_incomplete".to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/subscriptions", Self::BASE_URL))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("Stripe request failed: {e}")))?;

        Self::handle_response(response).await
    }

    /// Cancel a subscription immediately.
    pub async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<()> {
        let response = self
            .client
            .delete(format!("{}/subscriptions/{subscription_id}", Self::BASE_URL))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("Stripe request failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    /// Verify a `Stripe-Signature` header against the raw payload.
    ///
    /// The header carries `t=<timestamp>,v1=<hmac>,...`; the signed message
    /// is `"{t}.{payload}"`. Comparison is constant-time and the timestamp
    /// must be within the tolerance window.
    pub fn verify_webhook_signature(&self, payload: &str, sig_header: &str) -> AppResult<()> {
        let secret = self.webhook_secret.as_deref().ok_or_else(|| {
            AppError::Config("Stripe webhook secret not configured".to_string())
        })?;

        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in sig_header.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| AppError::BadRequest("Malformed Stripe signature".to_string()))?;

        if (Utc::now().timestamp() - timestamp).abs() > STRIPE_SIGNATURE_TOLERANCE_SECS {
            return Err(AppError::BadRequest(
                "Stripe signature timestamp outside tolerance".to_string(),
            ));
        }

        let signed_payload = format!("{timestamp}.{payload}");
        let expected = hmac_sha256_hex(secret, &signed_payload);

        if signatures.iter().any(|sig| constant_time_eq(sig, &expected)) {
            Ok(())
        } else {
            Err(AppError::BadRequest(
                "Invalid Stripe webhook signature".to_string(),
            ))
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> AppResult<T> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| AppError::Payment(format!("Malformed Stripe response: {e}")))
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    async fn error_from_response(response: reqwest::Response) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if let Ok(parsed) = serde_json::from_str::<StripeErrorBody>(&body) {
            AppError::Payment(format!(
                "Stripe error ({}): {}",
                parsed.error.error_type.unwrap_or_else(|| status.to_string()),
                parsed.error.message.unwrap_or_default()
            ))
        } else {
            AppError::Payment(format!("Stripe error: {status}"))
        }
    }
}

// ==================== PayPal client ====================

/// Minimal PayPal REST client (OAuth client-credentials, JSON).
#[derive(Clone)]
pub struct PayPalClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    base_url: String,
}

/// PayPal subscription.
#[derive(Debug, Deserialize)]
pub struct PayPalSubscription {
    /// Subscription id (`I-...`).
    pub id: String,
    /// Subscription status.
    pub status: String,
    /// HATEOAS links; the `approve` link starts the buyer flow.
    #[serde(default)]
    pub links: Vec<PayPalLink>,
}

/// A PayPal HATEOAS link.
#[derive(Debug, Deserialize)]
pub struct PayPalLink {
    /// Relation name.
    pub rel: String,
    /// Target URL.
    pub href: String,
}

impl PayPalSubscription {
    /// The approval URL the buyer must visit, if present.
    #[must_use]
    pub fn approve_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct PayPalTokenResponse {
    access_token: String,
}

impl PayPalClient {
    /// Create a new PayPal client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, sandbox: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let base_url = if sandbox {
            "https://api-m.sandbox.paypal.com".to_string()
        } else {
            "https://api-m.paypal.com".to_string()
        };

        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url,
        }
    }

    async fn access_token(&self) -> AppResult<String> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("PayPal token request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Payment(format!(
                "PayPal token error: {}",
                response.status()
            )));
        }

        let token: PayPalTokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Payment(format!("Malformed PayPal token response: {e}")))?;

        Ok(token.access_token)
    }

    /// Create a subscription on a billing plan.
    pub async fn create_subscription(
        &self,
        plan_id: &str,
        user_id: &str,
    ) -> AppResult<PayPalSubscription> {
        let token = self.access_token().await?;

        let body = json!({
            "plan_id": plan_id,
            "custom_id": user_id,
        });

        let response = self
            .client
            .post(format!("{}/v1/billing/subscriptions", self.base_url))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("PayPal request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Payment(format!(
                "PayPal subscription error: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Payment(format!("Malformed PayPal response: {e}")))
    }

    /// Cancel a subscription.
    pub async fn cancel_subscription(&self, subscription_id: &str, reason: &str) -> AppResult<()> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!(
                "{}/v1/billing/subscriptions/{subscription_id}/cancel",
                self.base_url
            ))
            .bearer_auth(&token)
            .json(&json!({ "reason": reason }))
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("PayPal request failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::Payment(format!(
                "PayPal cancel error: {}",
                response.status()
            )))
        }
    }

    /// Verify a webhook transmission through PayPal's verification API.
    pub async fn verify_webhook(
        &self,
        webhook_id: &str,
        headers: &PayPalWebhookHeaders,
        event_body: &serde_json::Value,
    ) -> AppResult<bool> {
        let token = self.access_token().await?;

        let body = json!({
            "auth_algo": headers.auth_algo,
            "cert_url": headers.cert_url,
            "transmission_id": headers.transmission_id,
            "transmission_sig": headers.transmission_sig,
            "transmission_time": headers.transmission_time,
            "webhook_id": webhook_id,
            "webhook_event": event_body,
        });

        let response = self
            .client
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.base_url
            ))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("PayPal verify request failed: {e}")))?;

        #[derive(Deserialize)]
        struct VerifyResponse {
            verification_status: String,
        }

        let verify: VerifyResponse = response
            .json()
            .await
            .map_err(|e| AppError::Payment(format!("Malformed PayPal verify response: {e}")))?;

        Ok(verify.verification_status == "SUCCESS")
    }
}

/// Transmission headers PayPal attaches to webhook deliveries.
#[derive(Debug, Clone)]
pub struct PayPalWebhookHeaders {
    pub transmission_id: String,
    pub transmission_time: String,
    pub transmission_sig: String,
    pub cert_url: String,
    pub auth_algo: String,
}

// ==================== Billing service ====================

/// Subscription status reported to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingStatus {
    pub plan: Plan,
    pub is_premium: bool,
    pub is_active: bool,
    pub payment_status: Option<String>,
    pub remaining_prompts: i32,
}

/// Response after starting a Stripe subscription.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeSubscriptionResponse {
    pub customer_id: String,
    pub subscription_id: String,
    pub status: String,
}

/// Response after starting a PayPal subscription.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPalSubscriptionResponse {
    pub subscription_id: String,
    pub status: String,
    pub approve_url: Option<String>,
}

/// Billing service.
#[derive(Clone)]
pub struct BillingService {
    config: BillingConfig,
    user_repo: UserRepository,
    ledger: ProcessedWebhookEventRepository,
    stripe: Option<StripeClient>,
    paypal: Option<PayPalClient>,
    email: Option<EmailService>,
    sso: Option<SsoService>,
}

impl BillingService {
    /// Create a new billing service from configuration.
    #[must_use]
    pub fn new(
        config: BillingConfig,
        user_repo: UserRepository,
        ledger: ProcessedWebhookEventRepository,
    ) -> Self {
        let stripe = config
            .stripe_secret_key
            .as_ref()
            .map(|key| StripeClient::new(key.clone(), config.stripe_webhook_secret.clone()));

        let paypal = match (&config.paypal_client_id, &config.paypal_client_secret) {
            (Some(id), Some(secret)) => Some(PayPalClient::new(
                id.clone(),
                secret.clone(),
                config.paypal_sandbox,
            )),
            _ => None,
        };

        Self {
            config,
            user_repo,
            ledger,
            stripe,
            paypal,
            email: None,
            sso: None,
        }
    }

    /// Set the email service for billing notifications.
    pub fn set_email(&mut self, email: EmailService) {
        self.email = Some(email);
    }

    /// Set the SSO service for subscription-change webhooks.
    pub fn set_sso(&mut self, sso: SsoService) {
        self.sso = Some(sso);
    }

    fn stripe(&self) -> AppResult<&StripeClient> {
        self.stripe
            .as_ref()
            .ok_or_else(|| AppError::Config("Stripe not configured".to_string()))
    }

    fn paypal(&self) -> AppResult<&PayPalClient> {
        self.paypal
            .as_ref()
            .ok_or_else(|| AppError::Config("PayPal not configured".to_string()))
    }

    /// The Stripe price id for a plan.
    fn stripe_price_for(&self, plan: Plan) -> AppResult<&str> {
        let price = match plan {
            Plan::Standard => self.config.stripe_standard_price_id.as_deref(),
            Plan::Founder => self.config.stripe_founder_price_id.as_deref(),
            Plan::Free => None,
        };
        price.ok_or_else(|| AppError::BadRequest("No price configured for this plan".to_string()))
    }

    /// The plan a Stripe price id maps back to.
    fn plan_for_stripe_price(&self, price_id: &str) -> Option<Plan> {
        if self.config.stripe_standard_price_id.as_deref() == Some(price_id) {
            Some(Plan::Standard)
        } else if self.config.stripe_founder_price_id.as_deref() == Some(price_id) {
            Some(Plan::Founder)
        } else {
            None
        }
    }

    /// The PayPal plan id for a plan.
    fn paypal_plan_for(&self, plan: Plan) -> AppResult<&str> {
        let id = match plan {
            Plan::Standard => self.config.paypal_standard_plan_id.as_deref(),
            Plan::Founder => self.config.paypal_founder_plan_id.as_deref(),
            Plan::Free => None,
        };
        id.ok_or_else(|| AppError::BadRequest("No PayPal plan configured for this plan".to_string()))
    }

    /// Quota granted on (re)activation of a plan.
    const fn quota_for(plan: Plan) -> i32 {
        match plan {
            Plan::Standard => STANDARD_PLAN_QUOTA,
            Plan::Free | Plan::Founder => 0,
        }
    }

    /// Current billing status for a user.
    #[must_use]
    pub fn status(user: &user::Model) -> BillingStatus {
        BillingStatus {
            plan: user.plan,
            is_premium: user.is_premium,
            is_active: user.is_active,
            payment_status: user.payment_status.clone(),
            remaining_prompts: user.remaining_prompts,
        }
    }

    // ==================== Subscription lifecycle ====================

    /// Start a Stripe subscription for a paid plan.
    pub async fn create_stripe_subscription(
        &self,
        user: &user::Model,
        plan: Plan,
    ) -> AppResult<StripeSubscriptionResponse> {
        if plan == Plan::Free {
            return Err(AppError::BadRequest(
                "Cannot subscribe to the free plan".to_string(),
            ));
        }

        let stripe = self.stripe()?;
        let price_id = self.stripe_price_for(plan)?;

        let customer_id = match &user.stripe_customer_id {
            Some(id) => id.clone(),
            None => {
                stripe
                    .create_customer(
                        &user.id,
                        user.email.as_deref(),
                        user.display_name.as_deref(),
                    )
                    .await?
                    .id
            }
        };

        let subscription = stripe.create_subscription(&customer_id, price_id).await?;

        let fresh = self.user_repo.get_by_id(&user.id).await?;
        let mut active: user::ActiveModel = fresh.into();
        active.plan = Set(plan);
        active.stripe_customer_id = Set(Some(customer_id.clone()));
        active.stripe_subscription_id = Set(Some(subscription.id.clone()));
        active.payment_status = Set(Some("pending".to_string()));
        active.updated_at = Set(Some(Utc::now().into()));
        self.user_repo.update(active).await?;

        Ok(StripeSubscriptionResponse {
            customer_id,
            subscription_id: subscription.id,
            status: subscription.status,
        })
    }

    /// Start a PayPal subscription for a paid plan.
    pub async fn create_paypal_subscription(
        &self,
        user: &user::Model,
        plan: Plan,
    ) -> AppResult<PayPalSubscriptionResponse> {
        if plan == Plan::Free {
            return Err(AppError::BadRequest(
                "Cannot subscribe to the free plan".to_string(),
            ));
        }

        let paypal = self.paypal()?;
        let plan_id = self.paypal_plan_for(plan)?;

        let subscription = paypal.create_subscription(plan_id, &user.id).await?;
        let approve_url = subscription.approve_url().map(ToString::to_string);

        let fresh = self.user_repo.get_by_id(&user.id).await?;
        let mut active: user::ActiveModel = fresh.into();
        active.plan = Set(plan);
        active.paypal_subscription_id = Set(Some(subscription.id.clone()));
        active.payment_status = Set(Some("pending".to_string()));
        active.updated_at = Set(Some(Utc::now().into()));
        self.user_repo.update(active).await?;

        Ok(PayPalSubscriptionResponse {
            subscription_id: subscription.id,
            status: subscription.status,
            approve_url,
        })
    }

    /// Cancel the user's subscription with whichever provider holds it.
    pub async fn cancel_subscription(&self, user: &user::Model) -> AppResult<()> {
        if let Some(ref subscription_id) = user.stripe_subscription_id {
            self.stripe()?.cancel_subscription(subscription_id).await?;
        } else if let Some(ref subscription_id) = user.paypal_subscription_id {
            self.paypal()?
                .cancel_subscription(subscription_id, "Canceled by user")
                .await?;
        } else {
            return Err(AppError::BadRequest(
                "No active subscription to cancel".to_string(),
            ));
        }

        let fresh = self.user_repo.get_by_id(&user.id).await?;
        let mut active: user::ActiveModel = fresh.into();
        active.plan = Set(Plan::Free);
        active.is_premium = Set(false);
        active.payment_status = Set(Some("canceled".to_string()));
        active.stripe_subscription_id = Set(None);
        active.paypal_subscription_id = Set(None);
        active.updated_at = Set(Some(Utc::now().into()));
        let updated = self.user_repo.update(active).await?;

        self.notify_change(&updated, "canceled").await;

        Ok(())
    }

    /// Verify a Stripe webhook signature.
    pub fn verify_stripe_signature(&self, payload: &str, sig_header: &str) -> AppResult<()> {
        self.stripe()?.verify_webhook_signature(payload, sig_header)
    }

    /// Verify a PayPal webhook transmission. Without a configured webhook id
    /// verification is skipped (development mode).
    pub async fn verify_paypal_transmission(
        &self,
        headers: &PayPalWebhookHeaders,
        event_body: &serde_json::Value,
    ) -> AppResult<()> {
        let Some(ref webhook_id) = self.config.paypal_webhook_id else {
            tracing::warn!("PayPal webhook id not configured - skipping verification");
            return Ok(());
        };

        let verified = self
            .paypal()?
            .verify_webhook(webhook_id, headers, event_body)
            .await?;

        if verified {
            Ok(())
        } else {
            Err(AppError::BadRequest(
                "Invalid PayPal webhook transmission".to_string(),
            ))
        }
    }

    // ==================== Webhook dispatch ====================

    /// Apply a verified Stripe event.
    ///
    /// Returns `false` when the event id was already in the ledger (replay).
    pub async fn handle_stripe_event(
        &self,
        event_id: &str,
        event_type: &str,
        object: &serde_json::Value,
    ) -> AppResult<bool> {
        if self.ledger.is_processed(event_id).await? {
            tracing::info!(event_id = %event_id, "Replayed Stripe event, skipping");
            return Ok(false);
        }

        match event_type {
            "payment_intent.succeeded" => {
                if let Some(user) = self.user_for_stripe_object(object).await? {
                    self.apply(&user, |active| {
                        active.payment_status = Set(Some("succeeded".to_string()));
                    })
                    .await?;
                }
            }
            "invoice.payment_succeeded" => {
                if let Some(user) = self.user_for_stripe_object(object).await? {
                    let plan = user.plan;
                    let updated = self
                        .apply(&user, |active| {
                            active.is_premium = Set(true);
                            active.is_active = Set(true);
                            active.payment_status = Set(Some("paid".to_string()));
                        })
                        .await?;
                    // Renewal refills the metered quota
                    if plan == Plan::Standard {
                        self.user_repo
                            .reset_prompts(&updated.id, Self::quota_for(plan))
                            .await?;
                    }
                    self.send_email(&updated, EmailKind::PaymentSucceeded).await;
                    self.notify_change(&updated, "paid").await;
                }
            }
            "invoice.payment_failed" => {
                if let Some(user) = self.user_for_stripe_object(object).await? {
                    let updated = self
                        .apply(&user, |active| {
                            active.is_active = Set(false);
                            active.payment_status = Set(Some("failed".to_string()));
                        })
                        .await?;
                    self.send_email(&updated, EmailKind::PaymentFailed).await;
                }
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                if let Some(user) = self.user_for_stripe_object(object).await? {
                    let subscription_id = object.get("id").and_then(|v| v.as_str());
                    let status = object
                        .get("status")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    let premium = matches!(status, "active" | "trialing");
                    let plan = self.plan_from_subscription_object(object);

                    let updated = self
                        .apply(&user, |active| {
                            if let Some(id) = subscription_id {
                                active.stripe_subscription_id = Set(Some(id.to_string()));
                            }
                            if let Some(plan) = plan {
                                active.plan = Set(plan);
                            }
                            active.is_premium = Set(premium);
                            active.payment_status = Set(Some(status.to_string()));
                        })
                        .await?;

                    if premium && plan == Some(Plan::Standard) && user.plan != Plan::Standard {
                        self.user_repo
                            .reset_prompts(&updated.id, Self::quota_for(Plan::Standard))
                            .await?;
                    }
                    self.notify_change(&updated, status).await;
                }
            }
            "customer.subscription.deleted" => {
                if let Some(user) = self.user_for_stripe_object(object).await? {
                    let updated = self
                        .apply(&user, |active| {
                            active.plan = Set(Plan::Free);
                            active.is_premium = Set(false);
                            active.payment_status = Set(Some("canceled".to_string()));
                            active.stripe_subscription_id = Set(None);
                        })
                        .await?;
                    self.send_email(&updated, EmailKind::Canceled).await;
                    self.notify_change(&updated, "canceled").await;
                }
            }
            other => {
                tracing::debug!(event_type = %other, "Unhandled Stripe event");
            }
        }

        self.ledger.record(event_id, "stripe").await?;
        Ok(true)
    }

    /// Apply a verified PayPal event.
    ///
    /// Returns `false` when the event id was already in the ledger (replay).
    pub async fn handle_paypal_event(
        &self,
        event_id: &str,
        event_type: &str,
        resource: &serde_json::Value,
    ) -> AppResult<bool> {
        if self.ledger.is_processed(event_id).await? {
            tracing::info!(event_id = %event_id, "Replayed PayPal event, skipping");
            return Ok(false);
        }

        match event_type {
            "BILLING.SUBSCRIPTION.ACTIVATED" => {
                if let Some(user) = self.user_for_paypal_resource(resource).await? {
                    let plan = user.plan;
                    let updated = self
                        .apply(&user, |active| {
                            active.is_premium = Set(true);
                            active.is_active = Set(true);
                            active.payment_status = Set(Some("active".to_string()));
                        })
                        .await?;
                    if plan == Plan::Standard {
                        self.user_repo
                            .reset_prompts(&updated.id, Self::quota_for(plan))
                            .await?;
                    }
                    self.send_email(&updated, EmailKind::PaymentSucceeded).await;
                    self.notify_change(&updated, "active").await;
                }
            }
            "PAYMENT.SALE.COMPLETED" => {
                if let Some(user) = self.user_for_paypal_resource(resource).await? {
                    self.apply(&user, |active| {
                        active.payment_status = Set(Some("paid".to_string()));
                    })
                    .await?;
                }
            }
            "BILLING.SUBSCRIPTION.CANCELLED" | "BILLING.SUBSCRIPTION.EXPIRED" => {
                if let Some(user) = self.user_for_paypal_resource(resource).await? {
                    let updated = self
                        .apply(&user, |active| {
                            active.plan = Set(Plan::Free);
                            active.is_premium = Set(false);
                            active.payment_status = Set(Some("canceled".to_string()));
                            active.paypal_subscription_id = Set(None);
                        })
                        .await?;
                    self.send_email(&updated, EmailKind::Canceled).await;
                    self.notify_change(&updated, "canceled").await;
                }
            }
            other => {
                tracing::debug!(event_type = %other, "Unhandled PayPal event");
            }
        }

        self.ledger.record(event_id, "paypal").await?;
        Ok(true)
    }

    // ==================== Helpers ====================

    /// Resolve the user a Stripe event object refers to.
    async fn user_for_stripe_object(
        &self,
        object: &serde_json::Value,
    ) -> AppResult<Option<user::Model>> {
        // Prefer our own id from customer metadata, then the customer ref
        if let Some(user_id) = object
            .pointer("/metadata/user_id")
            .and_then(|v| v.as_str())
        {
            return self.user_repo.find_by_id(user_id).await;
        }

        if let Some(customer_id) = object.get("customer").and_then(|v| v.as_str()) {
            return self.user_repo.find_by_stripe_customer(customer_id).await;
        }

        tracing::warn!("Stripe event object carries no customer reference");
        Ok(None)
    }

    /// Resolve the user a PayPal resource refers to.
    async fn user_for_paypal_resource(
        &self,
        resource: &serde_json::Value,
    ) -> AppResult<Option<user::Model>> {
        if let Some(user_id) = resource.get("custom_id").and_then(|v| v.as_str()) {
            return self.user_repo.find_by_id(user_id).await;
        }

        // Sale events reference the subscription through billing_agreement_id
        let subscription_id = resource
            .get("id")
            .and_then(|v| v.as_str())
            .or_else(|| resource.get("billing_agreement_id").and_then(|v| v.as_str()));

        if let Some(id) = subscription_id {
            return self.user_repo.find_by_paypal_subscription(id).await;
        }

        tracing::warn!("PayPal resource carries no subscription reference");
        Ok(None)
    }

    /// Plan from the first price in a subscription object.
    fn plan_from_subscription_object(&self, object: &serde_json::Value) -> Option<Plan> {
        let price_id = object
            .pointer("/items/data/0/price/id")
            .and_then(|v| v.as_str())?;
        self.plan_for_stripe_price(price_id)
    }

    /// Fetch-modify-update a user row.
    async fn apply<F>(&self, user: &user::Model, mutate: F) -> AppResult<user::Model>
    where
        F: FnOnce(&mut user::ActiveModel),
    {
        let fresh = self.user_repo.get_by_id(&user.id).await?;
        let mut active: user::ActiveModel = fresh.into();
        mutate(&mut active);
        active.updated_at = Set(Some(Utc::now().into()));
        self.user_repo.update(active).await
    }

    async fn send_email(&self, user: &user::Model, kind: EmailKind) {
        let Some(ref email) = self.email else { return };
        let Some(ref address) = user.email else { return };

        let result = match kind {
            EmailKind::PaymentSucceeded => {
                let plan = format!("{:?}", user.plan).to_lowercase();
                email
                    .send_payment_succeeded(address, &user.username, &plan)
                    .await
            }
            EmailKind::PaymentFailed => email.send_payment_failed(address, &user.username).await,
            EmailKind::Canceled => {
                email
                    .send_subscription_canceled(address, &user.username)
                    .await
            }
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, user_id = %user.id, "Failed to send billing email");
        }
    }

    async fn notify_change(&self, user: &user::Model, status: &str) {
        let Some(ref sso) = self.sso else { return };

        let data = json!({
            "plan": format!("{:?}", user.plan).to_lowercase(),
            "isPremium": user.is_premium,
            "isActive": user.is_active,
            "paymentStatus": status,
        });

        if let Err(e) = sso.notify_subscription_changed(user, data).await {
            tracing::warn!(error = %e, user_id = %user.id, "Failed to trigger subscription webhook");
        }
    }
}

/// Billing email kinds.
#[derive(Clone, Copy)]
enum EmailKind {
    PaymentSucceeded,
    PaymentFailed,
    Canceled,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use founder_db::entities::processed_webhook_event;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn stripe_client_with_secret(secret: &str) -> StripeClient {
        StripeClient::new("sk_test_key", Some(secret.to_string()))
    }

    fn sign(secret: &str, timestamp: i64, payload: &str) -> String {
        let signed = format!("{timestamp}.{payload}");
        format!("t={timestamp},v1={}", hmac_sha256_hex(secret, &signed))
    }

    #[test]
    fn test_verify_webhook_signature_valid() {
        let client = stripe_client_with_secret("whsec_test");
        let payload = r#"{"id":"evt_1"}"#;
        let now = Utc::now().timestamp();

        let header = sign("whsec_test", now, payload);

        client.verify_webhook_signature(payload, &header).unwrap();
    }

    #[test]
    fn test_verify_webhook_signature_wrong_secret() {
        let client = stripe_client_with_secret("whsec_test");
        let payload = r#"{"id":"evt_1"}"#;
        let now = Utc::now().timestamp();

        let header = sign("whsec_other", now, payload);

        assert!(client.verify_webhook_signature(payload, &header).is_err());
    }

    #[test]
    fn test_verify_webhook_signature_stale_timestamp() {
        let client = stripe_client_with_secret("whsec_test");
        let payload = r#"{"id":"evt_1"}"#;
        let stale = Utc::now().timestamp() - STRIPE_SIGNATURE_TOLERANCE_SECS - 10;

        let header = sign("whsec_test", stale, payload);

        assert!(client.verify_webhook_signature(payload, &header).is_err());
    }

    #[test]
    fn test_verify_webhook_signature_malformed_header() {
        let client = stripe_client_with_secret("whsec_test");

        assert!(client
            .verify_webhook_signature("{}", "not-a-signature-header")
            .is_err());
    }

    #[test]
    fn test_paypal_approve_url() {
        let subscription = PayPalSubscription {
            id: "I-ABC".to_string(),
            status: "APPROVAL_PENDING".to_string(),
            links: vec![
                PayPalLink {
                    rel: "self".to_string(),
                    href: "https://api.paypal.com/sub/I-ABC".to_string(),
                },
                PayPalLink {
                    rel: "approve".to_string(),
                    href: "https://paypal.com/approve/I-ABC".to_string(),
                },
            ],
        };

        assert_eq!(
            subscription.approve_url(),
            Some("https://paypal.com/approve/I-ABC")
        );
    }

    fn service_with_ledger(db: sea_orm::DatabaseConnection) -> BillingService {
        let db = Arc::new(db);
        BillingService::new(
            BillingConfig::default(),
            UserRepository::new(Arc::clone(&db)),
            ProcessedWebhookEventRepository::new(db),
        )
    }

    #[tokio::test]
    async fn test_replayed_event_is_skipped() {
        let ledger_row = processed_webhook_event::Model {
            id: "evt_1".to_string(),
            provider: "stripe".to_string(),
            processed_at: Utc::now().into(),
        };

        let service = service_with_ledger(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[ledger_row]])
                .into_connection(),
        );

        let applied = service
            .handle_stripe_event("evt_1", "invoice.payment_succeeded", &json!({}))
            .await
            .unwrap();

        assert!(!applied);
    }

    #[tokio::test]
    async fn test_unhandled_event_is_still_recorded() {
        let inserted = processed_webhook_event::Model {
            id: "evt_2".to_string(),
            provider: "stripe".to_string(),
            processed_at: Utc::now().into(),
        };

        let service = service_with_ledger(
            MockDatabase::new(DatabaseBackend::Postgres)
                // ledger miss
                .append_query_results([Vec::<processed_webhook_event::Model>::new()])
                // ledger insert
                .append_query_results([[inserted]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let applied = service
            .handle_stripe_event("evt_2", "charge.refunded", &json!({}))
            .await
            .unwrap();

        assert!(applied);
    }

    #[tokio::test]
    async fn test_cancel_without_subscription_fails() {
        let service = service_with_ledger(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let user = user::Model {
            id: "u1".to_string(),
            username: "alice".to_string(),
            email: None,
            password_hash: None,
            token: None,
            display_name: None,
            bio: None,
            avatar_url: None,
            plan: Plan::Free,
            remaining_prompts: 0,
            is_premium: false,
            is_active: true,
            payment_status: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            paypal_subscription_id: None,
            created_at: Utc::now().into(),
            updated_at: None,
        };

        let result = service.cancel_subscription(&user).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_quota_for_plans() {
        assert_eq!(BillingService::quota_for(Plan::Standard), STANDARD_PLAN_QUOTA);
        assert_eq!(BillingService::quota_for(Plan::Founder), 0);
        assert_eq!(BillingService::quota_for(Plan::Free), 0);
    }
}
