//! External SSO service.
//!
//! Issues and verifies short-lived JWTs for the external project-management
//! integration, builds access links, and delivers HMAC-signed webhooks to
//! endpoints the integration registers.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use founder_common::{AppError, AppResult, IdGenerator, config::SsoConfig};
use founder_db::{
    entities::{external_webhook, user},
    repositories::{ExternalWebhookRepository, external_webhook::MAX_WEBHOOKS_PER_USER},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Webhook events deliverable to the external integration.
pub mod events {
    /// Plan, premium or active state changed.
    pub const SUBSCRIPTION_CHANGED: &str = "subscription.changed";
    /// Account deleted.
    pub const ACCOUNT_DELETED: &str = "account.deleted";

    /// All valid events.
    #[must_use]
    pub fn all() -> Vec<&'static str> {
        vec![SUBSCRIPTION_CHANGED, ACCOUNT_DELETED]
    }

    /// Check if an event is valid.
    #[must_use]
    pub fn is_valid(event: &str) -> bool {
        all().contains(&event)
    }
}

/// Maximum delivery attempts per webhook payload.
const MAX_WEBHOOK_RETRIES: u32 = 5;

/// Consecutive failures before an endpoint is disabled.
const MAX_FAILURE_COUNT: i32 = 10;

/// JWT claims for the external integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalClaims {
    /// User ID.
    pub sub: String,
    /// Username.
    pub username: String,
    /// Email, when known.
    pub email: Option<String>,
    /// Subscription plan.
    pub plan: String,
    /// Expiry (seconds since epoch).
    pub exp: i64,
    /// Issued-at (seconds since epoch).
    pub iat: i64,
}

/// Input for registering a webhook endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWebhookInput {
    pub url: String,
    pub events: Vec<String>,
}

/// Response for a registered webhook.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub id: String,
    pub url: String,
    pub events: Vec<String>,
    pub is_active: bool,
    pub failure_count: i32,
    pub created_at: String,
}

impl From<external_webhook::Model> for WebhookResponse {
    fn from(w: external_webhook::Model) -> Self {
        Self {
            id: w.id,
            url: w.url,
            events: serde_json::from_value(w.events).unwrap_or_default(),
            is_active: w.is_active,
            failure_count: w.failure_count,
            created_at: w.created_at.to_rfc3339(),
        }
    }
}

/// Response for webhook registration (includes the signing secret once).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookWithSecretResponse {
    #[serde(flatten)]
    pub webhook: WebhookResponse,
    pub secret: String,
}

/// Webhook payload for delivery.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    event: String,
    user_id: String,
    timestamp: String,
    data: serde_json::Value,
}

/// One queued delivery.
#[derive(Debug, Clone)]
struct DeliveryJob {
    webhook_id: String,
    url: String,
    secret: String,
    payload: String,
    retry_count: u32,
}

/// External SSO service.
#[derive(Clone)]
pub struct SsoService {
    config: SsoConfig,
    webhook_repo: ExternalWebhookRepository,
    http_client: Arc<reqwest::Client>,
    id_gen: IdGenerator,
}

impl SsoService {
    /// Create a new SSO service.
    #[must_use]
    pub fn new(config: SsoConfig, webhook_repo: ExternalWebhookRepository) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            config,
            webhook_repo,
            http_client: Arc::new(http_client),
            id_gen: IdGenerator::new(),
        }
    }

    fn jwt_secret(&self) -> AppResult<&str> {
        self.config
            .jwt_secret
            .as_deref()
            .ok_or_else(|| AppError::Config("SSO JWT secret not configured".to_string()))
    }

    /// Issue a short-lived token for the external app.
    pub fn issue_token(&self, user: &user::Model) -> AppResult<(String, i64)> {
        let secret = self.jwt_secret()?;
        let now = Utc::now().timestamp();
        let exp = now + self.config.token_ttl_seconds as i64;

        let claims = ExternalClaims {
            sub: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            plan: format!("{:?}", user.plan).to_lowercase(),
            exp,
            iat: now,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))?;

        Ok((token, exp))
    }

    /// Verify a token presented by the external app.
    pub fn verify_token(&self, token: &str) -> AppResult<ExternalClaims> {
        let secret = self.jwt_secret()?;

        let data = decode::<ExternalClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AppError::Unauthorized)?;

        Ok(data.claims)
    }

    /// Build an access link into the external app carrying a fresh token.
    pub fn access_link(&self, user: &user::Model) -> AppResult<String> {
        let base = self.config.external_app_url.as_deref().ok_or_else(|| {
            AppError::Config("External app URL not configured".to_string())
        })?;

        let (token, _) = self.issue_token(user)?;
        Ok(format!("{}/sso?token={token}", base.trim_end_matches('/')))
    }

    // ==================== Webhook registration ====================

    /// Register a webhook endpoint for the calling user.
    pub async fn register_webhook(
        &self,
        user_id: &str,
        input: RegisterWebhookInput,
    ) -> AppResult<WebhookWithSecretResponse> {
        if !input.url.starts_with("http://") && !input.url.starts_with("https://") {
            return Err(AppError::Validation(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        if input.events.is_empty() {
            return Err(AppError::Validation(
                "At least one event must be specified".to_string(),
            ));
        }
        for event in &input.events {
            if !events::is_valid(event) {
                return Err(AppError::Validation(format!("Invalid event: {event}")));
            }
        }

        if self.webhook_repo.count_by_user_id(user_id).await? >= MAX_WEBHOOKS_PER_USER {
            return Err(AppError::Validation(
                "Maximum number of webhooks reached".to_string(),
            ));
        }

        let secret = self.generate_secret();
        let now = Utc::now();

        let model = external_webhook::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            url: Set(input.url),
            secret: Set(secret.clone()),
            events: Set(json!(input.events)),
            is_active: Set(true),
            last_triggered_at: Set(None),
            failure_count: Set(0),
            last_error: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(None),
        };

        let webhook = self.webhook_repo.create(model).await?;

        Ok(WebhookWithSecretResponse {
            webhook: webhook.into(),
            secret,
        })
    }

    /// List webhooks registered by a user.
    pub async fn list_webhooks(&self, user_id: &str) -> AppResult<Vec<WebhookResponse>> {
        let webhooks = self.webhook_repo.find_by_user_id(user_id).await?;
        Ok(webhooks.into_iter().map(Into::into).collect())
    }

    /// Delete a registered webhook.
    pub async fn delete_webhook(&self, user_id: &str, webhook_id: &str) -> AppResult<()> {
        self.webhook_repo.delete(webhook_id, user_id).await
    }

    // ==================== Delivery ====================

    /// Deliver a subscription-change event to the user's registered
    /// endpoints. Fire-and-forget with bounded retries.
    pub async fn notify_subscription_changed(
        &self,
        user: &user::Model,
        data: serde_json::Value,
    ) -> AppResult<()> {
        self.trigger(&user.id, events::SUBSCRIPTION_CHANGED, data).await
    }

    async fn trigger(&self, user_id: &str, event: &str, data: serde_json::Value) -> AppResult<()> {
        let webhooks = self
            .webhook_repo
            .find_active_by_user_and_event(user_id, event)
            .await?;

        for webhook in webhooks {
            let payload = WebhookPayload {
                event: event.to_string(),
                user_id: user_id.to_string(),
                timestamp: Utc::now().to_rfc3339(),
                data: data.clone(),
            };

            let job = DeliveryJob {
                webhook_id: webhook.id.clone(),
                url: webhook.url.clone(),
                secret: webhook.secret.clone(),
                payload: serde_json::to_string(&payload).unwrap_or_default(),
                retry_count: 0,
            };

            // Spawn async delivery with retry (don't block the caller)
            let service = self.clone();
            tokio::spawn(async move {
                let _ = service.deliver_with_retry(job).await;
            });
        }

        Ok(())
    }

    async fn deliver_with_retry(&self, mut job: DeliveryJob) -> AppResult<()> {
        loop {
            match self.deliver_once(&job).await {
                Ok(()) => {
                    self.webhook_repo.record_success(&job.webhook_id).await?;
                    tracing::debug!(
                        webhook_id = %job.webhook_id,
                        url = %job.url,
                        "Webhook delivered successfully"
                    );
                    return Ok(());
                }
                Err(e) => {
                    job.retry_count += 1;

                    if job.retry_count > MAX_WEBHOOK_RETRIES {
                        let error = format!("Max retries exceeded: {e}");
                        self.webhook_repo
                            .record_failure(&job.webhook_id, &error)
                            .await?;

                        if let Ok(Some(webhook)) =
                            self.webhook_repo.find_by_id(&job.webhook_id).await
                        {
                            if webhook.failure_count >= MAX_FAILURE_COUNT {
                                tracing::warn!(
                                    webhook_id = %job.webhook_id,
                                    failure_count = webhook.failure_count,
                                    "Disabling webhook after repeated failures"
                                );
                                let _ = self.webhook_repo.disable(&job.webhook_id).await;
                            }
                        }

                        tracing::warn!(
                            webhook_id = %job.webhook_id,
                            url = %job.url,
                            error = %e,
                            "Webhook delivery failed after max retries"
                        );
                        return Err(e);
                    }

                    // Backoff: 2^retry_count seconds (2, 4, 8, 16, 32)
                    let delay_secs = 2u64.pow(job.retry_count);
                    tracing::debug!(
                        webhook_id = %job.webhook_id,
                        retry_count = job.retry_count,
                        delay_secs = delay_secs,
                        error = %e,
                        "Webhook delivery failed, retrying"
                    );

                    tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
                }
            }
        }
    }

    async fn deliver_once(&self, job: &DeliveryJob) -> AppResult<()> {
        let signature = crate::crypto::hmac_sha256_hex(&job.secret, &job.payload);

        let response = self
            .http_client
            .post(&job.url)
            .header("Content-Type", "application/json")
            .header("X-Founder-Signature", format!("sha256={signature}"))
            .header("User-Agent", "FounderSocials-Webhook/1.0")
            .body(job.payload.clone())
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Request failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::ExternalService(format!(
                "HTTP {}",
                response.status()
            )))
        }
    }

    fn generate_secret(&self) -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use founder_db::entities::user::Plan;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn test_config() -> SsoConfig {
        SsoConfig {
            jwt_secret: Some("test-secret".to_string()),
            token_ttl_seconds: 900,
            external_app_url: Some("https://projects.example.com".to_string()),
        }
    }

    fn test_user() -> user::Model {
        user::Model {
            id: "u1".to_string(),
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            password_hash: None,
            token: None,
            display_name: None,
            bio: None,
            avatar_url: None,
            plan: Plan::Standard,
            remaining_prompts: 10,
            is_premium: true,
            is_active: true,
            payment_status: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            paypal_subscription_id: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn service() -> SsoService {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        SsoService::new(test_config(), ExternalWebhookRepository::new(db))
    }

    #[test]
    fn test_issue_and_verify_token_round_trip() {
        let service = service();
        let user = test_user();

        let (token, exp) = service.issue_token(&user).unwrap();
        let claims = service.verify_token(&token).unwrap();

        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.plan, "standard");
        assert_eq!(claims.exp, exp);
    }

    #[test]
    fn test_verify_rejects_tampered_token() {
        let service = service();
        let user = test_user();

        let (token, _) = service.issue_token(&user).unwrap();
        let tampered = format!("{token}x");

        assert!(matches!(
            service.verify_token(&tampered),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_verify_rejects_foreign_signature() {
        let issuing = service();
        let user = test_user();
        let (token, _) = issuing.issue_token(&user).unwrap();

        let other_config = SsoConfig {
            jwt_secret: Some("different-secret".to_string()),
            ..test_config()
        };
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let verifying = SsoService::new(other_config, ExternalWebhookRepository::new(db));

        assert!(matches!(
            verifying.verify_token(&token),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_access_link_carries_token() {
        let service = service();
        let user = test_user();

        let link = service.access_link(&user).unwrap();

        assert!(link.starts_with("https://projects.example.com/sso?token="));
    }

    #[test]
    fn test_issue_token_without_secret_fails() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let service = SsoService::new(SsoConfig::default(), ExternalWebhookRepository::new(db));

        assert!(service.issue_token(&test_user()).is_err());
    }

    #[tokio::test]
    async fn test_register_webhook_rejects_unknown_event() {
        let service = service();

        let result = service
            .register_webhook(
                "u1",
                RegisterWebhookInput {
                    url: "https://projects.example.com/hooks".to_string(),
                    events: vec!["not.an.event".to_string()],
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_register_webhook_rejects_bad_url() {
        let service = service();

        let result = service
            .register_webhook(
                "u1",
                RegisterWebhookInput {
                    url: "ftp://projects.example.com/hooks".to_string(),
                    events: vec![events::SUBSCRIPTION_CHANGED.to_string()],
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
