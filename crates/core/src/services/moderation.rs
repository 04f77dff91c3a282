//! AI comment moderation service.
//!
//! Wraps an OpenAI-compatible chat-completion endpoint for four operations:
//! reviewing new comments, merging follow-up responses, rewriting comments
//! for clarity, and generating process-flow suggestions.
//!
//! Moderation is fail-open: a provider failure never blocks a submission,
//! it degrades to an approved comment with a fallback prompt.

use founder_common::{AppError, AppResult, config::ModerationConfig};
use serde::{Deserialize, Serialize};

/// Default model when none is configured.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default API base URL (OpenAI-compatible).
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Follow-up question used when the provider is unreachable.
const FALLBACK_PROMPT: &str =
    "What outcome are you hoping for with this comment? Feel free to expand on it.";

/// Verdict for a newly submitted comment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    /// Whether the comment was approved.
    pub is_approved: bool,
    /// Follow-up question for the author (approved comments only).
    pub follow_up: Option<String>,
    /// Whether this verdict came from the fallback path.
    pub fallback: bool,
}

/// Result of merging the author's follow-up response into the comment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedComment {
    /// Final comment text.
    pub content: String,
    /// Whether the merged comment is approved.
    pub is_approved: bool,
}

/// A generated process-flow suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFlow {
    /// Short title.
    pub title: String,
    /// One-paragraph description.
    pub description: String,
    /// Ordered steps.
    pub steps: Vec<String>,
}

/// Service wrapping the moderation model.
#[derive(Clone)]
pub struct ModerationService {
    config: ModerationConfig,
    http_client: reqwest::Client,
}

impl ModerationService {
    /// Create a new moderation service.
    #[must_use]
    pub fn new(config: ModerationConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            config,
            http_client,
        }
    }

    /// Review a new comment against its post title.
    ///
    /// Never fails: provider errors degrade to an approved verdict with a
    /// generic follow-up prompt.
    pub async fn review_comment(&self, content: &str, post_title: &str) -> ModerationVerdict {
        let prompt = format!(
            "You are a moderation assistant for a founder community. \
             Review the comment below, posted on \"{post_title}\". \
             Reject only spam, abuse, or off-topic promotion. \
             When you approve, also write one short follow-up question that \
             would help the author sharpen their point.\n\n\
             Comment:\n{content}\n\n\
             Respond with JSON only: \
             {{\"isApproved\": bool, \"followUp\": string or null}}"
        );

        match self.complete(&prompt).await {
            Ok(text) => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Verdict {
                    is_approved: bool,
                    follow_up: Option<String>,
                }

                match parse_json_response::<Verdict>(&text) {
                    Ok(v) => ModerationVerdict {
                        is_approved: v.is_approved,
                        follow_up: if v.is_approved { v.follow_up } else { None },
                        fallback: false,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Unparseable moderation verdict, approving as-is");
                        Self::fallback_verdict()
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Moderation provider failed, approving as-is");
                Self::fallback_verdict()
            }
        }
    }

    /// Merge the author's answer to the follow-up question into a final
    /// comment.
    ///
    /// Never fails: provider errors echo the original content, approved.
    pub async fn merge_response(
        &self,
        original: &str,
        follow_up: &str,
        response: &str,
    ) -> MergedComment {
        let prompt = format!(
            "A comment author was asked a follow-up question and answered it. \
             Merge the answer into the original comment as one coherent text, \
             keeping the author's voice.\n\n\
             Original comment:\n{original}\n\n\
             Question:\n{follow_up}\n\n\
             Answer:\n{response}\n\n\
             Respond with JSON only: \
             {{\"content\": string, \"isApproved\": bool}}"
        );

        match self.complete(&prompt).await {
            Ok(text) => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Merged {
                    content: String,
                    is_approved: bool,
                }

                match parse_json_response::<Merged>(&text) {
                    Ok(m) => MergedComment {
                        content: m.content,
                        is_approved: m.is_approved,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Unparseable merge result, keeping original");
                        MergedComment {
                            content: original.to_string(),
                            is_approved: true,
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Moderation provider failed, keeping original");
                MergedComment {
                    content: original.to_string(),
                    is_approved: true,
                }
            }
        }
    }

    /// Rewrite a comment for clarity without changing its meaning.
    ///
    /// Never fails: provider errors echo the original content.
    pub async fn enhance_comment(&self, content: &str) -> String {
        let prompt = format!(
            "Rewrite the comment below for clarity and concision. Keep the \
             meaning, tone and first-person voice. Output only the rewritten \
             comment, no preamble.\n\n{content}"
        );

        match self.complete(&prompt).await {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    content.to_string()
                } else {
                    trimmed.to_string()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Enhancement provider failed, echoing original");
                content.to_string()
            }
        }
    }

    /// Generate 1-3 process-flow suggestions from a comment.
    pub async fn generate_process_flows(&self, content: &str) -> AppResult<Vec<ProcessFlow>> {
        let prompt = format!(
            "Extract 1 to 3 actionable process flows from the comment below. \
             Each flow has a short title, a one-paragraph description, and \
             3-7 concrete steps.\n\n\
             Comment:\n{content}\n\n\
             Respond with JSON only: \
             {{\"flows\": [{{\"title\": string, \"description\": string, \"steps\": [string]}}]}}"
        );

        let text = self.complete(&prompt).await?;

        #[derive(Deserialize)]
        struct Flows {
            flows: Vec<ProcessFlow>,
        }

        let parsed: Flows = parse_json_response(&text)?;

        if parsed.flows.is_empty() {
            return Err(AppError::ExternalService(
                "Model returned no process flows".to_string(),
            ));
        }

        Ok(parsed.flows.into_iter().take(3).collect())
    }

    const fn fallback_verdict() -> ModerationVerdict {
        ModerationVerdict {
            is_approved: true,
            follow_up: Some(String::new()),
            fallback: true,
        }
    }

    /// Fallback follow-up prompt text.
    #[must_use]
    pub fn fallback_prompt() -> &'static str {
        FALLBACK_PROMPT
    }

    /// Issue a single chat-completion call.
    async fn complete(&self, prompt: &str) -> AppResult<String> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| AppError::Config("Moderation API key not configured".to_string()))?;

        let model = self.config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let base_url = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.2,
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Moderation request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Moderation API error: {status} - {body}"
            )));
        }

        #[derive(Deserialize)]
        struct CompletionResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse moderation response: {e}"))
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::ExternalService("No completion returned".to_string()))
    }
}

/// Parse a JSON object out of a model response, tolerating code fences and
/// surrounding prose.
fn parse_json_response<T: serde::de::DeserializeOwned>(text: &str) -> AppResult<T> {
    let trimmed = text.trim();

    // Direct parse first
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    // Strip everything outside the outermost braces
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            return serde_json::from_str(&trimmed[start..=end]).map_err(|e| {
                AppError::ExternalService(format!("Malformed model JSON: {e}"))
            });
        }
    }

    Err(AppError::ExternalService(
        "Model response contained no JSON object".to_string(),
    ))
}

impl ModerationVerdict {
    /// The prompt to store on the comment row for this verdict.
    #[must_use]
    pub fn prompt_text(&self) -> Option<String> {
        if self.fallback {
            return Some(FALLBACK_PROMPT.to_string());
        }
        self.follow_up
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Deserialize, Debug, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Verdict {
        is_approved: bool,
        follow_up: Option<String>,
    }

    #[test]
    fn test_parse_json_response_plain() {
        let v: Verdict =
            parse_json_response(r#"{"isApproved": true, "followUp": "Why?"}"#).unwrap();
        assert!(v.is_approved);
        assert_eq!(v.follow_up.as_deref(), Some("Why?"));
    }

    #[test]
    fn test_parse_json_response_code_fenced() {
        let text = "```json\n{\"isApproved\": false, \"followUp\": null}\n```";
        let v: Verdict = parse_json_response(text).unwrap();
        assert!(!v.is_approved);
        assert!(v.follow_up.is_none());
    }

    #[test]
    fn test_parse_json_response_with_prose() {
        let text = "Here is my verdict: {\"isApproved\": true, \"followUp\": null} Hope it helps.";
        let v: Verdict = parse_json_response(text).unwrap();
        assert!(v.is_approved);
    }

    #[test]
    fn test_parse_json_response_garbage() {
        let result: AppResult<Verdict> = parse_json_response("I cannot answer that.");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_review_without_api_key_falls_open() {
        // No API key configured: the provider call fails and the verdict
        // degrades to approved-with-fallback, never an error.
        let service = ModerationService::new(ModerationConfig::default());

        let verdict = service.review_comment("Great idea!", "Launch plan").await;

        assert!(verdict.is_approved);
        assert!(verdict.fallback);
        assert_eq!(
            verdict.prompt_text().as_deref(),
            Some(ModerationService::fallback_prompt())
        );
    }

    #[tokio::test]
    async fn test_merge_without_api_key_echoes_original() {
        let service = ModerationService::new(ModerationConfig::default());

        let merged = service
            .merge_response("Original text", "Why?", "Because.")
            .await;

        assert_eq!(merged.content, "Original text");
        assert!(merged.is_approved);
    }

    #[tokio::test]
    async fn test_enhance_without_api_key_echoes_original() {
        let service = ModerationService::new(ModerationConfig::default());

        let enhanced = service.enhance_comment("My comment").await;

        assert_eq!(enhanced, "My comment");
    }

    #[tokio::test]
    async fn test_process_flows_without_api_key_errors() {
        // Unlike moderation, flow generation is not fail-open; the caller
        // already paid quota and should see the failure.
        let service = ModerationService::new(ModerationConfig::default());

        let result = service.generate_process_flows("Some comment").await;

        assert!(result.is_err());
    }
}
