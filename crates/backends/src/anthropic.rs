//! Anthropic native backend.
//!
//! Uses the Messages API directly: `x-api-key` header authentication, an
//! `anthropic-version` header, and the system prompt as a top-level field.

use crate::registry::ANTHROPIC_ID;
use arcanum_core::error::BackendError;
use arcanum_core::{Backend, GenerationRequest, GenerationResponse, Usage};
use arcanum_config::Environment;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Debug)]
pub struct AnthropicBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Custom base URL (testing, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build from the request environment. The availability predicate has
    /// already confirmed the credential exists; this re-checks anyway.
    pub fn from_env(env: &Environment) -> Result<Self, BackendError> {
        let api_key = env
            .credential("ANTHROPIC_API_KEY")
            .ok_or_else(|| BackendError::NotConfigured("ANTHROPIC_API_KEY is not set".into()))?;
        let mut backend = Self::new(api_key)?;
        if let Some(url) = env.backend_url(ANTHROPIC_ID) {
            backend = backend.with_base_url(url);
        }
        Ok(backend)
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn id(&self) -> &str {
        ANTHROPIC_ID
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationResponse, BackendError> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system_prompt,
            "messages": [{"role": "user", "content": request.user_prompt}],
        });

        debug!(backend = ANTHROPIC_ID, model = %request.model, "sending generation request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(BackendError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status == 401 || status == 403 {
            return Err(BackendError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(BackendError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: MessagesResponse =
            response
                .json()
                .await
                .map_err(|_| BackendError::EmptyResponse(ANTHROPIC_ID.into()))?;

        Ok(api_resp.into_generation_response())
    }
}

// --- Anthropic API types ---

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: MessagesUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessagesResponse {
    fn into_generation_response(self) -> GenerationResponse {
        let mut text = String::new();
        for block in &self.content {
            if let ResponseContentBlock::Text { text: t } = block {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(t);
            }
        }

        GenerationResponse {
            text,
            model: self.model,
            usage: Some(Usage {
                prompt_tokens: self.usage.input_tokens,
                completion_tokens: self.usage.output_tokens,
                total_tokens: self.usage.input_tokens + self.usage.output_tokens,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_defaults() {
        let backend = AnthropicBackend::new("sk-ant-test").unwrap();
        assert_eq!(backend.id(), "anthropic");
        assert_eq!(backend.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let backend = AnthropicBackend::new("sk-ant-test")
            .unwrap()
            .with_base_url("https://proxy.internal/");
        assert_eq!(backend.base_url, "https://proxy.internal");
    }

    #[test]
    fn from_env_requires_credential() {
        let err = AnthropicBackend::from_env(&Environment::new()).unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured(_)));

        let env = Environment::from_iter([
            ("ANTHROPIC_API_KEY", "sk-ant-x"),
            ("ARCANUM_ANTHROPIC_URL", "https://gateway.example/v1api"),
        ]);
        let backend = AnthropicBackend::from_env(&env).unwrap();
        assert_eq!(backend.base_url, "https://gateway.example/v1api");
    }

    #[test]
    fn parse_text_response() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "model": "claude-sonnet-4-20250514",
                "content": [{"type": "text", "text": "The cards lean toward patience."}],
                "usage": {"input_tokens": 210, "output_tokens": 96}
            }"#,
        )
        .unwrap();

        let out = resp.into_generation_response();
        assert_eq!(out.text, "The cards lean toward patience.");
        assert_eq!(out.usage.unwrap().total_tokens, 306);
        assert_eq!(out.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn non_text_blocks_are_ignored() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "thinking", "thinking": "hmm"},
                    {"type": "text", "text": "Answer."}
                ],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            }"#,
        )
        .unwrap();
        assert_eq!(resp.into_generation_response().text, "Answer.");
    }

    #[test]
    fn content_free_response_yields_empty_text() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "model": "claude-sonnet-4-20250514",
                "content": [],
                "usage": {"input_tokens": 10, "output_tokens": 0}
            }"#,
        )
        .unwrap();
        // The dispatcher treats this as a fatal empty response.
        assert!(resp.into_generation_response().text.is_empty());
    }
}
