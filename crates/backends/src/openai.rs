//! OpenAI-compatible chat-completions backend.
//!
//! Works against api.openai.com and any server speaking the same dialect
//! (a proxy, a local vLLM, etc.) via the environment's URL override.

use crate::registry::OPENAI_ID;
use arcanum_config::Environment;
use arcanum_core::error::BackendError;
use arcanum_core::{Backend, GenerationRequest, GenerationResponse, Usage};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiBackend {
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

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn from_env(env: &Environment) -> Result<Self, BackendError> {
        let api_key = env
            .credential("OPENAI_API_KEY")
            .ok_or_else(|| BackendError::NotConfigured("OPENAI_API_KEY is not set".into()))?;
        let mut backend = Self::new(api_key)?;
        if let Some(url) = env.backend_url(OPENAI_ID) {
            backend = backend.with_base_url(url);
        }
        Ok(backend)
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn id(&self) -> &str {
        OPENAI_ID
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationResponse, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
        });

        debug!(backend = OPENAI_ID, model = %request.model, "sending generation request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "chat-completions error");
            return Err(BackendError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: ChatResponse = response
            .json()
            .await
            .map_err(|_| BackendError::EmptyResponse(OPENAI_ID.into()))?;

        let choice = api_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::EmptyResponse(OPENAI_ID.into()))?;

        Ok(GenerationResponse {
            text: choice.message.content.unwrap_or_default(),
            model: api_resp.model,
            usage: api_resp.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

// --- Chat-completions API types ---

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_defaults() {
        let backend = OpenAiBackend::new("sk-test").unwrap();
        assert_eq!(backend.id(), "openai");
        assert_eq!(backend.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn from_env_applies_url_override() {
        let env = Environment::from_iter([
            ("OPENAI_API_KEY", "sk-x"),
            ("ARCANUM_OPENAI_URL", "http://localhost:8000/v1/"),
        ]);
        let backend = OpenAiBackend::from_env(&env).unwrap();
        assert_eq!(backend.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn parse_chat_response() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{
                "model": "gpt-4o-mini",
                "choices": [{"message": {"role": "assistant", "content": "A steady reading."}}],
                "usage": {"prompt_tokens": 180, "completion_tokens": 70, "total_tokens": 250}
            }"#,
        )
        .unwrap();
        assert_eq!(resp.choices.len(), 1);
        assert_eq!(
            resp.choices[0].message.content.as_deref(),
            Some("A steady reading.")
        );
        assert_eq!(resp.usage.unwrap().total_tokens, 250);
    }

    #[test]
    fn parse_response_without_choices() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"model": "gpt-4o-mini", "choices": [], "usage": null}"#,
        )
        .unwrap();
        assert!(resp.choices.is_empty());
    }
}
