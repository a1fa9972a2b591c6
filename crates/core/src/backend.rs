//! Backend trait — the abstraction over generation backends.
//!
//! A Backend knows how to turn an assembled system/user prompt pair into
//! reading text. Implementations: Anthropic Messages API, OpenAI-compatible
//! chat completions, and the local deterministic composer.

use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One generation call, fully assembled and budgeted upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// The model to use (backend-specific identifier).
    pub model: String,
    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

/// A complete response from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// The generated reading text.
    pub text: String,
    /// Which model actually responded (may differ from requested).
    pub model: String,
    /// Token usage statistics, when the backend reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Backend trait.
///
/// The dispatcher calls `generate()` without knowing which backend is being
/// used. Availability is decided separately by each descriptor's predicate —
/// a backend that is constructed is assumed to have its credentials.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Registry id of this backend (e.g. "anthropic", "composer").
    fn id(&self) -> &str;

    /// Execute one generation attempt.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationResponse, BackendError>;
}
