//! Backend dispatch — exactly one backend attempt-set per call.
//!
//! `run_backend` resolves one named backend, rebuilds the prompt against
//! that backend's own budget target, and executes the generation call.
//! Remote calls run inside bounded retry with doubling backoff and an
//! overall deadline that cancels the in-flight attempt. Cross-backend
//! fallback is the caller's policy (see `orchestrator`), not the
//! dispatcher's.
//!
//! Every invocation is wrapped in a tracing span tagged with backend id,
//! request id, and spread key; with no subscriber installed the span is a
//! no-op.

use crate::anthropic::AnthropicBackend;
use crate::composer::LocalComposer;
use crate::openai::OpenAiBackend;
use crate::registry::{self, ANTHROPIC_ID, COMPOSER_ID, OPENAI_ID};
use arcanum_config::Environment;
use arcanum_core::error::BackendError;
use arcanum_core::{Backend, Error, GenerationRequest, GenerationResponse, ReadingPayload, Usage};
use arcanum_prompt::{assemble_prompt, AssembleOptions, AssembledPrompt};
use std::time::Duration;
use tracing::Instrument;

/// Retry and timeout bounds for remote backends.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Fixed small retry count.
    pub max_attempts: u32,
    /// Base delay, doubled after each attempt.
    pub base_delay: Duration,
    /// Per-attempt deadline.
    pub attempt_timeout: Duration,
    /// Overall deadline across all attempts; cancels the in-flight call.
    pub overall_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(15),
            overall_timeout: Duration::from_secs(45),
        }
    }
}

/// The result of one successful backend run.
#[derive(Debug, Clone)]
pub struct ReadingOutcome {
    pub reading: String,
    pub prompts: AssembledPrompt,
    pub usage: Option<Usage>,
    /// Which backend served the request.
    pub backend_id: &'static str,
    /// Which model actually responded.
    pub model: String,
}

/// Run exactly one named backend for this payload.
pub async fn run_backend(
    backend_id: &str,
    env: &Environment,
    payload: &ReadingPayload,
    request_id: &str,
) -> Result<ReadingOutcome, Error> {
    let descriptor = registry::find(backend_id).ok_or_else(|| {
        BackendError::NotConfigured(format!("unknown backend '{backend_id}'"))
    })?;
    if !(descriptor.available)(env) {
        return Err(BackendError::Unavailable(descriptor.id.to_string()).into());
    }

    let span = tracing::info_span!(
        "backend_call",
        backend = descriptor.id,
        request_id = %request_id,
        spread = %payload.spread_key(),
    );

    async move {
        let budget = env
            .token_budget(descriptor.id)
            .unwrap_or(descriptor.default_budget);
        let prompts = assemble_prompt(
            payload,
            &AssembleOptions {
                token_budget: budget,
                slimming_enabled: env.slimming_enabled(),
            },
        )?;

        let request = GenerationRequest {
            system_prompt: prompts.system_prompt.clone(),
            user_prompt: prompts.user_prompt.clone(),
            model: env
                .backend_model(descriptor.id)
                .unwrap_or(descriptor.default_model)
                .to_string(),
            max_tokens: 1024,
            temperature: 0.7,
        };

        let policy = RetryPolicy::default();
        let result = match descriptor.id {
            // Local: no network, one deterministic attempt, no retry needed.
            COMPOSER_ID => LocalComposer::new(payload).generate(request).await,
            ANTHROPIC_ID => {
                let backend = AnthropicBackend::from_env(env)?;
                call_with_retry(&backend, request, policy).await
            }
            OPENAI_ID => {
                let backend = OpenAiBackend::from_env(env)?;
                call_with_retry(&backend, request, policy).await
            }
            other => Err(BackendError::NotConfigured(format!(
                "backend '{other}' has no dispatch arm"
            ))),
        };

        match result {
            Ok(response) => {
                tracing::info!(model = %response.model, "backend call succeeded");
                Ok(ReadingOutcome {
                    reading: response.text,
                    prompts,
                    usage: response.usage,
                    backend_id: descriptor.id,
                    model: response.model,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "backend call failed");
                Err(e.into())
            }
        }
    }
    .instrument(span)
    .await
}

/// Execute a backend call inside the retry/timeout envelope.
///
/// Transient failures retry up to the bound with doubling delay; a
/// non-transient error, or an empty response, fails the backend
/// immediately. The overall deadline cancels whatever is in flight and
/// surfaces as a typed timeout rather than hanging the caller.
pub async fn call_with_retry(
    backend: &dyn Backend,
    request: GenerationRequest,
    policy: RetryPolicy,
) -> Result<GenerationResponse, BackendError> {
    match tokio::time::timeout(policy.overall_timeout, retry_loop(backend, request, policy)).await
    {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(format!(
            "backend '{}' exceeded the overall deadline of {}s",
            backend.id(),
            policy.overall_timeout.as_secs()
        ))),
    }
}

async fn retry_loop(
    backend: &dyn Backend,
    request: GenerationRequest,
    policy: RetryPolicy,
) -> Result<GenerationResponse, BackendError> {
    let mut delay = policy.base_delay;
    let mut last_error = BackendError::NotConfigured("no attempt was made".into());

    for attempt in 1..=policy.max_attempts {
        match tokio::time::timeout(policy.attempt_timeout, backend.generate(request.clone())).await
        {
            Ok(Ok(response)) if response.text.trim().is_empty() => {
                tracing::warn!(
                    backend = backend.id(),
                    attempt,
                    "empty generation response, failing this backend"
                );
                return Err(BackendError::EmptyResponse(backend.id().to_string()));
            }
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => {
                if !e.is_transient() {
                    return Err(e);
                }
                tracing::warn!(
                    backend = backend.id(),
                    attempt,
                    error = %e,
                    "transient backend failure"
                );
                last_error = e;
            }
            Err(_) => {
                tracing::warn!(
                    backend = backend.id(),
                    attempt,
                    timeout_secs = policy.attempt_timeout.as_secs(),
                    "backend attempt timed out"
                );
                last_error = BackendError::Timeout(format!(
                    "attempt {attempt} exceeded {}s",
                    policy.attempt_timeout.as_secs()
                ));
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcanum_core::reading::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(50),
            overall_timeout: Duration::from_millis(500),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "system".into(),
            user_prompt: "user".into(),
            model: "test-model".into(),
            max_tokens: 64,
            temperature: 0.0,
        }
    }

    /// A mock backend that fails a fixed number of times, then succeeds.
    struct FlakyBackend {
        failures_before_success: usize,
        error: BackendError,
        calls: Mutex<usize>,
    }

    impl FlakyBackend {
        fn new(failures: usize, error: BackendError) -> Self {
            Self {
                failures_before_success: failures,
                error,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        fn id(&self) -> &str {
            "flaky"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, BackendError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.failures_before_success {
                return Err(self.error.clone());
            }
            Ok(GenerationResponse {
                text: "a reading".into(),
                model: "test-model".into(),
                usage: None,
            })
        }
    }

    /// A mock backend that always returns blank text.
    struct BlankBackend {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Backend for BlankBackend {
        fn id(&self) -> &str {
            "blank"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, BackendError> {
            *self.calls.lock().unwrap() += 1;
            Ok(GenerationResponse {
                text: "   \n".into(),
                model: "test-model".into(),
                usage: None,
            })
        }
    }

    /// A mock backend that hangs forever (for timeout testing).
    struct HangingBackend;

    #[async_trait]
    impl Backend for HangingBackend {
        fn id(&self) -> &str {
            "hanging"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, BackendError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn first_attempt_success_makes_one_call() {
        let backend = FlakyBackend::new(0, BackendError::Network("unused".into()));
        let result = call_with_retry(&backend, request(), fast_policy()).await;
        assert!(result.is_ok());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_retried_within_bound() {
        let backend = FlakyBackend::new(2, BackendError::Network("conn reset".into()));
        let result = call_with_retry(&backend, request(), fast_policy()).await;
        assert!(result.is_ok());
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_error() {
        let backend = FlakyBackend::new(10, BackendError::Network("down".into()));
        let err = call_with_retry(&backend, request(), fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Network(_)));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn non_transient_error_fails_fast() {
        let backend = FlakyBackend::new(10, BackendError::AuthenticationFailed("bad key".into()));
        let err = call_with_retry(&backend, request(), fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::AuthenticationFailed(_)));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn empty_response_is_fatal_for_the_backend() {
        let backend = BlankBackend {
            calls: Mutex::new(0),
        };
        let err = call_with_retry(&backend, request(), fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::EmptyResponse(_)));
        assert_eq!(*backend.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn hanging_backend_surfaces_typed_timeout() {
        let err = call_with_retry(&HangingBackend, request(), fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }

    // ── run_backend ───────────────────────────────────────────────────

    fn payload() -> ReadingPayload {
        ReadingPayload {
            spread: SpreadDescriptor {
                key: "one-card".into(),
                label: "Daily Draw".into(),
                positions: vec!["Today".into()],
            },
            cards: vec![CardEntry {
                card_name: "The Sun".into(),
                position: "Today".into(),
                orientation: Orientation::Upright,
                meaning: "Clarity, warmth, an uncomplicated yes".into(),
            }],
            question: "What should I carry into today?".into(),
            reflections: String::new(),
            themes: ThematicAnalysis::default(),
            relationships: None,
            context_tag: "general".into(),
            deck_style: "rider-waite".into(),
            passages: None,
            personalization: Personalization::default(),
            tier: SubscriptionTier::Free,
            env: Environment::new(),
            diagnostics: Vec::new(),
        }
    }

    #[tokio::test]
    async fn composer_runs_without_network_or_credentials() {
        let env = Environment::new();
        let outcome = run_backend(COMPOSER_ID, &env, &payload(), "req-1")
            .await
            .unwrap();
        assert!(outcome.reading.contains("The Sun"));
        assert!(outcome.prompts.system_prompt.contains("## Ethical Boundaries"));
        assert!(outcome.usage.is_some());
    }

    #[tokio::test]
    async fn composer_is_deterministic() {
        let env = Environment::new();
        let a = run_backend(COMPOSER_ID, &env, &payload(), "req-a")
            .await
            .unwrap();
        let b = run_backend(COMPOSER_ID, &env, &payload(), "req-b")
            .await
            .unwrap();
        assert_eq!(a.reading, b.reading);
    }

    #[tokio::test]
    async fn unknown_backend_is_not_configured() {
        let err = run_backend("oracle-9000", &Environment::new(), &payload(), "req-1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown backend"));
    }

    #[tokio::test]
    async fn unavailable_backend_rejected_before_any_work() {
        let err = run_backend(ANTHROPIC_ID, &Environment::new(), &payload(), "req-1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Backend(BackendError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn empty_card_list_fails_validation_not_dispatch() {
        let mut bad = payload();
        bad.cards.clear();
        let err = run_backend(COMPOSER_ID, &Environment::new(), &bad, "req-1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("length 0"));
    }

    #[tokio::test]
    async fn env_budget_override_reaches_the_estimator() {
        let env = Environment::from_iter([("ARCANUM_BUDGET_COMPOSER", "777")]);
        let outcome = run_backend(COMPOSER_ID, &env, &payload(), "req-1")
            .await
            .unwrap();
        assert_eq!(outcome.prompts.meta.estimated_tokens.budget, 777);
    }
}
