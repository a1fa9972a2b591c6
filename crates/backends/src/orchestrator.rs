//! Cross-backend fallback — the caller-owned policy layer.
//!
//! The dispatcher's unit of work is exactly one backend attempt-set;
//! advancing to the next available backend after a failure is a policy
//! decision, made here. The walk preserves registry priority order, and
//! because the local composer is always available and performs no I/O, the
//! chain has a terminal entry that is not expected to fail.

use crate::dispatcher::{run_backend, ReadingOutcome};
use crate::registry;
use arcanum_config::Environment;
use arcanum_core::{Error, ReadingPayload};
use tracing::warn;

/// Try each available backend in priority order until one succeeds.
///
/// Input-validation failures are fatal for the request, not the backend:
/// they surface immediately instead of burning through the chain.
pub async fn run_with_fallback(
    env: &Environment,
    payload: &ReadingPayload,
    request_id: &str,
) -> Result<ReadingOutcome, Error> {
    let mut last_error: Option<Error> = None;

    for descriptor in registry::list_available(env) {
        match run_backend(descriptor.id, env, payload, request_id).await {
            Ok(outcome) => return Ok(outcome),
            Err(Error::Input(e)) => return Err(e.into()),
            Err(e) => {
                warn!(
                    backend = descriptor.id,
                    error = %e,
                    "backend failed, advancing to next available"
                );
                last_error = Some(e);
            }
        }
    }

    // Unreachable in practice: the composer is always listed and does no I/O.
    Err(last_error.unwrap_or_else(|| Error::Internal("no backends available".into())))
}
