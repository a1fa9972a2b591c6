//! Generation backends for Arcanum.
//!
//! An immutable priority-ordered registry with pure availability
//! predicates, a dispatcher that runs exactly one backend per call inside
//! retry/timeout bounds and a tracing span, and a caller-level fallback
//! orchestrator. The local composer guarantees every environment has at
//! least one working backend.

pub mod anthropic;
pub mod composer;
pub mod dispatcher;
pub mod openai;
pub mod orchestrator;
pub mod registry;

pub use anthropic::AnthropicBackend;
pub use composer::LocalComposer;
pub use dispatcher::{call_with_retry, run_backend, ReadingOutcome, RetryPolicy};
pub use openai::OpenAiBackend;
pub use orchestrator::run_with_fallback;
pub use registry::{find, list_available, BackendDescriptor, REGISTRY};
