//! The backend registry — immutable, statically constructed, priority-ordered.
//!
//! Built once at compile time, no mutation API exposed: cross-request races
//! are impossible by construction. Each descriptor carries a pure
//! availability predicate closing over nothing but the environment passed
//! to it, so predicates can be unit-tested in isolation.

use arcanum_config::Environment;

pub const ANTHROPIC_ID: &str = "anthropic";
pub const OPENAI_ID: &str = "openai";
pub const COMPOSER_ID: &str = "composer";

/// One entry in the backend registry.
pub struct BackendDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    /// Pure availability predicate over the request environment.
    pub available: fn(&Environment) -> bool,
    /// Token budget target for prompts built for this backend, unless the
    /// environment overrides it.
    pub default_budget: usize,
    /// Model identifier used when the environment does not name one.
    pub default_model: &'static str,
}

fn anthropic_available(env: &Environment) -> bool {
    env.credential("ANTHROPIC_API_KEY").is_some()
}

fn openai_available(env: &Environment) -> bool {
    env.credential("OPENAI_API_KEY").is_some()
}

/// The local composer needs no network and no credentials.
fn always_available(_env: &Environment) -> bool {
    true
}

/// Priority order: remote backends first, the no-network composer as the
/// guaranteed terminal entry.
pub static REGISTRY: &[BackendDescriptor] = &[
    BackendDescriptor {
        id: ANTHROPIC_ID,
        label: "Anthropic Messages API",
        available: anthropic_available,
        default_budget: 1600,
        default_model: "claude-sonnet-4-20250514",
    },
    BackendDescriptor {
        id: OPENAI_ID,
        label: "OpenAI-compatible chat completions",
        available: openai_available,
        default_budget: 1600,
        default_model: "gpt-4o-mini",
    },
    BackendDescriptor {
        id: COMPOSER_ID,
        label: "Local template composer",
        available: always_available,
        default_budget: 4096,
        default_model: "template-v1",
    },
];

/// Filter the registry by availability, preserving priority order. Always
/// non-empty: the composer's predicate never fails.
pub fn list_available(env: &Environment) -> Vec<&'static BackendDescriptor> {
    REGISTRY.iter().filter(|d| (d.available)(env)).collect()
}

/// Look up one backend by id.
pub fn find(backend_id: &str) -> Option<&'static BackendDescriptor> {
    REGISTRY.iter().find(|d| d.id == backend_id)
}
