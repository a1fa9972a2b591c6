//! Prompt assembly and budget enforcement for Arcanum.
//!
//! The pipeline in this crate is deterministic and total: a valid payload in,
//! a usable prompt pair out, however tight the budget. Oversized prompts are
//! degraded through an ordered sequence of lossy slimming steps, and — as a
//! last resort — a hard character cap that keeps the safety-policy anchors
//! verbatim.

pub mod assembler;
pub mod meta;
pub mod slimmer;
pub mod token;

#[cfg(test)]
pub(crate) mod testutil;

pub use assembler::{
    assemble_prompt, AssembleOptions, AssembledPrompt, BlockKind, PromptDraft,
    CORE_PRINCIPLES_ANCHOR, DEFAULT_TOKEN_BUDGET, DIRECTIVES_ANCHOR, ETHICS_ANCHOR,
    SAFETY_ANCHORS,
};
pub use meta::{PassageMeta, PromptMeta, TokenEstimate, TruncationRecord};
pub use slimmer::{SlimStep, HARD_CAP_CHARS};
pub use token::estimate_tokens;
