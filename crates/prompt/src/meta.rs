//! Prompt metadata — the budgeting side-channel.
//!
//! One `PromptMeta` is created per assembly call and mutated in place by the
//! slimming state machine. It records what the estimator saw, which steps
//! fired (and only those), and whether hard-cap truncation touched either
//! side of the prompt.

use crate::slimmer::SlimStep;
use serde::{Deserialize, Serialize};

/// Estimated token counts for an assembled prompt pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub system: usize,
    pub user: usize,
    pub total: usize,
    /// The budget the estimate was taken against.
    pub budget: usize,
}

/// Which prompt sides hard-cap truncation fired on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TruncationRecord {
    pub system_truncated: bool,
    pub user_truncated: bool,
}

/// How the reference-passage block fared. Present only when the payload
/// carried retrieved passages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageMeta {
    /// Passages retrieved upstream.
    pub retrieved: usize,
    /// Passages still included after budgeting.
    pub included: usize,
    pub semantic_requested: bool,
    pub semantic_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Metadata record for one assembled prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMeta {
    pub estimated_tokens: TokenEstimate,
    pub slimming_enabled: bool,
    /// The slimming steps that fired, in firing order. Empty when slimming
    /// was disabled or the prompt was already within budget.
    pub slimming_steps: Vec<SlimStep>,
    pub truncation: TruncationRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passage_meta: Option<PassageMeta>,
}

impl PromptMeta {
    pub fn new(slimming_enabled: bool) -> Self {
        Self {
            estimated_tokens: TokenEstimate::default(),
            slimming_enabled,
            slimming_steps: Vec::new(),
            truncation: TruncationRecord::default(),
            passage_meta: None,
        }
    }

    /// Step names in firing order, for logs and persisted telemetry.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.slimming_steps.iter().map(|s| s.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_meta_is_empty() {
        let meta = PromptMeta::new(true);
        assert!(meta.slimming_enabled);
        assert!(meta.slimming_steps.is_empty());
        assert!(!meta.truncation.system_truncated);
        assert!(meta.passage_meta.is_none());
    }

    #[test]
    fn steps_serialize_as_kebab_case_names() {
        let mut meta = PromptMeta::new(true);
        meta.slimming_steps.push(SlimStep::DropLowWeightImagery);
        meta.slimming_steps.push(SlimStep::HardCapTruncation);

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("drop-low-weight-imagery"));
        assert!(json.contains("hard-cap-truncation"));
    }

    #[test]
    fn passage_meta_omitted_when_absent() {
        let meta = PromptMeta::new(false);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("passage_meta"));
    }
}
