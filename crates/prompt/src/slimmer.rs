//! Budget enforcement — the slimming state machine and the hard cap.
//!
//! `Assembled → (Slimming)* → (HardCapped)? → Final`. Transitions are
//! strictly forward: each canonical step is considered at most once, in a
//! fixed priority order, and the estimate is recomputed after every step.
//! The pipeline never fails — it always hands back a usable (possibly
//! degraded) prompt pair and a fully populated metadata record.

use crate::assembler::{floor_char_boundary, BlockKind, PromptDraft, SAFETY_ANCHORS};
use crate::meta::{PromptMeta, TokenEstimate};
use crate::token;
use serde::{Deserialize, Serialize};

/// Absolute character ceiling per prompt side, independent of the token
/// budget. A backstop against pathological oversized inputs, not a tuning
/// knob: it only comes into play after every slimming step has fired.
pub const HARD_CAP_CHARS: usize = 24_000;

const ELISION_MARKER: &str = "\n\n[… elided to fit size limits …]\n\n";

/// The named slimming steps, in canonical priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlimStep {
    DropLowWeightImagery,
    DropForecast,
    DropEphemeris,
    TrimGraphragPassages,
    DropGraphragBlock,
    DropDeckGeometry,
    DropDiagnostics,
    /// Not part of the canonical sequence — appended only when the hard cap
    /// fires after every canonical step has been exhausted.
    HardCapTruncation,
}

impl SlimStep {
    /// The seven canonical steps, in the order they fire.
    pub const CANONICAL: [SlimStep; 7] = [
        Self::DropLowWeightImagery,
        Self::DropForecast,
        Self::DropEphemeris,
        Self::TrimGraphragPassages,
        Self::DropGraphragBlock,
        Self::DropDeckGeometry,
        Self::DropDiagnostics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::DropLowWeightImagery => "drop-low-weight-imagery",
            Self::DropForecast => "drop-forecast",
            Self::DropEphemeris => "drop-ephemeris",
            Self::TrimGraphragPassages => "trim-graphrag-passages",
            Self::DropGraphragBlock => "drop-graphrag-block",
            Self::DropDeckGeometry => "drop-deck-geometry",
            Self::DropDiagnostics => "drop-diagnostics",
            Self::HardCapTruncation => "hard-cap-truncation",
        }
    }
}

impl std::fmt::Display for SlimStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Enforce the token budget on a draft and render the final prompt pair.
///
/// When slimming is disabled or the estimate already fits, the draft is
/// rendered unchanged and `meta.slimming_steps` stays empty. Otherwise the
/// canonical steps fire in order until the recomputed total fits; if the
/// whole catalog is exhausted and a side still exceeds [`HARD_CAP_CHARS`],
/// that side is truncated around its middle with the safety anchors kept
/// verbatim.
pub fn enforce_budget(
    draft: &mut PromptDraft,
    budget: usize,
    enabled: bool,
    meta: &mut PromptMeta,
    diagnostics: &mut Vec<String>,
) -> (String, String) {
    let mut system = draft.render_system();
    let mut user = draft.render_user();
    let mut estimate = take_estimate(&system, &user, budget);

    if !enabled || estimate.total <= budget {
        meta.estimated_tokens = estimate;
        return (system, user);
    }

    for step in SlimStep::CANONICAL {
        let before = estimate.total;
        apply_step(draft, step, meta);
        meta.slimming_steps.push(step);

        system = draft.render_system();
        user = draft.render_user();
        estimate = take_estimate(&system, &user, budget);

        tracing::debug!(
            step = step.name(),
            tokens_before = before,
            tokens_after = estimate.total,
            budget,
            "slimming step fired"
        );
        diagnostics.push(format!(
            "slimming: {} ({} → {} tokens)",
            step.name(),
            before,
            estimate.total
        ));

        if estimate.total <= budget {
            break;
        }
    }

    // Hard backstop — only reachable once every canonical step has fired.
    if estimate.total > budget {
        let (capped_system, system_fired) = hard_cap(&system, &SAFETY_ANCHORS);
        let (capped_user, user_fired) = hard_cap(&user, &[]);
        if system_fired || user_fired {
            system = capped_system;
            user = capped_user;
            meta.truncation.system_truncated = system_fired;
            meta.truncation.user_truncated = user_fired;
            meta.slimming_steps.push(SlimStep::HardCapTruncation);
            estimate = take_estimate(&system, &user, budget);

            tracing::warn!(
                system_truncated = system_fired,
                user_truncated = user_fired,
                tokens = estimate.total,
                "hard-cap truncation fired"
            );
            diagnostics.push(format!(
                "slimming: hard-cap-truncation (system: {system_fired}, user: {user_fired})"
            ));
        }
    }

    meta.estimated_tokens = estimate;
    (system, user)
}

fn apply_step(draft: &mut PromptDraft, step: SlimStep, meta: &mut PromptMeta) {
    match step {
        SlimStep::DropLowWeightImagery => {
            draft.remove(BlockKind::Imagery);
        }
        SlimStep::DropForecast => {
            draft.remove(BlockKind::Forecast);
        }
        SlimStep::DropEphemeris => {
            draft.remove(BlockKind::Ephemeris);
        }
        SlimStep::TrimGraphragPassages => {
            if let Some(included) = draft.trim_passages() {
                if let Some(pm) = meta.passage_meta.as_mut() {
                    pm.included = included;
                }
            }
        }
        SlimStep::DropGraphragBlock => {
            if draft.remove(BlockKind::Passages) {
                if let Some(pm) = meta.passage_meta.as_mut() {
                    pm.included = 0;
                }
            }
        }
        SlimStep::DropDeckGeometry => {
            draft.remove(BlockKind::DeckGeometry);
        }
        SlimStep::DropDiagnostics => {
            draft.remove(BlockKind::Diagnostics);
        }
        // Never dispatched from the canonical loop.
        SlimStep::HardCapTruncation => {}
    }
}

fn take_estimate(system: &str, user: &str, budget: usize) -> TokenEstimate {
    let system_tokens = token::estimate_tokens(system);
    let user_tokens = token::estimate_tokens(user);
    TokenEstimate {
        system: system_tokens,
        user: user_tokens,
        total: system_tokens + user_tokens,
        budget,
    }
}

/// Truncate the removable middle of `text` down to [`HARD_CAP_CHARS`],
/// keeping the head and tail around an elision marker. Any anchor the cut
/// removed is re-appended verbatim; space for the anchors present in the
/// input is reserved up front so the result never exceeds the ceiling.
fn hard_cap(text: &str, anchors: &[&str]) -> (String, bool) {
    if text.len() <= HARD_CAP_CHARS {
        return (text.to_string(), false);
    }

    let present: Vec<&str> = anchors
        .iter()
        .copied()
        .filter(|a| text.contains(*a))
        .collect();
    let reserved: usize =
        ELISION_MARKER.len() + present.iter().map(|a| a.len() + 2).sum::<usize>();
    let keep = HARD_CAP_CHARS.saturating_sub(reserved);
    let head_len = keep * 2 / 3;
    let tail_len = keep - head_len;

    let head_end = floor_char_boundary(text, head_len);
    let tail_start = ceil_char_boundary(text, text.len() - tail_len);

    let mut out = String::with_capacity(HARD_CAP_CHARS);
    out.push_str(&text[..head_end]);
    out.push_str(ELISION_MARKER);
    out.push_str(&text[tail_start..]);

    for anchor in present {
        if !out.contains(anchor) {
            out.push_str("\n\n");
            out.push_str(anchor);
        }
    }

    (out, true)
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
