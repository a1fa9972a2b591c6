//! Prompt assembly — the entry point of the budgeting pipeline.
//!
//! Builds a block-structured draft from a `ReadingPayload`: mandatory blocks
//! (persona, principles, ethics, directives, card-by-card content) that are
//! never removed, and named optional blocks the slimming pipeline may drop
//! one at a time. Assembly is deterministic: identical payloads always
//! produce identical prompt pairs.
//!
//! Every assembly call returns the diagnostics it produced; the owning
//! caller merges them into its own per-request accumulator.

use crate::meta::{PassageMeta, PromptMeta};
use crate::slimmer;
use arcanum_core::error::InputError;
use arcanum_core::reading::{Passage, ReadingPayload};

/// Literal substrings that must survive any truncation of the system prompt.
pub const CORE_PRINCIPLES_ANCHOR: &str = "## Core Principles";
pub const ETHICS_ANCHOR: &str = "## Ethical Boundaries";
pub const DIRECTIVES_ANCHOR: &str = "## Response Directives";

/// All safety anchors, in document order.
pub const SAFETY_ANCHORS: [&str; 3] = [CORE_PRINCIPLES_ANCHOR, ETHICS_ANCHOR, DIRECTIVES_ANCHOR];

/// Default token budget when neither the backend nor the environment
/// supplies one.
pub const DEFAULT_TOKEN_BUDGET: usize = 2048;

// ── Draft model ───────────────────────────────────────────────────────────

/// The named prompt blocks. Removable kinds are the slimming targets;
/// everything else survives every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    // System side
    Persona,
    CorePrinciples,
    SafetyPolicy,
    ModelDirectives,
    DeckGeometry,
    Imagery,
    Diagnostics,
    // User side
    CardContent,
    Question,
    Reflections,
    Themes,
    Relationships,
    Ephemeris,
    Forecast,
    Passages,
}

impl BlockKind {
    /// Whether the slimming pipeline is allowed to remove this block.
    pub fn removable(self) -> bool {
        matches!(
            self,
            Self::DeckGeometry
                | Self::Imagery
                | Self::Diagnostics
                | Self::Ephemeris
                | Self::Forecast
                | Self::Passages
        )
    }
}

/// One rendered block of prompt text.
#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
}

/// A prompt pair under construction. The slimming pipeline mutates this
/// until the estimate fits the budget, then it is rendered once.
#[derive(Debug, Clone)]
pub struct PromptDraft {
    system: Vec<Block>,
    user: Vec<Block>,
    /// Structured copy of the included passages, kept so the trim step can
    /// shrink the block instead of dropping it.
    passages: Vec<Passage>,
}

impl PromptDraft {
    pub fn render_system(&self) -> String {
        render(&self.system)
    }

    pub fn render_user(&self) -> String {
        render(&self.user)
    }

    pub fn has(&self, kind: BlockKind) -> bool {
        self.system.iter().chain(self.user.iter()).any(|b| b.kind == kind)
    }

    /// Remove a removable block from whichever side holds it.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, kind: BlockKind) -> bool {
        debug_assert!(kind.removable());
        let before = self.system.len() + self.user.len();
        self.system.retain(|b| b.kind != kind);
        self.user.retain(|b| b.kind != kind);
        if kind == BlockKind::Passages {
            self.passages.clear();
        }
        self.system.len() + self.user.len() < before
    }

    /// Halve the passage list (keeping the highest-scored) and cap each
    /// passage's length, then re-render the passage block in place.
    /// Returns the new included count, or `None` if there was nothing to trim.
    pub fn trim_passages(&mut self) -> Option<usize> {
        if self.passages.len() <= 1 && !self.passages.iter().any(|p| p.text.len() > PASSAGE_CHAR_CAP)
        {
            return None;
        }
        self.passages
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let keep = (self.passages.len() + 1) / 2;
        self.passages.truncate(keep.max(1));
        for passage in &mut self.passages {
            if passage.text.len() > PASSAGE_CHAR_CAP {
                let end = floor_char_boundary(&passage.text, PASSAGE_CHAR_CAP);
                passage.text.truncate(end);
                passage.text.push('…');
            }
        }
        let rendered = render_passage_block(&self.passages);
        for block in &mut self.user {
            if block.kind == BlockKind::Passages {
                block.text = rendered.clone();
            }
        }
        Some(self.passages.len())
    }
}

/// Per-passage length cap applied by the trim step.
const PASSAGE_CHAR_CAP: usize = 280;

fn render(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ── Assembly ──────────────────────────────────────────────────────────────

/// Options for one assembly call, resolved by the dispatcher from the
/// backend's budget target and the request environment.
#[derive(Debug, Clone, Copy)]
pub struct AssembleOptions {
    pub token_budget: usize,
    pub slimming_enabled: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            token_budget: DEFAULT_TOKEN_BUDGET,
            slimming_enabled: false,
        }
    }
}

/// An assembled, budgeted prompt pair plus its metadata side-channel.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
    pub meta: PromptMeta,
    /// Diagnostics produced by this call, for the owner to merge.
    pub diagnostics: Vec<String>,
}

/// Assemble the prompt pair for a reading.
///
/// Validates the card-list invariant before any other work, builds the
/// block draft, and runs it through the budget enforcement pipeline. Never
/// fails past validation: the result is always a usable (possibly degraded)
/// prompt pair with fully populated metadata.
pub fn assemble_prompt(
    payload: &ReadingPayload,
    options: &AssembleOptions,
) -> Result<AssembledPrompt, InputError> {
    payload.validate()?;

    let mut diagnostics = Vec::new();
    let (mut draft, passage_meta) = build_draft(payload, &mut diagnostics);

    let mut meta = PromptMeta::new(options.slimming_enabled);
    meta.passage_meta = passage_meta;

    let (system_prompt, user_prompt) = slimmer::enforce_budget(
        &mut draft,
        options.token_budget,
        options.slimming_enabled,
        &mut meta,
        &mut diagnostics,
    );

    Ok(AssembledPrompt {
        system_prompt,
        user_prompt,
        meta,
        diagnostics,
    })
}

pub(crate) fn build_draft(
    payload: &ReadingPayload,
    diagnostics: &mut Vec<String>,
) -> (PromptDraft, Option<PassageMeta>) {
    let mut system = Vec::new();
    let mut user = Vec::new();

    // ── System side ───────────────────────────────────────────────────
    system.push(Block {
        kind: BlockKind::Persona,
        text: persona_text(payload),
    });
    system.push(Block {
        kind: BlockKind::CorePrinciples,
        text: format!(
            "{CORE_PRINCIPLES_ANCHOR}\n\
             - Ground every statement in the drawn cards and their positions.\n\
             - Interpretation describes tendencies and invitations, never fixed fate.\n\
             - Keep the seeker's agency at the center of the reading."
        ),
    });
    system.push(Block {
        kind: BlockKind::SafetyPolicy,
        text: format!(
            "{ETHICS_ANCHOR}\n\
             - Never give medical, legal, or financial directives.\n\
             - Never predict death, illness, or harm to the seeker or anyone else.\n\
             - Decline to characterize third parties who have not consented to a reading."
        ),
    });
    system.push(Block {
        kind: BlockKind::ModelDirectives,
        text: format!(
            "{DIRECTIVES_ANCHOR}\n\
             - Open with a one-paragraph overview of the spread's overall tone.\n\
             - Address each position in order, naming the card and its orientation.\n\
             - Close with grounded guidance the seeker can act on."
        ),
    });

    if !payload.spread.positions.is_empty() {
        system.push(Block {
            kind: BlockKind::DeckGeometry,
            text: geometry_text(payload),
        });
    }

    system.push(Block {
        kind: BlockKind::Imagery,
        text: format!(
            "Imagery notes: when it serves the reading, draw lightly on the visual \
             language of the {} deck — its color symbolism and recurring figures — \
             without cataloguing every detail.",
            nonempty_or(&payload.deck_style, "rider-waite")
        ),
    });

    if !payload.diagnostics.is_empty() {
        let mut text = String::from("Context notes:");
        for note in &payload.diagnostics {
            text.push_str("\n- ");
            text.push_str(note);
        }
        system.push(Block {
            kind: BlockKind::Diagnostics,
            text,
        });
    }

    // ── User side ─────────────────────────────────────────────────────
    user.push(Block {
        kind: BlockKind::CardContent,
        text: card_content_text(payload),
    });

    if !payload.question.trim().is_empty() {
        user.push(Block {
            kind: BlockKind::Question,
            text: format!("Question: \"{}\"", payload.question.trim()),
        });
    }

    if !payload.reflections.trim().is_empty() {
        user.push(Block {
            kind: BlockKind::Reflections,
            text: format!("Reflections:\n{}", payload.reflections.trim()),
        });
    }

    if payload.themes.dominant_suit.is_some() || payload.themes.dominant_theme.is_some() {
        user.push(Block {
            kind: BlockKind::Themes,
            text: themes_text(payload),
        });
    }

    if let Some(rel) = &payload.relationships {
        let mut text = format!("Position relationships: {}", rel.summary);
        for link in &rel.links {
            text.push_str("\n- ");
            text.push_str(link);
        }
        user.push(Block {
            kind: BlockKind::Relationships,
            text,
        });
    }

    user.push(Block {
        kind: BlockKind::Ephemeris,
        text: "Timing context: frame any timing in terms of natural cycles — lunar \
               phases, seasons, turning points — rather than calendar dates."
            .into(),
    });

    user.push(Block {
        kind: BlockKind::Forecast,
        text: "Forecast focus: after the position-by-position reading, offer a \
               forward-looking passage for the coming cycle, anchored in the final \
               position of the spread."
            .into(),
    });

    // ── Reference passages ────────────────────────────────────────────
    let mut passages: Vec<Passage> = Vec::new();
    let passage_meta = payload.passages.as_ref().map(|p| {
        let graphrag_on = payload.env.graphrag_enabled();
        if graphrag_on && !p.passages.is_empty() {
            passages = p.passages.clone();
            user.push(Block {
                kind: BlockKind::Passages,
                text: render_passage_block(&passages),
            });
            diagnostics.push(format!(
                "graphrag: included {} of {} retrieved passages",
                passages.len(),
                p.passages.len()
            ));
        } else if !graphrag_on {
            diagnostics.push("graphrag: passages present but retrieval flag disabled".into());
        }
        if payload.env.semantic_scoring_override() == Some(false) && p.semantic_used {
            diagnostics.push(
                "graphrag: semantic scoring disabled by override, but passages were \
                 semantically ranked upstream"
                    .into(),
            );
        }
        PassageMeta {
            retrieved: p.passages.len(),
            included: passages.len(),
            semantic_requested: p.semantic_requested,
            semantic_used: p.semantic_used,
            fallback_reason: p.fallback_reason.clone(),
        }
    });

    (
        PromptDraft {
            system,
            user,
            passages,
        },
        passage_meta,
    )
}

fn persona_text(payload: &ReadingPayload) -> String {
    let mut text = format!(
        "You are Arcanum, an experienced tarot reader. You are interpreting the \
         {} spread with a {} deck for a seeker asking about {}.",
        payload.spread.label,
        nonempty_or(&payload.deck_style, "rider-waite"),
        nonempty_or(&payload.context_tag, "their path"),
    );
    if let Some(name) = &payload.personalization.display_name {
        text.push_str(&format!(" Address the seeker as {name}."));
    }
    if let Some(tone) = &payload.personalization.tone {
        text.push_str(&format!(" Keep the tone {tone}."));
    }
    if let Some(verbosity) = &payload.personalization.verbosity {
        text.push_str(&format!(" Aim for a {verbosity} reading."));
    }
    text
}

fn geometry_text(payload: &ReadingPayload) -> String {
    let positions = payload
        .spread
        .positions
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {}", i + 1, p))
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "Spread geometry: {} lays {} positions — {}.",
        payload.spread.label,
        payload.spread.positions.len(),
        positions
    )
}

fn card_content_text(payload: &ReadingPayload) -> String {
    let mut text = String::from("Cards drawn:");
    for (i, card) in payload.cards.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} — {} ({})\n   Meaning: {}",
            i + 1,
            card.card_name,
            card.position,
            card.orientation,
            card.meaning
        ));
        if let Some(theme) = payload.themes.card_themes.get(i) {
            text.push_str(&format!("\n   Theme: {theme}"));
        }
    }
    text
}

fn themes_text(payload: &ReadingPayload) -> String {
    let suit = payload
        .themes
        .dominant_suit
        .as_deref()
        .unwrap_or("none dominant");
    let theme = payload
        .themes
        .dominant_theme
        .as_deref()
        .unwrap_or("none dominant");
    format!("Thematic analysis: dominant suit — {suit}; dominant theme — {theme}.")
}

fn render_passage_block(passages: &[Passage]) -> String {
    let mut text = String::from("Reference passages:");
    for passage in passages {
        text.push_str(&format!("\n- [{}] {}", passage.source, passage.text));
    }
    text
}

fn nonempty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcanum_config::{Environment, KEY_GRAPHRAG};
    use arcanum_core::reading::*;

    fn payload() -> ReadingPayload {
        ReadingPayload {
            spread: SpreadDescriptor {
                key: "three-card".into(),
                label: "Past / Present / Future".into(),
                positions: vec!["Past".into(), "Present".into(), "Future".into()],
            },
            cards: vec![
                CardEntry {
                    card_name: "The Fool".into(),
                    position: "Past".into(),
                    orientation: Orientation::Upright,
                    meaning: "New beginnings, a leap taken on trust".into(),
                },
                CardEntry {
                    card_name: "Two of Cups".into(),
                    position: "Present".into(),
                    orientation: Orientation::Upright,
                    meaning: "Partnership, mutual recognition".into(),
                },
                CardEntry {
                    card_name: "The Star".into(),
                    position: "Future".into(),
                    orientation: Orientation::Reversed,
                    meaning: "Hope obscured, renewal delayed".into(),
                },
            ],
            question: "Where is my work life heading?".into(),
            reflections: "I keep circling the same doubt.".into(),
            themes: ThematicAnalysis {
                dominant_suit: Some("Cups".into()),
                dominant_theme: Some("renewal".into()),
                card_themes: vec!["trust".into(), "connection".into(), "patience".into()],
            },
            relationships: None,
            context_tag: "career".into(),
            deck_style: "rider-waite".into(),
            passages: None,
            personalization: Personalization::default(),
            tier: SubscriptionTier::Free,
            env: Environment::new(),
            diagnostics: Vec::new(),
        }
    }

    fn with_passages(mut p: ReadingPayload) -> ReadingPayload {
        p.env.set(KEY_GRAPHRAG, "true");
        p.passages = Some(PassagePayload {
            passages: vec![
                Passage {
                    source: "waite-pictorial-key".into(),
                    text: "The Star speaks of the gifts of the spirit.".into(),
                    score: 0.91,
                },
                Passage {
                    source: "card-notes".into(),
                    text: "Two of Cups marks the meeting of equals.".into(),
                    score: 0.74,
                },
            ],
            semantic_requested: true,
            semantic_used: false,
            fallback_reason: Some("embedding service unavailable".into()),
        });
        p
    }

    fn options() -> AssembleOptions {
        AssembleOptions {
            token_budget: 4096,
            slimming_enabled: false,
        }
    }

    #[test]
    fn anchors_present_in_system_prompt() {
        let out = assemble_prompt(&payload(), &options()).unwrap();
        for anchor in SAFETY_ANCHORS {
            assert!(out.system_prompt.contains(anchor), "missing {anchor}");
        }
    }

    #[test]
    fn card_content_lists_every_card() {
        let out = assemble_prompt(&payload(), &options()).unwrap();
        assert!(out.user_prompt.contains("The Fool — Past (upright)"));
        assert!(out.user_prompt.contains("The Star — Future (reversed)"));
        assert!(out.user_prompt.contains("Theme: connection"));
    }

    #[test]
    fn question_and_reflections_included() {
        let out = assemble_prompt(&payload(), &options()).unwrap();
        assert!(out.user_prompt.contains("Question: \"Where is my work life heading?\""));
        assert!(out.user_prompt.contains("Reflections:\nI keep circling the same doubt."));
    }

    #[test]
    fn empty_card_list_raises_immediately() {
        let mut p = payload();
        p.cards.clear();
        let err = assemble_prompt(&p, &options()).unwrap_err();
        assert!(err.to_string().contains("length 0"));
    }

    #[test]
    fn within_budget_means_no_steps() {
        let out = assemble_prompt(&payload(), &options()).unwrap();
        assert!(out.meta.slimming_steps.is_empty());
        assert!(out.meta.estimated_tokens.total > 0);
        assert_eq!(out.meta.estimated_tokens.budget, 4096);
    }

    #[test]
    fn passages_included_when_flag_on() {
        let out = assemble_prompt(&with_passages(payload()), &options()).unwrap();
        assert!(out.user_prompt.contains("Reference passages:"));
        assert!(out.user_prompt.contains("waite-pictorial-key"));

        let meta = out.meta.passage_meta.unwrap();
        assert_eq!(meta.retrieved, 2);
        assert_eq!(meta.included, 2);
        assert!(meta.semantic_requested);
        assert!(!meta.semantic_used);
        assert_eq!(
            meta.fallback_reason.as_deref(),
            Some("embedding service unavailable")
        );
    }

    #[test]
    fn passages_skipped_when_flag_off() {
        let mut p = with_passages(payload());
        p.env = Environment::new(); // drop the graphrag flag
        let out = assemble_prompt(&p, &options()).unwrap();
        assert!(!out.user_prompt.contains("Reference passages:"));
        assert_eq!(out.meta.passage_meta.unwrap().included, 0);
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.contains("retrieval flag disabled")));
    }

    #[test]
    fn personalization_flows_into_persona() {
        let mut p = payload();
        p.personalization.display_name = Some("Wren".into());
        p.personalization.tone = Some("gentle".into());
        let out = assemble_prompt(&p, &options()).unwrap();
        assert!(out.system_prompt.contains("Address the seeker as Wren."));
        assert!(out.system_prompt.contains("Keep the tone gentle."));
    }

    #[test]
    fn assembly_is_deterministic() {
        let p = with_passages(payload());
        let a = assemble_prompt(&p, &options()).unwrap();
        let b = assemble_prompt(&p, &options()).unwrap();
        assert_eq!(a.system_prompt, b.system_prompt);
        assert_eq!(a.user_prompt, b.user_prompt);
        assert_eq!(a.meta.estimated_tokens.total, b.meta.estimated_tokens.total);
    }

    #[test]
    fn payload_diagnostics_render_as_context_notes() {
        let mut p = payload();
        p.diagnostics.push("deck assets resolved from cache".into());
        let out = assemble_prompt(&p, &options()).unwrap();
        assert!(out.system_prompt.contains("Context notes:"));
        assert!(out.system_prompt.contains("deck assets resolved from cache"));
    }

    #[test]
    fn draft_remove_reports_absence() {
        let (mut draft, _) = build_draft(&payload(), &mut Vec::new());
        assert!(draft.remove(BlockKind::Imagery));
        assert!(!draft.remove(BlockKind::Imagery));
        assert!(!draft.remove(BlockKind::Passages));
    }
}
