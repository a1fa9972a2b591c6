//! Shared payload builders for crate tests.

use arcanum_config::{Environment, KEY_GRAPHRAG};
use arcanum_core::reading::*;

/// A payload with every optional block populated and a question padded to at
/// least `question_len` characters, so slimming tests can push the estimate
/// wherever they need it.
pub(crate) fn oversized_payload(question_len: usize) -> ReadingPayload {
    let mut env = Environment::new();
    env.set(KEY_GRAPHRAG, "true");

    let phrase = "Will this path keep unfolding the way I hope it will? ";
    let question = phrase.repeat(question_len / phrase.len() + 1);

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
                meaning: "New beginnings, innocence, a leap taken on trust".into(),
            },
            CardEntry {
                card_name: "The Tower".into(),
                position: "Present".into(),
                orientation: Orientation::Reversed,
                meaning: "Upheaval deferred, pressure building under the surface".into(),
            },
            CardEntry {
                card_name: "The Star".into(),
                position: "Future".into(),
                orientation: Orientation::Upright,
                meaning: "Hope, renewal, a long horizon coming clear".into(),
            },
        ],
        question,
        reflections: "I keep circling the same doubt and want to see it plainly.".into(),
        themes: ThematicAnalysis {
            dominant_suit: Some("Major Arcana".into()),
            dominant_theme: Some("threshold".into()),
            card_themes: vec!["trust".into(), "release".into(), "patience".into()],
        },
        relationships: Some(SpreadRelationshipAnalysis {
            summary: "The Fool and The Star bracket The Tower — a crossing, not a collapse."
                .into(),
            links: vec!["Past feeds Future through the Present's release".into()],
        }),
        context_tag: "career".into(),
        deck_style: "rider-waite".into(),
        passages: Some(PassagePayload {
            passages: vec![
                Passage {
                    source: "waite-pictorial-key".into(),
                    text: "The Star speaks of the gifts of the spirit, poured freely."
                        .repeat(3),
                    score: 0.91,
                },
                Passage {
                    source: "tower-notes".into(),
                    text: "The Tower reversed holds its lightning a moment longer.".repeat(3),
                    score: 0.82,
                },
                Passage {
                    source: "fool-notes".into(),
                    text: "The Fool steps out with the dog of instinct at his heel.".repeat(3),
                    score: 0.67,
                },
                Passage {
                    source: "spread-lore".into(),
                    text: "Three-card lines read left to right as a single breath.".repeat(3),
                    score: 0.55,
                },
            ],
            semantic_requested: true,
            semantic_used: true,
            fallback_reason: None,
        }),
        personalization: Personalization {
            display_name: Some("Rowan".into()),
            tone: Some("steady".into()),
            verbosity: None,
        },
        tier: SubscriptionTier::Plus,
        env,
        diagnostics: vec!["retrieval cache warm".into()],
    }
}
