//! Reading domain types.
//!
//! A `ReadingPayload` is created once per inbound request and flows through
//! assembly → budgeting → dispatch synchronously. The diagnostics list is the
//! request's own accumulator: pipeline stages return the diagnostics they
//! produce and the owning caller merges them here — one payload, one request,
//! never shared across concurrent requests.

use crate::error::InputError;
use arcanum_config::Environment;
use serde::{Deserialize, Serialize};

/// Which way a drawn card faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Upright,
    Reversed,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upright => write!(f, "upright"),
            Self::Reversed => write!(f, "reversed"),
        }
    }
}

/// One drawn card in its spread position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardEntry {
    /// Card name (e.g. "The Tower").
    pub card_name: String,
    /// Position label within the spread (e.g. "Past", "Obstacle").
    pub position: String,
    pub orientation: Orientation,
    /// Authored meaning text for this card in this position.
    pub meaning: String,
}

/// The spread being read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadDescriptor {
    /// Stable key used for routing and span tagging (e.g. "celtic-cross").
    pub key: String,
    /// Human-readable label.
    pub label: String,
    /// Ordered position labels.
    #[serde(default)]
    pub positions: Vec<String>,
}

/// Thematic analysis computed upstream from the drawn cards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThematicAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_suit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_theme: Option<String>,
    /// One theme line per card, in card order.
    #[serde(default)]
    pub card_themes: Vec<String>,
}

/// Cross-position relationship analysis (pairs, mirrors, progressions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadRelationshipAnalysis {
    pub summary: String,
    #[serde(default)]
    pub links: Vec<String>,
}

/// A retrieved reference passage eligible for prompt inclusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub source: String,
    pub text: String,
    /// Ranking score from retrieval (keyword or semantic).
    pub score: f32,
}

/// Precomputed retrieval payload. The pipeline only reuses or falls back
/// from this — ranking internals live upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassagePayload {
    pub passages: Vec<Passage>,
    /// Whether semantic scoring was requested for this retrieval.
    #[serde(default)]
    pub semantic_requested: bool,
    /// Whether semantic scoring was actually used.
    #[serde(default)]
    pub semantic_used: bool,
    /// Why retrieval fell back to keyword scoring, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Per-user presentation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Personalization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
}

/// Subscription tier, recorded in persisted telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Plus,
    Oracle,
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Plus => write!(f, "plus"),
            Self::Oracle => write!(f, "oracle"),
        }
    }
}

/// Everything one reading request carries through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingPayload {
    pub spread: SpreadDescriptor,
    /// Invariant: non-empty. Checked by [`ReadingPayload::validate`] before
    /// any other work.
    pub cards: Vec<CardEntry>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub reflections: String,
    #[serde(default)]
    pub themes: ThematicAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<SpreadRelationshipAnalysis>,
    /// Reading context tag (e.g. "love", "career", "general").
    #[serde(default)]
    pub context_tag: String,
    /// Deck style identifier (e.g. "rider-waite", "thoth").
    #[serde(default)]
    pub deck_style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passages: Option<PassagePayload>,
    #[serde(default)]
    pub personalization: Personalization,
    #[serde(default)]
    pub tier: SubscriptionTier,
    /// Request-scoped configuration view. Resolved per call, never cached in
    /// shared state.
    #[serde(default)]
    pub env: Environment,
    /// Per-request diagnostics accumulator (append-only). Must be a fresh
    /// instance per request.
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

impl ReadingPayload {
    /// Check the card-list invariant. Fatal on violation; callers surface
    /// this before doing any other work with the payload.
    pub fn validate(&self) -> std::result::Result<(), InputError> {
        if self.cards.is_empty() {
            return Err(InputError::empty_card_list());
        }
        Ok(())
    }

    /// Deserialize a payload from JSON, checking the card-list invariant at
    /// the boundary so a missing, null, or non-list `cards` field raises the
    /// same fatal error as an empty list — with the literal offending value
    /// in the message.
    pub fn from_json(value: serde_json::Value) -> std::result::Result<Self, crate::Error> {
        match value.get("cards") {
            None => return Err(InputError::missing_card_list().into()),
            Some(serde_json::Value::Array(items)) if items.is_empty() => {
                return Err(InputError::empty_card_list().into());
            }
            Some(serde_json::Value::Array(_)) => {}
            Some(other) => return Err(InputError::bad_card_value(other).into()),
        }
        let payload: Self = serde_json::from_value(value)?;
        payload.validate().map_err(crate::Error::from)?;
        Ok(payload)
    }

    /// Stable key for span tagging.
    pub fn spread_key(&self) -> &str {
        &self.spread.key
    }
}
