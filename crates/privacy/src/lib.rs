//! Privacy redaction for Arcanum.
//!
//! Nothing user-authored may be persisted raw. Before any prompt or response
//! text reaches storage it passes through three independent layers, each
//! individually testable:
//!
//! 1. **Content stripping** — whole free-text regions known to carry
//!    user-authored content are replaced with fixed placeholders, shrinking
//!    the attack surface for the pattern matchers.
//! 2. **Pattern redaction** — a fixed, ordered table of (category, matcher,
//!    placeholder) rules covering emails, phone numbers across regional
//!    formats, government ids, payment cards, dates, URLs, IPv4 addresses,
//!    and precise coordinates.
//! 3. **Name redaction** — the seeker's display name, any additional names,
//!    and heuristically extracted name hints, matched with Unicode-aware
//!    boundary logic.
//!
//! `redact` is pure and idempotent on already-clean text; a second pass
//! changes nothing.

pub mod names;
pub mod persist;
pub mod redact;

pub use names::extract_name_hints;
pub use persist::{
    build_persistable_payload, content_hash, structural_features, PersistablePrompt,
    StructuralFeatures,
};
pub use redact::{redact, RedactionOptions};
