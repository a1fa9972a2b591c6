//! # Arcanum Core
//!
//! Domain types, traits, and error definitions for the Arcanum reading
//! pipeline. This crate defines the model that all other crates implement
//! against: the `ReadingPayload` that flows through assembly, budgeting,
//! dispatch, and redaction, plus the `Backend` trait remote and local
//! generators implement.
//!
//! Implementations live in their respective crates so the dependency graph
//! stays inward-pointing and every seam can be tested with mocks.

pub mod backend;
pub mod error;
pub mod reading;

// Re-export key types at crate root for ergonomics
pub use backend::{Backend, GenerationRequest, GenerationResponse, Usage};
pub use error::{BackendError, Error, InputError, Result};
pub use reading::{
    CardEntry, Orientation, Passage, PassagePayload, Personalization, ReadingPayload,
    SpreadDescriptor, SpreadRelationshipAnalysis, SubscriptionTier, ThematicAnalysis,
};
