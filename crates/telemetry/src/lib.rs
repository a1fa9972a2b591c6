//! Reading telemetry for Arcanum.
//!
//! Two concerns live here: aggregating narrative-section validation results
//! into counts for observability, and the schema of the persisted telemetry
//! record (which only ever carries hashes, counts, and redacted detail —
//! never raw text).

pub mod record;
pub mod summary;

pub use record::{
    ErrorRecord, InputStats, OutputStats, StorageMode, TelemetryRecord, TimingStats,
    TELEMETRY_SCHEMA_VERSION,
};
pub use summary::{
    summarize, EnhancementValidation, Section, SectionMetadata, SectionSummary, TypeTally,
};
