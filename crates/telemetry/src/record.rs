//! The persisted-telemetry record shape.
//!
//! Emitted only when persistence is enabled (off by default). The record
//! carries no raw prompt or response text — that path goes through the
//! privacy crate — and how much of an error's detail survives depends on
//! the configured storage mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current record schema version.
pub const TELEMETRY_SCHEMA_VERSION: u32 = 2;

/// How much detail the error sub-record may keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Error kind only; detail omitted entirely.
    Minimal,
    /// Detail truncated to a fixed length.
    #[default]
    Redact,
    /// Detail kept in full.
    Full,
}

impl StorageMode {
    /// Parse a configured mode string; unrecognized values fall back to
    /// `Redact`, the privacy-conservative middle.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "minimal" => Self::Minimal,
            "full" => Self::Full,
            _ => Self::Redact,
        }
    }
}

/// Maximum error-detail length retained under `Redact`.
const REDACTED_DETAIL_MAX: usize = 256;

/// Error sub-record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Stable error kind (e.g. "timeout", "api-error").
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorRecord {
    /// Build an error record, keeping detail per the storage mode.
    pub fn new(kind: impl Into<String>, detail: &str, mode: StorageMode) -> Self {
        let detail = match mode {
            StorageMode::Minimal => None,
            StorageMode::Redact => {
                let mut end = detail.len().min(REDACTED_DETAIL_MAX);
                while !detail.is_char_boundary(end) {
                    end -= 1;
                }
                Some(detail[..end].to_string())
            }
            StorageMode::Full => Some(detail.to_string()),
        };
        Self {
            kind: kind.into(),
            detail,
        }
    }
}

/// Input-side metrics for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputStats {
    pub system_tokens: usize,
    pub user_tokens: usize,
    pub budget: usize,
    /// Names of the slimming steps that fired, in firing order.
    #[serde(default)]
    pub slimming_steps: Vec<String>,
}

/// Output-side metrics for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputStats {
    pub completion_tokens: u32,
    pub reading_length: usize,
    pub section_count: usize,
}

/// Timing metrics for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingStats {
    pub total_ms: u64,
    pub backend_ms: u64,
}

/// One persisted telemetry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub schema_version: u32,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    /// Feature that produced this record (e.g. "reading").
    pub feature: String,
    /// "ok" or "error".
    pub status: String,
    /// Backend id that served (or failed) the request.
    pub provider: String,
    pub model: String,
    pub tier: String,
    pub input: InputStats,
    pub output: OutputStats,
    pub timing: TimingStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl TelemetryRecord {
    /// A fresh record stamped with the current schema version and time.
    pub fn new(
        request_id: impl Into<String>,
        feature: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        tier: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: TELEMETRY_SCHEMA_VERSION,
            request_id: request_id.into(),
            timestamp: Utc::now(),
            feature: feature.into(),
            status: "ok".into(),
            provider: provider.into(),
            model: model.into(),
            tier: tier.into(),
            input: InputStats::default(),
            output: OutputStats::default(),
            timing: TimingStats::default(),
            error: None,
        }
    }

    /// Mark the record failed, attaching the error per the storage mode.
    pub fn with_error(mut self, kind: &str, detail: &str, mode: StorageMode) -> Self {
        self.status = "error".into();
        self.error = Some(ErrorRecord::new(kind, detail, mode));
        self
    }
}
