//! Persistable payload construction.
//!
//! Storage never sees raw text: the record carries content hashes (for
//! deduplication), redacted text, and structural features extracted from the
//! original — enough for analytics, nothing identifying.

use crate::names::extract_name_hints;
use crate::redact::{redact, RedactionOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Shape metrics taken from the original (pre-redaction) text.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StructuralFeatures {
    pub length: usize,
    pub word_count: usize,
    pub line_count: usize,
    pub has_headings: bool,
    pub has_lists: bool,
    pub has_tables: bool,
}

/// SHA-256 of the raw text, hex-encoded. Lets storage deduplicate without
/// ever holding the text itself.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract structural features from the original text.
pub fn structural_features(text: &str) -> StructuralFeatures {
    let lines: Vec<&str> = text.lines().collect();
    StructuralFeatures {
        length: text.len(),
        word_count: text.split_whitespace().count(),
        line_count: lines.len(),
        has_headings: lines.iter().any(|l| l.trim_start().starts_with('#')),
        has_lists: lines
            .iter()
            .any(|l| {
                let t = l.trim_start();
                t.starts_with("- ") || t.starts_with("* ") || starts_with_ordinal(t)
            }),
        has_tables: lines.iter().any(|l| l.trim_start().starts_with('|')),
    }
}

fn starts_with_ordinal(line: &str) -> bool {
    let digits: String = line.chars().take_while(|c| c.is_ascii_digit()).collect();
    !digits.is_empty() && line[digits.len()..].starts_with(". ")
}

/// The record storage receives: hashes, redacted text, and shape metrics.
/// Never raw text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistablePrompt {
    pub system_hash: String,
    pub user_hash: String,
    pub system_redacted: String,
    pub user_redacted: String,
    pub system_features: StructuralFeatures,
    pub user_features: StructuralFeatures,
}

/// Build the persistable record for a prompt pair.
///
/// Name hints are extracted from the raw text (before stripping removes the
/// prose they live in) and fed into the name-redaction layer, so names that
/// appear only in user prose are still protected.
pub fn build_persistable_payload(
    system_prompt: &str,
    user_prompt: &str,
    options: &RedactionOptions,
) -> PersistablePrompt {
    let mut opts = options.clone();
    for hint in extract_name_hints(user_prompt)
        .into_iter()
        .chain(extract_name_hints(system_prompt))
    {
        if !opts.extra_names.contains(&hint) {
            opts.extra_names.push(hint);
        }
    }

    PersistablePrompt {
        system_hash: content_hash(system_prompt),
        user_hash: content_hash(user_prompt),
        system_redacted: redact(system_prompt, &opts),
        user_redacted: redact(user_prompt, &opts),
        system_features: structural_features(system_prompt),
        user_features: structural_features(user_prompt),
    }
}
