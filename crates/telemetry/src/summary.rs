//! Aggregation of narrative-section validation results.
//!
//! Generated readings arrive as a list of sections, each carrying optional
//! type/name metadata and an optional enhancement-validation record. The
//! summarizer folds them into counts for observability and must not fail on
//! sections missing either — absent fields default to empty collections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional identity metadata on a generated section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionMetadata {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Validation results attached to a generated section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhancementValidation {
    #[serde(default)]
    pub enhanced: bool,
    /// Tags of enhancements that were applied.
    #[serde(default)]
    pub enhancements: Vec<String>,
    /// Tags of requirements the validator found missing.
    #[serde(default)]
    pub missing: Vec<String>,
    /// Requirement-presence map (kept verbatim, not aggregated).
    #[serde(default)]
    pub present: serde_json::Map<String, serde_json::Value>,
}

/// One generated narrative section as the validator hands it over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SectionMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<EnhancementValidation>,
}

/// Enhanced/total tally for one section type.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TypeTally {
    pub enhanced: u32,
    pub total: u32,
}

/// The aggregated view over all sections of one reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSummary {
    pub total_sections: usize,
    pub enhanced_sections: usize,
    /// Per-type enhanced/total tallies.
    pub by_type: BTreeMap<String, TypeTally>,
    /// Frequency of applied enhancement tags.
    pub enhancement_counts: BTreeMap<String, u32>,
    /// Frequency of missing-requirement tags.
    pub missing_counts: BTreeMap<String, u32>,
    /// Resolved section names, in section order: name → type → index.
    pub section_names: Vec<String>,
}

/// Summarize a reading's sections. `None` for an empty list.
pub fn summarize(sections: &[Section]) -> Option<SectionSummary> {
    if sections.is_empty() {
        return None;
    }

    let mut summary = SectionSummary {
        total_sections: sections.len(),
        enhanced_sections: 0,
        by_type: BTreeMap::new(),
        enhancement_counts: BTreeMap::new(),
        missing_counts: BTreeMap::new(),
        section_names: Vec::with_capacity(sections.len()),
    };

    for (index, section) in sections.iter().enumerate() {
        let metadata = section.metadata.clone().unwrap_or_default();
        let validation = section.validation.clone().unwrap_or_default();

        let kind = metadata.kind.clone().unwrap_or_else(|| "unknown".into());
        let tally = summary.by_type.entry(kind.clone()).or_default();
        tally.total += 1;

        if validation.enhanced {
            summary.enhanced_sections += 1;
            tally.enhanced += 1;
        }

        for tag in &validation.enhancements {
            *summary.enhancement_counts.entry(tag.clone()).or_insert(0) += 1;
        }
        for tag in &validation.missing {
            *summary.missing_counts.entry(tag.clone()).or_insert(0) += 1;
        }

        let name = metadata
            .name
            .or(metadata.kind)
            .unwrap_or_else(|| format!("section-{}", index + 1));
        summary.section_names.push(name);
    }

    Some(summary)
}
