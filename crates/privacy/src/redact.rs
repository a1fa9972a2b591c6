//! Content stripping and pattern-based redaction.
//!
//! The pattern table is data, not code: an ordered list of
//! (category, matcher, placeholder) entries processed by a stateless
//! evaluator. Matchers are compiled once into an immutable static table.

use crate::names;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Options for one redaction pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionOptions {
    /// The seeker's display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Additional proper names to redact (e.g. extracted name hints).
    #[serde(default)]
    pub extra_names: Vec<String>,
    /// Caller-supplied free-form patterns. A pattern that fails to compile
    /// is skipped; it never aborts the remaining passes.
    #[serde(default)]
    pub custom_patterns: Vec<String>,
}

// ── Layer 1: content stripping ────────────────────────────────────────────

struct StripRule {
    regex: Regex,
    replacement: &'static str,
}

/// Whole-region stripping of user-authored content, keyed to the prompt
/// layout the assembler produces. Applied before pattern matching.
static STRIP_RULES: LazyLock<Vec<StripRule>> = LazyLock::new(|| {
    vec![
        // Explicit question field.
        StripRule {
            regex: compile(r#"(?m)^Question: ".*"$"#),
            replacement: r#"Question: "[QUESTION]""#,
        },
        // Reflection block, up to the next blank line.
        StripRule {
            regex: compile(r"(?ms)^Reflections:\n(.*?)(\n\n|\z)"),
            replacement: "Reflections:\n[REFLECTION]$2",
        },
        // User text embedded inside position labels on card lines.
        StripRule {
            regex: compile(r"(?m)^(\s*\d+\. [^\n—]+— )[^\n(]+( \((?:upright|reversed)\))$"),
            replacement: "${1}[USER_TEXT]${2}",
        },
    ]
});

/// Replace user-authored free-text regions with fixed placeholders.
pub fn strip_user_content(text: &str) -> String {
    let mut out = text.to_string();
    for rule in STRIP_RULES.iter() {
        out = rule.regex.replace_all(&out, rule.replacement).into_owned();
    }
    out
}

// ── Layer 2: pattern table ────────────────────────────────────────────────

struct PatternRule {
    #[allow(dead_code)]
    category: &'static str,
    regex: Regex,
    placeholder: &'static str,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static redaction pattern must compile")
}

/// The fixed, ordered redaction table. Order matters: phones before dates
/// keeps separators from being half-eaten, URLs run after emails so an
/// address in a query string is already gone.
static PATTERN_TABLE: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    let entries: [(&'static str, &'static str, &'static str); 15] = [
        (
            "email",
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            "[EMAIL]",
        ),
        // North American: (415) 555-2671, +1 415-555-2671
        (
            "phone-na",
            r"(?:\+?1[-. ])?\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b",
            "[PHONE]",
        ),
        // UK: +44 7700 900123, 020 7946 0958
        (
            "phone-uk",
            r"\b(?:\+44[ -]?\d{4}|0\d{2,4})[ -]?\d{3,4}[ -]?\d{3,4}\b",
            "[PHONE]",
        ),
        // France: +33 6 12 34 56 78, 06 12 34 56 78
        (
            "phone-fr",
            r"\b(?:\+33[ -]?|0)[1-9](?:[ .-]?\d{2}){4}\b",
            "[PHONE]",
        ),
        // Germany: +49 30 901820, 030/901820
        (
            "phone-de",
            r"\b(?:\+49[ -]?|0)\d{2,4}[ /-]\d{3,8}\b",
            "[PHONE]",
        ),
        // Other EU country codes (+30..+39, +3xx)
        (
            "phone-eu",
            r"\b\+3\d{1,2}[ -]?\d{2,4}[ -]?\d{3}[ -]?\d{3,4}\b",
            "[PHONE]",
        ),
        // Australian mobiles: +61 412 345 678, 0412 345 678
        (
            "phone-au",
            r"\b(?:\+61[ -]?|0)4\d{2}[ -]?\d{3}[ -]?\d{3}\b",
            "[PHONE]",
        ),
        // Japan: +81 90-1234-5678, 03-1234-5678
        (
            "phone-jp",
            r"\b(?:\+81[ -]?|0)\d{1,4}[ -]\d{3,4}[ -]\d{4}\b",
            "[PHONE]",
        ),
        // Generic international fallback
        (
            "phone-intl",
            r"\+\d{1,3}[ -]?\d{2,4}[ -]?\d{3,4}[ -]?\d{3,4}\b",
            "[PHONE]",
        ),
        // Government ids: US SSN, UK National Insurance
        (
            "gov-id",
            r"\b(?:\d{3}-\d{2}-\d{4}|[A-Z]{2}\d{6}[A-D])\b",
            "[GOV_ID]",
        ),
        (
            "payment-card",
            r"\b(?:\d{4}[ -]?){3}\d{1,4}\b",
            "[CARD_NUMBER]",
        ),
        // ISO date first so 2024-01-15 is consumed whole.
        ("date-iso", r"\b\d{4}-\d{2}-\d{2}\b", "[DATE]"),
        (
            "date-ambiguous",
            r"\b\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4}\b",
            "[DATE]",
        ),
        ("url", r#"https?://[^\s<>"')]+"#, "[URL]"),
        ("ipv4", r"\b(?:\d{1,3}\.){3}\d{1,3}\b", "[IP_ADDRESS]"),
    ];

    let mut rules: Vec<PatternRule> = entries
        .into_iter()
        .map(|(category, pattern, placeholder)| PatternRule {
            category,
            regex: compile(pattern),
            placeholder,
        })
        .collect();

    // High-precision coordinates last: nothing above produces digit pairs
    // with four-plus decimals.
    rules.push(PatternRule {
        category: "geo-coordinates",
        regex: compile(r"-?\d{1,3}\.\d{4,}\s*,\s*-?\d{1,3}\.\d{4,}"),
        placeholder: "[COORDINATES]",
    });

    rules
});

/// Run the fixed pattern table over `text`, replacing every occurrence of
/// each category with its placeholder.
pub fn apply_pattern_table(text: &str) -> String {
    let mut out = text.to_string();
    for rule in PATTERN_TABLE.iter() {
        out = rule.regex.replace_all(&out, rule.placeholder).into_owned();
    }
    out
}

// ── Layer 3: names and custom patterns ────────────────────────────────────

fn apply_name_layer(text: &str, options: &RedactionOptions) -> String {
    let mut out = text.to_string();
    if let Some(name) = &options.display_name {
        out = names::replace_name(&out, name, "[NAME]");
    }
    for name in &options.extra_names {
        out = names::replace_name(&out, name, "[NAME]");
    }
    for pattern in &options.custom_patterns {
        match Regex::new(pattern) {
            Ok(re) => out = re.replace_all(&out, "[REDACTED]").into_owned(),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "skipping malformed custom redaction pattern");
            }
        }
    }
    out
}

/// The full redaction pass: strip → pattern table → names/custom patterns.
/// Pure: never mutates its input, deterministic for the same inputs.
pub fn redact(text: &str, options: &RedactionOptions) -> String {
    let stripped = strip_user_content(text);
    let patterned = apply_pattern_table(&stripped);
    apply_name_layer(&patterned, options)
}
