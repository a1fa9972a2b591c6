//! Name redaction and name-hint extraction.
//!
//! Boundary logic here is Unicode-aware on purpose: ASCII `\b` treats every
//! accented or non-Latin letter as a boundary, which both misses names like
//! "Zoë" and false-matches inside longer words. Instead, candidate matches
//! are checked against their actual neighboring characters.

use regex::Regex;
use std::sync::LazyLock;

/// Replace every occurrence of `name` (including a simple possessive
/// suffix) with `placeholder`, using Unicode-aware boundary checks: a match
/// counts only when the characters on both sides are non-alphanumeric.
pub(crate) fn replace_name(text: &str, name: &str, placeholder: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return text.to_string();
    }

    let pattern = format!(r"(?iu){}(?:['’]s)?", regex::escape(trimmed));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return text.to_string(),
    };

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        let before_ok = text[..m.start()]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = text[m.end()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            out.push_str(&text[last..m.start()]);
            out.push_str(placeholder);
            last = m.end();
        }
    }
    out.push_str(&text[last..]);
    out
}

// ── Name-hint extraction ──────────────────────────────────────────────────

/// Relational cues that tend to precede or surround proper names in
/// user-authored prose. Capture groups hold the candidate names.
static HINT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bbetween ([\p{Lu}][\p{L}'’-]+) and ([\p{Lu}][\p{L}'’-]+)",
        r"\b[Mm]y (?:partner|friend|husband|wife|boyfriend|girlfriend|ex|fianc[eé]e?|sister|brother|mother|father|son|daughter|colleague|boss|roommate),? ([\p{Lu}][\p{L}'’-]+)",
        r"\b([\p{Lu}][\p{L}'’-]+)['’]s\b",
        r"\b([\p{Lu}][\p{L}'’-]+) and I\b",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("static hint pattern must compile"))
    .collect()
});

/// Pronouns, articles, and other capitalized non-names the cue patterns
/// routinely catch at sentence starts.
const HINT_BLOCKLIST: &[&str] = &[
    "i", "a", "an", "the", "my", "me", "mine", "he", "she", "it", "we", "us", "you", "they",
    "them", "this", "that", "these", "those", "what", "when", "where", "which", "who", "why",
    "how", "if", "but", "and", "or", "so", "not", "no", "yes", "everyone", "someone", "anyone",
    "nobody", "everything", "nothing", "today", "tomorrow", "yesterday", "god",
];

/// Scan raw user-authored text for probable proper names following
/// relational cues, so names appearing only in prose are still protected in
/// any persisted copy. Results are deduplicated and order-stable.
pub fn extract_name_hints(free_text: &str) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();
    for re in HINT_PATTERNS.iter() {
        for caps in re.captures_iter(free_text) {
            for group in caps.iter().skip(1).flatten() {
                let candidate = group.as_str();
                if HINT_BLOCKLIST.contains(&candidate.to_lowercase().as_str()) {
                    continue;
                }
                if !hints.iter().any(|h| h == candidate) {
                    hints.push(candidate.to_string());
                }
            }
        }
    }
    hints
}
