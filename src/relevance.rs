//! Keyword relevance and word-overlap similarity.
//!
//! Both scorers are deliberately shallow: relevance counts how many terms of
//! a fixed domain vocabulary appear as substrings, and similarity is the
//! overlap of whitespace-separated word sets.

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use crate::models::ContextWindow;

/// Maximum number of tags attached to a context window.
pub const MAX_TAGS: usize = 10;

static CLASS_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"class\s+([A-Z][A-Za-z0-9_]*)").expect("class tag regex"));
static CALL_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w+)\s*\(").expect("call tag regex"));

/// Scores text against a domain vocabulary.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    keywords: Vec<String>,
}

impl RelevanceScorer {
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Fraction of the vocabulary found in `description` plus the serialized
    /// `context`, clamped to `[0, 1]`. An empty vocabulary scores 0.
    pub fn score(&self, description: &str, context: &Value) -> f64 {
        if self.keywords.is_empty() {
            return 0.0;
        }
        let context_text = match context {
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let haystack = format!("{} {}", description, context_text).to_lowercase();
        let found = self
            .keywords
            .iter()
            .filter(|k| haystack.contains(k.as_str()))
            .count();
        (found as f64 / self.keywords.len() as f64).clamp(0.0, 1.0)
    }
}

/// `|common words| / max(|words a|, |words b|)` over lowercased,
/// whitespace-separated word sets. Returns 0 when either side is empty.
pub fn similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = a.split_whitespace().map(|w| w.to_lowercase()).collect();
    let words_b: HashSet<String> = b.split_whitespace().map(|w| w.to_lowercase()).collect();
    let denom = words_a.len().max(words_b.len());
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let common = words_a.intersection(&words_b).count();
    common as f64 / denom as f64
}

/// Substring match of `query` against a window's summary, tags, or
/// serialized payload. Case-insensitive.
pub fn context_matches(window: &ContextWindow, query: &str) -> bool {
    let query = query.to_lowercase();
    if window.summary.to_lowercase().contains(&query) {
        return true;
    }
    if window
        .tags
        .iter()
        .any(|t| t.to_lowercase().contains(&query))
    {
        return true;
    }
    serde_json::to_string(&window.data)
        .map(|s| s.to_lowercase().contains(&query))
        .unwrap_or(false)
}

/// Identifiers worth tagging a context window with: declared class names
/// first, then call-shaped identifiers longer than three characters.
/// De-duplicated in first-seen order and capped at [`MAX_TAGS`].
pub fn extract_tags(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut tags = Vec::new();

    let classes = CLASS_TAG.captures_iter(text).map(|c| c[1].to_string());
    let calls = CALL_TAG
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .filter(|name| name.len() > 3);

    for tag in classes.chain(calls) {
        if tags.len() == MAX_TAGS {
            break;
        }
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextPayload;
    use chrono::Utc;
    use serde_json::json;

    fn scorer() -> RelevanceScorer {
        let words: Vec<String> = [
            "character",
            "inventory",
            "damage",
            "ui",
            "input",
            "memory",
            "performance",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        RelevanceScorer::new(&words)
    }

    #[test]
    fn score_counts_vocabulary_hits() {
        let s = scorer();
        assert_eq!(s.score("nothing relevant here", &Value::Null), 0.0);

        let two = s.score("Character takes damage", &Value::Null);
        assert!((two - 2.0 / 7.0).abs() < 1e-9);

        let with_context = s.score("Character", &json!({ "area": "inventory" }));
        assert!((with_context - 2.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_bounded() {
        let s = scorer();
        let all = s.score(
            "character inventory damage ui input memory performance",
            &Value::Null,
        );
        assert_eq!(all, 1.0);
        assert_eq!(RelevanceScorer::new(&[]).score("anything", &Value::Null), 0.0);
    }

    #[test]
    fn similarity_uses_word_sets() {
        assert_eq!(similarity("", "anything"), 0.0);
        assert_eq!(similarity("Crash on load", "crash on load"), 1.0);
        let half = similarity("inventory crash on pickup", "inventory crash");
        assert_eq!(half, 0.5);
        let repeated = similarity("crash crash crash", "crash");
        assert_eq!(repeated, 1.0);
    }

    #[test]
    fn tags_prefer_classes_and_skip_short_calls() {
        let tags = extract_tags("class AHero : public ACharacter { void Fire(); int f(x); BeginPlay(); }");
        assert_eq!(tags, vec!["AHero", "Fire", "BeginPlay"]);
    }

    #[test]
    fn tags_are_capped() {
        let text: String = (0..30).map(|i| format!("Call{}(); ", i)).collect();
        assert_eq!(extract_tags(&text).len(), MAX_TAGS);
    }

    #[test]
    fn context_match_checks_summary_tags_and_payload() {
        let window = ContextWindow {
            id: "w1".into(),
            timestamp: Utc::now(),
            session_id: None,
            data: ContextPayload::Blob {
                data: json!({ "note": "reload timing" }),
            },
            summary: "Context involving: note".into(),
            tags: vec!["ReloadWeapon".into()],
        };
        assert!(context_matches(&window, "NOTE"));
        assert!(context_matches(&window, "reloadweapon"));
        assert!(context_matches(&window, "timing"));
        assert!(!context_matches(&window, "inventory"));
    }
}
