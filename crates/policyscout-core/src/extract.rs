//! Evidence extraction from free-text research responses.
//!
//! Responses cite sources with inline markers like `[1]` or `[2, 3]` and may
//! rate each claim with `Strength: N/10`. The helpers here turn that prose
//! into per-citation claims and strengths. They are string heuristics: any
//! input is accepted and malformed text simply yields fewer matches.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::evidence::MAX_CLAIM_CHARS;

const SNIPPET_MAX_CHARS: usize = 280;

static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+").expect("line break regex"));
static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?]+[.!?]*").expect("sentence regex"));
static CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("citation regex"));
static CITATION_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\[\d+(?:\s*,\s*\d+)*\]").expect("citation strip regex"));
static STRENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:evidence\s*)?strength\s*:\s*(\d{1,2})\s*/\s*10\b")
        .expect("strength regex")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Per-citation claims and strengths extracted from one response.
///
/// Citation indexes are the 1-based numbers written in the text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitationClaims {
    pub claim_by_citation: HashMap<usize, String>,
    /// Strength on a 1..=10 scale.
    pub strength_by_citation: HashMap<usize, u8>,
    /// Used when a citation has no claim of its own.
    pub fallback_claim: String,
}

impl CitationClaims {
    /// The claim for a citation, or the fallback.
    pub fn claim_for(&self, index: usize) -> &str {
        self.claim_by_citation
            .get(&index)
            .map(String::as_str)
            .unwrap_or(&self.fallback_claim)
    }

    /// Confidence in [0.1, 1.0] from the citation's strength, 0.7 when unrated.
    pub fn confidence_for(&self, index: usize) -> f64 {
        match self.strength_by_citation.get(&index) {
            Some(&s) => (f64::from(s) / 10.0).clamp(0.1, 1.0),
            None => 0.7,
        }
    }
}

/// Extract citation-keyed claims from `content`.
///
/// - The claim for an index is the first segment citing it, with markers and
///   strength annotations removed.
/// - A strength annotation in a segment without markers applies to the
///   indexes cited by the previous marked segment, unless already rated.
/// - The fallback is the first segment mentioning `policy_name`, else the
///   first segment, else the first 500 characters of `content`.
pub fn extract_citation_claims(content: &str, policy_name: &str) -> CitationClaims {
    let segments = split_segments(content);
    let mut claim_by_citation = HashMap::new();
    let mut strength_by_citation = HashMap::new();
    let mut last_indices: Option<Vec<usize>> = None;

    for segment in &segments {
        let strength = parse_strength(segment);
        let mut indices: Vec<usize> = Vec::new();
        for caps in CITATION.captures_iter(segment) {
            for part in caps[1].split(',') {
                if let Ok(i) = part.trim().parse::<usize>()
                    && !indices.contains(&i)
                {
                    indices.push(i);
                }
            }
        }

        if indices.is_empty() {
            if let (Some(s), Some(last)) = (strength, &last_indices) {
                for &i in last {
                    strength_by_citation.entry(i).or_insert(s);
                }
            }
            continue;
        }

        let cleaned = clean_segment(segment);
        if cleaned.is_empty() {
            continue;
        }

        for &i in &indices {
            claim_by_citation.entry(i).or_insert_with(|| cleaned.clone());
            if let Some(s) = strength {
                strength_by_citation.entry(i).or_insert(s);
            }
        }
        last_indices = Some(indices);
    }

    CitationClaims {
        claim_by_citation,
        strength_by_citation,
        fallback_claim: fallback_claim(&segments, content, policy_name),
    }
}

/// Split on line breaks, then into sentences, dropping empty fragments.
fn split_segments(content: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for line in LINE_BREAKS.split(content).map(str::trim).filter(|l| !l.is_empty()) {
        let mut matched = false;
        for part in SENTENCE.find_iter(line) {
            matched = true;
            let trimmed = part.as_str().trim();
            if !trimmed.is_empty() {
                segments.push(trimmed.to_string());
            }
        }
        if !matched {
            segments.push(line.to_string());
        }
    }
    segments
}

fn parse_strength(segment: &str) -> Option<u8> {
    let caps = STRENGTH.captures(segment)?;
    let value: u8 = caps[1].parse().ok()?;
    Some(value.clamp(1, 10))
}

fn clean_segment(segment: &str) -> String {
    let without_markers = CITATION_STRIP.replace_all(segment, "");
    let without_strength = STRENGTH.replace_all(&without_markers, "");
    WHITESPACE
        .replace_all(&without_strength, " ")
        .trim()
        .to_string()
}

fn fallback_claim(segments: &[String], content: &str, policy_name: &str) -> String {
    let name = policy_name.trim().to_lowercase();
    let with_name = (!name.is_empty())
        .then(|| segments.iter().find(|s| s.to_lowercase().contains(&name)))
        .flatten();
    match with_name.or_else(|| segments.first()) {
        Some(s) => s.clone(),
        None => content.chars().take(MAX_CLAIM_CHARS).collect(),
    }
}

/// Hostname of `url` without a leading `www.`, or `None` if it does not parse.
pub fn derive_publisher(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    (!host.is_empty()).then(|| host.to_string())
}

/// Collapse whitespace and cap at 280 characters with a trailing ellipsis.
pub fn normalize_snippet(snippet: Option<&str>) -> Option<String> {
    let cleaned = WHITESPACE.replace_all(snippet?, " ").trim().to_string();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.chars().count() > SNIPPET_MAX_CHARS {
        let head: String = cleaned.chars().take(SNIPPET_MAX_CHARS - 3).collect();
        Some(format!("{head}..."))
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_and_strengths_per_citation() {
        let content = "Adoption rose 40% [1]. Strength: 7/10\n\n\
                       Independent review confirmed savings [2]. Strength: 9/10";
        let c = extract_citation_claims(content, "R&D Tax Credit");
        assert_eq!(c.claim_for(1), "Adoption rose 40%.");
        assert_eq!(c.claim_for(2), "Independent review confirmed savings.");
        assert_eq!(c.strength_by_citation[&1], 7);
        assert_eq!(c.strength_by_citation[&2], 9);
        assert!((c.confidence_for(1) - 0.7).abs() < 1e-9);
        assert!((c.confidence_for(2) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn inline_strength_is_stripped() {
        let c = extract_citation_claims(
            "Exports doubled within five years [3] evidence strength: 8/10",
            "",
        );
        assert_eq!(c.claim_for(3), "Exports doubled within five years");
        assert_eq!(c.strength_by_citation[&3], 8);
    }

    #[test]
    fn first_claim_and_first_strength_win() {
        let content = "First mention [1]. Strength: 4/10\nSecond mention [1] strength: 9/10.";
        let c = extract_citation_claims(content, "");
        assert_eq!(c.claim_for(1), "First mention.");
        assert_eq!(c.strength_by_citation[&1], 4);
    }

    #[test]
    fn multi_index_marker_shares_claim() {
        let c = extract_citation_claims("Broad uptake among SMEs [2, 3].", "");
        assert_eq!(c.claim_for(2), "Broad uptake among SMEs.");
        assert_eq!(c.claim_for(3), "Broad uptake among SMEs.");
    }

    #[test]
    fn strength_is_clamped() {
        let c = extract_citation_claims("Claim [1]. Strength: 0/10", "");
        assert_eq!(c.strength_by_citation[&1], 1);
        assert!((c.confidence_for(1) - 0.1).abs() < 1e-9);
        let c = extract_citation_claims("Claim [1]. Strength: 12/10", "");
        assert_eq!(c.strength_by_citation[&1], 10);
    }

    #[test]
    fn unrated_citation_defaults_confidence() {
        let c = extract_citation_claims("Claim [1].", "");
        assert!((c.confidence_for(1) - 0.7).abs() < 1e-9);
        assert!((c.confidence_for(5) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn fallback_prefers_policy_name() {
        let content = "Background sentence. The Startup Visa attracted founders. Other text.";
        let c = extract_citation_claims(content, "startup visa");
        assert_eq!(c.fallback_claim, "The Startup Visa attracted founders.");
        assert_eq!(c.claim_for(1), "The Startup Visa attracted founders.");
    }

    #[test]
    fn fallback_first_segment_then_raw() {
        let c = extract_citation_claims("Only this. And that.", "missing");
        assert_eq!(c.fallback_claim, "Only this.");
        let c = extract_citation_claims("   \n\n  ", "x");
        assert_eq!(c.fallback_claim, "   \n\n  ");
    }

    #[test]
    fn tolerates_citation_free_text() {
        let c = extract_citation_claims("No citations here at all", "x");
        assert!(c.claim_by_citation.is_empty());
        assert!(c.strength_by_citation.is_empty());
        assert_eq!(c.fallback_claim, "No citations here at all");
    }

    #[test]
    fn publisher_strips_www() {
        assert_eq!(
            derive_publisher("https://www.oecd.org/report").as_deref(),
            Some("oecd.org")
        );
        assert_eq!(
            derive_publisher("https://gov.ie/en/").as_deref(),
            Some("gov.ie")
        );
        assert_eq!(derive_publisher("not a url"), None);
    }

    #[test]
    fn snippet_normalisation() {
        assert_eq!(normalize_snippet(None), None);
        assert_eq!(normalize_snippet(Some("  \n ")), None);
        assert_eq!(
            normalize_snippet(Some("a\n\n b   c")).as_deref(),
            Some("a b c")
        );
        let long = "x".repeat(300);
        let out = normalize_snippet(Some(&long)).unwrap();
        assert_eq!(out.chars().count(), 280);
        assert!(out.ends_with("..."));
    }
}
