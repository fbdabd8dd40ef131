//! Claim heuristics: the post-filter applied to every claim list and the
//! sentence-level fallback used when the model finds nothing.

use crate::output::{Claim, EvidenceType};
use crate::pipeline::ingest::PageText;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Confidence assigned to heuristic claims.
pub const FALLBACK_CONFIDENCE: f64 = 0.55;

/// Heuristic claim text is cut to this many chars.
const FALLBACK_MAX_CHARS: usize = 300;

/// Short headings mentioning these words are navigation, not claims.
const SHORT_HEADING_LEN: usize = 120;

/// Affiliation and address vocabulary; sentences containing any are skipped.
const EXCLUDE_TOKENS: &[&str] = &[
    "university",
    "department",
    "street",
    "avenue",
    "usa",
    "canada",
    "spain",
    "italy",
    "france",
    "germany",
    "prepared for submission",
    "astrophysics research centre",
];

/// Result vocabulary; a sentence needs at least one.
const INCLUDE_TOKENS: &[&str] = &[
    "we find",
    "we obtain",
    "we measure",
    "we derive",
    "we compute",
    "result",
    "constraint",
    "consistent with",
    "significant",
    "confidence",
];

static RE_SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").unwrap());
static RE_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").unwrap());

/// Drop claims that are really headings, page markers or boilerplate.
pub fn filter_claims(claims: Vec<Claim>) -> Vec<Claim> {
    let before = claims.len();
    let kept: Vec<Claim> = claims.into_iter().filter(|c| keep_claim(&c.text)).collect();
    if kept.len() < before {
        debug!("Claim filter kept {}/{}", kept.len(), before);
    }
    kept
}

fn keep_claim(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() {
        return false;
    }
    let lower = t.to_lowercase();
    let len = t.chars().count();

    if lower.starts_with("--- page") || lower.contains("contents") {
        return false;
    }
    if (lower.contains("introduction") || lower.contains("section")) && len < SHORT_HEADING_LEN {
        return false;
    }
    if lower.contains("appendix") || lower.contains("references") {
        return false;
    }
    lower.matches(' ').count() >= 6
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace.
///
/// The terminator stays with its sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in RE_SENTENCE_END.find_iter(text) {
        sentences.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Numeric result sentences, in reading order, attributed to their page.
///
/// Returns at most `limit` claims.
pub fn heuristic_claims(pages: &[PageText], limit: usize) -> Vec<Claim> {
    let mut claims = Vec::new();

    for page in pages {
        for sentence in split_sentences(&page.text) {
            if claims.len() >= limit {
                return claims;
            }
            let clean = sentence.split_whitespace().collect::<Vec<_>>().join(" ");
            if is_result_sentence(&clean) {
                let text: String = clean.chars().take(FALLBACK_MAX_CHARS).collect();
                claims.push(Claim::new(text, FALLBACK_CONFIDENCE, page.page, EvidenceType::Quantitative));
            }
        }
    }

    claims
}

fn is_result_sentence(s: &str) -> bool {
    if s.chars().count() < 20 {
        return false;
    }
    let lower = s.to_lowercase();
    if EXCLUDE_TOKENS.iter().any(|tok| lower.contains(tok)) {
        return false;
    }
    if !RE_DIGIT.is_match(s) {
        return false;
    }
    INCLUDE_TOKENS.iter().any(|tok| lower.contains(tok))
}
