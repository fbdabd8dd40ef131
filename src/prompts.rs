//! Prompt templates for the three audit phases.
//!
//! Every prompt lives here so wording changes never touch retry or parsing
//! code, and so tests can inspect the exact text sent to the model.

/// System message sent ahead of every phase.
pub const SYSTEM_PROMPT: &str = "You are a meticulous scientific auditor. \
You read research papers and answer strictly in the JSON format requested, \
with no markdown fences and no commentary.";

/// Phase 1: ask for quantitative and comparative claims in one text window.
pub fn claim_extraction_prompt(window: &str) -> String {
    format!(
        r#"You are a scientific claim extractor. Analyze the following research paper text
and extract all quantitative and comparative claims. Focus on claims with numbers, percentages,
increases/decreases, comparisons between conditions.

Page boundaries are marked as "--- PAGE N ---"; report the page each claim appears on.

Return ONLY a valid JSON array of claims with this exact format:
[
  {{"text": "claim text here", "confidence": 0.9, "page": 1, "evidence_type": "quantitative"}},
  {{"text": "another claim", "confidence": 0.8, "page": 2, "evidence_type": "comparative"}}
]

PAPER TEXT:
{window}

Return ONLY the JSON array, no markdown, no explanation."#
    )
}

/// Phase 2: cross-check claims against the attached figures and leading text.
///
/// `claims` is a bullet list, one claim per line.
pub fn verification_prompt(claims: &str, context: &str, image_count: usize) -> String {
    let figures = if image_count == 0 {
        String::from("No figures could be extracted; rely on numbers stated in the text.")
    } else {
        format!("{image_count} figure(s) extracted from the paper are attached to this message.")
    };
    format!(
        r#"You are a scientific auditor. Analyze these claims against the text and figures:

CLAIMS:
{claims}

TEXT:
{context}

FIGURES:
{figures}

For each claim, determine if there is visual/numerical evidence supporting or contradicting it.
Return ONLY valid JSON in this format:
{{
  "verifications": [
    {{"claim": "claim text", "visual_found": true, "supports": true, "confidence": 0.8}}
  ]
}}
"#
    )
}

/// Phase 3: flag contradictions given claims and phase-2 verdicts (both JSON).
pub fn contradiction_prompt(claims_json: &str, verifications_json: &str) -> String {
    format!(
        r#"You are a scientific auditor. Based on the claims and verification results,
identify any contradictions.

CLAIMS:
{claims_json}

VERIFICATION RESULTS:
{verifications_json}

Return ONLY a valid JSON array of contradictions:
[
  {{"claim": "text", "visual_evidence_page": 1, "visual_shows": "description", "contradiction_type": "direct_conflict", "confidence": 0.9, "reasoning": "explanation"}}
]

Allowed contradiction_type values: direct_conflict, partial_contradiction, unsupported.
If no contradictions found, return empty array: []
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_prompt_embeds_window() {
        let p = claim_extraction_prompt("--- PAGE 1 ---\nWe find a 12% gain.");
        assert!(p.contains("We find a 12% gain."));
        assert!(p.contains(r#""evidence_type": "quantitative""#));
        assert!(!p.contains("{{"), "format escapes must collapse");
    }

    #[test]
    fn verification_prompt_mentions_figures() {
        let with = verification_prompt("- a", "ctx", 3);
        assert!(with.contains("3 figure(s)"));
        let without = verification_prompt("- a", "ctx", 0);
        assert!(without.contains("No figures"));
        assert!(with.contains(r#""verifications": ["#));
    }

    #[test]
    fn contradiction_prompt_embeds_both_payloads() {
        let p = contradiction_prompt("[{\"text\":\"c\"}]", "{\"verifications\":[]}");
        assert!(p.contains("[{\"text\":\"c\"}]"));
        assert!(p.contains("{\"verifications\":[]}"));
        assert!(p.contains("return empty array: []"));
    }
}
