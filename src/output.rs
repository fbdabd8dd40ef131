//! Records exchanged as JSON: claims, verifications, contradictions and the
//! report that aggregates them.
//!
//! Field names follow the JSON the prompts ask the model to emit, so the
//! same types deserialize model replies and serialize HTTP responses.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Contradictions above this confidence count as high-confidence in the summary.
pub const HIGH_CONFIDENCE: f64 = 0.8;

/// What kind of evidence a claim rests on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    #[default]
    Quantitative,
    Qualitative,
    Comparative,
    /// Anything else the model invents.
    #[serde(other)]
    Other,
}

/// A quantitative or comparative statement extracted from the paper text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    /// Model confidence in [0, 1].
    #[serde(deserialize_with = "lenient_f64")]
    pub confidence: f64,
    /// 1-indexed page the claim appears on.
    #[serde(default = "default_page", deserialize_with = "lenient_page")]
    pub page: usize,
    #[serde(default)]
    pub evidence_type: EvidenceType,
}

impl Claim {
    pub fn new(text: impl Into<String>, confidence: f64, page: usize, evidence_type: EvidenceType) -> Self {
        Self {
            text: text.into(),
            confidence,
            page,
            evidence_type,
        }
    }

    /// Non-empty text and a confidence inside [0, 1].
    pub fn is_valid(&self) -> bool {
        !self.text.trim().is_empty() && is_unit_interval(self.confidence)
    }
}

/// Phase-2 outcome for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub claim: String,
    /// A figure or table bearing on the claim was found.
    #[serde(default)]
    pub visual_found: bool,
    /// The evidence agrees with the claim.
    #[serde(default)]
    pub supports: bool,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: f64,
}

/// The object phase 2 asks the model to return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationSet {
    #[serde(default)]
    pub verifications: Vec<Verification>,
}

impl VerificationSet {
    pub fn is_empty(&self) -> bool {
        self.verifications.is_empty()
    }

    pub fn len(&self) -> usize {
        self.verifications.len()
    }
}

/// How a claim and the visual evidence disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionType {
    #[default]
    DirectConflict,
    PartialContradiction,
    Unsupported,
    #[serde(other)]
    Other,
}

/// A flagged mismatch between a claim and visual evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    /// The claim text.
    pub claim: String,
    /// Page holding the contradicting figure.
    #[serde(default = "default_page", deserialize_with = "lenient_page")]
    pub visual_evidence_page: usize,
    /// What the figure actually shows.
    #[serde(default)]
    pub visual_shows: String,
    #[serde(default)]
    pub contradiction_type: ContradictionType,
    #[serde(deserialize_with = "lenient_f64")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Contradiction {
    /// Non-empty claim text and a confidence inside [0, 1].
    pub fn is_valid(&self) -> bool {
        !self.claim.trim().is_empty() && is_unit_interval(self.confidence)
    }

    pub fn is_high_confidence(&self) -> bool {
        self.confidence > HIGH_CONFIDENCE
    }
}

/// Counters collected while auditing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
    /// Model requests issued, retries included.
    pub llm_calls: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Characters of extracted text, page markers included.
    pub characters_extracted: usize,
    pub images_extracted: usize,
    /// Figures actually attached to the verification request.
    pub images_sent: usize,
    /// Claims came from the sentence heuristic rather than the model.
    pub used_fallback: bool,
}

/// Final audit report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub claims: Vec<Claim>,
    pub contradictions: Vec<Contradiction>,
    pub audit_summary: String,
    pub total_pages: usize,
    pub processing_time_seconds: f64,
    /// Raw phase-2 verdicts, kept for callers that want to show their work.
    #[serde(default)]
    pub verifications: Vec<Verification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_trace: Option<String>,
    #[serde(default)]
    pub stats: AuditStats,
}

impl AuditReport {
    /// Build the one-paragraph summary shown above the report.
    pub fn summarize(claims: &[Claim], contradictions: &[Contradiction], total_pages: usize) -> String {
        let mut summary = format!(
            "Analyzed {} claims across {} pages. Detected {} contradiction(s). ",
            claims.len(),
            total_pages,
            contradictions.len()
        );
        if contradictions.is_empty() {
            summary.push_str("No major inconsistencies found.");
        } else {
            let high = contradictions.iter().filter(|c| c.is_high_confidence()).count();
            summary.push_str(&format!("{high} high-confidence contradictions."));
        }
        summary
    }

    pub fn high_confidence_contradictions(&self) -> impl Iterator<Item = &Contradiction> {
        self.contradictions.iter().filter(|c| c.is_high_confidence())
    }
}

/// Envelope returned by `POST /api/audit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// `"success"` or `"error"`.
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_report: Option<AuditReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl UploadResponse {
    pub fn success(report: AuditReport) -> Self {
        Self {
            status: "success".into(),
            message: format!("Audit completed in {:.1}s", report.processing_time_seconds),
            audit_report: Some(report),
            error_details: None,
        }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: "error".into(),
            message: message.into(),
            audit_report: None,
            error_details: details,
        }
    }
}

/// Metadata read from the PDF information dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

fn default_page() -> usize {
    1
}

/// Models write numbers as `4`, `4.0` or `"4"` interchangeably.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    fn value(self) -> Result<f64, String> {
        match self {
            LooseNumber::Number(n) => Ok(n),
            LooseNumber::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("expected a number, got {s:?}")),
        }
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    LooseNumber::deserialize(deserializer)?
        .value()
        .map_err(D::Error::custom)
}

/// A page number; whole-number floats are accepted, fractions and negatives are not.
fn lenient_page<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let n = lenient_f64(deserializer)?;
    if n.is_finite() && n >= 0.0 && n.fract() == 0.0 {
        Ok(n as usize)
    } else {
        Err(D::Error::custom(format!("invalid page number {n}")))
    }
}

fn is_unit_interval(v: f64) -> bool {
    (0.0..=1.0).contains(&v)
}
