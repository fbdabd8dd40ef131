//! The three-phase auditor.
//!
//! ```text
//! ExtractedDocument
//!  │
//!  ├─ 1. Claims          text windows → model → JSON claims (regex fallback)
//!  ├─ 2. Verification    top claims + leading text + figures → model → verdicts
//!  ├─ 3. Contradictions  claims + verdicts → model → contradictions
//!  └─ 4. Report          summary, stats, timing
//! ```
//!
//! Phases run strictly in sequence: each prompt embeds the previous phase's
//! output. A reply that cannot be parsed degrades to an empty result for
//! that phase; a model that stays unreachable after every retry fails the
//! whole audit.

use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::output::{AuditReport, AuditStats, Claim, Contradiction, VerificationSet};
use crate::pipeline::claims::{filter_claims, heuristic_claims};
use crate::pipeline::encode::encode_image;
use crate::pipeline::ingest::{prefix_chars, sample_windows, ExtractedDocument};
use crate::pipeline::llm::{call_with_retry, CallOutcome, CompletionBackend, CompletionRequest};
use crate::pipeline::parse::{parse_claims, parse_contradictions, parse_verifications};
use crate::progress::AuditPhase;
use crate::prompts::{claim_extraction_prompt, contradiction_prompt, verification_prompt, SYSTEM_PROMPT};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model usage of one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseUsage {
    pub calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub images_sent: usize,
}

impl PhaseUsage {
    fn record(&mut self, outcome: &CallOutcome) {
        self.calls += outcome.attempts;
        self.input_tokens += outcome.completion.input_tokens;
        self.output_tokens += outcome.completion.output_tokens;
    }
}

/// A phase result together with what it cost.
#[derive(Debug, Clone)]
pub struct PhaseOutput<T> {
    pub output: T,
    pub usage: PhaseUsage,
}

/// Phase-1 result.
#[derive(Debug, Clone, Default)]
pub struct ExtractedClaims {
    pub claims: Vec<Claim>,
    /// The model found nothing and the sentence heuristic supplied the claims.
    pub used_fallback: bool,
}

/// Shape of each claim in the phase-3 prompt.
#[derive(Serialize)]
struct ClaimDigest<'a> {
    text: &'a str,
    confidence: f64,
}

/// Runs audits against one long-lived completion backend.
///
/// Cheap to share: wrap in an `Arc` and call [`Auditor::run`] from as many
/// tasks as the caller allows.
pub struct Auditor {
    backend: Arc<dyn CompletionBackend>,
    config: AuditConfig,
}

impl Auditor {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: AuditConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Phase 1: extract quantitative and comparative claims.
    ///
    /// Windows from [`sample_windows`] are tried in order until one yields a
    /// non-empty claim list. If none does, claims come from
    /// [`heuristic_claims`]. Either way the result passes through
    /// [`filter_claims`].
    pub async fn extract_claims(
        &self,
        doc: &ExtractedDocument,
    ) -> Result<PhaseOutput<ExtractedClaims>, AuditError> {
        let mut usage = PhaseUsage::default();
        let mut claims = Vec::new();

        let windows = sample_windows(&doc.text, self.config.claim_window_chars);
        for (i, window) in windows.iter().enumerate() {
            let request = CompletionRequest::new(
                Some(SYSTEM_PROMPT),
                claim_extraction_prompt(window),
                &self.config,
            );
            let outcome = call_with_retry(
                self.backend.as_ref(),
                AuditPhase::ClaimExtraction,
                &request,
                &self.config,
            )
            .await?;
            usage.record(&outcome);

            match parse_claims(&outcome.completion.text) {
                Ok(found) if !found.is_empty() => {
                    debug!("Window {}/{} yielded {} claims", i + 1, windows.len(), found.len());
                    claims = found;
                    break;
                }
                Ok(_) => debug!("Window {}/{} yielded no claims", i + 1, windows.len()),
                Err(e) => warn!("Window {}/{}: unusable reply: {}", i + 1, windows.len(), e),
            }
        }

        let used_fallback = claims.is_empty();
        if used_fallback {
            claims = heuristic_claims(&doc.pages, self.config.fallback_claim_limit);
            info!("Model returned no claims; heuristic fallback found {}", claims.len());
        }

        Ok(PhaseOutput {
            output: ExtractedClaims {
                claims: filter_claims(claims),
                used_fallback,
            },
            usage,
        })
    }

    /// Phase 2: cross-check the leading claims against figures and text.
    pub async fn verify_claims(
        &self,
        doc: &ExtractedDocument,
        claims: &[Claim],
    ) -> Result<PhaseOutput<VerificationSet>, AuditError> {
        let mut usage = PhaseUsage::default();
        if claims.is_empty() {
            return Ok(PhaseOutput {
                output: VerificationSet::default(),
                usage,
            });
        }

        let claims_text = claims
            .iter()
            .take(self.config.max_claims_checked)
            .map(|c| format!("- {}", c.text))
            .collect::<Vec<_>>()
            .join("\n");
        let context = prefix_chars(&doc.text, self.config.verification_context_chars);

        let images: Vec<_> = doc
            .largest_images(self.config.max_images)
            .into_iter()
            .filter_map(|img| match encode_image(&img.image, self.config.max_image_pixels) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!("Page {}: could not encode figure {}: {}", img.page, img.index, e);
                    None
                }
            })
            .collect();
        usage.images_sent = images.len();

        let request = CompletionRequest::new(
            Some(SYSTEM_PROMPT),
            verification_prompt(&claims_text, context, images.len()),
            &self.config,
        )
        .with_images(images);

        let outcome = call_with_retry(
            self.backend.as_ref(),
            AuditPhase::Verification,
            &request,
            &self.config,
        )
        .await?;
        usage.record(&outcome);

        let output = parse_verifications(&outcome.completion.text).unwrap_or_else(|e| {
            warn!("Verification reply unusable: {}", e);
            VerificationSet::default()
        });

        Ok(PhaseOutput { output, usage })
    }

    /// Phase 3: flag contradictions from the claims and phase-2 verdicts.
    pub async fn detect_contradictions(
        &self,
        claims: &[Claim],
        verifications: &VerificationSet,
    ) -> Result<PhaseOutput<Vec<Contradiction>>, AuditError> {
        let mut usage = PhaseUsage::default();
        if claims.is_empty() {
            return Ok(PhaseOutput {
                output: Vec::new(),
                usage,
            });
        }

        let digests: Vec<ClaimDigest<'_>> = claims
            .iter()
            .take(self.config.max_claims_checked)
            .map(|c| ClaimDigest {
                text: &c.text,
                confidence: c.confidence,
            })
            .collect();
        let claims_json = serde_json::to_string_pretty(&digests)
            .map_err(|e| AuditError::Internal(format!("serialise claims: {e}")))?;
        let verifications_json = serde_json::to_string_pretty(verifications)
            .map_err(|e| AuditError::Internal(format!("serialise verifications: {e}")))?;

        let request = CompletionRequest::new(
            Some(SYSTEM_PROMPT),
            contradiction_prompt(&claims_json, &verifications_json),
            &self.config,
        );
        let outcome = call_with_retry(
            self.backend.as_ref(),
            AuditPhase::ContradictionDetection,
            &request,
            &self.config,
        )
        .await?;
        usage.record(&outcome);

        let output = parse_contradictions(&outcome.completion.text).unwrap_or_else(|e| {
            warn!("Contradiction reply unusable: {}", e);
            Vec::new()
        });

        Ok(PhaseOutput { output, usage })
    }

    /// Run all three phases and assemble the report.
    ///
    /// `processing_time_seconds` covers the model phases only; callers that
    /// also ingest the PDF overwrite it with their own wall-clock time.
    pub async fn run(&self, doc: &ExtractedDocument) -> Result<AuditReport, AuditError> {
        let start = Instant::now();
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_audit_start(doc.total_pages, doc.images.len());
        }

        info!("[Phase 1] Extracting claims from '{}'", doc.name);
        if let Some(cb) = cb {
            cb.on_phase_start(AuditPhase::ClaimExtraction);
        }
        let phase1 = self.extract_claims(doc).await?;
        let claims = phase1.output.claims;
        info!("  → Found {} claims", claims.len());
        if let Some(cb) = cb {
            cb.on_phase_complete(AuditPhase::ClaimExtraction, claims.len());
        }

        info!("[Phase 2] Verifying against visual evidence");
        if let Some(cb) = cb {
            cb.on_phase_start(AuditPhase::Verification);
        }
        let phase2 = self.verify_claims(doc, &claims).await?;
        info!(
            "  → {} verdicts using {} figure(s)",
            phase2.output.len(),
            phase2.usage.images_sent
        );
        if let Some(cb) = cb {
            cb.on_phase_complete(AuditPhase::Verification, phase2.output.len());
        }

        info!("[Phase 3] Detecting contradictions");
        if let Some(cb) = cb {
            cb.on_phase_start(AuditPhase::ContradictionDetection);
        }
        let phase3 = self.detect_contradictions(&claims, &phase2.output).await?;
        let contradictions = phase3.output;
        info!("  → Found {} contradictions", contradictions.len());
        if let Some(cb) = cb {
            cb.on_phase_complete(AuditPhase::ContradictionDetection, contradictions.len());
            cb.on_audit_complete(claims.len(), contradictions.len());
        }

        let usages = [phase1.usage, phase2.usage, phase3.usage];
        let stats = AuditStats {
            llm_calls: usages.iter().map(|u| u.calls).sum(),
            total_input_tokens: usages.iter().map(|u| u.input_tokens).sum(),
            total_output_tokens: usages.iter().map(|u| u.output_tokens).sum(),
            characters_extracted: doc.text.chars().count(),
            images_extracted: doc.images.len(),
            images_sent: phase2.usage.images_sent,
            used_fallback: phase1.output.used_fallback,
        };

        let reasoning_trace = format!(
            "claim extraction: {} claim(s){}\nvisual verification: {} verdict(s), {} figure(s) attached\ncontradiction detection: {} contradiction(s)",
            claims.len(),
            if stats.used_fallback { " from sentence heuristics" } else { "" },
            phase2.output.len(),
            stats.images_sent,
            contradictions.len()
        );

        Ok(AuditReport {
            audit_summary: AuditReport::summarize(&claims, &contradictions, doc.total_pages),
            total_pages: doc.total_pages,
            processing_time_seconds: start.elapsed().as_secs_f64(),
            verifications: phase2.output.verifications,
            reasoning_trace: Some(reasoning_trace),
            stats,
            claims,
            contradictions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::pipeline::ingest::PageText;
    use crate::pipeline::llm::Completion;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records prompts and answers each from a fixed list, in order.
    struct Recorder {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<(String, usize)>>,
    }

    impl Recorder {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn generate(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
            self.prompts
                .lock()
                .unwrap()
                .push((request.prompt.clone(), request.images.len()));
            let text = self.replies.lock().unwrap().pop().unwrap_or_default();
            Ok(Completion {
                text,
                input_tokens: 100,
                output_tokens: 20,
            })
        }
    }

    fn doc(text: &str) -> ExtractedDocument {
        ExtractedDocument::from_pages(
            "paper.pdf",
            vec![PageText {
                page: 1,
                text: text.into(),
            }],
            vec![],
        )
    }

    fn auditor(backend: Arc<Recorder>) -> Auditor {
        Auditor::new(backend, AuditConfig::default())
    }

    const CLAIMS: &str = r#"[{"text": "The proposed method improves accuracy by 12% over the baseline", "confidence": 0.9, "page": 1, "evidence_type": "quantitative"}]"#;

    #[tokio::test]
    async fn no_claims_skips_later_phases() {
        let backend = Recorder::new(&["[]"]);
        let a = auditor(backend.clone());
        let report = a.run(&doc("A short abstract without numbers.")).await.unwrap();
        assert!(report.claims.is_empty());
        assert!(report.contradictions.is_empty());
        assert!(report.stats.used_fallback);
        // Only the single phase-1 window was sent.
        assert_eq!(backend.prompts.lock().unwrap().len(), 1);
        assert!(report.audit_summary.contains("No major inconsistencies found."));
    }

    #[tokio::test]
    async fn invalid_reply_moves_to_next_window() {
        let long_text = "filler text. ".repeat(2000);
        let backend = Recorder::new(&["I could not find anything", CLAIMS, "{\"verifications\": []}", "[]"]);
        let a = auditor(backend.clone());
        let out = a.extract_claims(&doc(&long_text)).await.unwrap();
        assert_eq!(out.output.claims.len(), 1);
        assert!(!out.output.used_fallback);
        assert_eq!(out.usage.calls, 2);
    }

    #[tokio::test]
    async fn full_run_assembles_report() {
        let backend = Recorder::new(&[
            CLAIMS,
            r#"{"verifications": [{"claim": "The proposed method improves accuracy by 12%", "visual_found": true, "supports": false, "confidence": 0.85}]}"#,
            r#"```json
[{"claim": "The proposed method improves accuracy by 12% over the baseline", "visual_evidence_page": 3, "visual_shows": "Figure 2 shows a 2% improvement", "contradiction_type": "direct_conflict", "confidence": 0.9}]
```"#,
        ]);
        let a = auditor(backend.clone());
        let report = a.run(&doc("We find accuracy improves by 12%.")).await.unwrap();

        assert_eq!(report.claims.len(), 1);
        assert_eq!(report.verifications.len(), 1);
        assert_eq!(report.contradictions.len(), 1);
        assert_eq!(report.stats.llm_calls, 3);
        assert_eq!(report.stats.total_input_tokens, 300);
        assert_eq!(
            report.audit_summary,
            "Analyzed 1 claims across 1 pages. Detected 1 contradiction(s). 1 high-confidence contradictions."
        );

        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[1].0.contains("- The proposed method improves accuracy by 12% over the baseline"));
        assert!(prompts[2].0.contains("\"supports\": false"));
    }
}
