//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use paperlens::{BackendError, Completion, CompletionBackend, CompletionRequest, ExtractedImage};
use std::sync::Mutex;

/// Which phase a prompt belongs to, judged from its wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Claims,
    Verification,
    Contradictions,
}

pub fn phase_of(prompt: &str) -> Phase {
    if prompt.contains("scientific claim extractor") {
        Phase::Claims
    } else if prompt.contains("VERIFICATION RESULTS:") {
        Phase::Contradictions
    } else {
        Phase::Verification
    }
}

/// Answers each phase with a canned reply and records what it was sent.
pub struct MockModel {
    pub claims: String,
    pub verifications: String,
    pub contradictions: String,
    pub sent: Mutex<Vec<(Phase, String, usize)>>,
}

impl MockModel {
    pub fn new(claims: &str, verifications: &str, contradictions: &str) -> Self {
        Self {
            claims: claims.into(),
            verifications: verifications.into(),
            contradictions: contradictions.into(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self, phase: Phase) -> Vec<(String, usize)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| *p == phase)
            .map(|(_, prompt, images)| (prompt.clone(), *images))
            .collect()
    }
}

#[async_trait]
impl CompletionBackend for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        let phase = phase_of(&request.prompt);
        self.sent
            .lock()
            .unwrap()
            .push((phase, request.prompt.clone(), request.images.len()));
        let text = match phase {
            Phase::Claims => self.claims.clone(),
            Phase::Verification => self.verifications.clone(),
            Phase::Contradictions => self.contradictions.clone(),
        };
        Ok(Completion {
            text,
            input_tokens: 1000,
            output_tokens: 200,
        })
    }
}

/// Always fails with the given error.
pub struct FailingModel(pub BackendError);

#[async_trait]
impl CompletionBackend for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _request: &CompletionRequest) -> Result<Completion, BackendError> {
        Err(self.0.clone())
    }
}

/// A solid-colour figure.
pub fn figure(page: usize, index: usize, width: u32, height: u32) -> ExtractedImage {
    ExtractedImage {
        page,
        index,
        width,
        height,
        image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([30, 90, 200, 255]))),
    }
}

pub const CLAIMS_REPLY: &str = r#"```json
[
  {"text": "Our model reduces the error rate by 40% compared to the baseline", "confidence": 0.95, "page": 1, "evidence_type": "quantitative"},
  {"text": "Training converges twice as fast as with the standard optimizer", "confidence": 0.85, "page": 2, "evidence_type": "comparative"},
  {"text": "Introduction", "confidence": 0.9, "page": 1, "evidence_type": "qualitative"}
]
```"#;

pub const VERIFICATIONS_REPLY: &str = r#"{"verifications": [
  {"claim": "Our model reduces the error rate by 40% compared to the baseline", "visual_found": true, "supports": false, "confidence": 0.9},
  {"claim": "Training converges twice as fast as with the standard optimizer", "visual_found": true, "supports": true, "confidence": 0.7}
]}"#;

pub const CONTRADICTIONS_REPLY: &str = r#"Here is what I found:
[
  {"claim": "Our model reduces the error rate by 40% compared to the baseline", "visual_evidence_page": 3, "visual_shows": "Figure 2 shows the error rate falling from 10.0% to 9.6%, a 4% reduction", "contradiction_type": "direct_conflict", "confidence": 0.92, "reasoning": "The text overstates the gain by an order of magnitude."},
  {"claim": "Training converges twice as fast as with the standard optimizer", "visual_evidence_page": 4, "visual_shows": "Loss curves overlap after epoch 20", "contradiction_type": "partial_contradiction", "confidence": 0.6}
]"#;
