//! # paperlens
//!
//! Audit research papers for contradictions between what the text claims and
//! what the figures show.
//!
//! ## Why this crate?
//!
//! Reviewers read the abstract, then skim the plots. A paper that promises
//! "a 40% error reduction" while its own bar chart shows 4% slips through
//! more often than it should. This crate pulls the text and embedded figures
//! out of a PDF and runs three structured prompts against a multimodal model
//! to surface exactly that kind of mismatch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 0. Ingest          page text + embedded figures via pdfium (spawn_blocking)
//!  ├─ 1. Claims          text windows → model → JSON claims (regex fallback)
//!  ├─ 2. Verification    top claims + leading text + figures → model
//!  ├─ 3. Contradictions  claims + verdicts → model
//!  └─ 4. Report          summary, stats, timing → AuditReport
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paperlens::{audit, AuditConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Gemini picked up from GOOGLE_API_KEY / GEMINI_API_KEY
//!     let config = AuditConfig::default();
//!     let report = audit("paper.pdf", &config).await?;
//!     println!("{}", report.audit_summary);
//!     for c in report.high_confidence_contradictions() {
//!         println!("p.{}: {} vs. {}", c.visual_evidence_page, c.claim, c.visual_shows);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP service (`POST /api/audit`) |
//! | `cli`    | on      | The `paperlens` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod audit;
pub mod auditor;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use audit::{audit, audit_bytes, audit_source, audit_sync, audit_to_file, inspect, resolve_backend};
pub use auditor::{Auditor, ExtractedClaims, PhaseOutput, PhaseUsage};
pub use config::{AuditConfig, AuditConfigBuilder, DEFAULT_MODEL};
pub use error::{AuditError, BackendError};
pub use output::{
    AuditReport, AuditStats, Claim, Contradiction, ContradictionType, DocumentMetadata, EvidenceType,
    UploadResponse, Verification, VerificationSet,
};
pub use pipeline::ingest::{ExtractedDocument, ExtractedImage, PageText};
pub use pipeline::input::PdfSource;
pub use pipeline::llm::{Completion, CompletionBackend, CompletionRequest, EdgequakeBackend};
pub use progress::{AuditPhase, AuditProgressCallback, NoopProgressCallback, ProgressCallback};
