//! Progress-callback trait for per-phase audit events.
//!
//! Inject an [`Arc<dyn AuditProgressCallback>`] via
//! [`crate::config::AuditConfigBuilder::progress_callback`] to receive
//! events as the auditor moves through its three model phases.
//!
//! # Example
//!
//! ```rust
//! use paperlens::{AuditConfig, AuditPhase, AuditProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl AuditProgressCallback for Printer {
//!     fn on_phase_complete(&self, phase: AuditPhase, items: usize) {
//!         eprintln!("{phase}: {items} item(s)");
//!     }
//! }
//!
//! let config = AuditConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn AuditProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The stages of one audit, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPhase {
    /// Text and figures pulled out of the PDF.
    Ingestion,
    /// Phase 1: quantitative/comparative claims.
    ClaimExtraction,
    /// Phase 2: claims cross-checked against figures and text.
    Verification,
    /// Phase 3: contradictions flagged.
    ContradictionDetection,
}

impl AuditPhase {
    /// Short human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            AuditPhase::Ingestion => "ingestion",
            AuditPhase::ClaimExtraction => "claim extraction",
            AuditPhase::Verification => "visual verification",
            AuditPhase::ContradictionDetection => "contradiction detection",
        }
    }
}

impl fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the auditor as it moves through each phase.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: the server
/// shares one config across request tasks.
pub trait AuditProgressCallback: Send + Sync {
    /// Called once ingestion has finished.
    fn on_audit_start(&self, total_pages: usize, images: usize) {
        let _ = (total_pages, images);
    }

    /// Called before the first model request of a phase.
    fn on_phase_start(&self, phase: AuditPhase) {
        let _ = phase;
    }

    /// Called when a phase finishes.
    ///
    /// `items` is the number of claims, verifications or contradictions the
    /// phase produced.
    fn on_phase_complete(&self, phase: AuditPhase, items: usize) {
        let _ = (phase, items);
    }

    /// Called before a retry sleeps.
    fn on_retry(&self, phase: AuditPhase, attempt: u32, error: &str) {
        let _ = (phase, attempt, error);
    }

    /// Called once after phase 3.
    fn on_audit_complete(&self, claims: usize, contradictions: usize) {
        let _ = (claims, contradictions);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AuditProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AuditConfig`].
pub type ProgressCallback = Arc<dyn AuditProgressCallback>;
