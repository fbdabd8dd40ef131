//! Pipeline stages for a paper audit.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ ingest ──▶ encode ──▶ llm ──▶ parse ──▶ claims
//! (bytes)   (pdfium)   (base64)   (model)  (JSON)    (heuristics)
//! ```
//!
//! 1. [`input`]  — validate uploads, read local files, download URLs
//! 2. [`ingest`] — per-page text and embedded figures; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`] — downscale and PNG/base64-wrap figures for the vision request
//! 4. [`llm`]    — backend seam plus retry/backoff; the only stage with
//!    network I/O to the model
//! 5. [`parse`]  — fence stripping and tolerant JSON parsing of replies
//! 6. [`claims`] — claim post-filter and the sentence-level fallback

pub mod claims;
pub mod encode;
pub mod ingest;
pub mod input;
pub mod llm;
pub mod parse;
