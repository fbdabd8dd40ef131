//! End-to-end integration tests for paperlens.
//!
//! These tests read real PDF files from `./test_cases/`, need a pdfium
//! library, and (for the audit tests) make live model calls. They are gated
//! behind the `E2E_ENABLED` environment variable so they do not run in CI
//! unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=./libpdfium.so cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_inspect -- --nocapture

mod common;

use common::{MockModel, CLAIMS_REPLY, CONTRADICTIONS_REPLY, VERIFICATIONS_REPLY};
use paperlens::pipeline::ingest::extract_document;
use paperlens::{audit, audit_bytes, audit_to_file, inspect, AuditConfig, AuditError, AuditReport};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Skip unless some Gemini key is present.
macro_rules! skip_unless_api_key {
    () => {{
        if std::env::var("GEMINI_API_KEY").is_err() && std::env::var("GOOGLE_API_KEY").is_err() {
            println!("SKIP — set GOOGLE_API_KEY or GEMINI_API_KEY for live audits");
            return;
        }
    }};
}

/// Invariants every report must satisfy, whatever the model said.
fn assert_report_sane(report: &AuditReport, context: &str) {
    assert!(report.total_pages > 0, "[{context}] no pages");
    assert!(
        report.audit_summary.starts_with(&format!("Analyzed {} claims", report.claims.len())),
        "[{context}] summary does not match claims: {}",
        report.audit_summary
    );
    for c in &report.claims {
        assert!(!c.text.trim().is_empty(), "[{context}] empty claim");
        assert!((0.0..=1.0).contains(&c.confidence), "[{context}] confidence out of range");
    }
    for c in &report.contradictions {
        assert!((0.0..=1.0).contains(&c.confidence), "[{context}] confidence out of range");
    }
    assert!(report.stats.llm_calls >= 1, "[{context}] no model calls recorded");
    assert!(report.processing_time_seconds > 0.0);

    println!(
        "[{context}] ✓  {} claims, {} contradictions, {} calls, {:.1}s",
        report.claims.len(),
        report.contradictions.len(),
        report.stats.llm_calls,
        report.processing_time_seconds
    );
}

// ── Ingestion tests (pdfium only, no model) ──────────────────────────────────

#[tokio::test]
async fn test_inspect_arxiv_paper() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));

    let meta = inspect(path.to_str().unwrap())
        .await
        .expect("inspect() should succeed");

    assert_eq!(meta.page_count, 15, "Attention paper should have 15 pages");
    assert!(!meta.pdf_version.is_empty());

    println!("Metadata: {:?}", meta);
}

#[tokio::test]
async fn test_extract_text_and_figures() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let bytes = std::fs::read(&path).unwrap();

    let doc = extract_document("attention.pdf", bytes, None, 32)
        .await
        .expect("extraction should succeed");

    assert_eq!(doc.total_pages, 15);
    assert_eq!(doc.pages.len(), 15);
    assert!(doc.text.contains("--- PAGE 1 ---"));
    assert!(doc.text.contains("--- PAGE 15 ---"));
    assert!(doc.text.contains("Attention"));
    assert!(doc.images.iter().all(|i| i.width >= 32 && i.height >= 32));
    println!("{} chars, {} figures", doc.text.len(), doc.images.len());
}

#[tokio::test]
async fn test_corrupt_pdf_is_client_error() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let config = AuditConfig::builder()
        .backend(Arc::new(MockModel::new("[]", "{}", "[]")))
        .build()
        .unwrap();
    let err = audit_bytes("broken.pdf", b"%PDF-1.7\nthis is not a real document".to_vec(), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, AuditError::CorruptPdf { .. }), "got {err}");
    assert!(err.is_client_error());
}

#[tokio::test]
async fn test_real_pdf_with_mock_model() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let model = Arc::new(MockModel::new(CLAIMS_REPLY, VERIFICATIONS_REPLY, CONTRADICTIONS_REPLY));
    let config = AuditConfig::builder().backend(model.clone()).build().unwrap();

    let report = audit(path.to_str().unwrap(), &config).await.expect("audit should succeed");

    assert_eq!(report.total_pages, 15);
    assert_eq!(report.contradictions.len(), 2);
    assert!(report.stats.characters_extracted > 10_000);
    assert_report_sane(&report, "attention/mock");
}

// ── Live audits (need pdfium + API key) ──────────────────────────────────────

#[tokio::test]
async fn test_audit_arxiv_paper_live() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    skip_unless_api_key!();

    let config = AuditConfig::builder().max_retries(2).build().expect("valid config");
    let report = audit(path.to_str().unwrap(), &config).await.expect("audit should succeed");

    assert_report_sane(&report, "attention/live");
    assert!(!report.claims.is_empty(), "a results-heavy paper should yield claims");
}

#[tokio::test]
async fn test_audit_to_file_writes_json() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    skip_unless_api_key!();
    let out_path = output_dir().join("attention_audit.json");

    let config = AuditConfig::builder().max_images(0).build().unwrap();
    let report = audit_to_file(path.to_str().unwrap(), &out_path, &config)
        .await
        .expect("audit should succeed");

    let written: AuditReport =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).expect("valid JSON report");
    assert_eq!(written.claims, report.claims);
    assert_eq!(written.stats.images_sent, 0);
    assert!(!out_path.with_extension("json.tmp").exists());
}
