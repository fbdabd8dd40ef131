//! Top-level audit entry points.
//!
//! [`audit`] takes a path or URL, [`audit_bytes`] takes an in-memory upload
//! (what the HTTP server uses). Both resolve a backend, ingest the PDF and
//! hand the document to an [`Auditor`].

use crate::auditor::Auditor;
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::output::{AuditReport, DocumentMetadata};
use crate::pipeline::ingest;
use crate::pipeline::input::{self, PdfSource};
use crate::pipeline::llm::{CompletionBackend, EdgequakeBackend};
use crate::progress::AuditPhase;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Audit a PDF file or URL.
///
/// # Errors
/// Input, PDF and provider errors are returned as-is. A model call that
/// fails after every retry aborts the audit with
/// [`AuditError::LlmApiError`] or [`AuditError::ApiTimeout`].
pub async fn audit(input_str: impl AsRef<str>, config: &AuditConfig) -> Result<AuditReport, AuditError> {
    let source = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let auditor = Auditor::new(resolve_backend(config)?, config.clone());
    audit_source(&auditor, source).await
}

/// Audit PDF bytes already in memory.
pub async fn audit_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    config: &AuditConfig,
) -> Result<AuditReport, AuditError> {
    let source = PdfSource::from_upload(name, None, bytes)?;
    let auditor = Auditor::new(resolve_backend(config)?, config.clone());
    audit_source(&auditor, source).await
}

/// Ingest `source` and run every phase on it with an existing auditor.
///
/// `processing_time_seconds` in the result includes ingestion.
pub async fn audit_source(auditor: &Auditor, source: PdfSource) -> Result<AuditReport, AuditError> {
    let start = Instant::now();
    let config = auditor.config();
    info!("Starting audit: {} ({} bytes)", source.name, source.bytes.len());

    if let Some(ref cb) = config.progress_callback {
        cb.on_phase_start(AuditPhase::Ingestion);
    }
    let doc = ingest::extract_document(
        &source.name,
        source.bytes,
        config.password.as_deref(),
        config.min_image_pixels,
    )
    .await?;
    info!(
        "Extracted {} chars and {} figure(s) from {} page(s)",
        doc.text.chars().count(),
        doc.images.len(),
        doc.total_pages
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_phase_complete(AuditPhase::Ingestion, doc.total_pages);
    }

    let mut report = auditor.run(&doc).await?;
    report.processing_time_seconds = start.elapsed().as_secs_f64();

    info!(
        "Audit complete: {} claims, {} contradictions, {:.1}s",
        report.claims.len(),
        report.contradictions.len(),
        report.processing_time_seconds
    );
    Ok(report)
}

/// Audit a PDF and write the JSON report to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn audit_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &AuditConfig,
) -> Result<AuditReport, AuditError> {
    let report = audit(input_str, config).await?;
    let path = output_path.as_ref();
    let write_err = |source: std::io::Error| AuditError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| AuditError::Internal(format!("serialise report: {e}")))?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(report)
}

/// Synchronous wrapper around [`audit`].
///
/// Creates a temporary tokio runtime internally.
pub fn audit_sync(input_str: impl AsRef<str>, config: &AuditConfig) -> Result<AuditReport, AuditError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AuditError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(audit(input_str, config))
}

/// Read PDF metadata without auditing.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, AuditError> {
    let source = input::resolve_input(input_str.as_ref(), 120).await?;
    ingest::extract_metadata(&source.name, source.bytes, None).await
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AuditError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| AuditError::ProviderNotConfigured {
        provider: provider_name.to_string(),
        hint: format!("{e}"),
    })
}

fn wrap(provider: Arc<dyn LLMProvider>, provider_name: &str, model: &str) -> Arc<dyn CompletionBackend> {
    Arc::new(EdgequakeBackend::new(provider, format!("{provider_name}/{model}")))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the completion backend, from most-specific to least-specific.
///
/// 1. `config.backend`, used as-is.
/// 2. `config.provider_name` with `config.model` (or the default model).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. Gemini, when `GEMINI_API_KEY` or `GOOGLE_API_KEY` is set.
/// 5. [`ProviderFactory::from_env`] auto-detection.
pub fn resolve_backend(config: &AuditConfig) -> Result<Arc<dyn CompletionBackend>, AuditError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    let model = config.effective_model();

    if let Some(ref name) = config.provider_name {
        return Ok(wrap(create_provider(name, model)?, name, model));
    }

    if let (Some(prov), Some(env_model)) = (
        non_empty_env("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_env("EDGEQUAKE_MODEL"),
    ) {
        let model = config.model.as_deref().unwrap_or(&env_model);
        return Ok(wrap(create_provider(&prov, model)?, &prov, model));
    }

    if non_empty_env("GEMINI_API_KEY").is_some() || non_empty_env("GOOGLE_API_KEY").is_some() {
        return Ok(wrap(create_provider("gemini", model)?, "gemini", model));
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| AuditError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No LLM provider could be auto-detected from environment.\n\
            Set GOOGLE_API_KEY (or GEMINI_API_KEY) or configure a provider.\n\
            Error: {}",
            e
        ),
    })?;
    Ok(Arc::new(EdgequakeBackend::new(llm_provider, "auto")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::pipeline::llm::{Completion, CompletionRequest};
    use async_trait::async_trait;

    struct Never;

    #[async_trait]
    impl CompletionBackend for Never {
        fn name(&self) -> &str {
            "never"
        }

        async fn generate(&self, _request: &CompletionRequest) -> Result<Completion, BackendError> {
            Err(BackendError::Auth("should not be called".into()))
        }
    }

    #[test]
    fn explicit_backend_wins() {
        let config = AuditConfig::builder().backend(Arc::new(Never)).build().unwrap();
        let backend = resolve_backend(&config).unwrap();
        assert_eq!(backend.name(), "never");
    }

    #[tokio::test]
    async fn audit_bytes_rejects_before_touching_the_model() {
        let config = AuditConfig::builder().backend(Arc::new(Never)).build().unwrap();
        let err = audit_bytes("notes.txt", b"hello".to_vec(), &config).await.unwrap_err();
        assert!(matches!(err, AuditError::NotAPdf { .. }));

        let err = audit_bytes("empty.pdf", Vec::new(), &config).await.unwrap_err();
        assert!(matches!(err, AuditError::EmptyUpload));
    }

    #[tokio::test]
    async fn audit_missing_file() {
        let config = AuditConfig::builder().backend(Arc::new(Never)).build().unwrap();
        let err = audit("/definitely/not/here.pdf", &config).await.unwrap_err();
        assert!(matches!(err, AuditError::FileNotFound { .. }));
        assert!(err.is_client_error());
    }
}
