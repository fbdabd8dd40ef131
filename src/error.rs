//! Error types for the paperlens library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AuditError`] — **Fatal**: the audit cannot produce a report (bad
//!   upload, encrypted PDF, provider not configured, model unreachable after
//!   every retry). Returned as `Err(AuditError)` from the top-level `audit*`
//!   functions and mapped to an HTTP status by the server.
//!
//! * [`BackendError`] — **Per call**: one model request failed. The retry
//!   loop in [`crate::pipeline::llm`] inspects it to decide whether another
//!   attempt is worthwhile; only the last one surfaces, wrapped in
//!   [`AuditError::LlmApiError`].

use crate::progress::AuditPhase;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the paperlens library.
#[derive(Debug, Error)]
pub enum AuditError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The upload carried no bytes.
    #[error("Uploaded file is empty. Please upload a valid PDF.")]
    EmptyUpload,

    /// The bytes were read, but they are not a PDF.
    #[error("File rejected: '{name}' is not a valid PDF. Upload a .pdf file or ensure the file starts with %PDF.")]
    NotAPdf { name: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is password-protected or encrypted. Please upload an unencrypted PDF.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// pdfium opened the document but failed on a page.
    #[error("Text/image extraction failed on page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every attempt of a phase's model call failed.
    #[error("LLM API error during {phase} after {attempts} attempt(s): {message}")]
    LlmApiError {
        phase: AuditPhase,
        attempts: u32,
        message: String,
    },

    /// Model call timed out and retries were exhausted.
    #[error("LLM call timed out after {secs}s during {phase}")]
    ApiTimeout { phase: AuditPhase, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output report file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuditError {
    /// Whether the caller caused the failure (bad file, wrong password).
    ///
    /// The server answers these with 400; everything else is a 500.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuditError::FileNotFound { .. }
                | AuditError::PermissionDenied { .. }
                | AuditError::InvalidInput { .. }
                | AuditError::EmptyUpload
                | AuditError::NotAPdf { .. }
                | AuditError::CorruptPdf { .. }
                | AuditError::PasswordRequired { .. }
                | AuditError::WrongPassword { .. }
        )
    }
}

/// Failure of a single model call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// HTTP 429 or a quota message.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// HTTP 400; some hosted models return these transiently.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// HTTP 401/403. Retrying will not help.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The call did not complete within the per-call timeout.
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Anything else (5xx, connection reset, malformed body).
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::Auth(_))
    }

    /// Classify a provider error from its rendered message.
    ///
    /// Provider crates disagree on error shapes; the status code or a
    /// well-known phrase almost always survives into the message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if RE_RATE_LIMITED.is_match(&lower) {
            BackendError::RateLimited(message)
        } else if RE_AUTH.is_match(&lower) {
            BackendError::Auth(message)
        } else if RE_BAD_REQUEST.is_match(&lower) {
            BackendError::BadRequest(message)
        } else {
            BackendError::Other(message)
        }
    }
}

// Status codes must stand alone; request ids and byte counts contain digits too.
static RE_RATE_LIMITED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b429\b|rate[ _]limit|resource_exhausted|quota").unwrap());
static RE_AUTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b40[13]\b|unauthorized|unauthenticated|permission_denied|(invalid|missing|incorrect|bad) api[ _-]?key|api[ _-]?key (is )?(invalid|missing|not valid)",
    )
    .unwrap()
});
static RE_BAD_REQUEST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b400\b|bad request|invalid_argument").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_pdf_display() {
        let e = AuditError::NotAPdf {
            name: "notes.txt".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("notes.txt"), "got: {msg}");
        assert!(msg.contains("%PDF"));
    }

    #[test]
    fn llm_api_error_display() {
        let e = AuditError::LlmApiError {
            phase: AuditPhase::Verification,
            attempts: 4,
            message: "503 overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("4 attempt(s)"), "got: {msg}");
        assert!(msg.contains("503 overloaded"));
    }

    #[test]
    fn client_errors_are_classified() {
        assert!(AuditError::EmptyUpload.is_client_error());
        assert!(AuditError::PasswordRequired { name: "a.pdf".into() }.is_client_error());
        assert!(!AuditError::Internal("boom".into()).is_client_error());
        assert!(!AuditError::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: String::new(),
        }
        .is_client_error());
    }

    #[test]
    fn classify_rate_limit() {
        let e = BackendError::classify("HTTP 429 Too Many Requests");
        assert!(matches!(e, BackendError::RateLimited(_)));
        assert!(e.is_retryable());
        assert!(matches!(
            BackendError::classify("RESOURCE_EXHAUSTED: quota exceeded"),
            BackendError::RateLimited(_)
        ));
    }

    #[test]
    fn classify_auth_is_not_retryable() {
        let e = BackendError::classify("401 Unauthorized: invalid key");
        assert!(matches!(e, BackendError::Auth(_)));
        assert!(!e.is_retryable());
    }

    #[test]
    fn classify_bad_request_and_other() {
        assert!(matches!(
            BackendError::classify("400 Bad Request"),
            BackendError::BadRequest(_)
        ));
        assert!(matches!(
            BackendError::classify("connection reset by peer"),
            BackendError::Other(_)
        ));
    }

    #[test]
    fn classify_ignores_digits_inside_identifiers() {
        let e = BackendError::classify("500 Internal Server Error (request id 4012-af93, retry after 4290ms)");
        assert!(matches!(e, BackendError::Other(_)), "got {e:?}");
        assert!(e.is_retryable());

        let e = BackendError::classify("503 Service Unavailable: upstream sent 14003 bytes");
        assert!(matches!(e, BackendError::Other(_)), "got {e:?}");
    }

    #[test]
    fn classify_api_key_mentions() {
        assert!(matches!(
            BackendError::classify("HTTP 401 Unauthorized"),
            BackendError::Auth(_)
        ));
        assert!(matches!(
            BackendError::classify("API key not valid. Please pass a valid API key."),
            BackendError::Auth(_)
        ));
        assert!(matches!(
            BackendError::classify("Invalid API key provided"),
            BackendError::Auth(_)
        ));
        // A server fault that merely mentions the key header is still retryable.
        assert!(BackendError::classify("502 Bad Gateway while forwarding x-goog-api-key request").is_retryable());
    }
}
