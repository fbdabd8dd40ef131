//! Input resolution: turn a path, URL or upload into validated PDF bytes.
//!
//! pdfium can open a document straight from memory, so every source ends up
//! as a [`PdfSource`] holding the raw bytes and a display name used in logs
//! and error messages.

use crate::error::AuditError;
use std::path::PathBuf;
use tracing::{debug, info};

/// PDF bytes plus the name they arrived under.
#[derive(Debug, Clone)]
pub struct PdfSource {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PdfSource {
    /// Validate an upload and wrap it.
    ///
    /// Accepts the file when ANY of the extension, the `%PDF` header or the
    /// declared MIME type says PDF; pdfium has the final word later.
    pub fn from_upload(
        name: impl Into<String>,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<Self, AuditError> {
        let name = name.into();
        if !looks_like_pdf(&name, content_type, &bytes) {
            return Err(AuditError::NotAPdf { name });
        }
        if bytes.is_empty() {
            return Err(AuditError::EmptyUpload);
        }
        Ok(Self { name, bytes })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Whether the bytes start with the PDF magic.
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Loose PDF detection: extension OR header OR MIME type.
pub fn looks_like_pdf(name: &str, content_type: Option<&str>, bytes: &[u8]) -> bool {
    let by_extension = name.to_lowercase().ends_with(".pdf");
    let by_mime = content_type
        .map(|m| m.trim().eq_ignore_ascii_case("application/pdf"))
        .unwrap_or(false);
    debug!(
        "PDF validation for '{}': extension={}, header={}, mime={}",
        name,
        by_extension,
        has_pdf_magic(bytes),
        by_mime
    );
    by_extension || has_pdf_magic(bytes) || by_mime
}

/// Resolve the input string to PDF bytes.
///
/// URLs are downloaded; anything else is treated as a local path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PdfSource, AuditError> {
    if input.trim().is_empty() {
        return Err(AuditError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

/// Read a local file, validating existence, permissions and PDF magic.
async fn resolve_local(path_str: &str) -> Result<PdfSource, AuditError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AuditError::PermissionDenied { path });
        }
        Err(_) => return Err(AuditError::FileNotFound { path }),
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_str.to_string());

    if bytes.is_empty() {
        return Err(AuditError::EmptyUpload);
    }
    if !has_pdf_magic(&bytes) {
        return Err(AuditError::NotAPdf { name });
    }

    debug!("Resolved local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(PdfSource { name, bytes })
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<PdfSource, AuditError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AuditError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AuditError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AuditError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AuditError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AuditError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    let name = filename_from_url(url);
    if bytes.is_empty() {
        return Err(AuditError::EmptyUpload);
    }
    if !has_pdf_magic(&bytes) {
        return Err(AuditError::NotAPdf { name });
    }

    info!("Downloaded {} bytes as '{}'", bytes.len(), name);
    Ok(PdfSource { name, bytes })
}

/// Last path segment of the URL, or a generic name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://arxiv.org/pdf/1706.03762"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn looks_like_pdf_accepts_any_signal() {
        assert!(looks_like_pdf("paper.PDF", None, b"garbage"));
        assert!(looks_like_pdf("blob", None, b"%PDF-1.7\n"));
        assert!(looks_like_pdf("blob", Some("application/pdf"), b""));
        assert!(!looks_like_pdf("notes.txt", Some("text/plain"), b"hello"));
    }

    #[test]
    fn upload_validation_order() {
        // Non-PDF wins over emptiness when nothing says PDF.
        let err = PdfSource::from_upload("a.txt", None, vec![]).unwrap_err();
        assert!(matches!(err, AuditError::NotAPdf { .. }));
        // A .pdf name with no bytes is an empty upload.
        let err = PdfSource::from_upload("a.pdf", None, vec![]).unwrap_err();
        assert!(matches!(err, AuditError::EmptyUpload));
        assert!(PdfSource::from_upload("a.pdf", None, b"%PDF-1.4".to_vec()).is_ok());
    }

    #[test]
    fn filename_from_url_uses_last_segment() {
        assert_eq!(filename_from_url("https://arxiv.org/pdf/1706.03762"), "1706.03762");
        assert_eq!(filename_from_url("https://example.com/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn resolve_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, AuditError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn resolve_local_rejects_non_pdf() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"just some text").unwrap();
        let err = resolve_input(tmp.path().to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, AuditError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn resolve_local_reads_pdf_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.5\n%fake").unwrap();
        let src = resolve_input(tmp.path().to_str().unwrap(), 5).await.unwrap();
        assert!(has_pdf_magic(&src.bytes));
    }

    #[tokio::test]
    async fn blank_input_is_invalid() {
        tokio_test::assert_err!(resolve_input("  ", 5).await);
    }
}
