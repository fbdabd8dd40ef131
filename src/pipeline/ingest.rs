//! PDF ingestion: per-page text and embedded figures via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole parse. Running it on Tokio's blocking pool
//! keeps the server's worker threads free to accept uploads while a large
//! paper is being read.

use crate::error::AuditError;
use crate::output::DocumentMetadata;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

/// Text of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-indexed page number.
    pub page: usize,
    pub text: String,
}

/// One embedded image object.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// 1-indexed page number.
    pub page: usize,
    /// Position among the kept images of that page.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub image: DynamicImage,
}

impl ExtractedImage {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Everything the auditor needs from a PDF.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub name: String,
    /// All pages joined, each preceded by a `--- PAGE N ---` marker.
    pub text: String,
    pub pages: Vec<PageText>,
    pub images: Vec<ExtractedImage>,
    pub total_pages: usize,
}

impl ExtractedDocument {
    /// Assemble a document from already-extracted pages.
    pub fn from_pages(name: impl Into<String>, pages: Vec<PageText>, images: Vec<ExtractedImage>) -> Self {
        let mut text = String::new();
        for p in &pages {
            text.push_str(&page_marker(p.page));
            text.push_str(&p.text);
        }
        Self {
            name: name.into(),
            text,
            total_pages: pages.len(),
            pages,
            images,
        }
    }

    /// The `limit` largest figures, largest first; ties keep page order.
    pub fn largest_images(&self, limit: usize) -> Vec<&ExtractedImage> {
        let mut refs: Vec<&ExtractedImage> = self.images.iter().collect();
        refs.sort_by(|a, b| b.area().cmp(&a.area()));
        refs.truncate(limit);
        refs
    }
}

/// Marker inserted ahead of each page's text.
pub fn page_marker(page: usize) -> String {
    format!("\n--- PAGE {page} ---\n")
}

/// Extract text and images from PDF bytes.
///
/// Images whose width or height is below `min_image_pixels` are skipped.
pub async fn extract_document(
    name: &str,
    bytes: Vec<u8>,
    password: Option<&str>,
    min_image_pixels: u32,
) -> Result<ExtractedDocument, AuditError> {
    let name = name.to_string();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        extract_document_blocking(&name, &bytes, password.as_deref(), min_image_pixels)
    })
    .await
    .map_err(|e| AuditError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Read document metadata without touching page content.
pub async fn extract_metadata(
    name: &str,
    bytes: Vec<u8>,
    password: Option<&str>,
) -> Result<DocumentMetadata, AuditError> {
    let name = name.to_string();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&name, &bytes, password.as_deref()))
        .await
        .map_err(|e| AuditError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// Bind to pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the system.
pub fn bind_pdfium() -> Result<Pdfium, AuditError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| AuditError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    bytes: &'a [u8],
    name: &str,
    password: Option<&str>,
) -> Result<PdfDocument<'a>, AuditError> {
    pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                AuditError::WrongPassword {
                    name: name.to_string(),
                }
            } else {
                AuditError::PasswordRequired {
                    name: name.to_string(),
                }
            }
        } else {
            AuditError::CorruptPdf {
                name: name.to_string(),
                detail: err_str,
            }
        }
    })
}

fn extract_document_blocking(
    name: &str,
    bytes: &[u8],
    password: Option<&str>,
    min_image_pixels: u32,
) -> Result<ExtractedDocument, AuditError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, bytes, name, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF '{}' loaded: {} pages", name, total_pages);

    let mut page_texts = Vec::with_capacity(total_pages);
    let mut images = Vec::new();

    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;

        let text = page
            .text()
            .map_err(|e| AuditError::ExtractionFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?
            .all();
        page_texts.push(PageText {
            page: page_num,
            text,
        });

        let mut index = 0;
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            match image_object.get_raw_image() {
                Ok(image) => {
                    let (width, height) = (image.width(), image.height());
                    if width < min_image_pixels || height < min_image_pixels {
                        debug!("Page {}: skipping {}x{} image", page_num, width, height);
                        continue;
                    }
                    images.push(ExtractedImage {
                        page: page_num,
                        index,
                        width,
                        height,
                        image,
                    });
                    index += 1;
                }
                Err(e) => warn!("Page {}: undecodable image object: {:?}", page_num, e),
            }
        }
    }

    let doc = ExtractedDocument::from_pages(name, page_texts, images);
    info!(
        "Extracted {} characters, {} images",
        doc.text.chars().count(),
        doc.images.len()
    );
    Ok(doc)
}

fn extract_metadata_blocking(
    name: &str,
    bytes: &[u8],
    password: Option<&str>,
) -> Result<DocumentMetadata, AuditError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, bytes, name, password)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

// ── Text windows ─────────────────────────────────────────────────────────────

/// Byte offset of the `n`-th char, or the end of the string.
fn char_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map(|(b, _)| b).unwrap_or(text.len())
}

/// The first `n` chars of `text`.
pub fn prefix_chars(text: &str, n: usize) -> &str {
    &text[..char_offset(text, n)]
}

/// Windows of `window` chars sampled for claim extraction.
///
/// Always the start of the paper; when the paper is longer than two windows,
/// also its middle and its end, so results sections deep in the text are
/// reachable.
pub fn sample_windows(text: &str, window: usize) -> Vec<&str> {
    if text.is_empty() || window == 0 {
        return Vec::new();
    }
    let total = text.chars().count();
    let mut windows = vec![prefix_chars(text, window)];
    if total > 2 * window {
        let mid_start = (total / 2).saturating_sub(window / 2);
        windows.push(&text[char_offset(text, mid_start)..char_offset(text, mid_start + window)]);
        windows.push(&text[char_offset(text, total - window)..]);
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn image(page: usize, w: u32, h: u32) -> ExtractedImage {
        ExtractedImage {
            page,
            index: 0,
            width: w,
            height: h,
            image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]))),
        }
    }

    #[test]
    fn from_pages_inserts_markers() {
        let doc = ExtractedDocument::from_pages(
            "paper.pdf",
            vec![
                PageText { page: 1, text: "Intro".into() },
                PageText { page: 2, text: "Results".into() },
            ],
            vec![],
        );
        assert_eq!(doc.text, "\n--- PAGE 1 ---\nIntro\n--- PAGE 2 ---\nResults");
        assert_eq!(doc.total_pages, 2);
    }

    #[test]
    fn largest_images_prefers_area() {
        let doc = ExtractedDocument::from_pages(
            "p.pdf",
            vec![],
            vec![image(1, 40, 40), image(2, 100, 80), image(3, 50, 50)],
        );
        let picked: Vec<usize> = doc.largest_images(2).iter().map(|i| i.page).collect();
        assert_eq!(picked, vec![2, 3]);
    }

    #[test]
    fn short_text_yields_single_window() {
        let w = sample_windows("abc", 8000);
        assert_eq!(w, vec!["abc"]);
        assert!(sample_windows("", 10).is_empty());
    }

    #[test]
    fn long_text_yields_start_middle_end() {
        let text: String = (0..30).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let w = sample_windows(&text, 10);
        assert_eq!(w.len(), 3);
        assert_eq!(w[0], &text[..10]);
        assert_eq!(w[1], &text[10..20]);
        assert_eq!(w[2], &text[20..]);
    }

    #[test]
    fn exactly_two_windows_long_is_not_sampled() {
        let text = "x".repeat(20);
        assert_eq!(sample_windows(&text, 10).len(), 1);
    }

    #[test]
    fn windows_respect_char_boundaries() {
        let text = "α".repeat(25);
        let w = sample_windows(&text, 10);
        assert_eq!(w.len(), 3);
        assert!(w.iter().all(|s| s.chars().count() == 10));
        assert_eq!(prefix_chars("ééé", 2), "éé");
    }
}
