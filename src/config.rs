//! Configuration types for a paper audit.
//!
//! All audit behaviour is controlled through [`AuditConfig`], built via its
//! [`AuditConfigBuilder`]. The same config is shared by the CLI and by every
//! request the HTTP server handles.

use crate::error::AuditError;
use crate::pipeline::llm::CompletionBackend;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Configuration for a paper audit.
///
/// # Example
/// ```rust
/// use paperlens::AuditConfig;
///
/// let config = AuditConfig::builder()
///     .model("gemini-2.0-flash")
///     .max_retries(5)
///     .max_images(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AuditConfig {
    /// LLM model identifier. If None, [`DEFAULT_MODEL`] (or `EDGEQUAKE_MODEL`).
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    /// If None along with `backend`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed completion backend. Takes precedence over `provider_name`.
    pub backend: Option<Arc<dyn CompletionBackend>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// The prompts ask for strict JSON; low temperature keeps the model on
    /// the format.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Retries after the first attempt of each model call. Default: 3.
    pub max_retries: u32,

    /// First retry delay in milliseconds; doubles per retry. Default: 1000.
    ///
    /// 1 s → 2 s → 4 s. Hosted models return 429 in bursts, and a
    /// sub-second backoff tends to land inside the same quota window.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Characters per phase-1 text window. Default: 8000.
    pub claim_window_chars: usize,

    /// Leading characters of the paper sent as phase-2 context. Default: 3000.
    pub verification_context_chars: usize,

    /// Claims forwarded to phases 2 and 3. Default: 5.
    pub max_claims_checked: usize,

    /// Figures attached to the phase-2 request. Default: 4. Zero sends text only.
    pub max_images: usize,

    /// Longest edge of an attached figure after downscaling. Default: 1536.
    pub max_image_pixels: u32,

    /// Figures narrower or shorter than this are ignored. Default: 32.
    ///
    /// Filters out rules, bullets and logos that pdfium reports as images.
    pub min_image_pixels: u32,

    /// Sentences kept by the heuristic fallback. Default: 10.
    pub fallback_claim_limit: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-phase progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            backend: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 1000,
            api_timeout_secs: 120,
            password: None,
            claim_window_chars: 8000,
            verification_context_chars: 3000,
            max_claims_checked: 5,
            max_images: 4,
            max_image_pixels: 1536,
            min_image_pixels: 32,
            fallback_claim_limit: 10,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("claim_window_chars", &self.claim_window_chars)
            .field("verification_context_chars", &self.verification_context_chars)
            .field("max_claims_checked", &self.max_claims_checked)
            .field("max_images", &self.max_images)
            .field("fallback_claim_limit", &self.fallback_claim_limit)
            .finish()
    }
}

impl AuditConfig {
    /// Create a new builder for `AuditConfig`.
    pub fn builder() -> AuditConfigBuilder {
        AuditConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model id that will be requested.
    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`AuditConfig`].
pub struct AuditConfigBuilder {
    config: AuditConfig,
}

impl fmt::Debug for AuditConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AuditConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(256);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn claim_window_chars(mut self, n: usize) -> Self {
        self.config.claim_window_chars = n;
        self
    }

    pub fn verification_context_chars(mut self, n: usize) -> Self {
        self.config.verification_context_chars = n;
        self
    }

    pub fn max_claims_checked(mut self, n: usize) -> Self {
        self.config.max_claims_checked = n;
        self
    }

    pub fn max_images(mut self, n: usize) -> Self {
        self.config.max_images = n;
        self
    }

    pub fn max_image_pixels(mut self, px: u32) -> Self {
        self.config.max_image_pixels = px.max(64);
        self
    }

    pub fn min_image_pixels(mut self, px: u32) -> Self {
        self.config.min_image_pixels = px;
        self
    }

    pub fn fallback_claim_limit(mut self, n: usize) -> Self {
        self.config.fallback_claim_limit = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AuditConfig, AuditError> {
        let c = &self.config;
        if c.max_claims_checked == 0 {
            return Err(AuditError::InvalidConfig(
                "max_claims_checked must be ≥ 1".into(),
            ));
        }
        if c.claim_window_chars < 500 {
            return Err(AuditError::InvalidConfig(format!(
                "claim_window_chars must be ≥ 500, got {}",
                c.claim_window_chars
            )));
        }
        if c.min_image_pixels > c.max_image_pixels {
            return Err(AuditError::InvalidConfig(format!(
                "min_image_pixels ({}) exceeds max_image_pixels ({})",
                c.min_image_pixels, c.max_image_pixels
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = AuditConfig::default();
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.claim_window_chars, 8000);
        assert_eq!(c.verification_context_chars, 3000);
        assert_eq!(c.max_claims_checked, 5);
        assert_eq!(c.fallback_claim_limit, 10);
        assert_eq!(c.effective_model(), DEFAULT_MODEL);
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = AuditConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_zero_claims() {
        let err = AuditConfig::builder().max_claims_checked(0).build().unwrap_err();
        assert!(matches!(err, AuditError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_tiny_window() {
        assert!(AuditConfig::builder().claim_window_chars(100).build().is_err());
    }

    #[test]
    fn builder_rejects_inverted_image_bounds() {
        let err = AuditConfig::builder()
            .max_image_pixels(64)
            .min_image_pixels(200)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("min_image_pixels"));
    }

    #[test]
    fn debug_hides_backend_internals() {
        let s = format!("{:?}", AuditConfig::default());
        assert!(s.contains("AuditConfig"));
        assert!(s.contains("max_retries"));
    }
}
