//! Configuration for a pipeline run.
//!
//! Everything the orchestrator needs to know about the outside world lives
//! in [`PipelineConfig`]: where each provider is and how to authenticate,
//! where artifacts go, and how hard to retry. Build it through
//! [`PipelineConfig::builder()`]; `build()` rejects configurations that could
//! never succeed (missing credentials, zero attempts, non-HTTP base URLs).
//!
//! Loading secrets from the environment is the caller's business. The CLI
//! does it through `clap`'s `env` fallbacks.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_PDFCO_URL: &str = "https://api.pdf.co/v1";
pub const DEFAULT_CONVERTAPI_URL: &str = "https://v2.convertapi.com";

/// Where a provider lives and the secret it expects.
#[derive(Clone, Default)]
pub struct ProviderSettings {
    pub base_url: String,
    /// API key (PDF.co) or bearer token (ConvertAPI).
    pub credential: String,
}

impl ProviderSettings {
    pub fn new(base_url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credential: credential.into(),
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("credential", &redact(&self.credential))
            .finish()
    }
}

/// Knobs for operations that take a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOptions {
    /// Text stamped by the watermark operation. Default: "CONFIDENTIAL".
    pub watermark_text: String,
    /// Clockwise rotation for the rotate operation. Default: 90.
    pub rotate_degrees: u16,
    /// JPEG quality (1–100) for the compress operation. Default: 75.
    pub image_quality: u8,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            watermark_text: "CONFIDENTIAL".to_string(),
            rotate_degrees: 90,
            image_quality: 75,
        }
    }
}

/// Completion webhook target.
#[derive(Clone)]
pub struct WebhookSettings {
    pub url: String,
    /// Sent as a bearer token when present.
    pub token: Option<String>,
}

impl fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("url", &self.url)
            .field("token", &self.token.as_deref().map(redact))
            .finish()
    }
}

/// Configuration for one pipeline run.
///
/// # Example
/// ```rust
/// use pdfchain::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .pdfco("https://api.pdf.co/v1", "my-api-key")
///     .convertapi("https://v2.convertapi.com", "my-token")
///     .max_attempts(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// First-stage provider.
    pub pdfco: ProviderSettings,

    /// Second-stage provider.
    pub convertapi: ProviderSettings,

    /// Artifacts land in `<output_root>/<base name>` unless a job overrides
    /// its output directory. Default: `output`.
    pub output_root: PathBuf,

    /// Attempts per outbound request, including the first. Default: 3.
    pub max_attempts: u32,

    /// Fixed pause between attempts in milliseconds. Default: 2000.
    pub retry_delay_ms: u64,

    /// Timeout for uploads and metadata queries in seconds. Default: 30.
    pub upload_timeout_secs: u64,

    /// Timeout for conversions and downloads in seconds. Default: 60.
    pub conversion_timeout_secs: u64,

    pub operation_options: OperationOptions,

    /// Optional completion webhook.
    pub webhook: Option<WebhookSettings>,

    /// Optional observer for state changes.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pdfco: ProviderSettings::new(DEFAULT_PDFCO_URL, ""),
            convertapi: ProviderSettings::new(DEFAULT_CONVERTAPI_URL, ""),
            output_root: PathBuf::from("output"),
            max_attempts: 3,
            retry_delay_ms: 2000,
            upload_timeout_secs: 30,
            conversion_timeout_secs: 60,
            operation_options: OperationOptions::default(),
            webhook: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("pdfco", &self.pdfco)
            .field("convertapi", &self.convertapi)
            .field("output_root", &self.output_root)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("conversion_timeout_secs", &self.conversion_timeout_secs)
            .field("operation_options", &self.operation_options)
            .field("webhook", &self.webhook)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn pdfco(mut self, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.config.pdfco = ProviderSettings::new(base_url, api_key);
        self
    }

    pub fn convertapi(mut self, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        self.config.convertapi = ProviderSettings::new(base_url, token);
        self
    }

    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_root = dir.into();
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs;
        self
    }

    pub fn watermark_text(mut self, text: impl Into<String>) -> Self {
        self.config.operation_options.watermark_text = text.into();
        self
    }

    pub fn rotate_degrees(mut self, degrees: u16) -> Self {
        self.config.operation_options.rotate_degrees = degrees % 360;
        self
    }

    pub fn image_quality(mut self, quality: u8) -> Self {
        self.config.operation_options.image_quality = quality.clamp(1, 100);
        self
    }

    pub fn webhook(mut self, url: impl Into<String>, token: Option<String>) -> Self {
        self.config.webhook = Some(WebhookSettings {
            url: url.into(),
            token: token.filter(|t| !t.is_empty()),
        });
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        for (name, settings) in [("PDF.co", &c.pdfco), ("ConvertAPI", &c.convertapi)] {
            if !is_http_url(&settings.base_url) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} base URL must be http(s), got '{}'",
                    settings.base_url
                )));
            }
            if settings.credential.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} credential is not configured"
                )));
            }
        }
        if c.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.upload_timeout_secs == 0 || c.conversion_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "timeouts must be at least one second".into(),
            ));
        }
        if let Some(ref hook) = c.webhook {
            if !is_http_url(&hook.url) {
                return Err(PipelineError::InvalidConfig(format!(
                    "webhook URL must be http(s), got '{}'",
                    hook.url
                )));
            }
        }
        Ok(self.config)
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PipelineConfigBuilder {
        PipelineConfig::builder()
            .pdfco("https://api.pdf.co/v1", "key")
            .convertapi("https://v2.convertapi.com", "token")
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = builder().build().unwrap();
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.retry_delay_ms, 2000);
        assert_eq!(c.upload_timeout_secs, 30);
        assert_eq!(c.conversion_timeout_secs, 60);
        assert_eq!(c.output_root, PathBuf::from("output"));
        assert!(c.webhook.is_none());
    }

    #[test]
    fn missing_credential_is_rejected() {
        let err = PipelineConfig::builder()
            .convertapi("https://v2.convertapi.com", "token")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("PDF.co credential"), "got: {err}");
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(builder().max_attempts(0).build().is_err());
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        assert!(builder().pdfco("ftp://pdf.co", "key").build().is_err());
        assert!(builder().webhook("file:///tmp/hook", None).build().is_err());
    }

    #[test]
    fn option_setters_clamp() {
        let c = builder().rotate_degrees(450).image_quality(0).build().unwrap();
        assert_eq!(c.operation_options.rotate_degrees, 90);
        assert_eq!(c.operation_options.image_quality, 1);
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = builder().webhook("https://hooks.test", Some("s3cret".into())).build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("s3cret"));
        assert!(!dbg.contains("\"key\""));
        assert!(dbg.contains("<redacted>"));
    }
}
