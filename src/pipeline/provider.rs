//! Provider adapters: one shape over two incompatible conversion APIs.
//!
//! PDF.co authenticates with a static `x-api-key` header and reports errors
//! with `"error": true`; ConvertAPI takes a bearer token and reports errors
//! with a non-zero `"Code"`. Upload responses, result lists and request
//! payloads differ as well. [`ProviderAdapter`] absorbs all of that so the
//! orchestrator only ever sees `upload → invoke → result_urls`.

use crate::config::{OperationOptions, PipelineConfig, ProviderSettings};
use crate::error::PipelineError;
use crate::pipeline::catalog::OperationChoice;
use crate::pipeline::retry::RetryExecutor;
use crate::transport::{HttpRequest, HttpTransport};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The external conversion services the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// First stage: PDF in, PDF or images out.
    PdfCo,
    /// Second stage: follow-up operations on PDFs and images.
    ConvertApi,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::PdfCo => "pdf.co",
            Provider::ConvertApi => "convertapi",
        }
    }

    /// Response fields that may carry the remote URL of an uploaded file.
    fn upload_url_fields(&self) -> &'static [&'static str] {
        match self {
            Provider::PdfCo => &["url", "presignedUrl"],
            Provider::ConvertApi => &["Url", "FileUrl", "url"],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every endpoint either provider exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKey {
    Upload,
    DocumentInfo,
    PageCount,
    ConvertToImage,
    Optimize,
    Split,
    Merge,
    PdfToDocx,
    Watermark,
    ImageCompress,
    ImageRotate,
    ImageToPng,
}

/// Adapter for one provider, sharing a transport and retry policy.
pub struct ProviderAdapter {
    provider: Provider,
    settings: ProviderSettings,
    transport: Arc<dyn HttpTransport>,
    retry: RetryExecutor,
    upload_timeout: Duration,
    conversion_timeout: Duration,
    options: OperationOptions,
}

impl ProviderAdapter {
    pub fn new(
        provider: Provider,
        config: &PipelineConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let settings = match provider {
            Provider::PdfCo => config.pdfco.clone(),
            Provider::ConvertApi => config.convertapi.clone(),
        };
        Self {
            provider,
            settings,
            transport,
            retry: RetryExecutor::from_config(config),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            conversion_timeout: Duration::from_secs(config.conversion_timeout_secs),
            options: config.operation_options.clone(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Absolute URL for `key`, or a validation error if this provider lacks it.
    pub fn resolve_endpoint(&self, key: EndpointKey) -> Result<String, PipelineError> {
        use EndpointKey::*;
        let path = match (self.provider, key) {
            (Provider::PdfCo, Upload) => "/file/upload",
            (Provider::PdfCo, DocumentInfo) => "/pdf/info",
            (Provider::PdfCo, PageCount) => "/pdf/info/pagecount",
            (Provider::PdfCo, ConvertToImage) => "/pdf/convert/to/jpg",
            (Provider::PdfCo, Optimize) => "/pdf/optimize",
            (Provider::PdfCo, Split) => "/pdf/split",
            (Provider::ConvertApi, Upload) => "/upload",
            (Provider::ConvertApi, Merge) => "/convert/pdf/to/merge",
            (Provider::ConvertApi, PdfToDocx) => "/convert/pdf/to/docx",
            (Provider::ConvertApi, Watermark) => "/convert/pdf/to/watermark",
            (Provider::ConvertApi, ImageCompress) => "/convert/jpg/to/compress",
            (Provider::ConvertApi, ImageRotate) => "/convert/jpg/to/rotate",
            (Provider::ConvertApi, ImageToPng) => "/convert/jpg/to/png",
            (provider, key) => {
                return Err(PipelineError::Validation(format!(
                    "{provider} has no {key:?} endpoint"
                )))
            }
        };
        Ok(format!("{}{}", self.settings.base_url.trim_end_matches('/'), path))
    }

    /// The provider's authentication header as `(name, value)`.
    pub fn auth_header(&self) -> (String, String) {
        match self.provider {
            Provider::PdfCo => ("x-api-key".to_string(), self.settings.credential.clone()),
            Provider::ConvertApi => (
                "Authorization".to_string(),
                format!("Bearer {}", self.settings.credential),
            ),
        }
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        let (name, value) = self.auth_header();
        request.header(name, value)
    }

    /// Upload a local file and return the provider's URL for it.
    pub async fn upload(&self, path: &Path) -> Result<String, PipelineError> {
        let url = self.resolve_endpoint(EndpointKey::Upload)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        info!("Uploading {} ({} bytes) to {}", filename, bytes.len(), self.provider);

        let request = self
            .authorized(HttpRequest::post(url, self.upload_timeout))
            .file("file", filename, bytes);
        let body = self.send_json(request).await?;

        self.provider
            .upload_url_fields()
            .iter()
            .find_map(|field| body.get(*field).and_then(Value::as_str))
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::protocol(
                    format!("{} upload", self.provider),
                    format!(
                        "none of the fields {:?} present in response",
                        self.provider.upload_url_fields()
                    ),
                )
            })
    }

    /// POST `payload` to the endpoint for `key` and return the raw JSON answer.
    pub async fn invoke(&self, key: EndpointKey, payload: Value) -> Result<Value, PipelineError> {
        let url = self.resolve_endpoint(key)?;
        let timeout = match key {
            EndpointKey::DocumentInfo | EndpointKey::PageCount => self.upload_timeout,
            _ => self.conversion_timeout,
        };
        debug!("Invoking {:?} on {}", key, self.provider);
        let request = self.authorized(HttpRequest::post(url, timeout).json(payload));
        self.send_json(request).await
    }

    /// Page count of an uploaded document.
    ///
    /// Reads `info.PageCount` from the document-info endpoint; when that field
    /// is missing or zero, asks the dedicated page-count endpoint instead.
    pub async fn page_count(&self, file_url: &str) -> Result<u32, PipelineError> {
        let info = self
            .invoke(EndpointKey::DocumentInfo, json!({ "url": file_url, "async": false }))
            .await?;
        if let Some(n) = info
            .pointer("/info/PageCount")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
        {
            return self.fit_page_count(n);
        }

        warn!("{}: document info has no page count, using fallback query", self.provider);
        let fallback = self
            .invoke(EndpointKey::PageCount, json!({ "url": file_url }))
            .await?;
        let n = fallback
            .get("pageCount")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                PipelineError::protocol(
                    format!("{} page count", self.provider),
                    "neither info.PageCount nor pageCount present",
                )
            })?;
        self.fit_page_count(n)
    }

    fn fit_page_count(&self, n: u64) -> Result<u32, PipelineError> {
        u32::try_from(n).map_err(|_| {
            PipelineError::protocol(
                format!("{} page count", self.provider),
                format!("{n} pages is out of range"),
            )
        })
    }

    /// Request body for `choice` applied to the uploaded file at `file_url`.
    pub fn operation_payload(&self, choice: OperationChoice, file_url: &str) -> Value {
        match self.provider {
            Provider::PdfCo => {
                let mut payload = json!({ "url": file_url, "async": false });
                match choice {
                    OperationChoice::ConvertToImage => {
                        payload["outputformat"] = json!("jpg");
                        payload["pages"] = json!("0-");
                        payload["inline"] = json!(true);
                    }
                    OperationChoice::Split => {
                        payload["pages"] = json!("*");
                    }
                    _ => {}
                }
                payload
            }
            Provider::ConvertApi => {
                let mut parameters = match choice {
                    OperationChoice::Merge => {
                        vec![json!({ "Name": "Files", "FileValues": [{ "Url": file_url }] })]
                    }
                    _ => vec![json!({ "Name": "File", "FileValue": { "Url": file_url } })],
                };
                match choice {
                    OperationChoice::Watermark => parameters
                        .push(json!({ "Name": "Text", "Value": self.options.watermark_text })),
                    OperationChoice::Rotate => parameters
                        .push(json!({ "Name": "ImageRotation", "Value": self.options.rotate_degrees })),
                    OperationChoice::Compress => parameters
                        .push(json!({ "Name": "ImageQuality", "Value": self.options.image_quality })),
                    _ => {}
                }
                json!({ "Parameters": parameters })
            }
        }
    }

    /// Download URLs listed in a raw invoke result.
    pub fn result_urls(&self, raw: &Value) -> Result<Vec<String>, PipelineError> {
        let urls: Option<Vec<String>> = match self.provider {
            Provider::PdfCo => raw
                .get("urls")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                }),
            Provider::ConvertApi => raw.get("Files").and_then(Value::as_array).map(|files| {
                files
                    .iter()
                    .filter_map(|f| f.get("Url").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            }),
        };
        urls.or_else(|| {
            raw.get("url")
                .and_then(Value::as_str)
                .map(|u| vec![u.to_string()])
        })
        .ok_or_else(|| {
            PipelineError::protocol(
                format!("{} result", self.provider),
                "no download URLs in response",
            )
        })
    }

    /// GET request for a result file, carrying this provider's credentials.
    pub fn download_request(&self, url: &str) -> HttpRequest {
        self.authorized(HttpRequest::get(url, self.conversion_timeout))
    }

    /// Provider-specific failure report embedded in a 2xx body, if any.
    fn reported_failure(&self, body: &Value) -> Option<String> {
        match self.provider {
            Provider::PdfCo => {
                if body.get("error").and_then(Value::as_bool) == Some(true) {
                    Some(message_of(body, "message"))
                } else {
                    None
                }
            }
            Provider::ConvertApi => match body.get("Code").and_then(Value::as_i64) {
                Some(code) if code != 0 => Some(format!("{} (code {code})", message_of(body, "Message"))),
                _ => None,
            },
        }
    }

    /// Send with retry; non-success status, transport faults and reported
    /// API failures are all retried as one unit.
    async fn send_json(&self, request: HttpRequest) -> Result<Value, PipelineError> {
        let label = format!("{} {}", self.provider, request.url);
        let transport = self.transport.as_ref();
        let request = &request;
        self.retry
            .run(&label, move || async move {
                let response = transport.send(request.clone()).await?;
                let body = response.error_for_status().await?.json().await?;
                match self.reported_failure(&body) {
                    Some(message) => Err(PipelineError::Api {
                        provider: self.provider.name().to_string(),
                        message,
                    }),
                    None => Ok(body),
                }
            })
            .await
    }
}

fn message_of(body: &Value, field: &str) -> String {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or("no message")
        .to_string()
}
