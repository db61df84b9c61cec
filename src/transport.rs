//! HTTP transport seam.
//!
//! The pipeline never talks to `reqwest` directly. Adapters build an
//! [`HttpRequest`], hand it to an [`HttpTransport`], and read the
//! [`HttpResponse`] body either whole (JSON endpoints) or as a stream of
//! chunks (artifact downloads). Requests are plain data and cheap to clone so
//! the retry executor can send the same request again.
//!
//! [`ReqwestTransport`] is the production implementation;
//! [`crate::testing::ScriptedTransport`] is the in-process fake used by tests.

use crate::error::PipelineError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Body of an outbound request.
#[derive(Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// Single-file multipart form.
    File {
        field: String,
        filename: String,
        bytes: Arc<[u8]>,
    },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Json(v) => f.debug_tuple("Json").field(v).finish(),
            RequestBody::File {
                field,
                filename,
                bytes,
            } => f
                .debug_struct("File")
                .field("field", field)
                .field("filename", filename)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// A fully described outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url, timeout)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        filename: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        self.body = RequestBody::File {
            field: field.into(),
            filename: filename.into(),
            bytes: bytes.into(),
        };
        self
    }
}

/// Streaming response body.
pub struct ResponseBody {
    chunks: BoxStream<'static, Result<Vec<u8>, PipelineError>>,
}

impl ResponseBody {
    pub fn from_stream(
        chunks: impl futures::Stream<Item = Result<Vec<u8>, PipelineError>> + Send + 'static,
    ) -> Self {
        Self {
            chunks: chunks.boxed(),
        }
    }

    pub fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self::from_stream(stream::iter(chunks.into_iter().map(Ok)))
    }

    pub fn empty() -> Self {
        Self::from_chunks(Vec::new())
    }
}

/// Status plus body of an answered request.
pub struct HttpResponse {
    pub status: u16,
    pub url: String,
    body: ResponseBody,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    pub fn new(status: u16, url: impl Into<String>, body: ResponseBody) -> Self {
        Self {
            status,
            url: url.into(),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Consume the body chunk by chunk.
    pub fn into_chunks(self) -> BoxStream<'static, Result<Vec<u8>, PipelineError>> {
        self.body.chunks
    }

    /// Collect the whole body.
    pub async fn bytes(self) -> Result<Vec<u8>, PipelineError> {
        let mut out = Vec::new();
        let mut chunks = self.body.chunks;
        while let Some(chunk) = chunks.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    /// Collect and parse the body as JSON.
    pub async fn json(self) -> Result<serde_json::Value, PipelineError> {
        let url = self.url.clone();
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::protocol(url, format!("body is not JSON: {e}")))
    }

    /// Turn a non-2xx status into a transport error carrying a body excerpt.
    pub async fn error_for_status(self) -> Result<Self, PipelineError> {
        if self.is_success() {
            return Ok(self);
        }
        let status = self.status;
        let url = self.url.clone();
        let body = self.bytes().await.unwrap_or_default();
        let excerpt: String = String::from_utf8_lossy(&body).chars().take(200).collect();
        Err(PipelineError::Transport {
            url,
            reason: if excerpt.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {}", excerpt.trim())
            },
        })
    }
}

/// The outbound HTTP collaborator.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PipelineError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pdfchain/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PipelineError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;
        debug!("{:?} {}", method, url);

        let mut builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .timeout(timeout);

        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::File {
                field,
                filename,
                bytes,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename);
                builder.multipart(reqwest::multipart::Form::new().part(field, part))
            }
        };

        let response = builder.send().await.map_err(|e| PipelineError::Transport {
            url: url.clone(),
            reason: if e.is_timeout() {
                format!("timed out after {}s", timeout.as_secs())
            } else {
                e.to_string()
            },
        })?;

        let status = response.status().as_u16();
        let stream_url = url.clone();
        let chunks = response.bytes_stream().map(move |chunk| {
            chunk
                .map(|b| b.to_vec())
                .map_err(|e| PipelineError::Transport {
                    url: stream_url.clone(),
                    reason: format!("body stream interrupted: {e}"),
                })
        });

        Ok(HttpResponse::new(status, url, ResponseBody::from_stream(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_body_parses_across_chunks() {
        let resp = HttpResponse::new(
            200,
            "https://x.test/a",
            ResponseBody::from_chunks(vec![b"{\"url\":".to_vec(), b"\"https://f\"}".to_vec()]),
        );
        let v = resp.json().await.unwrap();
        assert_eq!(v["url"], "https://f");
    }

    #[tokio::test]
    async fn invalid_json_is_a_protocol_error() {
        let resp = HttpResponse::new(200, "u", ResponseBody::from_chunks(vec![b"<html>".to_vec()]));
        let err = resp.json().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn error_for_status_keeps_excerpt() {
        let resp = HttpResponse::new(
            503,
            "https://x.test/b",
            ResponseBody::from_chunks(vec![b"service unavailable".to_vec()]),
        );
        let err = resp.error_for_status().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
        assert!(err.to_string().contains("HTTP 503: service unavailable"));
    }

    #[test]
    fn request_builder_keeps_headers_in_order() {
        let req = HttpRequest::post("https://x.test", Duration::from_secs(30))
            .header("x-api-key", "k")
            .header("accept", "application/json")
            .json(serde_json::json!({"a": 1}));
        assert_eq!(req.method, Method::Post);
        assert_eq!(
            req.headers,
            vec![
                ("x-api-key".to_string(), "k".to_string()),
                ("accept".to_string(), "application/json".to_string()),
            ]
        );
        assert!(matches!(req.body, RequestBody::Json(_)));
    }

    #[test]
    fn file_body_debug_hides_bytes() {
        let req = HttpRequest::post("u", Duration::from_secs(1)).file("file", "a.pdf", vec![1u8; 4096]);
        let dbg = format!("{:?}", req.body);
        assert!(dbg.contains("len: 4096"), "got: {dbg}");
    }
}
