//! In-process fakes for exercising the pipeline without a network.
//!
//! [`ScriptedTransport`] answers requests from per-URL scripts and records
//! every call with the (tokio) instant it was made, so tests can assert both
//! what was sent and how attempts were spaced under a paused clock.

use crate::error::PipelineError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, ResponseBody};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::time::Instant;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Respond with `status` and a body split into `chunks`.
    Body { status: u16, chunks: Vec<Vec<u8>> },
    /// Fail before any response arrives.
    Fail(String),
}

impl Reply {
    pub fn json(value: serde_json::Value) -> Self {
        Self::json_status(200, value)
    }

    pub fn json_status(status: u16, value: serde_json::Value) -> Self {
        Reply::Body {
            status,
            chunks: vec![value.to_string().into_bytes()],
        }
    }

    /// 200 with `bytes` delivered in 1000-byte chunks.
    pub fn bytes(bytes: Vec<u8>) -> Self {
        Reply::Body {
            status: 200,
            chunks: bytes.chunks(1000).map(<[u8]>::to_vec).collect(),
        }
    }

    /// Empty body with the given status.
    pub fn status(status: u16) -> Self {
        Reply::Body {
            status,
            chunks: Vec::new(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Reply::Fail(reason.into())
    }
}

/// A request as the transport saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub at: Instant,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// [`HttpTransport`] that replays scripted replies keyed by exact URL.
///
/// Replies routed to the same URL are served in order; the last one repeats
/// for every further call. An unrouted URL fails like an unreachable host.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: impl Into<String>, reply: Reply) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.into())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls_to(&self, url: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.url == url)
            .collect()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let queue = routes.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PipelineError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                method: request.method,
                url: request.url.clone(),
                headers: request.headers.clone(),
                body: request.body.clone(),
                at: Instant::now(),
            });

        match self.next_reply(&request.url) {
            Some(Reply::Body { status, chunks }) => Ok(HttpResponse::new(
                status,
                request.url,
                ResponseBody::from_chunks(chunks),
            )),
            Some(Reply::Fail(reason)) => Err(PipelineError::Transport {
                url: request.url,
                reason,
            }),
            None => Err(PipelineError::Transport {
                url: request.url,
                reason: "no route to host".to_string(),
            }),
        }
    }
}

/// Bytes of a minimal PDF with `pages` page objects.
pub fn sample_pdf(pages: u32) -> Vec<u8> {
    let mut out = String::from("%PDF-1.4\n");
    out.push_str("1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", i + 3)).collect();
    out.push_str(&format!(
        "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
        kids.join(" "),
        pages
    ));
    for i in 0..pages {
        out.push_str(&format!(
            "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >> endobj\n",
            i + 3
        ));
    }
    out.push_str("trailer << /Root 1 0 R >>\n%%EOF\n");
    out.into_bytes()
}

/// Write [`sample_pdf`] to `dir/name` and return the path.
pub fn write_sample_pdf(dir: &Path, name: &str, pages: u32) -> io::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, sample_pdf(pages))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn last_reply_repeats() {
        let t = ScriptedTransport::new();
        t.route("u", Reply::status(500));
        t.route("u", Reply::json(serde_json::json!({"ok": true})));
        let req = HttpRequest::get("u", Duration::from_secs(1));
        assert_eq!(t.send(req.clone()).await.unwrap().status, 500);
        assert_eq!(t.send(req.clone()).await.unwrap().status, 200);
        assert_eq!(t.send(req).await.unwrap().status, 200);
        assert_eq!(t.calls_to("u").len(), 3);
    }

    #[tokio::test]
    async fn unrouted_url_is_transport_error() {
        let t = ScriptedTransport::new();
        let err = t
            .send(HttpRequest::get("https://nowhere", Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
    }
}
