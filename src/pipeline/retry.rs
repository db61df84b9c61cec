//! Bounded retry around a single outbound request.
//!
//! ## Retry Strategy
//!
//! A fixed attempt budget (default 3) with a fixed pause between attempts
//! (default 2 s). There is no backoff: the worst case for one request is
//! `attempts × (timeout + delay)` and is known up front.
//!
//! Only faults that another attempt could cure are retried: transport
//! failures (network, timeout, non-success status) and provider-reported API
//! errors. Protocol and validation errors are returned on the first attempt.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, warn};

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExecutor {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_DELAY)
    }
}

impl RetryExecutor {
    /// `attempts` is clamped to at least one.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.retry_delay_ms))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `label` names the request in log lines.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{label}: succeeded on attempt {attempt}/{}", self.attempts);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.attempts => {
                    error!("{label}: giving up after {} attempts: {e}", self.attempts);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "{label}: attempt {attempt}/{} failed: {e}; retrying in {}ms",
                        self.attempts,
                        self.delay.as_millis()
                    );
                    sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Send `request` through `transport`, retrying transport faults and
    /// non-success statuses.
    pub async fn execute(
        &self,
        transport: &dyn HttpTransport,
        request: &HttpRequest,
    ) -> Result<HttpResponse, PipelineError> {
        self.run(&request.url, move || {
            let request = request.clone();
            async move { transport.send(request).await?.error_for_status().await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{Reply, ScriptedTransport};
    use std::sync::atomic::{AtomicU32, Ordering};

    const URL: &str = "https://api.pdf.co/v1/file/upload";

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget_with_fixed_spacing() {
        let transport = ScriptedTransport::new();
        transport.route(URL, Reply::fail("connection reset"));
        let retry = RetryExecutor::new(3, Duration::from_secs(2));

        let err = retry
            .execute(&transport, &HttpRequest::post(URL, Duration::from_secs(30)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert_eq!(pair[1].at - pair[0].at, Duration::from_secs(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn budget_of_k_makes_k_calls() {
        for k in 1..=5 {
            let transport = ScriptedTransport::new();
            transport.route(URL, Reply::status(502));
            let retry = RetryExecutor::new(k, Duration::from_millis(250));
            let result = retry
                .execute(&transport, &HttpRequest::get(URL, Duration::from_secs(1)))
                .await;
            assert!(result.is_err());
            assert_eq!(transport.calls().len() as u32, k);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let transport = ScriptedTransport::new();
        transport.route(URL, Reply::fail("timed out"));
        transport.route(URL, Reply::json(serde_json::json!({"url": "https://files/x.pdf"})));
        let retry = RetryExecutor::default();

        let resp = retry
            .execute(&transport, &HttpRequest::post(URL, Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn protocol_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let retry = RetryExecutor::new(3, Duration::from_secs(60));
        let err = retry
            .run("parse", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(PipelineError::protocol("upload", "no url field")) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_attempts_is_clamped() {
        assert_eq!(RetryExecutor::new(0, Duration::ZERO).attempts(), 1);
    }
}
