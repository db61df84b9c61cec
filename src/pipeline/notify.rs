//! Completion webhook.
//!
//! After a job completes, a summary is POSTed to an optional external
//! endpoint. Delivery is best effort: one attempt, and a failure is logged
//! without touching the job's status.

use crate::config::WebhookSettings;
use crate::error::PipelineError;
use crate::job::Job;
use crate::transport::{HttpRequest, HttpTransport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Body sent to the webhook.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionNotice {
    pub original_file: String,
    pub converted_files: Vec<String>,
    pub status: String,
    pub timestamp: String,
}

impl CompletionNotice {
    pub fn from_job(job: &Job) -> Self {
        Self {
            original_file: job.filename.clone(),
            converted_files: job
                .artifacts()
                .map(|(_, a)| a.path.display().to_string())
                .collect(),
            status: job.status.as_str().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub struct Notifier {
    settings: WebhookSettings,
    transport: Arc<dyn HttpTransport>,
}

impl Notifier {
    pub fn new(settings: WebhookSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self { settings, transport }
    }

    /// Deliver the notice for `job`. Returns whether the endpoint accepted it.
    pub async fn notify(&self, job: &Job) -> bool {
        match self.try_notify(job).await {
            Ok(()) => {
                info!("Webhook accepted completion of {}", job.filename);
                true
            }
            Err(e) => {
                warn!("Webhook delivery failed: {e}");
                false
            }
        }
    }

    async fn try_notify(&self, job: &Job) -> Result<(), PipelineError> {
        let body = serde_json::to_value(CompletionNotice::from_job(job))
            .map_err(|e| PipelineError::protocol("webhook", e.to_string()))?;
        let mut request = HttpRequest::post(&self.settings.url, WEBHOOK_TIMEOUT).json(body);
        if let Some(ref token) = self.settings.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        self.transport.send(request).await?.error_for_status().await?;
        Ok(())
    }
}
