//! The two-stage job orchestrator.
//!
//! ```text
//! Created ─▶ Stage1Uploading ─▶ Stage1Processing ─▶ Stage1Downloaded ─┐
//!                                                                       │
//!   ┌── (second stage requested) ───────────────────────────────────────┤
//!   ▼                                                                   ▼
//! Stage2Uploading ─▶ Stage2Processing ─▶ Stage2Downloaded ─────────▶ Completed
//!
//! any state ─▶ Failed
//! ```
//!
//! Preflight runs before a [`Job`] exists: an invalid source, a declined
//! selection, or a split of a document known to have one page is returned as
//! an error and nothing is uploaded or persisted. Once a job exists,
//! [`Orchestrator::run`] always returns it, `Completed` or `Failed`, after a
//! best-effort write to the result store.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, StagePhase};
use crate::job::{Artifact, ArtifactType, Job, JobStatus, PipelineState, Stage};
use crate::pipeline::catalog::{self, OperationChoice};
use crate::pipeline::download::{artifact_path, ArtifactDownloader};
use crate::pipeline::input;
use crate::pipeline::notify::Notifier;
use crate::pipeline::provider::{Provider, ProviderAdapter};
use crate::pipeline::retry::RetryExecutor;
use crate::pipeline::select::{OperationSelector, SelectionRequest};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::store::{Database, ResultStore};
use crate::transport::HttpTransport;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What to run.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub source: PathBuf,
    /// Defaults to `<output_root>/<base name>`.
    pub output_dir: Option<PathBuf>,
    /// Run the ConvertAPI stage on the first stage-1 artifact.
    pub second_stage: bool,
}

impl JobRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_dir: None,
            second_stage: false,
        }
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn second_stage(mut self, enabled: bool) -> Self {
        self.second_stage = enabled;
        self
    }
}

/// A finished job plus what happened around it.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job: Job,
    /// Row id in the result store; `None` when persistence failed.
    pub record_id: Option<i64>,
    /// Whether the completion webhook accepted the notice, if one is configured.
    pub notified: Option<bool>,
    pub elapsed_ms: u64,
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        self.job.status == JobStatus::Completed
    }

    pub fn artifact_count(&self) -> usize {
        self.job.artifact_count()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.job.total_size_bytes()
    }
}

pub struct Orchestrator {
    output_root: PathBuf,
    pdfco: ProviderAdapter,
    convertapi: ProviderAdapter,
    downloader: ArtifactDownloader,
    store: ResultStore,
    selector: Arc<dyn OperationSelector>,
    notifier: Option<Notifier>,
    callback: ProgressCallback,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        transport: Arc<dyn HttpTransport>,
        database: Arc<dyn Database>,
        selector: Arc<dyn OperationSelector>,
    ) -> Self {
        let callback = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        let notifier = config
            .webhook
            .clone()
            .map(|hook| Notifier::new(hook, transport.clone()));
        Self {
            output_root: config.output_root.clone(),
            pdfco: ProviderAdapter::new(Provider::PdfCo, &config, transport.clone()),
            convertapi: ProviderAdapter::new(Provider::ConvertApi, &config, transport.clone()),
            downloader: ArtifactDownloader::new(transport, RetryExecutor::from_config(&config)),
            store: ResultStore::new(database),
            selector,
            notifier,
            callback,
        }
    }

    /// Create the result tables if they are missing.
    pub async fn init_store(&self) -> Result<(), PipelineError> {
        self.store.init().await
    }

    /// Run one job to a terminal state.
    ///
    /// # Errors
    /// Only preflight failures are returned as `Err`: a missing or non-PDF
    /// source, a cancelled or invalid stage-1 selection, or a split of a
    /// document with fewer than two pages. Failures after the job exists are
    /// reported through `JobOutcome::job`.
    pub async fn run(&self, request: &JobRequest) -> Result<JobOutcome, PipelineError> {
        let start = Instant::now();

        // ── Preflight ────────────────────────────────────────────────────────
        let source = input::resolve_source(&request.source).await?;
        let first = self
            .select(1, Provider::PdfCo, ArtifactType::Pdf)
            .map_err(|e| e.during(1, StagePhase::Selection))?;
        if first == OperationChoice::Split {
            match source.page_count {
                Some(pages) => catalog::ensure_splittable(pages)?,
                None => debug!("Local page count unknown; deferring split check"),
            }
        }

        // ── Job ──────────────────────────────────────────────────────────────
        let mut job = Job::new(&source.path, PathBuf::new());
        job.output_dir = request
            .output_dir
            .clone()
            .unwrap_or_else(|| self.output_root.join(job.base_name()));
        info!(
            "Job {} started for {} ({} bytes, stage 1: {}, second stage: {})",
            job.id, job.filename, source.size_bytes, first, request.second_stage
        );

        let result = self.execute(&mut job, first, request.second_stage).await;
        self.finish(&mut job, result);
        self.callback.on_job_finished(&job);

        // ── Side effects ─────────────────────────────────────────────────────
        let notified = match (&self.notifier, job.status) {
            (Some(notifier), JobStatus::Completed) => Some(notifier.notify(&job).await),
            _ => None,
        };

        let record_id = match self.store.persist(&job).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Job {} could not be persisted: {e}", job.id);
                None
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            "Job {} {} in {}ms: {} artifacts, {} bytes",
            job.id,
            job.status.as_str(),
            elapsed_ms,
            job.artifact_count(),
            job.total_size_bytes()
        );

        Ok(JobOutcome {
            job,
            record_id,
            notified,
            elapsed_ms,
        })
    }

    async fn execute(
        &self,
        job: &mut Job,
        first: OperationChoice,
        second_stage: bool,
    ) -> Result<(), PipelineError> {
        // ── Stage 1 ──────────────────────────────────────────────────────────
        let source = job.source.clone();
        let output = self
            .run_stage(job, 1, &self.pdfco, first, ArtifactType::Pdf, &source)
            .await?;

        if !second_stage {
            return Ok(());
        }

        // ── Stage 2 ──────────────────────────────────────────────────────────
        let forwarded = job
            .stages
            .first()
            .and_then(|s| s.artifacts.first())
            .map(|a| a.path.clone())
            .ok_or_else(|| {
                PipelineError::Validation("stage 1 left nothing to forward".into())
                    .during(2, StagePhase::Selection)
            })?;
        let second = self
            .select(2, Provider::ConvertApi, output)
            .map_err(|e| e.during(2, StagePhase::Selection))?;
        self.run_stage(job, 2, &self.convertapi, second, output, &forwarded)
            .await?;
        Ok(())
    }

    /// Upload, process and download one stage. Returns its output type.
    async fn run_stage(
        &self,
        job: &mut Job,
        step: u8,
        adapter: &ProviderAdapter,
        choice: OperationChoice,
        input_type: ArtifactType,
        input_path: &Path,
    ) -> Result<ArtifactType, PipelineError> {
        let provider = adapter.provider();
        let entry = catalog::resolve(provider, input_type, choice)
            .map_err(|e| e.during(step, StagePhase::Selection))?;

        job.stages
            .push(Stage::new(step, provider, choice, input_type, entry.output));

        // ── Upload ───────────────────────────────────────────────────────────
        self.advance(job, PipelineState::uploading(step));
        let file_url = adapter
            .upload(input_path)
            .await
            .map_err(|e| e.during(step, StagePhase::Upload))?;
        debug!("Stage {step}: uploaded as {file_url}");

        // ── Processing ───────────────────────────────────────────────────────
        self.advance(job, PipelineState::processing(step));
        let processing = |e: PipelineError| e.during(step, StagePhase::Processing);
        if provider == Provider::PdfCo {
            let pages = adapter.page_count(&file_url).await.map_err(processing)?;
            info!("Stage {step}: document has {pages} pages");
            if choice == OperationChoice::Split {
                catalog::ensure_splittable(pages).map_err(processing)?;
            }
        }
        let payload = adapter.operation_payload(choice, &file_url);
        let raw = adapter.invoke(entry.endpoint, payload).await.map_err(processing)?;
        let urls = adapter.result_urls(&raw).map_err(processing)?;
        if urls.is_empty() {
            return Err(processing(PipelineError::protocol(
                format!("{provider} result"),
                "empty list of result files",
            )));
        }
        info!("Stage {step}: {} produced {} result file(s)", choice.label(), urls.len());

        // ── Download ─────────────────────────────────────────────────────────
        let base = job.base_name();
        for (i, url) in urls.iter().enumerate() {
            let dest = artifact_path(&job.output_dir, &base, step, i + 1, entry.output);
            let size_bytes = self
                .downloader
                .download(&adapter.download_request(url), &dest)
                .await
                .map_err(|e| e.during(step, StagePhase::Download))?;
            let artifact = Artifact {
                path: dest,
                size_bytes,
                kind: entry.output,
            };
            self.callback.on_artifact_saved(step, &artifact);
            if let Some(stage) = job.stages.last_mut() {
                stage.artifacts.push(artifact);
            }
        }
        self.advance(job, PipelineState::downloaded(step));

        Ok(entry.output)
    }

    fn select(
        &self,
        step: u8,
        provider: Provider,
        input: ArtifactType,
    ) -> Result<OperationChoice, PipelineError> {
        let offered = catalog::choices(provider, input);
        if offered.is_empty() {
            return Err(PipelineError::Validation(format!(
                "{provider} offers no operations for {input} input"
            )));
        }
        self.selector.select(&SelectionRequest {
            step,
            provider,
            input,
            choices: offered,
        })
    }

    fn advance(&self, job: &mut Job, to: PipelineState) {
        let from = job.state;
        job.state = to;
        job.status = JobStatus::Running;
        debug!("Job {}: {:?} -> {:?}", job.id, from, to);
        self.callback.on_state_change(job.id, from, to);
    }

    fn finish(&self, job: &mut Job, result: Result<(), PipelineError>) {
        let from = job.state;
        if let Err(e) = result.and_then(|()| job.complete()) {
            warn!("Job {} failed: {e}", job.id);
            job.fail(e.to_string());
        }
        debug!("Job {}: {:?} -> {:?}", job.id, from, job.state);
        self.callback.on_state_change(job.id, from, job.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::select::PresetSelector;
    use crate::store::memory::MemoryDatabase;
    use crate::testing::{write_sample_pdf, Reply, ScriptedTransport};
    use serde_json::json;

    fn orchestrator(
        transport: Arc<ScriptedTransport>,
        db: MemoryDatabase,
        first: Option<OperationChoice>,
        root: &Path,
    ) -> Orchestrator {
        let config = PipelineConfig::builder()
            .pdfco("https://pdf.test/v1", "key")
            .convertapi("https://convert.test", "token")
            .output_root(root)
            .retry_delay_ms(0)
            .build()
            .unwrap();
        Orchestrator::new(
            config,
            transport,
            Arc::new(db),
            Arc::new(PresetSelector::new(first, None)),
        )
    }

    #[tokio::test]
    async fn cancelled_selection_creates_no_job() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_sample_pdf(dir.path(), "a.pdf", 2).unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let db = MemoryDatabase::new();
        let o = orchestrator(transport.clone(), db.clone(), None, dir.path());

        let err = o.run(&JobRequest::new(&src)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(transport.calls().is_empty());
        assert!(db.jobs().is_empty());
    }

    #[tokio::test]
    async fn empty_result_list_fails_processing() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_sample_pdf(dir.path(), "a.pdf", 2).unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            "https://pdf.test/v1/file/upload",
            Reply::json(json!({ "url": "https://files.test/a.pdf" })),
        );
        transport.route(
            "https://pdf.test/v1/pdf/info",
            Reply::json(json!({ "info": { "PageCount": 2 } })),
        );
        transport.route("https://pdf.test/v1/pdf/optimize", Reply::json(json!({ "urls": [] })));
        let db = MemoryDatabase::new();
        let o = orchestrator(transport, db.clone(), Some(OperationChoice::Optimize), dir.path());

        let outcome = o.run(&JobRequest::new(&src)).await.unwrap();
        assert_eq!(outcome.job.status, JobStatus::Failed);
        assert_eq!(outcome.job.stages.len(), 1);
        assert_eq!(outcome.job.artifact_count(), 0);
        let message = outcome.job.error.unwrap();
        assert!(message.starts_with("stage 1 processing failed"), "got: {message}");
        let jobs = db.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].1.operations_summary, "Optimize PDF");
    }

    #[tokio::test]
    async fn remote_page_count_guards_split() {
        let dir = tempfile::tempdir().unwrap();
        // No page objects or /Count visible locally.
        let src = dir.path().join("opaque.pdf");
        std::fs::write(&src, b"%PDF-1.7\n%%EOF\n").unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            "https://pdf.test/v1/file/upload",
            Reply::json(json!({ "url": "https://files.test/opaque.pdf" })),
        );
        transport.route(
            "https://pdf.test/v1/pdf/info",
            Reply::json(json!({ "info": { "PageCount": 1 } })),
        );
        let db = MemoryDatabase::new();
        let o = orchestrator(transport.clone(), db, Some(OperationChoice::Split), dir.path());

        let outcome = o.run(&JobRequest::new(&src)).await.unwrap();
        assert_eq!(outcome.job.status, JobStatus::Failed);
        assert!(transport.calls_to("https://pdf.test/v1/pdf/split").is_empty());
        assert!(outcome
            .job
            .error
            .unwrap()
            .starts_with("stage 1 processing failed: validation failed"));
    }
}
