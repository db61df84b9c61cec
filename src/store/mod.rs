//! Result store: one transaction per finished job.
//!
//! [`ResultStore::persist`] writes the job row, then one row per artifact
//! carrying its stage's step number and type, and commits once. Any failure
//! rolls the whole transaction back, so a job is either fully recorded or not
//! at all. There is no deduplication; persisting the same job twice yields
//! two rows with distinct ids.
//!
//! The database engine sits behind [`Database`] / [`DbSession`]:
//! [`memory::MemoryDatabase`] for tests and library use without a server,
//! and `postgres::PgDatabase` behind the `postgres` feature.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::error::PipelineError;
use crate::job::Job;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Row describing one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub filename: String,
    pub processed_at: DateTime<Utc>,
    pub operations_summary: String,
    pub status: String,
    pub result_path: String,
    pub error_message: Option<String>,
}

/// Row describing one downloaded artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRow {
    pub job_id: i64,
    pub step_number: u8,
    pub path: String,
    pub size_bytes: u64,
    pub artifact_type: String,
}

impl JobRow {
    pub fn from_job(job: &Job) -> Self {
        Self {
            filename: job.filename.clone(),
            processed_at: Utc::now(),
            operations_summary: job.operations_summary(),
            status: job.status.as_str().to_string(),
            result_path: job.output_dir.display().to_string(),
            error_message: job.error.clone(),
        }
    }
}

/// A database engine able to open transactional sessions.
#[async_trait]
pub trait Database: Send + Sync {
    /// Create the job and artifact tables if they do not exist.
    async fn ensure_schema(&self) -> Result<(), PipelineError>;

    /// Open a fresh connection; it is used for one transaction and closed.
    async fn connect(&self) -> Result<Box<dyn DbSession>, PipelineError>;
}

/// One open connection.
#[async_trait]
pub trait DbSession: Send {
    async fn begin(&mut self) -> Result<(), PipelineError>;

    /// Insert a job row and return its generated id.
    async fn insert_job(&mut self, row: &JobRow) -> Result<i64, PipelineError>;

    /// Insert an artifact row and return its generated id.
    async fn insert_artifact(&mut self, row: &ArtifactRow) -> Result<i64, PipelineError>;

    async fn commit(&mut self) -> Result<(), PipelineError>;

    async fn rollback(&mut self) -> Result<(), PipelineError>;

    async fn close(&mut self);
}

/// Persists finished jobs through a [`Database`].
#[derive(Clone)]
pub struct ResultStore {
    database: Arc<dyn Database>,
}

impl ResultStore {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }

    /// Ensure the schema exists.
    pub async fn init(&self) -> Result<(), PipelineError> {
        self.database.ensure_schema().await?;
        debug!("Result store schema ready");
        Ok(())
    }

    /// Write `job` and its artifacts in a single transaction and return the
    /// job row id.
    pub async fn persist(&self, job: &Job) -> Result<i64, PipelineError> {
        let mut session = self.database.connect().await.map_err(as_persistence)?;

        let result = Self::write(&mut *session, job).await;
        if let Err(ref e) = result {
            warn!("Rolling back persistence of {}: {e}", job.filename);
            if let Err(rb) = session.rollback().await {
                warn!("Rollback failed: {rb}");
            }
        }
        session.close().await;

        let id = result.map_err(as_persistence)?;
        info!(
            "Persisted job {} as row {} ({} artifacts)",
            job.filename,
            id,
            job.artifact_count()
        );
        Ok(id)
    }

    async fn write(session: &mut dyn DbSession, job: &Job) -> Result<i64, PipelineError> {
        session.begin().await?;
        let job_id = session.insert_job(&JobRow::from_job(job)).await?;
        for (stage, artifact) in job.artifacts() {
            session
                .insert_artifact(&ArtifactRow {
                    job_id,
                    step_number: stage.step,
                    path: artifact.path.display().to_string(),
                    size_bytes: artifact.size_bytes,
                    artifact_type: artifact.kind.as_str().to_string(),
                })
                .await?;
        }
        session.commit().await?;
        Ok(job_id)
    }
}

fn as_persistence(e: PipelineError) -> PipelineError {
    match e {
        PipelineError::Persistence(_) => e,
        other => PipelineError::Persistence(other.to_string()),
    }
}
