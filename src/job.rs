//! Job, stage and artifact records produced by a pipeline run.
//!
//! A [`Job`] is owned by the orchestrator while it runs and handed to the
//! result store once it reaches a terminal status. A stage is appended when
//! its step begins and artifacts are appended as each download finishes, so
//! a failed job still records the operation it attempted and everything
//! produced before the failure.

use crate::error::PipelineError;
use crate::pipeline::catalog::OperationChoice;
use crate::pipeline::provider::Provider;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Semantic type of a document flowing between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Pdf,
    Image,
    Docx,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Pdf => "pdf",
            ArtifactType::Image => "image",
            ArtifactType::Docx => "docx",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ArtifactType::Pdf),
            "image" => Ok(ArtifactType::Image),
            "docx" => Ok(ArtifactType::Docx),
            other => Err(PipelineError::Validation(format!(
                "unknown artifact type '{other}'"
            ))),
        }
    }
}

/// Coarse lifecycle status, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Fine-grained position of a job in the two-stage state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Created,
    Stage1Uploading,
    Stage1Processing,
    Stage1Downloaded,
    Stage2Uploading,
    Stage2Processing,
    Stage2Downloaded,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn uploading(step: u8) -> Self {
        if step == 1 {
            PipelineState::Stage1Uploading
        } else {
            PipelineState::Stage2Uploading
        }
    }

    pub fn processing(step: u8) -> Self {
        if step == 1 {
            PipelineState::Stage1Processing
        } else {
            PipelineState::Stage2Processing
        }
    }

    pub fn downloaded(step: u8) -> Self {
        if step == 1 {
            PipelineState::Stage1Downloaded
        } else {
            PipelineState::Stage2Downloaded
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

/// A file written to disk by the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    /// Bytes actually written to `path`.
    pub size_bytes: u64,
    pub kind: ArtifactType,
}

/// One provider pass over an input artifact.
#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    /// 1 or 2.
    pub step: u8,
    pub provider: Provider,
    pub operation: OperationChoice,
    pub input_type: ArtifactType,
    pub output_type: ArtifactType,
    pub artifacts: Vec<Artifact>,
}

impl Stage {
    pub fn new(
        step: u8,
        provider: Provider,
        operation: OperationChoice,
        input_type: ArtifactType,
        output_type: ArtifactType,
    ) -> Self {
        Self {
            step,
            provider,
            operation,
            input_type,
            output_type,
            artifacts: Vec::new(),
        }
    }
}

/// The unit of work for one source document.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub source: PathBuf,
    /// File name of `source`, as recorded in the store.
    pub filename: String,
    pub output_dir: PathBuf,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: JobStatus,
    pub state: PipelineState,
    pub stages: Vec<Stage>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(source: &Path, output_dir: PathBuf) -> Self {
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        Self {
            id: Uuid::new_v4(),
            source: source.to_path_buf(),
            filename,
            output_dir,
            created_at: chrono::Utc::now(),
            status: JobStatus::Created,
            state: PipelineState::Created,
            stages: Vec::new(),
            error: None,
        }
    }

    /// Source file name without its extension; the prefix of every artifact name.
    pub fn base_name(&self) -> String {
        self.source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Human-readable list of the operations applied, e.g. `"Convert to JPG"`.
    pub fn operations_summary(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.operation.label())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn artifacts(&self) -> impl Iterator<Item = (&Stage, &Artifact)> {
        self.stages
            .iter()
            .flat_map(|stage| stage.artifacts.iter().map(move |a| (stage, a)))
    }

    pub fn artifact_count(&self) -> usize {
        self.stages.iter().map(|s| s.artifacts.len()).sum()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.artifacts().map(|(_, a)| a.size_bytes).sum()
    }

    /// Move to `Completed`, enforcing that every stage produced output.
    pub fn complete(&mut self) -> Result<(), PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::Validation(
                "job finished without running any stage".into(),
            ));
        }
        if let Some(empty) = self.stages.iter().find(|s| s.artifacts.is_empty()) {
            return Err(PipelineError::Validation(format!(
                "stage {} produced no artifacts",
                empty.step
            )));
        }
        self.status = JobStatus::Completed;
        self.state = PipelineState::Completed;
        Ok(())
    }

    /// Move to `Failed`, keeping every stage and artifact recorded so far.
    pub fn fail(&mut self, message: impl Into<String>) {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "unknown error".to_string();
        }
        self.status = JobStatus::Failed;
        self.state = PipelineState::Failed;
        self.error = Some(message);
    }
}
