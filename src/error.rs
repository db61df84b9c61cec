//! Error types for the pdfchain library.
//!
//! Every failure in the pipeline is a [`PipelineError`]. The variants follow
//! the fault taxonomy the orchestrator reasons about:
//!
//! * **Transport / Api**: the remote side or the network misbehaved. These
//!   are the only kinds the [`crate::pipeline::retry::RetryExecutor`]
//!   retries.
//! * **Protocol / Validation**: the response was malformed or a precondition
//!   does not hold. Retrying cannot help, so they fail on first sight.
//! * **Persistence / Io**: local side effects (database, disk) failed.
//!
//! Errors raised while a stage is running are wrapped in
//! [`PipelineError::Stage`] so the job's error message says which step and
//! phase broke, while [`PipelineError::kind`] still reports the root cause.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdfchain library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Remote errors ─────────────────────────────────────────────────────
    /// Network failure, timeout, or a non-success HTTP status.
    #[error("transport error for '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// The provider answered but reported a failure in its payload.
    #[error("{provider} API error: {message}")]
    Api { provider: String, message: String },

    /// A response did not carry a field the pipeline depends on.
    #[error("unexpected response from {context}: {detail}")]
    Protocol { context: String, detail: String },

    // ── Local errors ──────────────────────────────────────────────────────
    /// A precondition for the requested operation does not hold.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The store transaction failed and was rolled back.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Reading the source or writing an artifact failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operation selector declined to choose.
    #[error("operation selection cancelled for step {step}")]
    UserCancelled { step: u8 },

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Context ───────────────────────────────────────────────────────────
    /// A failure inside a running stage, tagged with where it happened.
    #[error("stage {step} {phase} failed: {source}")]
    Stage {
        step: u8,
        phase: StagePhase,
        #[source]
        source: Box<PipelineError>,
    },
}

/// Flat classification of a [`PipelineError`], ignoring stage context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Transport,
    Api,
    Protocol,
    Validation,
    Persistence,
    Io,
    Cancelled,
    Config,
}

/// The part of a stage in which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StagePhase {
    Selection,
    Upload,
    Processing,
    Download,
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StagePhase::Selection => "selection",
            StagePhase::Upload => "upload",
            StagePhase::Processing => "processing",
            StagePhase::Download => "download",
        };
        f.write_str(name)
    }
}

impl PipelineError {
    /// Root-cause classification, looking through [`PipelineError::Stage`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Transport { .. } => ErrorKind::Transport,
            PipelineError::Api { .. } => ErrorKind::Api,
            PipelineError::Protocol { .. } => ErrorKind::Protocol,
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Persistence(_) => ErrorKind::Persistence,
            PipelineError::Io { .. } => ErrorKind::Io,
            PipelineError::UserCancelled { .. } => ErrorKind::Cancelled,
            PipelineError::InvalidConfig(_) => ErrorKind::Config,
            PipelineError::Stage { source, .. } => source.kind(),
        }
    }

    /// Whether another attempt at the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Api)
    }

    /// Attach step/phase context to an error raised inside a stage.
    pub fn during(self, step: u8, phase: StagePhase) -> Self {
        PipelineError::Stage {
            step,
            phase,
            source: Box::new(self),
        }
    }

    pub(crate) fn protocol(context: impl Into<String>, detail: impl Into<String>) -> Self {
        PipelineError::Protocol {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display_names_step_and_phase() {
        let e = PipelineError::Transport {
            url: "https://api.pdf.co/v1/file/upload".into(),
            reason: "connection refused".into(),
        }
        .during(1, StagePhase::Upload);
        let msg = e.to_string();
        assert!(msg.starts_with("stage 1 upload failed"), "got: {msg}");
        assert!(msg.contains("connection refused"), "got: {msg}");
    }

    #[test]
    fn kind_looks_through_stage_wrapper() {
        let e = PipelineError::Validation("too few pages".into()).during(2, StagePhase::Processing);
        assert_eq!(e.kind(), ErrorKind::Validation);
        assert!(!e.is_retryable());
    }

    #[test]
    fn only_remote_faults_are_retryable() {
        let transport = PipelineError::Transport {
            url: "u".into(),
            reason: "timeout".into(),
        };
        let api = PipelineError::Api {
            provider: "pdf.co".into(),
            message: "quota".into(),
        };
        assert!(transport.is_retryable());
        assert!(api.is_retryable());
        assert!(!PipelineError::protocol("upload", "no url").is_retryable());
        assert!(!PipelineError::Persistence("deadlock".into()).is_retryable());
        assert!(!PipelineError::UserCancelled { step: 1 }.is_retryable());
    }

    #[test]
    fn api_display_names_provider() {
        let e = PipelineError::Api {
            provider: "convertapi".into(),
            message: "Parameter validation error".into(),
        };
        assert_eq!(
            e.to_string(),
            "convertapi API error: Parameter validation error"
        );
    }
}
