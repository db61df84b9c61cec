//! Progress-callback trait for job state changes.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe a
//! run as it moves through the state machine. The CLI uses it to drive a
//! spinner; tests use it to assert the exact sequence of states.
//!
//! # Example
//!
//! ```rust
//! use pdfchain::{JobProgressCallback, PipelineState};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct Trail(Mutex<Vec<PipelineState>>);
//!
//! impl JobProgressCallback for Trail {
//!     fn on_state_change(&self, _job: uuid::Uuid, _from: PipelineState, to: PipelineState) {
//!         self.0.lock().unwrap().push(to);
//!     }
//! }
//! ```

use crate::job::{Artifact, Job, PipelineState};
use std::sync::Arc;
use uuid::Uuid;

/// Called by the orchestrator as a job advances.
///
/// All methods default to no-ops so implementations only override what they
/// care about. Calls arrive sequentially from the task running the job.
pub trait JobProgressCallback: Send + Sync {
    /// The job moved from `from` to `to`.
    fn on_state_change(&self, job_id: Uuid, from: PipelineState, to: PipelineState) {
        let _ = (job_id, from, to);
    }

    /// An artifact of stage `step` finished downloading.
    fn on_artifact_saved(&self, step: u8, artifact: &Artifact) {
        let _ = (step, artifact);
    }

    /// The job reached a terminal status; called before persistence.
    fn on_job_finished(&self, job: &Job) {
        let _ = job;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ArtifactType;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<PipelineState>>,
        artifacts: AtomicUsize,
    }

    impl JobProgressCallback for Recorder {
        fn on_state_change(&self, _job_id: Uuid, _from: PipelineState, to: PipelineState) {
            self.states.lock().unwrap().push(to);
        }

        fn on_artifact_saved(&self, _step: u8, _artifact: &Artifact) {
            self.artifacts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let job = Job::new(Path::new("a.pdf"), PathBuf::from("out"));
        cb.on_state_change(job.id, PipelineState::Created, PipelineState::Stage1Uploading);
        cb.on_job_finished(&job);
    }

    #[test]
    fn recorder_sees_events_through_arc_dyn() {
        let recorder = Arc::new(Recorder::default());
        let cb: ProgressCallback = recorder.clone();
        let id = Uuid::new_v4();
        cb.on_state_change(id, PipelineState::Created, PipelineState::Stage1Uploading);
        cb.on_state_change(id, PipelineState::Stage1Uploading, PipelineState::Failed);
        cb.on_artifact_saved(
            1,
            &Artifact {
                path: PathBuf::from("out/a_step1_1.jpg"),
                size_bytes: 1,
                kind: ArtifactType::Image,
            },
        );
        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec![PipelineState::Stage1Uploading, PipelineState::Failed]
        );
        assert_eq!(recorder.artifacts.load(Ordering::SeqCst), 1);
    }
}
