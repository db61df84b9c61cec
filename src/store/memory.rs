//! In-process [`Database`] keeping committed rows in memory.
//!
//! Sessions buffer their inserts and publish them on commit, so a rolled
//! back transaction leaves no trace. Ids come from one shared counter and are
//! never reused, including ids handed out to rolled back rows.

use super::{ArtifactRow, Database, DbSession, JobRow};
use crate::error::PipelineError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    schema_ready: bool,
    next_id: i64,
    jobs: Vec<(i64, JobRow)>,
    artifacts: Vec<(i64, ArtifactRow)>,
    fail_artifact_inserts: bool,
    sessions_opened: usize,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Cloning shares the same underlying rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Committed job rows with their ids.
    pub fn jobs(&self) -> Vec<(i64, JobRow)> {
        self.lock().jobs.clone()
    }

    /// Committed artifact rows with their ids.
    pub fn artifacts(&self) -> Vec<(i64, ArtifactRow)> {
        self.lock().artifacts.clone()
    }

    /// Make every artifact insert fail, to exercise rollback.
    pub fn fail_artifact_inserts(&self, fail: bool) {
        self.lock().fail_artifact_inserts = fail;
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub fn schema_ready(&self) -> bool {
        self.lock().schema_ready
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn ensure_schema(&self) -> Result<(), PipelineError> {
        self.lock().schema_ready = true;
        Ok(())
    }

    async fn connect(&self) -> Result<Box<dyn DbSession>, PipelineError> {
        let mut state = self.lock();
        state.sessions_opened += 1;
        state.schema_ready = true;
        Ok(Box::new(MemorySession {
            db: self.clone(),
            in_transaction: false,
            closed: false,
            jobs: Vec::new(),
            artifacts: Vec::new(),
        }))
    }
}

struct MemorySession {
    db: MemoryDatabase,
    in_transaction: bool,
    closed: bool,
    jobs: Vec<(i64, JobRow)>,
    artifacts: Vec<(i64, ArtifactRow)>,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::Persistence("session is closed".into()));
        }
        if !self.in_transaction {
            return Err(PipelineError::Persistence("no transaction in progress".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DbSession for MemorySession {
    async fn begin(&mut self) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::Persistence("session is closed".into()));
        }
        self.in_transaction = true;
        Ok(())
    }

    async fn insert_job(&mut self, row: &JobRow) -> Result<i64, PipelineError> {
        self.ensure_open()?;
        let id = self.db.lock().allocate_id();
        self.jobs.push((id, row.clone()));
        Ok(id)
    }

    async fn insert_artifact(&mut self, row: &ArtifactRow) -> Result<i64, PipelineError> {
        self.ensure_open()?;
        if !self.jobs.iter().any(|(id, _)| *id == row.job_id) {
            return Err(PipelineError::Persistence(format!(
                "artifact references unknown job {}",
                row.job_id
            )));
        }
        let mut state = self.db.lock();
        if state.fail_artifact_inserts {
            return Err(PipelineError::Persistence("artifact insert rejected".into()));
        }
        let id = state.allocate_id();
        drop(state);
        self.artifacts.push((id, row.clone()));
        Ok(id)
    }

    async fn commit(&mut self) -> Result<(), PipelineError> {
        self.ensure_open()?;
        let mut state = self.db.lock();
        state.jobs.append(&mut self.jobs);
        state.artifacts.append(&mut self.artifacts);
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), PipelineError> {
        self.jobs.clear();
        self.artifacts.clear();
        self.in_transaction = false;
        Ok(())
    }

    async fn close(&mut self) {
        self.jobs.clear();
        self.artifacts.clear();
        self.closed = true;
    }
}
