//! # pdfchain
//!
//! Run a source PDF through up to two hosted conversion services in sequence,
//! keep every result file on disk, and record the job in a database.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 0. Preflight  %PDF magic, local page count, stage-1 selection
//!  ├─ 1. Stage 1    PDF.co: upload → page count → operation → download
//!  ├─ 2. Stage 2    ConvertAPI on the first stage-1 artifact (optional)
//!  ├─ 3. Notify     completion webhook (optional, best effort)
//!  └─ 4. Persist    job + artifact rows in one transaction
//! ```
//!
//! Every outbound request goes through an [`HttpTransport`] and is retried a
//! bounded number of times with a fixed pause. Only transport faults and
//! provider-reported failures are retried.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfchain::{
//!     JobRequest, MemoryDatabase, OperationChoice, Orchestrator, PipelineConfig,
//!     PresetSelector, ReqwestTransport,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .pdfco("https://api.pdf.co/v1", std::env::var("PDFCO_API_KEY")?)
//!         .convertapi("https://v2.convertapi.com", std::env::var("CONVERTAPI_TOKEN")?)
//!         .build()?;
//!     let orchestrator = Orchestrator::new(
//!         config,
//!         Arc::new(ReqwestTransport::new()?),
//!         Arc::new(MemoryDatabase::new()),
//!         Arc::new(PresetSelector::new(
//!             Some(OperationChoice::ConvertToImage),
//!             Some(OperationChoice::ConvertToPng),
//!         )),
//!     );
//!     let outcome = orchestrator
//!         .run(&JobRequest::new("report.pdf").second_stage(true))
//!         .await?;
//!     println!("{}: {} artifacts", outcome.job.status.as_str(), outcome.artifact_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `cli`      | on      | Enables the `pdfchain` binary (clap + anyhow + tracing-subscriber) |
//! | `postgres` | off     | PostgreSQL result store via `sqlx` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod store;
#[doc(hidden)]
pub mod testing;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OperationOptions, PipelineConfig, PipelineConfigBuilder, ProviderSettings, WebhookSettings};
pub use convert::{JobOutcome, JobRequest, Orchestrator};
pub use error::{ErrorKind, PipelineError, StagePhase};
pub use job::{Artifact, ArtifactType, Job, JobStatus, PipelineState, Stage};
pub use pipeline::catalog::OperationChoice;
pub use pipeline::provider::Provider;
pub use pipeline::select::{OperationSelector, PresetSelector, SelectionRequest};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::memory::MemoryDatabase;
#[cfg(feature = "postgres")]
pub use store::postgres::PgDatabase;
pub use store::{Database, ResultStore};
pub use transport::{HttpTransport, ReqwestTransport};
