//! Building blocks the orchestrator sequences for each stage.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ select ──▶ provider.upload ──▶ provider.invoke ──▶ download
//! (%PDF)    (catalog)   (retry)             (retry)             (8 KiB chunks)
//! ```
//!
//! 1. [`input`]    validate the source and count its pages locally
//! 2. [`select`]   ask the injected selector for an operation the
//!    [`catalog`] allows for this provider and input type
//! 3. [`provider`] upload, invoke and list result URLs, through [`retry`]
//! 4. [`download`] stream each result to `<base>_step<N>_<index>.<ext>`
//! 5. [`notify`]   optional completion webhook

pub mod catalog;
pub mod download;
pub mod input;
pub mod notify;
pub mod provider;
pub mod retry;
pub mod select;
