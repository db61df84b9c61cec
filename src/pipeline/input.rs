//! Source resolution: validate the local document before any network call.
//!
//! The split operation needs at least two pages, and a split request on a
//! one-page document should be refused before anything is uploaded. This
//! module reads the source once, checks the `%PDF` magic bytes, and counts
//! pages straight from the file:
//!
//! 1. count page objects (`/Type /Page`, not `/Pages`);
//! 2. if none are visible (object streams hide them), fall back to the
//!    largest `/Count` in the page tree.
//!
//! When neither yields a number the count is unknown and the decision is
//! left to the provider's metadata query after upload.

use crate::error::PipelineError;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

static RE_PAGE_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Type\s*/Page\b").expect("valid page-object regex"));

static RE_PAGE_TREE_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Count\s+(\d+)").expect("valid page-count regex"));

/// A validated source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Pages found locally; `None` when the file does not expose them.
    pub page_count: Option<u32>,
}

/// Validate `path` as a readable PDF and inspect its page count.
pub async fn resolve_source(path: &Path) -> Result<SourceDocument, PipelineError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::Validation(format!(
                "source file not found: '{}'",
                path.display()
            )))
        }
        Err(e) => return Err(PipelineError::io(path, e)),
    };

    if !bytes.starts_with(b"%PDF") {
        let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
        return Err(PipelineError::Validation(format!(
            "'{}' is not a PDF document (first bytes: {:?})",
            path.display(),
            magic
        )));
    }

    let page_count = count_pages(&bytes);
    debug!(
        "Resolved source {} ({} bytes, pages: {:?})",
        path.display(),
        bytes.len(),
        page_count
    );

    Ok(SourceDocument {
        path: path.to_path_buf(),
        size_bytes: bytes.len() as u64,
        page_count,
    })
}

/// Count pages in raw PDF bytes; `None` when undeterminable.
pub fn count_pages(bytes: &[u8]) -> Option<u32> {
    let objects = RE_PAGE_OBJECT.find_iter(bytes).count() as u32;
    if objects > 0 {
        return Some(objects);
    }
    RE_PAGE_TREE_COUNT
        .captures_iter(bytes)
        .filter_map(|caps| std::str::from_utf8(&caps[1]).ok()?.parse::<u32>().ok())
        .max()
        .filter(|n| *n > 0)
}
