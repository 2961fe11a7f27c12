//! 🎬 *[two configs walk into a struct. one limits chunk size. one limits request size.]*
//! *["We belong together," they said. "In the backends module." The module system nodded.]*
//!
//! 📦 **Common Backend Configs**: the shared DNA of source and sink configuration.
//!
//! 🧠 Knowledge graph:
//! - `CommonSourceConfig`: embedded in `FileSourceConfig`. How big a chunk do we pull?
//!   Rows and bytes, whichever ceiling is hit first.
//! - `CommonSinkConfig`: embedded in `IngestConfig`. How big a `_bulk` body do we push?
//! - Both are re-exported from `backends.rs` so callers can `use crate::backends::CommonSinkConfig`.
//!
//! "He who sends a 2GB bulk request, receives a 413 and a lesson." 🦆

use serde::Deserialize;

// ============================================================
// 📦 CommonSourceConfig: shared source-side knobs
// ============================================================

/// 📦 How large a chunk the source hands downstream per `next_page()` call.
///
/// `chunk_size` is counted in data rows (the header does not count). Fifty thousand is
/// what the loader has always used: big enough to keep the cluster busy, small enough
/// that a laptop running Docker does not start swapping and crying.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommonSourceConfig {
    /// 📄 Max data rows per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// 📦 Max bytes per chunk, for files with suspiciously long rows
    #[serde(default = "default_max_batch_size_bytes")]
    pub max_batch_size_bytes: usize,
}

fn default_chunk_size() -> usize {
    50_000
}

// 📦 64MiB. A chunk of 50k offer rows is usually ~10MiB, so this only bites on weird files.
fn default_max_batch_size_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for CommonSourceConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_batch_size_bytes: default_max_batch_size_bytes(),
        }
    }
}

// ============================================================
// 🚰 CommonSinkConfig: shared sink-side knobs
// ============================================================

/// 🚰 Upper bound for one `_bulk` request body.
///
/// The composer splits a chunk into several requests when its NDJSON would cross this line.
/// Elasticsearch refuses bodies above `http.max_content_length` (100MB by default),
/// so the default stays well under it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommonSinkConfig {
    /// 🚰 Max payload bytes per sink request
    #[serde(default = "default_max_request_size_bytes")]
    pub max_request_size_bytes: usize,
}

// 🚰 32MiB: comfortably below the cluster's 100MB ceiling.
fn default_max_request_size_bytes() -> usize {
    32 * 1024 * 1024
}

impl Default for CommonSinkConfig {
    fn default() -> Self {
        Self {
            max_request_size_bytes: default_max_request_size_bytes(),
        }
    }
}
