//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Source backends pour raw CSV pages, Sink backends swallow rendered `_bulk` bodies.
//! Everything in between (parsing, normalizing, composing) is somebody else's problem,
//! and that somebody lives in `transforms` and `composers`.
//!
//! 🎭 This module is the casting agency:
//! - `FileSource`: the offer CSV on disk, one page at a time.
//! - `InMemorySource` / `InMemorySink`: RAM-only stand-ins for tests.
//! - `ElasticsearchSink`: the real destination, with a retry loop and a stubborn streak.
//! - `hotels_file`: not a source at all. It loads the hotel reference table in one gulp,
//!   because you cannot join against a table you are still reading.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use anyhow::Result;
use async_trait::async_trait;

use crate::store::BulkReport;

pub(crate) mod common_config;
pub(crate) mod elasticsearch;
pub(crate) mod file_source;
pub(crate) mod hotels_file;
pub(crate) mod in_mem;

// 🎯 Re-export configs so callers can write `backends::FileSourceConfig` and move on with their lives.
pub use common_config::{CommonSinkConfig, CommonSourceConfig};
pub use elasticsearch::{ElasticsearchClient, ElasticsearchConfig};
pub use file_source::FileSourceConfig;

// ===== Source Trait and Backend Enum =====

/// 🚰 A source that produces pages of raw CSV lines.
///
/// # Contract
/// - `next_page` returns `Some(page)` while data flows: data lines joined by `\n`, no header.
/// - `None` means the well is dry. Calling again keeps returning `None`.
/// - Sources do not parse. A page is text, and text is all it is.
#[async_trait]
pub(crate) trait Source: std::fmt::Debug + Send {
    async fn next_page(&mut self) -> Result<Option<String>>;
}

/// 🎭 The many faces of a Source. The supervisor never needs to know which one it got.
#[derive(Debug)]
pub(crate) enum SourceBackend {
    File(file_source::FileSource),
    InMemory(in_mem::InMemorySource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn next_page(&mut self) -> Result<Option<String>> {
        match self {
            SourceBackend::File(source) => source.next_page().await,
            SourceBackend::InMemory(source) => source.next_page().await,
        }
    }
}

// ===== Sink Trait and Backend Enum =====

/// 🕳️ A sink that consumes rendered `_bulk` bodies.
///
/// # Contract
/// - `send` ships one payload and reports what happened to each document in it.
///   An `Err` means the payload as a whole never landed, retries included.
/// - `close` releases whatever the sink holds. MUST be called. Skipping it is rude.
#[async_trait]
pub(crate) trait Sink: std::fmt::Debug + Send {
    async fn send(&mut self, payload: String) -> Result<BulkReport>;
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a Sink. Mirrors `SourceBackend`, because symmetry is soothing.
#[derive(Debug)]
pub(crate) enum SinkBackend {
    Elasticsearch(elasticsearch::ElasticsearchSink),
    InMemory(in_mem::InMemorySink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&mut self, payload: String) -> Result<BulkReport> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.send(payload).await,
            SinkBackend::InMemory(sink) => sink.send(payload).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.close().await,
            SinkBackend::InMemory(sink) => sink.close().await,
        }
    }
}
