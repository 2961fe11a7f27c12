//! 🗄️ The document store seam.
//!
//! Everything that actually stores, filters, sorts, or aggregates offers lives on the other
//! side of this trait. The ingestion supervisor and the HTTP handlers both receive an
//! `Arc<dyn DocumentStore>`; nobody reaches for a global client.
//!
//! 🧠 Knowledge graph:
//! - Real implementation: `backends::elasticsearch::ElasticsearchClient` (reqwest).
//! - Test implementations: stubs inside `#[cfg(test)]` modules, and wiremock in `tests/`.
//! - [`BulkReport`]: the per-document verdict of one `_bulk` call, summed per chunk and per run.
//! - [`StoreError`]: the typed failures the retry loop knows how to judge.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// 🗄️ What ofx needs from a search engine. Nothing more, nothing less.
///
/// `bulk` takes a fully rendered NDJSON body: composing is the composer's job, and the
/// store only ships bytes.
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// 📡 "Hello? Is this thing on?"
    async fn ping(&self) -> Result<()>;
    /// 🔍 Does the index exist?
    async fn index_exists(&self, index: &str) -> Result<bool>;
    /// 🏗️ Create an index with the given field mappings.
    async fn create_index(&self, index: &str, mappings: &Value) -> Result<()>;
    /// 🗑️ Delete an index. Deleting an index that is already gone is fine.
    async fn delete_index(&self, index: &str) -> Result<()>;
    /// 🔧 Update dynamic index settings.
    async fn put_settings(&self, index: &str, settings: &Value) -> Result<()>;
    /// 📦 Submit one bulk body and report what happened to each document.
    async fn bulk(&self, payload: &str) -> Result<BulkReport>;
    /// 🔍 Run a search body (query + aggregations) and return the raw response.
    async fn search(&self, index: &str, body: &Value) -> Result<Value>;
}

/// 💀 Store failures with enough shape for a retry decision.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never got an answer: DNS, connect, timeout, reset.
    #[error("📡 Could not reach the document store")]
    Transport(#[source] reqwest::Error),
    /// The store answered, and the answer was no.
    #[error("💀 The document store answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl StoreError {
    /// 🔄 Worth another try? Network hiccups and "slow down" answers are. Mapping errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Rejected { status, .. } => matches!(status, 429 | 502 | 503 | 504),
        }
    }
}

// 🔬 Keep a few failure reasons for the logs. Nobody reads fifty thousand of them.
const MAX_FAILURE_SAMPLES: usize = 5;

/// 📊 Per-document outcome of one or more bulk requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
    /// 🔬 A handful of failure reasons, for the warning log line.
    pub failure_samples: Vec<String>,
}

impl BulkReport {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, reason: impl Into<String>) {
        self.failed += 1;
        if self.failure_samples.len() < MAX_FAILURE_SAMPLES {
            self.failure_samples.push(reason.into());
        }
    }

    /// ➕ Fold another report into this one.
    pub fn merge(&mut self, other: BulkReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        for sample in other.failure_samples {
            if self.failure_samples.len() >= MAX_FAILURE_SAMPLES {
                break;
            }
            self.failure_samples.push(sample);
        }
    }
}
