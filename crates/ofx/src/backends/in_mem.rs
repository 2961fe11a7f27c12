//! # Previously, on ofx...
//!
//! 🎬 The offers were trapped in a file the size of a small moon, and the tests had
//! four milliseconds to spare. Someone had to fake it. Someone had to live entirely in RAM.
//!
//! [`InMemorySource`] hands out a fixed list of pages, once each, in order.
//! [`InMemorySink`] keeps every payload it receives behind an `Arc<Mutex<...>>` so a test
//! can peek after the pipeline has taken ownership. It answers every document with "indexed",
//! because it has never met a mapping it didn't like.
//!
//! ⚠️ Not for production. If you're deploying this to prod, please also deploy a therapist.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::{Sink, Source};
use crate::store::BulkReport;

/// 📦 Pages from RAM, handed out once.
#[derive(Debug, Default)]
pub(crate) struct InMemorySource {
    pages: VecDeque<String>,
}

impl InMemorySource {
    pub(crate) fn new<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn next_page(&mut self) -> Result<Option<String>> {
        Ok(self.pages.pop_front())
    }
}

/// 📦 A sink that never forgets. Clone it before handing it off; clones share the vault.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemorySink {
    pub(crate) received: Arc<Mutex<Vec<String>>>,
    pub(crate) closed: Arc<Mutex<bool>>,
}

impl InMemorySink {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&mut self, payload: String) -> Result<BulkReport> {
        // -- 📦 every second line of a bulk body is a document; the other is its action line
        let documents = payload.lines().count() / 2;
        self.received.lock().await.push(payload);
        Ok(BulkReport {
            succeeded: documents,
            ..Default::default()
        })
    }

    async fn close(&mut self) -> Result<()> {
        *self.closed.lock().await = true;
        Ok(())
    }
}
