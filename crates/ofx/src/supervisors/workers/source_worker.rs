//! 🚰 The SourceWorker: pulls pages out of the source and pushes them into the channel,
//! numbered, in order, until the source runs dry or nobody is listening anymore.

use anyhow::{Context, Result};
use async_channel::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Chunk, Worker};
use crate::backends::{Source, SourceBackend};

#[derive(Debug)]
pub(in crate::supervisors) struct SourceWorker {
    tx: Sender<Chunk>,
    source: SourceBackend,
}

impl SourceWorker {
    pub(in crate::supervisors) fn new(tx: Sender<Chunk>, source: SourceBackend) -> Self {
        Self { tx, source }
    }
}

impl Worker for SourceWorker {
    /// Number of chunks handed to the channel.
    type Output = usize;

    fn start(mut self) -> JoinHandle<Result<usize>> {
        tokio::spawn(async move {
            debug!("📖 SourceWorker started reading...");
            let mut sent = 0usize;
            while let Some(page) = self
                .source
                .next_page()
                .await
                .context("💀 SourceWorker could not read the next page")?
            {
                let chunk = Chunk {
                    number: sent + 1,
                    page,
                };
                if self.tx.send(chunk).await.is_err() {
                    // -- 🚪 every sink worker hung up; one of them has the real error
                    warn!("⚠️ SourceWorker: channel closed after {} chunks, stopping early", sent);
                    return Ok(sent);
                }
                sent += 1;
            }
            debug!("🏁 SourceWorker: source exhausted after {} chunks", sent);
            // -- dropping `self.tx` here closes the channel for the sink workers
            Ok(sent)
        })
    }
}
