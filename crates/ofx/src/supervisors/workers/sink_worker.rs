//! 🎬 *[a channel fills with chunks. somewhere, a sink waits.]*
//!
//! 🗑️ The SinkWorker: takes a chunk off the channel, turns it into documents, composes the
//! `_bulk` bodies and ships them. Documents the cluster rejects are counted and logged,
//! never resent; the next chunk goes out regardless. A payload that never lands at all
//! (retries exhausted, or a 4xx on the whole request) ends this worker and, by closing
//! the channel, the whole load.

use anyhow::{Context, Result};
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Chunk, Worker};
use crate::backends::{Sink, SinkBackend};
use crate::composers::BulkComposer;
use crate::store::BulkReport;
use crate::supervisors::IngestReport;
use crate::transforms::OfferTransformer;

#[derive(Debug)]
pub(in crate::supervisors) struct SinkWorker {
    rx: Receiver<Chunk>,
    sink: SinkBackend,
    transformer: OfferTransformer,
    composer: BulkComposer,
}

impl SinkWorker {
    pub(in crate::supervisors) fn new(
        rx: Receiver<Chunk>,
        sink: SinkBackend,
        transformer: OfferTransformer,
        composer: BulkComposer,
    ) -> Self {
        Self {
            rx,
            sink,
            transformer,
            composer,
        }
    }

    async fn process(&mut self, chunk: Chunk, totals: &mut IngestReport) -> Result<()> {
        let transformed = self.transformer.transform(&chunk.page);
        let payloads = self
            .composer
            .compose(&transformed.documents)
            .context(format!("💀 Could not compose the bulk body for chunk {}", chunk.number))?;

        let mut chunk_report = BulkReport::default();
        for payload in payloads {
            let report = self
                .sink
                .send(payload)
                .await
                .context(format!("💀 Chunk {} never made it into the index", chunk.number))?;
            chunk_report.merge(report);
            totals.requests += 1;
        }

        if chunk_report.failed > 0 {
            warn!(
                "⚠️ chunk {}: {} of {} documents were rejected by the index; e.g. {:?}",
                chunk.number,
                chunk_report.failed,
                transformed.documents.len(),
                chunk_report.failure_samples
            );
        }
        debug!(
            "📦 chunk {}: {} rows, {} documents, {} indexed",
            chunk.number,
            transformed.rows_read,
            transformed.documents.len(),
            chunk_report.succeeded
        );

        totals.chunks += 1;
        totals.rows_read += transformed.rows_read;
        totals.rows_skipped += transformed.rows_skipped;
        totals.rows_undecodable += transformed.rows_undecodable;
        totals.documents_emitted += transformed.documents.len();
        totals.documents_indexed += chunk_report.succeeded;
        totals.documents_failed += chunk_report.failed;
        Ok(())
    }
}

impl Worker for SinkWorker {
    /// This worker's share of the run totals.
    type Output = IngestReport;

    fn start(mut self) -> JoinHandle<Result<IngestReport>> {
        tokio::spawn(async move {
            debug!("📥 SinkWorker started draining channel...");
            let mut totals = IngestReport::default();
            while let Ok(chunk) = self.rx.recv().await {
                if let Err(err) = self.process(chunk, &mut totals).await {
                    // -- 🚪 stop the reader and the other workers; no point loading half a file
                    self.rx.close();
                    // -- the error we return matters more than a failed close
                    let _ = self.sink.close().await;
                    return Err(err);
                }
            }
            debug!("🏁 SinkWorker: channel closed. Shutting down.");
            self.sink
                .close()
                .await
                .context("💀 SinkWorker failed to close its sink")?;
            Ok(totals)
        })
    }
}
