//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where ninety million offers need a home..."
//! 🎬 "One supervisor dared to load them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor runs one ingestion from start to finish.
//!
//! Steps:
//! 1. Load the hotel lookup and open the offer file. Bad inputs fail here, before the
//!    index is touched, so a typo in a path never costs you your existing index.
//! 2. Prepare the index (recreate if asked, create, bulk-load settings).
//! 3. Pump: one source worker, `sink_parallelism` sink workers, one bounded channel.
//! 4. Restore serving settings on the index. Always, even when step 3 failed.
//! 5. Hand back an [`IngestReport`].
//!
//! ⚠️ Workers are private. The supervisor is the only one allowed to boss them around.

mod workers;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL};
use futures::future::join_all;
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::backends::elasticsearch::ElasticsearchSink;
use crate::backends::file_source::FileSource;
use crate::backends::hotels_file::load_hotel_lookup;
use crate::backends::{FileSourceConfig, SinkBackend, SourceBackend};
use crate::composers::BulkComposer;
use crate::progress::format_number;
use crate::schema::{prepare_index, restore_index};
use crate::store::DocumentStore;
use crate::transforms::OfferTransformer;
use workers::{SinkWorker, SourceWorker, Worker};

/// 📊 What one ingestion run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Data rows read from the offer file.
    pub rows_read: usize,
    /// Rows that became documents.
    pub documents_emitted: usize,
    /// Rows dropped for lacking a usable outbound departure timestamp.
    pub rows_skipped: usize,
    /// Rows that were not valid CSV for the file's header.
    pub rows_undecodable: usize,
    /// Documents the index accepted.
    pub documents_indexed: usize,
    /// Documents the index rejected individually.
    pub documents_failed: usize,
    pub chunks: usize,
    /// `_bulk` requests sent (a chunk may need several).
    pub requests: usize,
    pub elapsed: Duration,
}

impl IngestReport {
    fn absorb(&mut self, other: IngestReport) {
        self.rows_read += other.rows_read;
        self.documents_emitted += other.documents_emitted;
        self.rows_skipped += other.rows_skipped;
        self.rows_undecodable += other.rows_undecodable;
        self.documents_indexed += other.documents_indexed;
        self.documents_failed += other.documents_failed;
        self.chunks += other.chunks;
        self.requests += other.requests;
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["📊 ingestion", ""]);
        let rows: [(&str, String); 9] = [
            ("rows read", format_number(self.rows_read as u64)),
            ("documents emitted", format_number(self.documents_emitted as u64)),
            ("rows skipped (no outbound departure)", format_number(self.rows_skipped as u64)),
            ("rows undecodable", format_number(self.rows_undecodable as u64)),
            ("documents indexed", format_number(self.documents_indexed as u64)),
            ("documents rejected", format_number(self.documents_failed as u64)),
            ("chunks", format_number(self.chunks as u64)),
            ("bulk requests", format_number(self.requests as u64)),
            ("elapsed", crate::progress::format_duration(self.elapsed)),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        write!(f, "{table}")
    }
}

/// 📦 The Supervisor: because even async tasks need someone hovering over them.
#[derive(Debug)]
pub struct Supervisor {
    app_config: AppConfig,
    store: Arc<dyn DocumentStore>,
}

impl Supervisor {
    pub fn new(app_config: AppConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self { app_config, store }
    }

    /// 🚀 Run one ingestion. See the module docs for the steps.
    pub async fn run(&self) -> Result<IngestReport> {
        let started = Instant::now();
        let ingest = &self.app_config.ingest;
        let index = self.app_config.elasticsearch.index.as_str();

        let hotels = Arc::new(load_hotel_lookup(&ingest.hotels_file, ingest.hotels_delimiter).await?);
        let source = FileSource::new(FileSourceConfig {
            file_name: ingest.offers_file.clone(),
            delimiter: ingest.offers_delimiter,
            common_config: ingest.source.clone(),
        })
        .await?;
        let transformer = OfferTransformer::new(source.headers().clone(), ingest.offers_delimiter, hotels)?;

        self.store
            .ping()
            .await
            .context("💀 The search cluster is not answering; nothing was loaded")?;
        prepare_index(self.store.as_ref(), index, ingest.recreate_index).await?;

        let es = &self.app_config.elasticsearch;
        let retry_backoff = Duration::from_millis(es.retry_backoff_ms);
        let outcome = self
            .pump(SourceBackend::File(source), transformer, || {
                SinkBackend::Elasticsearch(ElasticsearchSink::new(
                    self.store.clone(),
                    es.max_retries,
                    retry_backoff,
                ))
            })
            .await;

        let restored = restore_index(self.store.as_ref(), index).await;
        let mut report = match (outcome, restored) {
            (Ok(report), Ok(())) => report,
            (Ok(_), Err(restore_err)) => return Err(restore_err),
            (Err(load_err), Ok(())) => return Err(load_err),
            (Err(load_err), Err(restore_err)) => {
                warn!("{restore_err:#}");
                return Err(load_err);
            }
        };
        report.elapsed = started.elapsed();
        info!(
            "✅ Ingestion finished: {} documents indexed, {} rejected, {} rows skipped in {:?}",
            report.documents_indexed, report.documents_failed, report.rows_skipped, report.elapsed
        );
        Ok(report)
    }

    /// 🧵 Wire a source to `sink_parallelism` sinks and wait for all of them.
    pub(crate) async fn pump<F>(
        &self,
        source: SourceBackend,
        transformer: OfferTransformer,
        mut new_sink: F,
    ) -> Result<IngestReport>
    where
        F: FnMut() -> SinkBackend,
    {
        let runtime = &self.app_config.runtime;
        let composer = BulkComposer::new(
            &self.app_config.elasticsearch.index,
            self.app_config.ingest.sink.max_request_size_bytes,
        )?;
        let (tx, rx) = async_channel::bounded(runtime.queue_capacity.max(1));

        let source_handle = SourceWorker::new(tx, source).start();
        let sink_handles: Vec<_> = (0..runtime.sink_parallelism.max(1))
            .map(|_| SinkWorker::new(rx.clone(), new_sink(), transformer.clone(), composer.clone()).start())
            .collect();
        drop(rx);

        let mut report = IngestReport::default();
        let mut first_error = None;
        for joined in join_all(sink_handles).await {
            match joined {
                Ok(Ok(partial)) => report.absorb(partial),
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    first_error.get_or_insert(anyhow!(join_err).context("💀 A sink worker panicked"));
                }
            }
        }
        let chunks_read = match source_handle.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow!(join_err).context("💀 The source worker panicked")),
        };

        if let Some(err) = first_error {
            return Err(err);
        }
        let chunks_read = chunks_read?;
        if chunks_read != report.chunks {
            warn!(
                "⚠️ {} chunks were read but {} were processed",
                chunks_read, report.chunks
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::{InMemorySink, InMemorySource};
    use crate::common::HotelRow;
    use crate::normalizer::build_hotel_lookup;

    fn transformer() -> Result<OfferTransformer> {
        let hotels = build_hotel_lookup(vec![HotelRow {
            hotelid: Some(7),
            hotelname: Some("Seaside".to_string()),
            hotelstars: Some(4.5),
        }])?;
        let headers = crate::backends::file_source::parse_header("hotelid,price,outbounddeparturedatetime", ',')?;
        OfferTransformer::new(headers, ',', Arc::new(hotels))
    }

    fn supervisor(sink_parallelism: usize) -> Result<Supervisor> {
        let mut config = AppConfig::default();
        config.runtime.sink_parallelism = sink_parallelism;
        config.runtime.queue_capacity = 1;
        let store = crate::backends::ElasticsearchClient::new(config.elasticsearch.clone())?;
        Ok(Supervisor::new(config, Arc::new(store)))
    }

    #[tokio::test]
    async fn the_one_where_every_chunk_finds_a_sink() -> Result<()> {
        let supervisor = supervisor(3)?;
        let sink = InMemorySink::new();
        let source = InMemorySource::new([
            "7,100,2024-03-01\n7,110,2024-03-02",
            "8,90,2024-03-03\n8,95,",
            "9,50,2024-03-04\nbroken",
        ]);

        let report = supervisor
            .pump(SourceBackend::InMemory(source), transformer()?, || {
                SinkBackend::InMemory(sink.clone())
            })
            .await?;

        assert_eq!(report.chunks, 3);
        assert_eq!(report.rows_read, 6);
        assert_eq!(report.documents_emitted, 4);
        assert_eq!(report.rows_skipped, 1);
        assert_eq!(report.rows_undecodable, 1);
        assert_eq!(report.documents_indexed, 4);
        assert_eq!(report.requests, 3);
        assert_eq!(sink.received.lock().await.len(), 3);
        assert!(*sink.closed.lock().await, "every sink gets closed");
        Ok(())
    }

    #[test]
    fn the_one_where_the_report_renders_as_a_table() {
        let report = IngestReport {
            rows_read: 1_234_567,
            documents_indexed: 1_234_000,
            ..Default::default()
        };
        let rendered = report.to_string();
        assert!(rendered.contains("1,234,567"));
        assert!(rendered.contains("documents indexed"));
    }
}
