//! 🏨 ofx: travel offers in, cheapest holidays out.
//!
//! 🧠 Knowledge graph:
//! - [`ingest`]: hotels CSV + offers CSV → normalized documents → `_bulk` into Elasticsearch.
//!   Driven by the [`Supervisor`].
//! - [`serve`]: the axum query service over the same index.
//! - Both talk to the cluster through the [`DocumentStore`] trait, so tests can swap in a fake.
//! - [`normalizer`] is the pure part: no IO, just rows in and documents out.

pub mod app_config;
pub mod backends;
pub mod common;
pub(crate) mod composers;
pub mod normalizer;
pub(crate) mod progress;
pub mod query;
pub mod responses;
pub mod schema;
pub mod server;
pub mod store;
pub mod supervisors;
pub(crate) mod transforms;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

pub use app_config::{AppConfig, load_config};
pub use backends::{ElasticsearchClient, ElasticsearchConfig};
pub use normalizer::{HotelLookup, NormalizeError, build_hotel_lookup, normalize_batch};
pub use store::{BulkReport, DocumentStore, StoreError};
pub use supervisors::{IngestReport, Supervisor};

/// 🚀 Load both CSV files into the configured index and report what happened.
pub async fn ingest(app_config: AppConfig) -> Result<IngestReport> {
    let client = ElasticsearchClient::new(app_config.elasticsearch.clone())
        .context("💀 Could not build the Elasticsearch client for ingestion")?;
    info!(
        "🚚 Loading '{}' (hotels '{}') into index '{}' at {}",
        app_config.ingest.offers_file,
        app_config.ingest.hotels_file,
        app_config.elasticsearch.index,
        app_config.elasticsearch.url
    );
    Supervisor::new(app_config, Arc::new(client)).run().await
}

/// 🌐 Serve the query API until Ctrl-C.
pub async fn serve(app_config: AppConfig) -> Result<()> {
    let client = ElasticsearchClient::new(app_config.elasticsearch.clone())
        .context("💀 Could not build the Elasticsearch client for the query service")?;
    let state = server::AppState::new(
        Arc::new(client),
        app_config.elasticsearch.index.clone(),
        &app_config.server,
    );
    let router = server::router(state, &app_config.server.allowed_origins)?;
    server::serve_until_shutdown(router, &app_config.server.bind_address).await
}
