//! 🔧 App Configuration: the TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment. Two layers:
//! - environment variables prefixed `OFX_`, nested with `__`
//!   (`OFX_ELASTICSEARCH__URL`, `OFX_INGEST__CHUNK_SIZE`, ...)
//! - an optional TOML file, which wins on conflicts.
//!
//! Every field has a default, so an empty environment and no file is a valid
//! (if optimistic) configuration pointing at `http://localhost:9200`.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{CommonSinkConfig, CommonSourceConfig, ElasticsearchConfig};

/// 📦 One struct to rule them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// 📥 What to load, and how to chop it up.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IngestConfig {
    #[serde(default = "default_hotels_file")]
    pub hotels_file: String,
    #[serde(default = "default_offers_file")]
    pub offers_file: String,
    #[serde(default = "default_hotels_delimiter")]
    pub hotels_delimiter: char,
    #[serde(default = "default_offers_delimiter")]
    pub offers_delimiter: char,
    /// 🗑️ Drop and recreate the index before loading. Off = append, with duplicates if re-run.
    #[serde(default = "default_recreate_index")]
    pub recreate_index: bool,
    /// 📄 `chunk_size`, `max_batch_size_bytes`
    #[serde(flatten)]
    pub source: CommonSourceConfig,
    /// 🚰 `max_request_size_bytes`
    #[serde(flatten)]
    pub sink: CommonSinkConfig,
}

fn default_hotels_file() -> String {
    "hotels.csv".to_string()
}

fn default_offers_file() -> String {
    "offers.csv".to_string()
}

fn default_hotels_delimiter() -> char {
    ';'
}

fn default_offers_delimiter() -> char {
    ','
}

fn default_recreate_index() -> bool {
    true
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            hotels_file: default_hotels_file(),
            offers_file: default_offers_file(),
            hotels_delimiter: default_hotels_delimiter(),
            offers_delimiter: default_offers_delimiter(),
            recreate_index: default_recreate_index(),
            source: CommonSourceConfig::default(),
            sink: CommonSinkConfig::default(),
        }
    }
}

/// 🧵 How many hands on deck during ingestion.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// 📬 Pages buffered between the file reader and the sink workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// 🚰 Concurrent transform-and-send workers, i.e. concurrent bulk requests.
    #[serde(default = "default_sink_parallelism")]
    pub sink_parallelism: usize,
}

fn default_queue_capacity() -> usize {
    4
}

fn default_sink_parallelism() -> usize {
    2
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            sink_parallelism: default_sink_parallelism(),
        }
    }
}

/// 🌐 The query service.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// 🔒 CORS origins allowed to call us with credentials. No wildcards: browsers refuse
    /// `*` together with credentials anyway.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// 🏨 Max hotels returned by `/bestOffersByHotel`.
    #[serde(default = "default_best_offers_bucket_size")]
    pub best_offers_bucket_size: usize,
    /// 📄 Max offers returned by `/hotels/{id}/offers`.
    #[serde(default = "default_hotel_offers_page_size")]
    pub hotel_offers_page_size: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_best_offers_bucket_size() -> usize {
    100
}

fn default_hotel_offers_page_size() -> usize {
    200
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            allowed_origins: default_allowed_origins(),
            best_offers_bucket_size: default_best_offers_bucket_size(),
            hotel_offers_page_size: default_hotel_offers_page_size(),
        }
    }
}

/// 🚀 Load the config: environment first, then the TOML file on top if one was given.
///
/// - `None` → env vars only.
/// - `Some(path)` → env vars + TOML file, merged. TOML wins on conflicts.
///   A path that doesn't exist contributes nothing; Figment treats a missing file as empty.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration from OFX_* environment variables{}",
        config_file_name
            .map(|path| format!(" and '{}'", path.display()))
            .unwrap_or_default()
    );

    let config = Figment::new().merge(Env::prefixed("OFX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (OFX_*). \
             Check the types: delimiters are single characters, sizes are plain integers.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (OFX_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}
