//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN: INT. SERVER ROOM, 3:47 AM
//!
//! The monitoring dashboard glows amber in the dark. Chunk 1,204 of 1,856 is in flight.
//! The cluster answers with a 429. Our hero exhales, waits half a second, and tries again.
//! That is the whole plot. It is enough.
//!
//! 🚀 This module is the only place in ofx that speaks HTTP to the search engine.
//! It creates and deletes the offer index, tunes its settings, ships `_bulk` bodies,
//! and runs the searches the query service asks for.
//!
//! 🧠 Knowledge graph:
//! - [`ElasticsearchConfig`]: URL, auth, index name, timeouts, retry knobs, compression.
//! - [`ElasticsearchClient`]: implements [`DocumentStore`]. No retries inside; it reports.
//! - [`ElasticsearchSink`]: implements [`Sink`] on top of any store, and owns the retry loop.
//!
//! ⚠️ Auth priority: API key wins over basic auth. This is not a democracy. 🦆

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::backends::Sink;
use crate::store::{BulkReport, DocumentStore, StoreError};

/// 📡 Where the cluster lives and how to talk to it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ElasticsearchConfig {
    /// 📡 Cluster URL, scheme and port included. Yes, all of it.
    #[serde(default = "default_url")]
    pub url: String,
    /// 🔒 Username for basic auth.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key: the velvet rope variant of authentication.
    #[serde(default)]
    pub api_key: Option<String>,
    /// 📦 The offer index. Loader writes it, query service reads it.
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 🔄 How many times a retryable bulk failure is retried before we give up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// ⏱️ First retry delay; doubles every attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// 🫁 Gzip request bodies (`Content-Encoding: gzip`).
    #[serde(default)]
    pub compress_requests: bool,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index() -> String {
    "offers".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

// ⏱️ 30 seconds, because bulk requests can be meaty and we're not monsters.
fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            api_key: None,
            index: default_index(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            compress_requests: false,
        }
    }
}

/// 📡 The HTTP muscle. Cheap to share: wrap it in an `Arc` and hand it around.
#[derive(Debug)]
pub struct ElasticsearchClient {
    client: reqwest::Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchClient {
    /// 🏗️ Build the client. Does not touch the network; call [`DocumentStore::ping`] for that.
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. We tried to build a reqwest::Client and the universe said 'no'. Probably a TLS setup problem.")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    // 📡 `https://host/` + `/offers` → `https://host/offers`. One slash. Infinite suffering avoided.
    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    // 🔒 API key beats basic auth in this club.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    // 🫁 Optionally squish the body. Returns the bytes and whether they are gzipped.
    fn encode_body(&self, body: Vec<u8>) -> Result<(Vec<u8>, bool)> {
        if !self.config.compress_requests {
            return Ok((body, false));
        }
        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::fast());
        encoder
            .write_all(&body)
            .context("💀 Gzip refused to squish the request body.")?;
        let compressed = encoder
            .finish()
            .context("💀 Gzip started squishing and could not finish. Relatable.")?;
        Ok((compressed, true))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        content_type: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, StoreError> {
        let mut request = self.authorize(request);
        if let Some(body) = body {
            let (body, gzipped) = self
                .encode_body(body)
                .map_err(|err| StoreError::Rejected { status: 0, body: format!("{err:#}") })?;
            request = request.header("Content-Type", content_type);
            if gzipped {
                request = request.header("Content-Encoding", "gzip");
            }
            request = request.body(body);
        }
        request.send().await.map_err(StoreError::Transport)
    }

    // 💀 Turn a non-2xx answer into a `StoreError::Rejected`, body included for the postmortem.
    async fn reject(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StoreError::Rejected { status, body }
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        body: &Value,
    ) -> Result<reqwest::Response> {
        let bytes = serde_json::to_vec(body)
            .context("💀 Failed to serialize a request body. The JSON that describes JSON has failed to become JSON.")?;
        let response = self.send(request, "application/json", Some(bytes)).await?;
        if !response.status().is_success() {
            return Err(Self::reject(response).await.into());
        }
        Ok(response)
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchClient {
    async fn ping(&self) -> Result<()> {
        let response = self
            .send(self.client.get(self.url("/")), "application/json", None)
            .await
            .context("💀 Knocked on the cluster's front door. Nobody answered.")?;
        if !response.status().is_success() {
            return Err(Self::reject(response).await)
                .context("💀 The cluster answered the ping, but not with a smile.");
        }
        debug!("✅ Cluster at {} is awake and talking to us", self.config.url);
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .send(self.client.head(self.url(index)), "application/json", None)
            .await
            .context(format!("💀 Could not check whether index '{index}' exists"))?;
        match response.status().as_u16() {
            200..=299 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::reject(response).await)
                .context(format!("💀 Asked whether index '{index}' exists and got a riddle back")),
        }
    }

    async fn create_index(&self, index: &str, mappings: &Value) -> Result<()> {
        let body = serde_json::json!({ "mappings": mappings });
        self.send_json(self.client.put(self.url(index)), &body)
            .await
            .context(format!("💀 Failed to create index '{index}'"))?;
        debug!("🏗️ Index '{index}' created with the offer mapping");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let response = self
            .send(self.client.delete(self.url(index)), "application/json", None)
            .await
            .context(format!("💀 Failed to delete index '{index}'"))?;
        let status = response.status();
        if status.is_success() || status.as_u16() == 404 {
            debug!("🗑️ Index '{index}' is gone (status {status})");
            return Ok(());
        }
        Err(Self::reject(response).await).context(format!("💀 Index '{index}' refused to be deleted"))
    }

    async fn put_settings(&self, index: &str, settings: &Value) -> Result<()> {
        let path = format!("{index}/_settings");
        self.send_json(self.client.put(self.url(&path)), settings)
            .await
            .context(format!("💀 Failed to update settings of index '{index}'"))?;
        trace!("🔧 Settings of '{index}' updated to {settings}");
        Ok(())
    }

    async fn bulk(&self, payload: &str) -> Result<BulkReport> {
        // ⚠️ Content-Type: application/x-ndjson, not application/json. VERY important.
        let response = self
            .send(
                self.client.post(self.url("_bulk")),
                "application/x-ndjson",
                Some(payload.as_bytes().to_vec()),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::reject(response).await.into());
        }
        let bytes = response.bytes().await.map_err(StoreError::Transport)?;
        let parsed: BulkResponse = serde_json::from_slice(&bytes)
            .context("💀 The bulk request landed but the response was not the JSON we were promised.")?;
        Ok(parsed.into_report())
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let path = format!("{index}/_search");
        let response = self
            .send_json(self.client.post(self.url(&path)), body)
            .await
            .context(format!("💀 Search against index '{index}' failed"))?;
        let bytes = response
            .bytes()
            .await
            .context("💀 The search response got lost on its way back to us")?;
        serde_json::from_slice(&bytes).context("💀 The search response was not valid JSON")
    }
}

// ===== Bulk response =====

/// 📦 The parts of a `_bulk` response we care about.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

impl BulkResponse {
    fn into_report(self) -> BulkReport {
        let mut report = BulkReport::default();
        for item in self.items {
            // -- 🔄 one entry per item, keyed by the action name ("index")
            for (_action, result) in item {
                if result.error.is_none() && (200..300).contains(&result.status) {
                    report.record_success();
                } else {
                    let reason = result
                        .error
                        .as_ref()
                        .and_then(|error| error.get("reason"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("status {}", result.status));
                    report.record_failure(reason);
                }
            }
        }
        if self.errors && report.failed == 0 {
            warn!("⚠️ Bulk response said errors=true but no item admitted to failing. Suspicious.");
        }
        report
    }
}

// ===== Sink =====

/// 🚰 Sends rendered `_bulk` bodies to the store, retrying the retryable.
///
/// 🔄 Retries are the caller's problem, and this is the caller. Transport errors and
/// 429/502/503/504 are retried with exponential backoff up to `max_retries` times.
/// Documents that the store rejected individually are counted, never resent.
#[derive(Debug)]
pub(crate) struct ElasticsearchSink {
    store: Arc<dyn DocumentStore>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ElasticsearchSink {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            store,
            max_retries,
            retry_backoff,
        }
    }

    // ⏱️ 500ms, 1s, 2s, 4s ... capped at 64x the base so nobody waits a week.
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff * 2u32.pow(attempt.min(6))
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    async fn send(&mut self, payload: String) -> Result<BulkReport> {
        let mut attempt = 0u32;
        loop {
            match self.store.bulk(&payload).await {
                Ok(report) => {
                    trace!(
                        "🚀 Bulk request landed: {} indexed, {} rejected",
                        report.succeeded,
                        report.failed
                    );
                    return Ok(report);
                }
                Err(err) => {
                    let retryable = err
                        .downcast_ref::<StoreError>()
                        .is_some_and(StoreError::is_retryable);
                    if !retryable || attempt >= self.max_retries {
                        return Err(err).context(format!(
                            "💀 The bulk request failed after {} attempt(s). The documents never made it to the index.",
                            attempt + 1
                        ));
                    }
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        "🔄 Bulk request attempt {} failed ({:#}); retrying in {:?}",
                        attempt + 1,
                        err,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        debug!("🗑️ Elasticsearch sink closing: no buffer to flush, just vibes to release");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ElasticsearchConfig {
        ElasticsearchConfig {
            url: server.uri(),
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn the_one_where_bulk_items_are_judged_one_by_one() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("Content-Type", "application/x-ndjson"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "took": 3,
                "errors": true,
                "items": [
                    {"index": {"_index": "offers", "status": 201}},
                    {"index": {"_index": "offers", "status": 400,
                        "error": {"type": "mapper_parsing_exception", "reason": "failed to parse field [price]"}}},
                    {"index": {"_index": "offers", "status": 201}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElasticsearchClient::new(config_for(&server))?;
        let report = client.bulk("{\"index\":{}}\n{}\n").await?;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failure_samples, vec!["failed to parse field [price]".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_index_lifecycle_goes_full_circle() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/offers"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/offers"))
            .and(body_string_contains("\"mappings\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/offers/_settings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/offers"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ElasticsearchClient::new(config_for(&server))?;
        assert!(!client.index_exists("offers").await?);
        client
            .create_index("offers", &serde_json::json!({"properties": {}}))
            .await?;
        client
            .put_settings("offers", &serde_json::json!({"index.refresh_interval": "-1"}))
            .await?;
        client.delete_index("offers").await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_api_key_outranks_the_password() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("Authorization", "ApiKey sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"tagline": "You Know, for Search"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElasticsearchClient::new(ElasticsearchConfig {
            username: Some("elastic".to_string()),
            password: Some("password123".to_string()),
            api_key: Some("sekrit".to_string()),
            ..config_for(&server)
        })?;
        client.ping().await
    }

    #[tokio::test]
    async fn the_one_where_search_errors_keep_their_status() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/offers/_search"))
            .respond_with(ResponseTemplate::new(400).set_body_string("parsing_exception"))
            .mount(&server)
            .await;

        let client = ElasticsearchClient::new(config_for(&server))?;
        let err = client
            .search("offers", &serde_json::json!({"size": 0}))
            .await
            .expect_err("💀 a 400 should not look like a search result");

        match err.downcast_ref::<StoreError>() {
            Some(StoreError::Rejected { status, body }) => {
                assert_eq!(*status, 400);
                assert_eq!(body, "parsing_exception");
            }
            other => panic!("💀 expected a rejected store error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_requests_arrive_squished() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("Content-Encoding", "gzip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"errors": false, "items": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElasticsearchClient::new(ElasticsearchConfig {
            compress_requests: true,
            ..config_for(&server)
        })?;
        client.bulk("{\"index\":{}}\n{}\n").await?;
        Ok(())
    }

    /// 🧪 A store that says "slow down" a fixed number of times before cooperating.
    #[derive(Debug)]
    struct MoodyStore {
        tantrums_left: Mutex<u32>,
        status: u16,
        calls: Mutex<u32>,
    }

    impl MoodyStore {
        fn new(tantrums: u32, status: u16) -> Self {
            Self {
                tantrums_left: Mutex::new(tantrums),
                status,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("💀 poisoned test mutex")
        }
    }

    #[async_trait]
    impl DocumentStore for MoodyStore {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn index_exists(&self, _index: &str) -> Result<bool> {
            Ok(true)
        }
        async fn create_index(&self, _index: &str, _mappings: &Value) -> Result<()> {
            Ok(())
        }
        async fn delete_index(&self, _index: &str) -> Result<()> {
            Ok(())
        }
        async fn put_settings(&self, _index: &str, _settings: &Value) -> Result<()> {
            Ok(())
        }
        async fn bulk(&self, _payload: &str) -> Result<BulkReport> {
            *self.calls.lock().expect("💀 poisoned test mutex") += 1;
            let mut tantrums = self.tantrums_left.lock().expect("💀 poisoned test mutex");
            if *tantrums > 0 {
                *tantrums -= 1;
                return Err(StoreError::Rejected { status: self.status, body: "nope".to_string() }.into());
            }
            Ok(BulkReport { succeeded: 1, ..Default::default() })
        }
        async fn search(&self, _index: &str, _body: &Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn the_one_where_the_sink_waits_out_a_tantrum() -> Result<()> {
        let store = Arc::new(MoodyStore::new(2, 429));
        let mut sink = ElasticsearchSink::new(store.clone(), 3, Duration::from_millis(1));

        let report = sink.send("payload".to_string()).await?;

        assert_eq!(report.succeeded, 1);
        assert_eq!(store.calls(), 3, "two tantrums, one success");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_bad_request_is_not_retried() {
        let store = Arc::new(MoodyStore::new(5, 400));
        let mut sink = ElasticsearchSink::new(store.clone(), 3, Duration::from_millis(1));

        let result = sink.send("payload".to_string()).await;

        assert!(result.is_err());
        assert_eq!(store.calls(), 1, "a 400 will still be a 400 next time");
    }

    #[tokio::test]
    async fn the_one_where_patience_runs_out() {
        let store = Arc::new(MoodyStore::new(10, 503));
        let mut sink = ElasticsearchSink::new(store.clone(), 2, Duration::from_millis(1));

        let result = sink.send("payload".to_string()).await;

        assert!(result.is_err());
        assert_eq!(store.calls(), 3, "one try plus two retries");
    }
}
