//! 🧪 End to end: two CSV files on disk, a pretend cluster on a random port, one `ofx::ingest`.

use std::io::Write;

use anyhow::Result;
use ofx::AppConfig;
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const HOTELS: &str = "hotelid;hotelname;hotelstars\n1;Seaside;4.5\n2;Mountain Lodge;\n";

const OFFERS: &str = "\
HotelID,Price,CountAdults,CountChildren,OutboundDepartureDateTime,InboundDepartureDateTime,OutboundDepartureAirport,MealType,OceanView
1,399.5,2,0,2024-03-01T06:00:00+02:00,2024-03-08T16:00:00+02:00,FRA,halfboard,true
2,250,2,1,2024-04-01 07:00:00,2024-04-05 09:00:00,MUC,none,false
99,120,1,0,2024-05-01,2024-05-03,HAM,none,false
1,100,1,0,,2024-03-08T16:00:00+02:00,FRA,none,false
";

/// 📦 Answers a `_bulk` request with one successful item per action line.
struct AcceptEverything;

impl Respond for AcceptEverything {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body);
        let items: Vec<Value> = body
            .lines()
            .filter(|line| line.starts_with(r#"{"index""#))
            .map(|_| json!({ "index": { "status": 201 } }))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "errors": false, "items": items }))
    }
}

fn csv_file(contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn config_for(server: &MockServer, hotels: &NamedTempFile, offers: &NamedTempFile) -> AppConfig {
    let mut config = AppConfig::default();
    config.elasticsearch.url = server.uri();
    config.elasticsearch.max_retries = 0;
    config.elasticsearch.retry_backoff_ms = 1;
    config.ingest.hotels_file = hotels.path().display().to_string();
    config.ingest.offers_file = offers.path().display().to_string();
    config.ingest.source.chunk_size = 2;
    config
}

async fn mount_index_lifecycle(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tagline": "You Know, for Search" })))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/offers"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/offers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/offers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .expect(1)
        .mount(server)
        .await;
    // -- once for loading, once for serving
    Mock::given(method("PUT"))
        .and(path("/offers/_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .expect(2)
        .mount(server)
        .await;
}

#[tokio::test]
async fn the_one_where_two_csv_files_become_an_index() -> Result<()> {
    let server = MockServer::start().await;
    mount_index_lifecycle(&server).await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(AcceptEverything)
        .mount(&server)
        .await;
    let hotels = csv_file(HOTELS)?;
    let offers = csv_file(OFFERS)?;

    let report = ofx::ingest(config_for(&server, &hotels, &offers)).await?;

    assert_eq!(report.rows_read, 4);
    assert_eq!(report.documents_emitted, 3);
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.documents_indexed, 3);
    assert_eq!(report.documents_failed, 0);
    assert_eq!(report.chunks, 2);

    let requests = server.received_requests().await.unwrap_or_default();
    let documents: Vec<Value> = requests
        .iter()
        .filter(|request| request.url.path() == "/_bulk")
        .flat_map(|request| {
            String::from_utf8_lossy(&request.body)
                .lines()
                .filter(|line| !line.starts_with(r#"{"index""#))
                .map(serde_json::from_str::<Value>)
                .collect::<Vec<_>>()
        })
        .collect::<Result<_, _>>()?;
    assert_eq!(documents.len(), 3);

    let seaside = documents
        .iter()
        .find(|doc| doc["hotelid"] == 1)
        .ok_or_else(|| anyhow::anyhow!("the Seaside offer never reached the index"))?;
    assert_eq!(seaside["hotelname"], "Seaside");
    assert_eq!(seaside["hotelstars"], 4.5);
    assert_eq!(seaside["duration"], 7);
    assert_eq!(seaside["outbounddeparturedatetime"], "2024-03-01T04:00:00+0000");

    let lodge = documents
        .iter()
        .find(|doc| doc["hotelid"] == 2)
        .ok_or_else(|| anyhow::anyhow!("the lodge offer never reached the index"))?;
    assert_eq!(lodge["hotelstars"], 0.0, "a known hotel without stars gets zero");
    assert_eq!(lodge["duration"], 4);

    let stranger = documents
        .iter()
        .find(|doc| doc["hotelid"] == 99)
        .ok_or_else(|| anyhow::anyhow!("the unknown hotel's offer never reached the index"))?;
    assert!(stranger["hotelname"].is_null());
    assert!(stranger["hotelstars"].is_null());
    Ok(())
}

#[tokio::test]
async fn the_one_where_the_cluster_says_no_and_still_gets_its_settings_back() -> Result<()> {
    let server = MockServer::start().await;
    mount_index_lifecycle(&server).await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(400).set_body_string("mapper_parsing_exception"))
        .mount(&server)
        .await;
    let hotels = csv_file(HOTELS)?;
    let offers = csv_file(OFFERS)?;

    let result = ofx::ingest(config_for(&server, &hotels, &offers)).await;

    let err = match result {
        Ok(report) => anyhow::bail!("expected the load to fail, got {report:?}"),
        Err(err) => err,
    };
    assert!(format!("{err:#}").contains("mapper_parsing_exception"));
    // -- the `expect(2)` on `_settings` is verified when the server drops
    Ok(())
}

#[tokio::test]
async fn the_one_where_a_missing_hotels_file_never_touches_the_index() -> Result<()> {
    let server = MockServer::start().await;
    let offers = csv_file(OFFERS)?;
    let mut config = AppConfig::default();
    config.elasticsearch.url = server.uri();
    config.ingest.hotels_file = "/definitely/not/here/hotels.csv".to_string();
    config.ingest.offers_file = offers.path().display().to_string();

    let result = ofx::ingest(config).await;

    assert!(result.is_err());
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty(), "no request may reach the cluster: {requests:?}");
    Ok(())
}
