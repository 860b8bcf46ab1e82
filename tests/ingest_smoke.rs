use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use csv_index_ingest::{
    count_data_lines, preflight, ConnectError, ElasticsearchClient, IngestConfig, IngestError,
    Ingestion, Record, RecordSink, Report, Severity,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct CollectSink {
    batches: Vec<Vec<Record>>,
}

#[async_trait]
impl RecordSink for CollectSink {
    async fn send_batch(&mut self, batch: Vec<Record>) -> anyhow::Result<()> {
        self.batches.push(batch);
        Ok(())
    }
}

async fn mock_cluster(fields: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    let properties: serde_json::Map<String, Value> = fields
        .iter()
        .map(|f| (f.to_string(), json!({ "type": "keyword" })))
        .collect();

    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "green" })))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/people"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_cat/indices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "index": "people" },
            { "index": ".kibana" },
            { "index": "animals" },
            { "index": "people_arranger_set" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/people/_mapping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "people": { "mappings": { "properties": properties } }
        })))
        .mount(&server)
        .await;
    server
}

fn write_csv(dir: &Path, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, contents)?;
    Ok(path)
}

fn config_for(path: &Path, index: &str, server: &MockServer) -> IngestConfig {
    let mut config = IngestConfig::new(path, index);
    config.url = server.uri();
    config.batch_size = 2.0;
    config
        .metadata
        .insert("submitter".to_string(), json!("qa"));
    config
}

async fn run_once(config: &IngestConfig) -> anyhow::Result<(Vec<Vec<Record>>, u32, Report)> {
    let mut report = Report::new();
    let backend = ElasticsearchClient::new(&config.url)?;
    let plan = preflight(config, &backend, &mut report).await?;
    let mut sink = CollectSink::default();
    let summary = Ingestion::start(&plan).await?.run(&mut sink, &mut report).await?;
    Ok((sink.batches, summary.checksum, report))
}

#[tokio::test]
async fn counts_rows_in_gzip_input() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let gz_path = dir.path().join("tiny.csv.gz");

    let mut plain = String::from("sku,col1\n");
    for i in 0..100_000 {
        plain.push_str(&format!("SKU{i:06},{i}\n"));
    }
    let mut encoder = GzipEncoder::new(Vec::new());
    encoder.write_all(plain.as_bytes()).await?;
    encoder.shutdown().await?;
    std::fs::write(&gz_path, encoder.into_inner())?;

    let count = count_data_lines(&gz_path, encoding_rs::UTF_8).await?;
    assert_eq!(count, 100_000);
    Ok(())
}

#[tokio::test]
async fn streams_typed_records_in_batches() -> anyhow::Result<()> {
    let server = mock_cluster(&["id", "name", "age"]).await;
    let dir = tempfile::tempdir()?;
    let csv = write_csv(
        dir.path(),
        "people.csv",
        "id,name,age\r\n1,Ann,34\r\n2,Bob,\r\n3, Cy ,x\r\n",
    )?;
    let config = config_for(&csv, "people", &server);

    let (batches, _checksum, report) = run_once(&config).await?;

    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 1]);
    let records: Vec<&Record> = batches.iter().flatten().collect();
    assert_eq!(records[0].get("id"), Some(&json!(1)));
    assert_eq!(records[0].get("age"), Some(&json!(34)));
    assert_eq!(records[1].get("age"), Some(&Value::Null));
    assert_eq!(records[2].get("name"), Some(&json!("Cy")));
    assert_eq!(records[2].get("age"), Some(&json!("x")));
    assert_eq!(records[2].metadata(), Some(&json!({ "submitter": "qa" })));
    assert!(!report.has_errors());
    Ok(())
}

#[tokio::test]
async fn skips_malformed_lines_and_keeps_going() -> anyhow::Result<()> {
    let server = mock_cluster(&["id", "name", "age"]).await;
    let dir = tempfile::tempdir()?;
    let csv = write_csv(
        dir.path(),
        "people.csv",
        "id,name,age\n1,Ann,34\n2,\"Bob,40\n\n3,Cy,50\n",
    )?;
    let config = config_for(&csv, "people", &server);

    let mut report = Report::new();
    let backend = ElasticsearchClient::new(&config.url)?;
    let plan = preflight(&config, &backend, &mut report).await?;
    assert_eq!(plan.total_records(), 4);

    let mut sink = CollectSink::default();
    let summary = Ingestion::start(&plan).await?.run(&mut sink, &mut report).await?;

    assert_eq!(summary.records, 2);
    assert_eq!(summary.skipped_lines, 1);
    let skipped: Vec<_> = report.warnings().collect();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].message.contains("line 3"));
    Ok(())
}

#[tokio::test]
async fn reruns_produce_identical_output() -> anyhow::Result<()> {
    let server = mock_cluster(&["id", "name", "age"]).await;
    let dir = tempfile::tempdir()?;
    let csv = write_csv(
        dir.path(),
        "people.csv",
        "id,name,age\n1,Ann,34\n2,Bob,1e3\n3,Cy,-0.5\n",
    )?;
    let config = config_for(&csv, "people", &server);

    let (first, first_sum, _) = run_once(&config).await?;
    let (second, second_sum, _) = run_once(&config).await?;
    assert_eq!(first, second);
    assert_eq!(first_sum, second_sum);
    Ok(())
}

#[tokio::test]
async fn rejects_headers_that_do_not_match_the_mapping() -> anyhow::Result<()> {
    let server = mock_cluster(&["id", "name", "age"]).await;
    let dir = tempfile::tempdir()?;
    let csv = write_csv(dir.path(), "people.csv", "id,name,email\n1,Ann,a@x\n")?;
    let config = config_for(&csv, "people", &server);

    let mut report = Report::new();
    let backend = ElasticsearchClient::new(&config.url)?;
    let err = preflight(&config, &backend, &mut report).await.unwrap_err();

    match err {
        IngestError::SchemaMismatch { index, check } => {
            assert_eq!(index, "people");
            assert_eq!(check.extra_headers, vec!["email"]);
            assert_eq!(check.missing_fields, vec!["age"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn lists_available_indices_when_target_is_missing() -> anyhow::Result<()> {
    let server = mock_cluster(&["id"]).await;
    let dir = tempfile::tempdir()?;
    let csv = write_csv(dir.path(), "people.csv", "id\n1\n")?;
    let config = config_for(&csv, "missing", &server);

    let mut report = Report::new();
    let backend = ElasticsearchClient::new(&config.url)?;
    let err = preflight(&config, &backend, &mut report).await.unwrap_err();

    match err {
        IngestError::IndexNotFound { index, available } => {
            assert_eq!(index, "missing");
            assert_eq!(available, vec!["animals", "people"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn header_only_file_has_no_data_rows() -> anyhow::Result<()> {
    let server = mock_cluster(&["id", "name"]).await;
    let dir = tempfile::tempdir()?;
    let csv = write_csv(dir.path(), "people.csv", "id,name\n")?;
    let config = config_for(&csv, "people", &server);

    let mut report = Report::new();
    let backend = ElasticsearchClient::new(&config.url)?;
    let err = preflight(&config, &backend, &mut report).await.unwrap_err();

    assert!(matches!(err, IngestError::NoDataRows(_)));
    assert!(report.has_errors());
    Ok(())
}

#[tokio::test]
async fn bad_configuration_fails_before_touching_the_file() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let mut config = config_for(Path::new("/does/not/exist.csv"), "people", &server);
    config.delimiter = ",;".to_string();

    let mut report = Report::new();
    let backend = ElasticsearchClient::new(&config.url)?;
    let err = preflight(&config, &backend, &mut report).await.unwrap_err();

    assert!(matches!(err, IngestError::InvalidConfig));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    let errors: Vec<_> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].severity, Severity::Error);
    assert_eq!(errors[0].message, "Invalid delimiter");
    Ok(())
}

#[tokio::test]
async fn missing_file_is_reported_by_path() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("nope.csv");
    let config = config_for(&missing, "people", &server);

    let mut report = Report::new();
    let backend = ElasticsearchClient::new(&config.url)?;
    let err = preflight(&config, &backend, &mut report).await.unwrap_err();

    match err {
        IngestError::FileNotFound(p) => assert!(p.ends_with("nope.csv")),
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn duplicate_headers_stop_before_the_cluster_is_asked() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    let csv = write_csv(dir.path(), "people.csv", "id,id,name\n1,2,Ann\n")?;
    let config = config_for(&csv, "people", &server);

    let mut report = Report::new();
    let backend = ElasticsearchClient::new(&config.url)?;
    let err = preflight(&config, &backend, &mut report).await.unwrap_err();

    assert!(matches!(err, IngestError::InvalidHeaders(_)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn mapping_failure_ends_preflight_with_a_report_entry() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "green" })))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/people"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/people/_mapping"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let csv = write_csv(dir.path(), "people.csv", "id,name\n1,Ann\n")?;
    let config = config_for(&csv, "people", &server);

    let mut report = Report::new();
    let backend = ElasticsearchClient::new(&config.url)?;
    let err = preflight(&config, &backend, &mut report).await.unwrap_err();

    assert!(matches!(
        err,
        IngestError::Connect(ConnectError::Status { status: 500, .. })
    ));
    let errors: Vec<_> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Error retrieving mapping for index 'people'");
    Ok(())
}

#[tokio::test]
async fn padded_quoted_cells_land_in_their_columns() -> anyhow::Result<()> {
    let server = mock_cluster(&["id", "name", "age"]).await;
    let dir = tempfile::tempdir()?;
    let csv = write_csv(
        dir.path(),
        "people.csv",
        "id,name,age\n1, \"Smith, John\", 34\n",
    )?;
    let config = config_for(&csv, "people", &server);

    let (batches, _checksum, report) = run_once(&config).await?;

    let records: Vec<&Record> = batches.iter().flatten().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("name"), Some(&json!("Smith, John")));
    assert_eq!(records[0].get("age"), Some(&json!(34)));
    assert_eq!(report.warnings().count(), 0);
    Ok(())
}
