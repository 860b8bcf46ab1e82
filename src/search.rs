//! Read-only access to the destination Elasticsearch cluster.

use crate::mapping::IndexSchema;
use crate::report::{Diagnostic, Report};
use crate::{IngestError, IngestResult};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Per-request timeout for cluster calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connectivity failures, split so callers can point at the right fix.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("could not connect to Elasticsearch at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("authentication failed for {url} (HTTP {status})")]
    Authentication { url: String, status: u16 },
    #[error("unexpected response from {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ConnectError {
    /// What the operator should check next.
    pub fn hints(&self) -> Vec<String> {
        match self {
            ConnectError::Unreachable { url, .. } => vec![
                "Elasticsearch is running".to_string(),
                format!("The URL is correct: {url}"),
                "Network connectivity".to_string(),
            ],
            ConnectError::Authentication { .. } => vec![
                "Username is correct".to_string(),
                "Password is correct".to_string(),
                "User has sufficient permissions".to_string(),
            ],
            ConnectError::Status { .. } | ConnectError::Http(_) => Vec::new(),
        }
    }
}

/// The calls the pre-flight checks make against the destination. None of
/// them writes.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Cluster health; any answer at all means the cluster is reachable.
    async fn health(&self) -> Result<(), ConnectError>;

    async fn index_exists(&self, index: &str) -> Result<bool, ConnectError>;

    /// User-facing index names, sorted.
    async fn indices(&self) -> Result<Vec<String>, ConnectError>;

    async fn mapping(&self, index: &str) -> Result<IndexSchema, ConnectError>;
}

#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CatIndex {
    index: String,
}

impl ElasticsearchClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConnectError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<Response, ConnectError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        check_status(&url, response)
    }
}

fn send_error(url: &str, source: reqwest::Error) -> ConnectError {
    if source.is_connect() || source.is_timeout() {
        ConnectError::Unreachable {
            url: url.to_string(),
            source,
        }
    } else {
        ConnectError::Http(source)
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, ConnectError> {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ConnectError::Authentication {
            url: url.to_string(),
            status: status.as_u16(),
        }),
        s if s.is_success() => Ok(response),
        s => Err(ConnectError::Status {
            url: url.to_string(),
            status: s.as_u16(),
        }),
    }
}

/// System indices and arranger sets are never ingestion targets.
fn is_user_index(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with("_arranger_set")
}

#[async_trait]
impl SearchBackend for ElasticsearchClient {
    async fn health(&self) -> Result<(), ConnectError> {
        self.get("_cluster/health").await?;
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, ConnectError> {
        let url = self.url(index);
        debug!(%url, "HEAD");
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(&url, response)?;
        Ok(true)
    }

    async fn indices(&self) -> Result<Vec<String>, ConnectError> {
        let listed: Vec<CatIndex> = self.get("_cat/indices?format=json").await?.json().await?;
        let mut names: Vec<String> = listed
            .into_iter()
            .map(|i| i.index)
            .filter(|n| is_user_index(n))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn mapping(&self, index: &str) -> Result<IndexSchema, ConnectError> {
        let body: serde_json::Value = self.get(&format!("{index}/_mapping")).await?.json().await?;
        Ok(IndexSchema::from_mapping_response(index, &body))
    }
}

/// Health check, reported with hints matching the kind of failure.
pub async fn check_connection<B>(backend: &B, report: &mut Report) -> IngestResult<()>
where
    B: SearchBackend + ?Sized,
{
    match backend.health().await {
        Ok(()) => {
            report.info("Connection to Elasticsearch successful");
            Ok(())
        }
        Err(e) => {
            let message = match &e {
                ConnectError::Unreachable { .. } => "Could not connect to Elasticsearch",
                ConnectError::Authentication { .. } => "Authentication with Elasticsearch failed",
                _ => "Error connecting to Elasticsearch",
            };
            Err(reported(e, message, report))
        }
    }
}

/// Confirm `index` exists; otherwise report the indices that do.
pub async fn check_index<B>(backend: &B, index: &str, report: &mut Report) -> IngestResult<()>
where
    B: SearchBackend + ?Sized,
{
    let lookup = format!("Error checking index '{index}'");
    let exists = backend
        .index_exists(index)
        .await
        .map_err(|e| reported(e, &lookup, report))?;
    if exists {
        report.info(format!("Index '{index}' found"));
        return Ok(());
    }

    let available = backend
        .indices()
        .await
        .map_err(|e| reported(e, &lookup, report))?;
    report.push(
        Diagnostic::error(format!("Index '{index}' does not exist"))
            .with_details(available.iter().map(|i| format!("Available index: {i}")))
            .with_hints(["Specify one of the available indices"]),
    );
    Err(IngestError::IndexNotFound {
        index: index.to_string(),
        available,
    })
}

/// Fetch the field names of `index`; a failed request is reported before it
/// is returned.
pub async fn fetch_mapping<B>(
    backend: &B,
    index: &str,
    report: &mut Report,
) -> IngestResult<IndexSchema>
where
    B: SearchBackend + ?Sized,
{
    let schema = backend.mapping(index).await.map_err(|e| {
        reported(e, &format!("Error retrieving mapping for index '{index}'"), report)
    })?;
    debug!(%index, fields = schema.len(), "fetched index mapping");
    Ok(schema)
}

fn reported(e: ConnectError, message: &str, report: &mut Report) -> IngestError {
    report.push(
        Diagnostic::error(message)
            .with_details([e.to_string()])
            .with_hints(e.hints()),
    );
    e.into()
}
