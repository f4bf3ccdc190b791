//! Elasticsearch access: scroll searches over the raw log indices, day index creation and
//! bulk indexing into them.

use std::collections::HashMap;
use std::fmt::Write;
use std::time::Duration;

use futures::{Stream, TryStreamExt, stream};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use xferstats_config::shared::ElasticsearchConfig;

use crate::bail;
use crate::connector::Connector;
use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::ingest_error;
use crate::partition::PartitionSchema;
use crate::source::LogSource;
use crate::store::{BulkResponse, ItemFailure, PartitionStore};
use crate::types::{RawLogEntry, TimeWindow, UpsertOperation};

/// Field the source range filter applies to.
const TIMESTAMP_FIELD: &str = "@timestamp";

/// Error type returned when an index is created by a concurrent writer.
const ALREADY_EXISTS_ERROR: &str = "resource_already_exists_exception";

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Deserialize)]
struct ScrollPage {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct BulkResponseBody {
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

enum ScrollState {
    Start,
    Continue(String),
    Done,
}

/// HTTP client for one Elasticsearch cluster.
///
/// Serves as both the [`LogSource`] of raw entries and the [`PartitionStore`] of statistics
/// records.
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<SecretString>,
    source_index: String,
    scroll_keep_alive: String,
    page_size: u32,
}

impl ElasticsearchClient {
    pub fn new(config: &ElasticsearchConfig) -> IngestResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| {
                ingest_error!(
                    ErrorKind::DestinationConnectionFailed,
                    "Failed to build the Elasticsearch HTTP client",
                    err.to_string(),
                    source: err
                )
            })?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            source_index: config.source_index.clone(),
            scroll_keep_alive: config.scroll_keep_alive.clone(),
            page_size: config.page_size,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/{}", self.base_url, path));

        match &self.username {
            Some(username) => builder.basic_auth(
                username,
                self.password
                    .as_ref()
                    .map(|password| password.expose_secret().clone()),
            ),
            None => builder,
        }
    }

    async fn open_scroll(&self, window: &TimeWindow) -> IngestResult<ScrollPage> {
        let body = json!({
            "size": self.page_size,
            "sort": ["_doc"],
            "query": {
                "range": {
                    TIMESTAMP_FIELD: {
                        "gte": window.start.to_rfc3339(),
                        "lt": window.end.to_rfc3339(),
                    }
                }
            }
        });
        let path = format!(
            "{}/_search?scroll={}",
            self.source_index, self.scroll_keep_alive
        );

        let response = self
            .request(Method::POST, &path)
            .json(&body)
            .send()
            .await
            .map_err(source_error)?;
        let response = check_status(
            response,
            ErrorKind::SourceQueryFailed,
            "Scroll search over the raw log indices failed",
        )
        .await?;

        Ok(response.json().await?)
    }

    async fn continue_scroll(&self, scroll_id: &str) -> IngestResult<ScrollPage> {
        let body = json!({
            "scroll": self.scroll_keep_alive,
            "scroll_id": scroll_id,
        });

        let response = self
            .request(Method::POST, "_search/scroll")
            .json(&body)
            .send()
            .await
            .map_err(source_error)?;
        let response = check_status(
            response,
            ErrorKind::SourceQueryFailed,
            "Fetching the next scroll page failed",
        )
        .await?;

        Ok(response.json().await?)
    }

    /// Releases a scroll cursor. Failures are only logged since the cursor expires anyway.
    async fn clear_scroll(&self, scroll_id: &str) {
        let result = self
            .request(Method::DELETE, "_search/scroll")
            .json(&json!({ "scroll_id": [scroll_id] }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("scroll cleared");
            }
            Ok(response) => {
                warn!(status = %response.status(), "failed to clear scroll");
            }
            Err(err) => {
                warn!(error = %err, "failed to clear scroll");
            }
        }
    }

    async fn partition_exists(&self, partition: &str) -> IngestResult<bool> {
        let response = self
            .request(Method::HEAD, partition)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => bail!(
                ErrorKind::DestinationQueryFailed,
                "Checking for a partition failed",
                format!("partition {partition} answered with status {status}")
            ),
        }
    }
}

impl LogSource for ElasticsearchClient {
    fn name() -> &'static str {
        "elasticsearch"
    }

    fn scan(&self, window: TimeWindow) -> impl Stream<Item = IngestResult<RawLogEntry>> + Send {
        stream::try_unfold(ScrollState::Start, move |state| async move {
            let page = match state {
                ScrollState::Start => self.open_scroll(&window).await?,
                ScrollState::Continue(scroll_id) => match self.continue_scroll(&scroll_id).await {
                    Ok(page) => page,
                    Err(err) => {
                        self.clear_scroll(&scroll_id).await;
                        return Err(err);
                    }
                },
                ScrollState::Done => return Ok(None),
            };

            let next = match page.scroll_id {
                Some(scroll_id) if !page.hits.hits.is_empty() => ScrollState::Continue(scroll_id),
                Some(scroll_id) => {
                    self.clear_scroll(&scroll_id).await;
                    ScrollState::Done
                }
                None => ScrollState::Done,
            };

            Ok::<_, IngestError>(Some((page.hits.hits, next)))
        })
        .map_ok(|hits| {
            stream::iter(
                hits.into_iter()
                    .map(|hit| RawLogEntry::from_document(hit.source)),
            )
        })
        .try_flatten()
    }
}

impl PartitionStore for ElasticsearchClient {
    fn name() -> &'static str {
        "elasticsearch"
    }

    async fn ensure_partition(&self, partition: &str, schema: &PartitionSchema) -> IngestResult<()> {
        if self.partition_exists(partition).await? {
            return Ok(());
        }

        let response = self
            .request(Method::PUT, partition)
            .json(&schema.to_mapping())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(%partition, "created partition");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains(ALREADY_EXISTS_ERROR) {
            debug!(%partition, "partition created concurrently");
            return Ok(());
        }

        bail!(
            ErrorKind::PartitionCreationFailed,
            "Partition creation failed",
            format!("partition {partition} answered with status {status}: {body}")
        );
    }

    async fn bulk_upsert(&self, operations: &[UpsertOperation]) -> IngestResult<BulkResponse> {
        if operations.is_empty() {
            return Ok(BulkResponse::success());
        }

        let mut body = String::new();
        for operation in operations {
            let action = json!({
                "index": {
                    "_index": operation.partition,
                    "_id": operation.id.as_str(),
                }
            });
            let _ = writeln!(body, "{action}");
            let _ = writeln!(body, "{}", Value::Object(operation.document.clone()));
        }

        let response = self
            .request(Method::POST, "_bulk")
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        let response = check_status(
            response,
            ErrorKind::BulkWriteFailed,
            "Bulk request was rejected",
        )
        .await?;

        let parsed: BulkResponseBody = response.json().await?;
        if parsed.items.len() != operations.len() {
            bail!(
                ErrorKind::BulkWriteFailed,
                "Bulk response does not match the request",
                format!(
                    "sent {} operations, received {} results",
                    operations.len(),
                    parsed.items.len()
                )
            );
        }

        let mut response = BulkResponse::success();
        for (index, (operation, item)) in operations.iter().zip(parsed.items).enumerate() {
            // A missing result counts as a server error.
            let Some(result) = item.into_values().next() else {
                response.failures.push(ItemFailure {
                    index,
                    id: operation.id.clone(),
                    status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    reason: "bulk response item has no result".to_string(),
                });
                continue;
            };
            if (200..300).contains(&result.status) {
                continue;
            }

            response.failures.push(ItemFailure {
                index,
                id: operation.id.clone(),
                status: result.status,
                reason: describe_item_error(result.error.as_ref()),
            });
        }

        Ok(response)
    }
}

/// Opens a fresh [`ElasticsearchClient`] per window.
#[derive(Debug, Clone)]
pub struct ElasticsearchConnector {
    config: ElasticsearchConfig,
}

impl ElasticsearchConnector {
    pub fn new(config: ElasticsearchConfig) -> Self {
        Self { config }
    }
}

impl Connector for ElasticsearchConnector {
    type Connection = ElasticsearchClient;

    async fn connect(&self) -> IngestResult<Self::Connection> {
        ElasticsearchClient::new(&self.config)
    }
}

fn source_error(err: reqwest::Error) -> IngestError {
    let kind = if err.is_connect() || err.is_timeout() {
        ErrorKind::SourceConnectionFailed
    } else {
        ErrorKind::SourceQueryFailed
    };

    ingest_error!(kind, "Request to the raw log indices failed", err.to_string(), source: err)
}

async fn check_status(
    response: Response,
    kind: ErrorKind,
    description: &'static str,
) -> IngestResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    bail!(kind, description, format!("status {status}: {body}"));
}

fn describe_item_error(error: Option<&Value>) -> String {
    let Some(error) = error else {
        return "unknown error".to_string();
    };

    let error_type = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (error_type, reason) {
        (Some(error_type), Some(reason)) => format!("{error_type}: {reason}"),
        (Some(error_type), None) => error_type.to_string(),
        (None, Some(reason)) => reason.to_string(),
        (None, None) => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_errors_are_described_by_type_and_reason() {
        let error = json!({"type": "mapper_parsing_exception", "reason": "failed to parse [dest]"});

        assert_eq!(
            describe_item_error(Some(&error)),
            "mapper_parsing_exception: failed to parse [dest]"
        );
        assert_eq!(describe_item_error(None), "unknown error");
    }

    #[test]
    fn trailing_slashes_are_dropped_from_the_url() {
        let client =
            ElasticsearchClient::new(&ElasticsearchConfig::with_url("http://localhost:9200/"))
                .unwrap();

        assert_eq!(client.base_url, "http://localhost:9200");
    }
}
