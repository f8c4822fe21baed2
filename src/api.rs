//! HTTP access to a node-table backend.
//!
//! Endpoints, relative to `{endpoint}` (e.g. `http://host/api/process`):
//! - `GET  {endpoint}-data?skip&limit&sortField&sortOrder&filter`
//! - `PUT  {endpoint}-data/{pk}`
//! - `DELETE {endpoint}/delete/{pk}[?dry_run=true]`
//! - `POST {endpoint}/{pause|play|kill}/{pk}`

use crate::error::TableError;
use crate::model::{ActionCommand, DeleteOutcome, EditDelta, Pk, Row, RowSet, ViewQuery};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn query(&self, query: &ViewQuery) -> Result<RowSet, TableError>;

    /// Returns the server's echo of the row when it sends one.
    async fn update(&self, pk: Pk, delta: &EditDelta) -> Result<Option<Row>, TableError>;

    /// Dry-run deletion. The returned list includes `pk` itself.
    async fn delete_preview(&self, pk: Pk) -> Result<Vec<Pk>, TableError>;

    async fn delete(&self, pk: Pk) -> Result<DeleteOutcome, TableError>;

    async fn lifecycle(&self, command: ActionCommand, pk: Pk) -> Result<(), TableError>;
}

#[derive(Debug, Deserialize)]
struct DryRunResponse {
    #[serde(default)]
    deleted_nodes: Vec<Pk>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Clone)]
pub struct HttpNodeApi {
    http: reqwest::Client,
    endpoint: String,
    filter_param: String,
}

impl HttpNodeApi {
    pub fn new(
        endpoint: impl Into<String>,
        filter_param: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TableError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("node-table/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            filter_param: filter_param.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, suffix: &str) -> Result<Url, TableError> {
        let raw = format!("{}{suffix}", self.endpoint);
        Url::parse(&raw).map_err(|e| TableError::Transport(format!("invalid url {raw}: {e}")))
    }

    pub fn query_url(&self, query: &ViewQuery) -> Result<Url, TableError> {
        let mut url = self.url("-data")?;
        url.query_pairs_mut()
            .append_pair("skip", &query.skip.to_string())
            .append_pair("limit", &query.limit.to_string())
            .append_pair("sortField", &query.sort_field)
            .append_pair("sortOrder", query.sort_order.as_query_str())
            .append_pair(&self.filter_param, &query.filter.to_query_value());
        Ok(url)
    }

    pub fn update_url(&self, pk: Pk) -> Result<Url, TableError> {
        self.url(&format!("-data/{pk}"))
    }

    pub fn delete_url(&self, pk: Pk, dry_run: bool) -> Result<Url, TableError> {
        let mut url = self.url(&format!("/delete/{pk}"))?;
        if dry_run {
            url.query_pairs_mut().append_pair("dry_run", "true");
        }
        Ok(url)
    }

    pub fn lifecycle_url(&self, command: ActionCommand, pk: Pk) -> Result<Url, TableError> {
        self.url(&format!("/{}/{pk}", command.endpoint_verb()))
    }
}

/// Maps a non-2xx response to a rejection, keeping the `detail` field when
/// the body carries one.
fn rejection(status: StatusCode, body: &[u8]) -> TableError {
    let detail = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .map(|b| match b.detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
    TableError::ServerRejection {
        status: status.as_u16(),
        detail,
    }
}

async fn checked_body(resp: Response) -> Result<Bytes, TableError> {
    let status = resp.status();
    let body = resp.bytes().await?;
    if !status.is_success() {
        return Err(rejection(status, &body));
    }
    Ok(body)
}

/// A 2xx update is accepted whatever its body says. The row echo is only
/// used when the body actually is a row.
fn echoed_row(body: &[u8]) -> Option<Row> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "update acknowledged with non-JSON body");
            return None;
        }
    };
    match serde_json::from_value::<Row>(value) {
        Ok(row) => Some(row),
        Err(_) => {
            tracing::debug!("update acknowledged without a row echo");
            None
        }
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, TableError> {
    let body = checked_body(resp).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl NodeApi for HttpNodeApi {
    async fn query(&self, query: &ViewQuery) -> Result<RowSet, TableError> {
        let url = self.query_url(query)?;
        tracing::debug!(%url, "GET rows");
        let resp = self.http.get(url).send().await?;
        read_json(resp).await
    }

    async fn update(&self, pk: Pk, delta: &EditDelta) -> Result<Option<Row>, TableError> {
        let url = self.update_url(pk)?;
        tracing::debug!(%url, fields = delta.0.len(), "PUT row");
        let resp = self.http.put(url).json(delta).send().await?;
        let body = checked_body(resp).await?;
        Ok(echoed_row(&body))
    }

    async fn delete_preview(&self, pk: Pk) -> Result<Vec<Pk>, TableError> {
        let url = self.delete_url(pk, true)?;
        tracing::debug!(%url, "DELETE dry-run");
        let resp = self.http.delete(url).send().await?;
        let parsed: DryRunResponse = read_json(resp).await?;
        Ok(parsed.deleted_nodes)
    }

    async fn delete(&self, pk: Pk) -> Result<DeleteOutcome, TableError> {
        let url = self.delete_url(pk, false)?;
        tracing::debug!(%url, "DELETE");
        let resp = self.http.delete(url).send().await?;
        read_json(resp).await
    }

    async fn lifecycle(&self, command: ActionCommand, pk: Pk) -> Result<(), TableError> {
        let url = self.lifecycle_url(command, pk)?;
        tracing::debug!(%url, "POST lifecycle");
        let resp = self.http.post(url).send().await?;
        checked_body(resp).await.map(|_| ())
    }
}
