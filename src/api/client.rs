//! HTTP client for the remote document API
//!
//! Provides:
//! - Bearer-token authentication
//! - Pagination over list endpoints
//! - Status mapping onto [`Error`]
//! - Gate, retry and rate limiting around every single request via [`CallStack`]

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::config::ClientConfig;
use super::model::{
    Column, Doc, MutationHandle, MutationStatus, Page, RemoteResource, Row, RowInsert, TableRef,
};
use super::pagination::{PageRequest, PaginationHelper};
use super::shared_resources::{global_http_client, global_rate_limiter};
use super::RemoteApi;
use crate::concurrency::{CallStack, ConcurrencyGate, RateLimiter, RetryPolicy};
use crate::error::{Error, Result};
use crate::metrics::RequestTimer;

/// Remote API client over reqwest
pub struct CodaClient {
    http: Arc<Client>,
    base_url: String,
    api_token: String,
    stack: CallStack,
}

impl CodaClient {
    /// Client using the process-wide HTTP client and rate limiter
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = global_http_client()?;
        let limiter = global_rate_limiter(config.backoff_interval);
        Ok(Self::with_parts(http, config, limiter))
    }

    /// Client with explicit shared parts
    ///
    /// # Arguments
    /// * `http` - Shared HTTP client (Arc for cheap cloning)
    /// * `config` - Token, API root and call-stack settings
    /// * `limiter` - Rate limiter; share one instance between all clients of a token
    pub fn with_parts(http: Arc<Client>, config: &ClientConfig, limiter: Arc<RateLimiter>) -> Self {
        let retry = RetryPolicy::new(config.max_retries)
            .with_delay(config.retry_delay)
            .with_mode(config.retry_mode);
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            stack: CallStack::new(ConcurrencyGate::new(config.concurrency), retry, limiter),
        }
    }

    /// Middleware stack wrapped around every request
    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn table_path(doc_id: &str, table_id: &str) -> String {
        format!("/docs/{doc_id}/tables/{table_id}")
    }

    /// Perform one raw request. Never retried here; callers wrap it in the stack.
    async fn execute(
        &self,
        kind: &'static str,
        method: Method,
        url: &str,
        query: &[(&'static str, String)],
        body: Option<&Value>,
        expected: Option<StatusCode>,
    ) -> Result<Value> {
        debug!("{} {} with {} params", method, url, query.len());

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.api_token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let timer = RequestTimer::start(kind);
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                timer.finish(0);
                return Err(e.into());
            }
        };
        let status = response.status();
        timer.finish(status.as_u16());

        if !status.is_success() {
            let message = error_message(response).await;
            return Err(Error::from_status(
                status,
                format!("Status code: {}. Message: {}", status.as_u16(), message),
            ));
        }
        if let Some(expected) = expected {
            if status != expected {
                return Err(Error::UnexpectedStatus {
                    endpoint: url.to_string(),
                    expected: expected.as_u16(),
                    actual: status.as_u16(),
                });
            }
        }

        Ok(response.json::<Value>().await?)
    }

    async fn get_one<T>(&self, cancel: &CancellationToken, path: &str) -> Result<T>
    where
        T: RemoteResource + Send,
    {
        let url = self.url(path);
        let body = self
            .stack
            .call(cancel, || {
                self.execute("get", Method::GET, &url, &[], None, None)
            })
            .await?;
        T::from_raw(body)
    }

    async fn list_all<T>(&self, cancel: &CancellationToken, path: &str) -> Result<Vec<T>>
    where
        T: RemoteResource + Send,
    {
        let first = PageRequest::first(self.url(path));
        let items = PaginationHelper::collect_all(first, |req| async move {
            let body = self
                .stack
                .call(cancel, || {
                    self.execute("list", Method::GET, &req.url, &req.query, None, None)
                })
                .await?;
            Page::from_value(body)
        })
        .await?;
        items.into_iter().map(T::from_raw).collect()
    }

    async fn mutate(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        body: Value,
    ) -> Result<MutationHandle> {
        let url = self.url(path);
        let response = self
            .stack
            .call(cancel, || {
                self.execute(
                    "mutate",
                    method.clone(),
                    &url,
                    &[],
                    Some(&body),
                    Some(StatusCode::ACCEPTED),
                )
            })
            .await?;
        serde_json::from_value(response)
            .map_err(|e| Error::MalformedResponse(format!("mutation response of {url}: {e}")))
    }
}

/// Extract the service's error message, falling back to the raw body.
async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) => serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text),
        Err(_) => status.to_string(),
    }
}

#[async_trait]
impl RemoteApi for CodaClient {
    async fn list_docs(&self, cancel: &CancellationToken) -> Result<Vec<Doc>> {
        self.list_all(cancel, "/docs").await
    }

    async fn get_doc(&self, cancel: &CancellationToken, doc_id: &str) -> Result<Doc> {
        self.get_one(cancel, &format!("/docs/{doc_id}")).await
    }

    async fn list_tables(&self, cancel: &CancellationToken, doc_id: &str) -> Result<Vec<TableRef>> {
        self.list_all(cancel, &format!("/docs/{doc_id}/tables")).await
    }

    async fn get_table(
        &self,
        cancel: &CancellationToken,
        doc_id: &str,
        table_id: &str,
    ) -> Result<TableRef> {
        self.get_one(cancel, &Self::table_path(doc_id, table_id)).await
    }

    async fn list_columns(
        &self,
        cancel: &CancellationToken,
        doc_id: &str,
        table_id: &str,
    ) -> Result<Vec<Column>> {
        let path = format!("{}/columns", Self::table_path(doc_id, table_id));
        self.list_all(cancel, &path).await
    }

    async fn list_rows(
        &self,
        cancel: &CancellationToken,
        doc_id: &str,
        table_id: &str,
    ) -> Result<Vec<Row>> {
        let path = format!("{}/rows", Self::table_path(doc_id, table_id));
        self.list_all(cancel, &path).await
    }

    async fn delete_rows(
        &self,
        cancel: &CancellationToken,
        doc_id: &str,
        table_id: &str,
        row_ids: &[String],
    ) -> Result<MutationHandle> {
        let path = format!("{}/rows", Self::table_path(doc_id, table_id));
        self.mutate(cancel, Method::DELETE, &path, json!({ "rowIds": row_ids }))
            .await
    }

    async fn insert_rows(
        &self,
        cancel: &CancellationToken,
        doc_id: &str,
        table_id: &str,
        rows: &[RowInsert],
    ) -> Result<MutationHandle> {
        let path = format!("{}/rows", Self::table_path(doc_id, table_id));
        self.mutate(cancel, Method::POST, &path, json!({ "rows": rows }))
            .await
    }

    async fn mutation_completed(
        &self,
        cancel: &CancellationToken,
        handle: &MutationHandle,
    ) -> Result<bool> {
        let url = self.url(&format!("/mutationStatus/{}", handle.request_id));
        let body = self
            .stack
            .call(cancel, || {
                self.execute("status", Method::GET, &url, &[], None, None)
            })
            .await?;
        let status: MutationStatus = serde_json::from_value(body)
            .map_err(|e| Error::MalformedResponse(format!("mutation status: {e}")))?;
        Ok(status.completed)
    }
}
