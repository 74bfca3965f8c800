//! Integration tests for CodaClient against a mock HTTP server

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use coda_exporter::api::{
    CellEdit, ClientConfig, CodaClient, MutationWaiter, RemoteApi, RowInsert,
};
use coda_exporter::concurrency::{Phase, RateLimiter, RateLimiterConfig};
use coda_exporter::Error;

/// Client against `server` with short timings and its own limiter
fn client(server: &MockServer, max_retries: u32) -> (CodaClient, Arc<RateLimiter>) {
    let config = ClientConfig::new("test-token")
        .with_base_url(server.uri())
        .with_max_retries(max_retries)
        .with_retry_delay(Duration::from_millis(10));
    let limiter = Arc::new(RateLimiter::with_config(RateLimiterConfig {
        backoff_interval: Duration::from_millis(100),
        recovery_poll_interval: Duration::from_millis(10),
        probe_error_pause: Duration::from_millis(10),
        probe_handoff_delay: Duration::from_millis(20),
    }));
    let http = Arc::new(reqwest::Client::new());
    let client = CodaClient::with_parts(http, &config, limiter.clone());
    (client, limiter)
}

#[tokio::test]
async fn test_get_doc_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs/d-1"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "d-1",
            "name": "Roadmap",
            "folder": {"id": "fl-1", "name": "Team"},
            "owner": "someone@example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client(&server, 0);
    let doc = client.get_doc(&CancellationToken::new(), "d-1").await.unwrap();

    assert_eq!(doc.name, "Roadmap");
    assert_eq!(doc.folder.id, "fl-1");
    assert_eq!(doc.raw["owner"], "someone@example.com");
}

#[tokio::test]
async fn test_rate_limit_absorbed_without_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs/d-1"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"message": "Too many requests"})),
        )
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/d-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "d-1", "name": "Roadmap"})),
        )
        .mount(&server)
        .await;

    let (client, limiter) = client(&server, 0);
    let doc = client.get_doc(&CancellationToken::new(), "d-1").await.unwrap();

    assert_eq!(doc.id, "d-1");
    assert_eq!(limiter.phase(), Phase::Normal);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs/d-1/tables/grid-1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/d-1/tables/grid-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "grid-1", "name": "Plans", "tableType": "table"
        })))
        .mount(&server)
        .await;

    let (client, _) = client(&server, 3);
    let table = client
        .get_table(&CancellationToken::new(), "d-1", "grid-1")
        .await
        .unwrap();
    assert_eq!(table.name, "Plans");
}

#[tokio::test]
async fn test_not_found_carries_service_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "statusCode": 404,
            "message": "Doc not found"
        })))
        .mount(&server)
        .await;

    let (client, _) = client(&server, 0);
    let err = client
        .get_doc(&CancellationToken::new(), "missing")
        .await
        .unwrap_err();

    match err {
        Error::NotFound(message) => {
            assert_eq!(message, "Status code: 404. Message: Doc not found");
        }
        other => panic!("expected not found, got {other}"),
    }
}

#[tokio::test]
async fn test_list_follows_next_page_link() {
    let server = MockServer::start().await;
    let next = format!("{}/docs/d-1/tables/grid-1/rows?pageToken=p2", server.uri());
    Mock::given(method("GET"))
        .and(path("/docs/d-1/tables/grid-1/rows"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "i-3", "index": 3, "values": {"c-1": "c"}}]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/d-1/tables/grid-1/rows"))
        .and(query_param("limit", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "i-1", "index": 1, "values": {"c-1": "a"}},
                {"id": "i-2", "index": 2, "values": {"c-1": "b"}}
            ],
            "nextPageLink": next
        })))
        .mount(&server)
        .await;

    let (client, _) = client(&server, 0);
    let rows = client
        .list_rows(&CancellationToken::new(), "d-1", "grid-1")
        .await
        .unwrap();

    let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["i-1", "i-2", "i-3"]);
}

#[tokio::test]
async fn test_insert_then_wait_for_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/docs/d-1/tables/grid-1/rows"))
        .and(body_json(json!({
            "rows": [{"cells": [{"column": "c-1", "value": "v1"}]}]
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "requestId": "mutate-abc",
            "addedRowIds": ["i-9"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mutationStatus/mutate-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"completed": false})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mutationStatus/mutate-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"completed": true})))
        .mount(&server)
        .await;

    let (client, _) = client(&server, 0);
    let cancel = CancellationToken::new();
    let rows = vec![RowInsert {
        cells: vec![CellEdit {
            column: "c-1".into(),
            value: json!("v1"),
        }],
    }];
    let handle = client
        .insert_rows(&cancel, "d-1", "grid-1", &rows)
        .await
        .unwrap();
    assert_eq!(handle.request_id, "mutate-abc");

    MutationWaiter::new(Duration::from_millis(20))
        .wait(&client, &cancel, &handle)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mutation_requires_accepted_status() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/docs/d-1/tables/grid-1/rows"))
        .and(body_json(json!({"rowIds": ["i-1", "i-2"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"requestId": "mutate:x"})))
        .mount(&server)
        .await;

    let (client, _) = client(&server, 0);
    let err = client
        .delete_rows(
            &CancellationToken::new(),
            "d-1",
            "grid-1",
            &["i-1".to_string(), "i-2".to_string()],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::UnexpectedStatus {
            expected: 202,
            actual: 200,
            ..
        }
    ));
}
