//! Contract tests for the REST-API source connector.
//!
//! These run against a wiremock endpoint and verify the paging protocol,
//! request format, and error mapping, then drive a full search over a
//! sorted-only remote attribute.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use simsearch::catalog::{Attribute, Catalog};
use simsearch::config::{AttributeConfig, SearchConfig};
use simsearch::error::SimSearchError;
use simsearch::search::{execute_search, SearchClause, SearchRequest};
use simsearch::source::{ColumnSelection, RestSource, SourceConnector, TableSource};
use simsearch::types::{Algorithm, OperationKind};

fn selection() -> ColumnSelection {
    ColumnSelection {
        key_column: "id".into(),
        columns: vec!["cuisine".into()],
    }
}

fn source(server: &MockServer, api_key: Option<&str>, page_size: usize) -> RestSource {
    RestSource::new(
        "remote",
        format!("{}/search", server.uri()),
        api_key.map(str::to_string),
        page_size,
        Duration::from_secs(5),
    )
    .unwrap()
}

fn page(rows: &[(&str, &str)]) -> serde_json::Value {
    json!({
        "results": rows
            .iter()
            .map(|(id, v)| json!({"id": id, "values": [v]}))
            .collect::<Vec<_>>()
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Request format
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pages_until_short_page() {
    let server = MockServer::start().await;

    for (offset, rows) in [
        (0, vec![("r1", "pizza"), ("r2", "sushi")]),
        (2, vec![("r3", "pasta"), ("r4", "pizza")]),
        (4, vec![("r5", "grill")]),
    ] {
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({"offset": offset, "limit": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&rows)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let rows = source(&server, None, 2)
        .scan(&selection(), None, None)
        .await
        .unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r3", "r4", "r5"]);
    assert_eq!(rows[2].values, vec!["pasta".to_string()]);
}

#[tokio::test]
async fn test_scan_respects_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({"offset": 0, "limit": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[
            ("r1", "pizza"),
            ("r2", "sushi"),
            ("r3", "pasta"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = source(&server, None, 10)
        .scan(&selection(), None, Some(3))
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_request_carries_selection_filter_and_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("X-API-Key", "secret"))
        .and(body_partial_json(json!({
            "key_column": "id",
            "columns": ["cuisine"],
            "filter": "price < 30"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[("r1", "pizza")])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = source(&server, Some("secret"), 100)
        .scan(&selection(), Some("price < 30"), None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_numeric_ids_and_null_values() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 42, "values": [null]}, {"id": "7", "values": [3.5]}]
        })))
        .mount(&server)
        .await;

    let rows = source(&server, None, 100)
        .scan(&selection(), None, None)
        .await
        .unwrap();
    assert_eq!(rows[0].id, "42");
    assert_eq!(rows[0].values, vec![String::new()]);
    assert_eq!(rows[1].values, vec!["3.5".to_string()]);
}

// ────────────────────────────────────────────────────────────────────────────
// Error mapping
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_is_source_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = source(&server, None, 100)
        .scan(&selection(), None, None)
        .await
        .unwrap_err();
    match err {
        SimSearchError::SourceUnavailable { attribute, reason } => {
            assert_eq!(attribute, "remote");
            assert!(reason.contains("500"), "reason: {reason}");
        }
        other => panic!("expected SourceUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_source_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = source(&server, None, 100)
        .scan(&selection(), None, None)
        .await
        .unwrap_err();
    assert!(err.is_source_failure());
}

#[tokio::test]
async fn test_lookup_is_unsupported() {
    let server = MockServer::start().await;
    let remote = source(&server, None, 100);

    assert!(!remote.supports_random_access());
    let err = remote.lookup(&selection(), None, "r1").await.unwrap_err();
    assert!(matches!(err, SimSearchError::UnsupportedAccess { .. }));
}

// ────────────────────────────────────────────────────────────────────────────
// Search over a remote attribute
// ────────────────────────────────────────────────────────────────────────────

fn catalog(server: &MockServer) -> Catalog {
    let catalog = Catalog::new();
    catalog.register_source(Arc::new(source(server, None, 100)));
    catalog.register_source(Arc::new(
        TableSource::parse(
            "local",
            "id;price\nr1;20\nr2;45\nr3;22\nr4;18\n",
            ';',
            true,
        )
        .unwrap(),
    ));

    for (name, source_name, operation, column) in [
        ("cuisine", "remote", OperationKind::CategoricalTopk, "cuisine"),
        ("price", "local", OperationKind::NumericalTopk, "price"),
    ] {
        let config = AttributeConfig {
            name: name.into(),
            source: source_name.into(),
            operation,
            key_column: "id".into(),
            search_columns: vec![column.into()],
            alias: None,
            decay: None,
            scale: None,
            token_delimiter: None,
            spatial_metric: Default::default(),
            normalization: Default::default(),
        };
        catalog
            .register_attribute(Attribute::from_config(&config).unwrap())
            .unwrap();
    }
    catalog
}

fn request(algorithm: Algorithm) -> SearchRequest {
    SearchRequest {
        clauses: vec![
            SearchClause {
                attribute: "cuisine".into(),
                value: json!("pasta"),
                weights: vec![1.0],
                filter: None,
                decay: None,
                scale: None,
            },
            SearchClause {
                attribute: "price".into(),
                value: json!(20),
                weights: vec![1.0],
                filter: None,
                decay: None,
                scale: None,
            },
        ],
        algorithm: Some(algorithm),
        k: 2,
        similarity_matrix: false,
        timeout_ms: None,
    }
}

#[tokio::test]
async fn test_partial_search_over_remote_attribute() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[
            ("r1", "pizza,pasta"),
            ("r2", "sushi"),
            ("r3", "pasta,grill"),
            ("r4", "pizza"),
        ])))
        .mount(&server)
        .await;

    let response = execute_search(
        &catalog(&server),
        &SearchConfig::default(),
        request(Algorithm::PartialRandomAccess),
    )
    .await
    .unwrap();

    assert!(response.is_exact());
    let ids: Vec<_> = response.lists[0].results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r3"]);
    assert_eq!(response.access[0].random_accesses, 0);
}

#[tokio::test]
async fn test_threshold_never_contacts_remote() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[])))
        .expect(0)
        .mount(&server)
        .await;

    let err = execute_search(
        &catalog(&server),
        &SearchConfig::default(),
        request(Algorithm::Threshold),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SimSearchError::IncompatibleAlgorithm { .. }));
}

#[tokio::test]
async fn test_remote_failure_fails_search() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = execute_search(
        &catalog(&server),
        &SearchConfig::default(),
        request(Algorithm::NoRandomAccess),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), 502);
}
