//! Wire-level behavior of the REST transport backend.

use grid_stats::{EntityQuery, HttpRequestSender, RequestSender, TransportError, TransportKind};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use url::Url;
use wiremock::{
    matchers::{body_string_contains, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn sender_for(server: &MockServer) -> HttpRequestSender {
    let base = Url::parse(&server.uri()).unwrap();
    HttpRequestSender::new(base, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn get_attributes_requests_projected_fields_and_parses_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/members"))
        .and(query_param("fields", "nodeId,roleName"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"nodeId": 1, "roleName": "storage"},
                {"nodeId": 2, "roleName": "proxy"},
            ]
        })))
        .mount(&server)
        .await;

    let sender = sender_for(&server);
    assert_eq!(sender.kind(), TransportKind::Http);
    let items = sender
        .get_attributes(&EntityQuery::new("members"), &["nodeId", "roleName"])
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].i64_("nodeId"), Some(1));
    assert_eq!(items[1].str_("roleName"), Some("proxy"));
}

#[tokio::test]
async fn query_params_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/caches"))
        .and(query_param("tier", "back"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let sender = sender_for(&server);
    let items = sender
        .get_attributes(&EntityQuery::new("caches").with("tier", "back"), &["size"])
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn missing_collection_is_an_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/federation"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let sender = sender_for(&server);
    let items = sender
        .get_attributes(&EntityQuery::new("federation"), &["service"])
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn reports_are_posted_as_xml_and_rows_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .and(body_string_contains("<report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"name": "DistributedSvc", "memberCount": 3}]
        })))
        .mount(&server)
        .await;

    let sender = sender_for(&server);
    let rows = sender
        .invoke_report("<report id=\"service-summary\"/>")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("memberCount"), Some(&json!(3)));
}

#[tokio::test]
async fn failed_report_surfaces_as_report_execution() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(500).set_body_string("report engine disabled"))
        .mount(&server)
        .await;

    let sender = sender_for(&server);
    let err = sender
        .invoke_report("<report id=\"service-summary\"/>")
        .await
        .unwrap_err();
    match err {
        TransportError::ReportExecution(message) => {
            assert!(message.contains("report engine disabled"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn structured_requests_keep_their_query_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/caches"))
        .and(query_param("links", ""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"service": "DistributedSvc", "name": "orders", "size": 32}]
        })))
        .mount(&server)
        .await;

    let sender = sender_for(&server);
    let tree = sender.get_structured("caches?links=").await.unwrap();
    let items = tree.get("items").and_then(|v| v.as_array()).unwrap();
    assert_eq!(items.len(), 1);
}
