mod common;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use common::Timeline;
use flowgen::config::{FlowRegistry, SuiteLoader};
use flowgen::http::create_http_client;
use flowgen::observability::EventWriter;
use flowgen::request::RequestResult;
use flowgen::suite::SuiteEngine;

async fn start_target() -> SocketAddr {
    let app = Router::new()
        .route("/healthcheck", get(|| async { "ok" }))
        .route(
            "/down",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                "slow"
            }),
        )
        .route(
            "/orders",
            post(|headers: HeaderMap, body: String| async move {
                let authorized = headers
                    .get("x-api-key")
                    .is_some_and(|v| v.as_bytes() == b"secret");
                let parsed: Option<serde_json::Value> = serde_json::from_str(&body).ok();
                let has_sku = parsed.is_some_and(|v| v.get("sku").is_some());
                if authorized && has_sku {
                    StatusCode::CREATED
                } else {
                    StatusCode::BAD_REQUEST
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn suite_yaml(addr: SocketAddr) -> String {
    format!(
        r#"
name: http-target
phases:
  - name: Probe
    duration: 1
    flow_rate: 3
flows:
  - flow: shopper
http_flows:
  shopper:
    setup:
      - name: warm
        url: http://{addr}/healthcheck
    steps:
      - name: healthcheck
        url: http://{addr}/healthcheck
        groups: [lb]
      - name: order
        method: post
        url: http://{addr}/orders
        headers:
          x-api-key: secret
        body:
          sku: A-1
          qty: 2
      - name: down
        url: http://{addr}/down
      - name: slow
        url: http://{addr}/slow
        timeout_ms: 50
      - name: never
        url: http://{addr}/healthcheck
"#
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn http_flows_classify_responses_and_abort_on_transport_errors() {
    let addr = start_target().await;
    let config = SuiteLoader::default()
        .load_str(&suite_yaml(addr), Path::new("http.yaml"))
        .unwrap()
        .config;

    let client = create_http_client().unwrap();
    let mut registry = FlowRegistry::new();
    registry.register_http_flows(&config, &client).unwrap();
    let definition = registry.build_suite(&config).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let events_path = tmp.path().join("events.jsonl");
    let writer = Arc::new(EventWriter::from_file(&events_path).unwrap());
    let timeline = Arc::new(Timeline::default());

    let engine = SuiteEngine::new(definition);
    engine.subscribe(writer.clone());
    engine.subscribe(timeline.clone());
    let report = engine.run().await.unwrap();

    assert_eq!(report.total_spawned(), 3);
    assert_eq!(report.failed_flows, 3, "slow step should fail every flow");
    assert_eq!(report.orphaned, 0);

    let requests = timeline.requests();
    let result_of = |name: &str| -> Vec<RequestResult> {
        requests
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.result.clone())
            .collect()
    };

    assert_eq!(result_of("warm"), vec![RequestResult::Status(200); 3]);
    assert_eq!(result_of("healthcheck"), vec![RequestResult::Status(200); 3]);
    assert_eq!(result_of("order"), vec![RequestResult::Status(201); 3]);
    assert_eq!(result_of("down"), vec![RequestResult::Status(503); 3]);
    assert_eq!(
        result_of("slow"),
        vec![RequestResult::Error("timeout".to_string()); 3]
    );
    assert!(result_of("never").is_empty());

    for request in requests.iter().filter(|r| r.name == "healthcheck") {
        assert_eq!(request.kind, "http");
        assert_eq!(request.groups, vec!["lb".to_string()]);
        assert_eq!(request.phase, "Probe");
    }

    let contents = std::fs::read_to_string(&events_path).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("invalid JSON: {e}\nline: {l}")))
        .collect();

    assert_eq!(lines.first().unwrap()["type"], "suite_started");
    assert_eq!(lines.last().unwrap()["type"], "suite_finished");

    let sequences: Vec<u64> = lines
        .iter()
        .map(|l| l["sequence"].as_u64().expect("sequence should be u64"))
        .collect();
    for window in sequences.windows(2) {
        assert!(window[1] > window[0], "sequence not monotonic: {sequences:?}");
    }

    let completed = lines
        .iter()
        .filter(|l| l["type"] == "request_completed")
        .count();
    assert_eq!(completed, requests.len());
}
