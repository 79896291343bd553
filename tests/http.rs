//! End-to-end checks of the HTTP surface against in-process backends.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use hosts_gateway::{
    config::Environment, document::MemoryDocumentStore, redis::RedisCache, server,
    store::MemoryCache, State,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn seeded_store() -> Arc<MemoryDocumentStore> {
    let record = json!({"pod": "pod-a", "info": "ready"});
    let records = vec![record.as_object().cloned().unwrap()];
    Arc::new(MemoryDocumentStore::new().with_records("hosts", records))
}

async fn app(durable: Arc<MemoryDocumentStore>) -> Router {
    let state = State::assemble(durable, Arc::new(MemoryCache::new()), Environment::Test).await;
    server::router(Arc::new(state))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, String) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, String) {
    send(app, Method::GET, uri, None).await
}

#[tokio::test]
async fn fetch_invalidate_fetch() {
    let app = app(seeded_store()).await;

    let (status, headers, body) = get(&app, "/hosts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "MISS");
    assert_eq!(headers["content-type"], "application/json");
    assert!(headers["x-response-time"].to_str().unwrap().ends_with("ms"));
    let first: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(first, json!([{"id": "pod-a", "info": "ready"}]));

    let (_, headers, again) = get(&app, "/hosts").await;
    assert_eq!(headers["x-cache"], "HIT");
    assert_eq!(again, body);

    let (status, _, ack) = get(&app, "/cache/clear").await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack.starts_with("cache cleared"));

    let (_, headers, after) = get(&app, "/hosts").await;
    assert_eq!(headers["x-cache"], "MISS");
    assert_eq!(after, body);
}

#[tokio::test]
async fn cache_status_tracks_the_entry() {
    let app = app(seeded_store()).await;

    let (_, _, body) = get(&app, "/cache/status").await;
    let status: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(status, json!({"available": true, "entryCount": 0, "ttlRemaining": -1}));

    get(&app, "/hosts").await;
    let (_, _, body) = get(&app, "/cache/status").await;
    let status: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(status["entryCount"], 1);
    let ttl = status["ttlRemaining"].as_i64().unwrap();
    assert!((290..=300).contains(&ttl), "ttl {ttl}");
}

#[tokio::test]
async fn generic_dataset_route() {
    let app = app(seeded_store()).await;

    let (status, headers, _) = get(&app, "/data/hosts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "MISS");

    let (status, _, body) = get(&app, "/data/pods").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("unknown dataset"));
}

#[tokio::test]
async fn writes_go_to_the_durable_store_and_invalidate() {
    let app = app(seeded_store()).await;
    get(&app, "/hosts").await;

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/hosts",
        Some(json!({"id": "pod-b", "info": "starting"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["id"], "pod-b");

    let (_, headers, body) = get(&app, "/hosts").await;
    assert_eq!(headers["x-cache"], "MISS");
    assert_eq!(serde_json::from_str::<Vec<Value>>(&body).unwrap().len(), 2);

    let (status, _, _) = send(&app, Method::DELETE, "/hosts/pod-a", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app, Method::DELETE, "/hosts/pod-a", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, _, body) = get(&app, "/hosts").await;
    let entries: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(entries, json!([{"id": "pod-b", "info": "starting"}]));
}

#[tokio::test]
async fn durable_outage_is_absorbed() {
    let durable = seeded_store();
    let app = app(durable.clone()).await;
    durable.set_offline(true);

    let (status, headers, body) = get(&app, "/hosts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "ERROR");
    let entries: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(entries[0]["id"], "Error");

    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["durable"]["availability"], "unavailable");

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/hosts",
        Some(json!({"id": "pod-c", "info": "new"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn sharding_info_reflects_topology() {
    let app = app(seeded_store()).await;
    let (_, _, body) = get(&app, "/sharding-info").await;
    let info: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        info,
        json!({"sharding_enabled": false, "mode": "single-node", "environment": "test"})
    );

    let shards = vec!["rs0".into(), "rs1".into()];
    let sharded = Arc::new(MemoryDocumentStore::new().with_shards(shards));
    let app = self::app(sharded).await;
    let (_, _, body) = get(&app, "/sharding-info").await;
    let info: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(info["sharding_enabled"], true);
    assert_eq!(info["shards"], json!(["rs0", "rs1"]));
    assert_eq!(info["mode"], "sharded");
}

#[tokio::test]
async fn unreachable_cache_never_hits() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let volatile = RedisCache::new("127.0.0.1", port)
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));
    let state = State::assemble(seeded_store(), Arc::new(volatile), Environment::Dev).await;
    let app = server::router(Arc::new(state));

    for _ in 0..2 {
        let (status, headers, _) = get(&app, "/hosts").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-cache"], "MISS");
    }

    let (_, _, body) = get(&app, "/cache/status").await;
    let status: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(status, json!({"available": false, "entryCount": 0, "ttlRemaining": -1}));

    let (status, _, ack) = get(&app, "/cache/clear").await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack.starts_with("cache unavailable"));
}

#[tokio::test]
async fn index_page_names_the_pod() {
    let durable = seeded_store();
    let state = State::assemble(durable, Arc::new(MemoryCache::new()), Environment::Prod).await;
    let hostname = state.hostname.clone();
    let app = server::router(Arc::new(state));

    let (status, headers, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers["content-type"].to_str().unwrap().starts_with("text/html"));
    assert!(body.contains("Distributed Systems Demo"));
    assert!(body.contains(&format!("<p id=\"hostname\">{hostname}</p>")));
    assert!(body.contains("durable: available (single-node), volatile: available"));
}
