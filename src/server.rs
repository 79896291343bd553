//! HTTP routes.

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;

use crate::{
    config::Environment,
    dataset::{HostEntry, HOSTS},
    document::DocumentStore,
    error::GatewayError,
    probe::{Availability, BackendStatus, Topology},
    state,
};

const TRACING_TARGET: &str = "hosts_gateway::server";

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

type AppState = Arc<state::State>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/hosts", get(hosts).post(create_host))
        .route("/hosts/{id}", delete(delete_host))
        .route("/data/{dataset}", get(dataset))
        .route("/cache/clear", get(clear_cache))
        .route("/cache/status", get(cache_status))
        .route("/sharding-info", get(sharding_info))
        .route("/health", get(health))
        .with_state(state)
}

/// Gateway errors as HTTP responses.
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type Result<T> = std::result::Result<T, ApiError>;

async fn hosts(State(state): State<AppState>) -> Result<Response> {
    fetch(&state, HOSTS).await
}

async fn dataset(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response> {
    fetch(&state, &name).await
}

async fn fetch(state: &state::State, name: &str) -> Result<Response> {
    let started = Instant::now();
    let fetched = state.gateway.fetch(name).await?;
    let elapsed = format!("{:.2}ms", started.elapsed().as_secs_f64() * 1000.0);

    let mut response = (
        [(header::CONTENT_TYPE, "application/json")],
        fetched.payload,
    )
        .into_response();
    let headers = response.headers_mut();
    headers.insert(X_CACHE, HeaderValue::from_static(fetched.source.header_value()));
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        headers.insert(X_RESPONSE_TIME, value);
    }
    Ok(response)
}

async fn create_host(
    State(state): State<AppState>,
    Json(entry): Json<HostEntry>,
) -> Result<(StatusCode, Json<HostEntry>)> {
    let gateway = &state.gateway;
    let dataset = gateway.datasets().resolve(HOSTS)?;
    gateway
        .durable()
        .insert(&dataset.collection, dataset.to_record(&entry))
        .await
        .map_err(GatewayError::from)?;
    gateway.invalidate(HOSTS).await?;
    tracing::info!(target: TRACING_TARGET, id = %entry.id, "host record created");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn delete_host(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    let gateway = &state.gateway;
    let dataset = gateway.datasets().resolve(HOSTS)?;
    let removed = gateway
        .durable()
        .delete(&dataset.collection, &dataset.id_field, &id)
        .await
        .map_err(GatewayError::from)?;
    if !removed {
        return Ok(StatusCode::NOT_FOUND);
    }
    gateway.invalidate(HOSTS).await?;
    tracing::info!(target: TRACING_TARGET, id = %id, "host record deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_cache(State(state): State<AppState>) -> Result<String> {
    let outcome = state.gateway.invalidate(HOSTS).await?;
    Ok(format!("{outcome} ({HOSTS})"))
}

async fn cache_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.gateway.cache_status(HOSTS).await?))
}

#[derive(Debug, Serialize)]
struct ShardingInfo {
    sharding_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    shards: Option<Vec<String>>,
    mode: &'static str,
    environment: Environment,
}

fn sharding_info_from(status: BackendStatus, environment: Environment) -> ShardingInfo {
    let mode = match (status.availability, status.topology) {
        (_, Some(Topology::Clustered)) => "sharded",
        (_, Some(Topology::SingleNode)) => "single-node",
        (Availability::Degraded, None) => "unknown",
        (_, None) => "unavailable",
    };
    let sharding_enabled = status.topology == Some(Topology::Clustered);
    ShardingInfo {
        sharding_enabled,
        shards: sharding_enabled.then_some(status.shards),
        mode,
        environment,
    }
}

async fn sharding_info(State(state): State<AppState>) -> Json<ShardingInfo> {
    let status = state.probe.probe_durable().await;
    Json(sharding_info_from(status, state.environment))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    durable: BackendStatus,
    volatile: BackendStatus,
    summary: String,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = state.probe.run().await;
    let status = if report.durable.availability == Availability::Unavailable {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let summary = report.summary();
    (
        status,
        Json(HealthResponse {
            durable: report.durable,
            volatile: report.volatile,
            summary,
        }),
    )
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Distributed Systems Demo</title></head>
<body>
<h1>Distributed Systems Demo</h1>
<h2>Pod hostname</h2>
<p id="hostname">{hostname}</p>
<p>Environment: <strong>{environment}</strong> ({architecture})</p>
<p>Backends at startup: {summary}</p>
<h2>Hosts</h2>
<ul id="host-list"></ul>
<script>
fetch('/hosts').then(r => r.json()).then(items => {{
  const list = document.getElementById('host-list');
  items.forEach(item => {{
    const li = document.createElement('li');
    li.textContent = `${{item.id}} (${{item.info}})`;
    list.appendChild(li);
  }});
}});
</script>
</body>
</html>
"#,
        hostname = escape(&state.hostname),
        environment = state.environment,
        architecture = state.environment.architecture(),
        summary = escape(&state.startup.summary()),
    ))
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
