//! REST API handlers.
//!
//! Reads go straight to the store by key prefix; writes go through the
//! drift recorder. Every JSON response uses the same envelope.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::warn;

use kubedrift_drift::{RecordError, Resource, ResourceKind, UnknownKind};
use kubedrift_metrics::{MetricSample, series_subtree};
use kubedrift_store::StoreError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn store_error(e: StoreError) -> axum::response::Response {
    match e {
        StoreError::Key(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
        e => {
            warn!(error = %e, "store read failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

fn record_error(e: RecordError) -> axum::response::Response {
    match e {
        RecordError::Key(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
        RecordError::Store(e) => store_error(e),
    }
}

fn unknown_kind(e: UnknownKind) -> axum::response::Response {
    error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
}

// ── Drift ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DriftPath {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

/// GET /api/v1/drift/{kind}[/{namespace}[/{name}]]
pub async fn get_drift(State(state): State<ApiState>, Path(path): Path<DriftPath>) -> impl IntoResponse {
    let kind = match path.kind.parse::<ResourceKind>() {
        Ok(kind) => kind,
        Err(e) => return unknown_kind(e),
    };
    let rest: Vec<&str> = [path.namespace.as_deref(), path.name.as_deref()]
        .into_iter()
        .flatten()
        .collect();

    match state.recorder.query(kind, &rest) {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => record_error(e),
    }
}

// ── Metrics ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MetricsPath {
    pub node: String,
    pub namespace: Option<String>,
    pub pod: Option<String>,
    pub metric: Option<String>,
}

/// GET /api/v1/metrics/nodes/{node}[/{namespace}[/{pod}[/{metric}]]]
pub async fn get_node_metrics(
    State(state): State<ApiState>,
    Path(path): Path<MetricsPath>,
) -> impl IntoResponse {
    // Those subtrees hold drift records; no node is ever scraped under them.
    if let Some(kind) = ResourceKind::from_segment(&path.node) {
        let msg = format!("node name {:?} is reserved for {kind} drift records", path.node);
        return error_response(&msg, StatusCode::BAD_REQUEST).into_response();
    }
    let rest: Vec<&str> = [
        path.namespace.as_deref(),
        path.pod.as_deref(),
        path.metric.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();

    let prefix = match series_subtree(&path.node, &rest) {
        Ok(prefix) => prefix,
        Err(e) => return store_error(e.into()),
    };
    match state.store.scan_json::<MetricSample>(prefix.as_str()) {
        Ok(samples) => {
            let samples: Vec<MetricSample> = samples.into_iter().map(|(_, s)| s).collect();
            ApiResponse::ok(samples).into_response()
        }
        Err(e) => store_error(e),
    }
}

// ── Resources ──────────────────────────────────────────────────

#[derive(serde::Serialize)]
struct Recorded {
    key: String,
}

/// POST /api/v1/resources
pub async fn record_resource(
    State(state): State<ApiState>,
    body: Result<Json<Resource>, JsonRejection>,
) -> impl IntoResponse {
    let Json(resource) = match body {
        Ok(body) => body,
        Err(e) => return error_response(&e.body_text(), StatusCode::BAD_REQUEST).into_response(),
    };
    match state.recorder.record(&resource) {
        Ok(key) => (
            StatusCode::CREATED,
            ApiResponse::ok(Recorded {
                key: key.into_string(),
            }),
        )
            .into_response(),
        Err(e) => record_error(e),
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
