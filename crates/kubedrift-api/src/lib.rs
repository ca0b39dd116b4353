//! kubedrift-api — HTTP query surface for kubedrift.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/drift/{kind}[/{namespace}[/{name}]]` | Drift records under a subtree |
//! | GET | `/api/v1/metrics/nodes/{node}[/{namespace}[/{pod}[/{metric}]]]` | Metric samples under a subtree |
//! | POST | `/api/v1/resources` | Record one resource (JSON with `kind`) |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use kubedrift_drift::DriftRecorder;
use kubedrift_store::DriftStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: DriftStore,
    pub recorder: DriftRecorder,
}

/// Build the complete API router.
pub fn build_router(store: DriftStore, recorder: DriftRecorder) -> Router {
    let state = ApiState { store, recorder };

    let api_routes = Router::new()
        .route("/drift/{kind}", get(handlers::get_drift))
        .route("/drift/{kind}/{namespace}", get(handlers::get_drift))
        .route("/drift/{kind}/{namespace}/{name}", get(handlers::get_drift))
        .route("/metrics/nodes/{node}", get(handlers::get_node_metrics))
        .route("/metrics/nodes/{node}/{namespace}", get(handlers::get_node_metrics))
        .route("/metrics/nodes/{node}/{namespace}/{pod}", get(handlers::get_node_metrics))
        .route(
            "/metrics/nodes/{node}/{namespace}/{pod}/{metric}",
            get(handlers::get_node_metrics),
        )
        .route("/resources", post(handlers::record_resource))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use kubedrift_drift::FlattenOptions;
    use kubedrift_metrics::{MetricSample, sample_key};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn router() -> (Router, DriftStore) {
        let store = DriftStore::open_in_memory().unwrap();
        let recorder = DriftRecorder::new(store.clone(), FlattenOptions::default());
        (build_router(store.clone(), recorder), store)
    }

    async fn send(router: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    const POD: &str = r#"{"kind":"Pod","metadata":{"name":"web-0","namespace":"default","uid":"u1"},"status":{"phase":"Running"}}"#;

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (router, _) = router();
        let resp = router.oneshot(get("/healthz")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn post_resource_then_query_drift() {
        let (router, _) = router();

        let (status, json) = send(router.clone(), post_json("/api/v1/resources", POD)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["key"], "/pod/default/web-0/u1");

        let (status, json) = send(router.clone(), get("/api/v1/drift/pod/default")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
        assert_eq!(json["data"][0]["fields"]["phase"], "Running");

        let (_, json) = send(router.clone(), get("/api/v1/drift/pods/default/web-0")).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 1);

        let (_, json) = send(router, get("/api/v1/drift/pod/kube-system")).await;
        assert!(json["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deployment_with_null_template_timestamp_is_recorded() {
        let (router, _) = router();
        let body = r#"{
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "default", "uid": "d1", "creationTimestamp": "2024-03-02T10:15:00Z"},
            "spec": {
                "replicas": 2,
                "strategy": {"type": "RollingUpdate"},
                "template": {
                    "metadata": {"creationTimestamp": null, "labels": {"app": "web"}},
                    "spec": {"containers": [{"name": "nginx", "image": "nginx:1.25", "resources": {}}]}
                }
            },
            "status": {"replicas": 2, "readyReplicas": 2}
        }"#;

        let (status, json) = send(router.clone(), post_json("/api/v1/resources", body)).await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        assert_eq!(json["data"]["key"], "/deployment/default/web/d1");

        let (_, json) = send(router, get("/api/v1/drift/deployment/default")).await;
        assert_eq!(json["data"][0]["fields"]["replicas"], "2");
        assert_eq!(json["data"][0]["fields"]["creation_timestamp"], "2024-03-02T10:15:00Z");
    }

    #[tokio::test]
    async fn metrics_under_kind_name_are_rejected() {
        let (router, _) = router();
        let node = r#"{"kind":"Node","metadata":{"name":"node-a","uid":"u1"}}"#;
        let (status, _) = send(router.clone(), post_json("/api/v1/resources", node)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = send(router.clone(), get("/api/v1/metrics/nodes/node")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);

        let (status, json) = send(router, get("/api/v1/drift/node")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_kind_is_bad_request() {
        let (router, _) = router();

        let (status, json) = send(router.clone(), get("/api/v1/drift/configmap")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);

        let body = r#"{"kind":"ConfigMap","metadata":{"name":"x","uid":"y"}}"#;
        let (status, _) = send(router, post_json("/api/v1/resources", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn resource_without_uid_is_bad_request() {
        let (router, store) = router();
        let body = r#"{"kind":"Pod","metadata":{"name":"web-0","namespace":"default"}}"#;
        let (status, _) = send(router, post_json("/api/v1/resources", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn node_metrics_narrow_by_path() {
        let (router, store) = router();
        let samples = [
            ("node-1", "default", "web-0", "container_cpu_usage_seconds_total"),
            ("node-1", "default", "web-0", "container_memory_usage_bytes"),
            ("node-1", "default", "web-1", "container_cpu_usage_seconds_total"),
            ("node-10", "default", "web-0", "container_cpu_usage_seconds_total"),
        ];
        for (node, ns, pod, metric) in samples {
            let sample = MetricSample::new(metric, 1.0, 0)
                .with_label("namespace", ns)
                .with_label("pod", pod)
                .with_label("container", "app")
                .with_label("node", node);
            store.put_json(&sample_key(node, &sample).unwrap(), &sample).unwrap();
        }

        let count = |json: &Value| json["data"].as_array().map(Vec::len).unwrap_or(0);

        let (status, json) = send(router.clone(), get("/api/v1/metrics/nodes/node-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count(&json), 3);

        let (_, json) = send(router.clone(), get("/api/v1/metrics/nodes/node-1/default/web-0")).await;
        assert_eq!(count(&json), 2);

        let (_, json) = send(
            router.clone(),
            get("/api/v1/metrics/nodes/node-1/default/web-0/container_memory_usage_bytes"),
        )
        .await;
        assert_eq!(count(&json), 1);
        assert_eq!(json["data"][0]["value"], "1");

        let (_, json) = send(router, get("/api/v1/metrics/nodes/node-2")).await;
        assert_eq!(count(&json), 0);
    }
}
