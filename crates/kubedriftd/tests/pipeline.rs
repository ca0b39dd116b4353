//! End-to-end pipeline tests.
//!
//! Scrape a simulated cluster into a real store, then read the results back
//! through the query API, the way the daemon wires things together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use serde_json::Value;
use tower::ServiceExt;

use kubedrift_api::build_router;
use kubedrift_drift::{DriftRecorder, FlattenOptions};
use kubedrift_metrics::MetricAllowList;
use kubedrift_scraper::{ClusterClient, ClusterError, ClusterResult, NodeRef, ScrapeConfig, Scraper};
use kubedrift_store::DriftStore;

struct SimulatedCluster {
    bodies: HashMap<String, Option<String>>,
}

impl ClusterClient for SimulatedCluster {
    async fn list_nodes(&self) -> ClusterResult<Vec<NodeRef>> {
        let mut names: Vec<_> = self.bodies.keys().cloned().collect();
        names.sort();
        Ok(names.into_iter().map(NodeRef::new).collect())
    }

    async fn proxy_get(&self, node: &str, _suffix: &str, _timeout: Duration) -> ClusterResult<Bytes> {
        match self.bodies.get(node) {
            Some(Some(body)) => Ok(Bytes::from(body.clone())),
            _ => Err(ClusterError::Status {
                status: 503,
                uri: format!("/api/v1/nodes/{node}/proxy/metrics/cadvisor"),
            }),
        }
    }
}

fn cadvisor_body(pods: &[&str]) -> String {
    let mut out = String::from(
        "# HELP container_memory_usage_bytes Current memory usage in bytes.\n\
         # TYPE container_memory_usage_bytes gauge\n",
    );
    for pod in pods {
        out.push_str(&format!(
            "container_memory_usage_bytes{{container=\"app\",namespace=\"default\",pod=\"{pod}\"}} 1.048576e+06 1700000000000\n"
        ));
    }
    out.push_str("# TYPE machine_cpu_cores gauge\nmachine_cpu_cores 8\n");
    out
}

fn cluster() -> SimulatedCluster {
    let mut bodies = HashMap::new();
    bodies.insert("node-a".to_string(), Some(cadvisor_body(&["web-0", "web-1"])));
    bodies.insert("node-b".to_string(), Some(cadvisor_body(&["db-0"])));
    bodies.insert("node-c".to_string(), None);
    SimulatedCluster { bodies }
}

fn scraper(store: &DriftStore) -> Scraper<SimulatedCluster> {
    Scraper::new(
        cluster(),
        store.clone(),
        Arc::new(MetricAllowList::cadvisor()),
        ScrapeConfig {
            period: Duration::from_secs(2),
            ..ScrapeConfig::default()
        },
    )
}

async fn get_json(router: axum::Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn scraped_samples_are_served_by_node() {
    let store = DriftStore::open_in_memory().unwrap();
    let report = scraper(&store).scrape_once().await;
    assert_eq!(report.nodes, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.persisted, 3);
    assert_eq!(report.dropped, 2);

    let recorder = DriftRecorder::new(store.clone(), FlattenOptions::default());
    let router = build_router(store, recorder);

    let (status, json) = get_json(router.clone(), "/api/v1/metrics/nodes/node-a").await;
    assert_eq!(status, StatusCode::OK);
    let samples = json["data"].as_array().unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0]["labels"]["node"], "node-a");
    assert_eq!(samples[0]["value"], "1048576");
    assert_eq!(samples[0]["timestamp_ms"], 1_700_000_000_000i64);

    let (_, json) = get_json(router.clone(), "/api/v1/metrics/nodes/node-a/default/web-1").await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (_, json) = get_json(router, "/api/v1/metrics/nodes/node-c").await;
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn drift_and_metrics_share_one_store() {
    let store = DriftStore::open_in_memory().unwrap();
    scraper(&store).scrape_once().await;

    let recorder = DriftRecorder::new(store.clone(), FlattenOptions::default());
    let router = build_router(store, recorder);

    let node = r#"{"kind":"Node","metadata":{"name":"node-a","uid":"n-a"},"spec":{"podCIDR":"10.244.0.0/24"}}"#;
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/resources")
        .header("content-type", "application/json")
        .body(Body::from(node))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let (_, json) = get_json(router.clone(), "/api/v1/drift/node").await;
    let records = json["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["key"], "/node/none/node-a/n-a");
    assert_eq!(records[0]["fields"]["pod_cidr"], "10.244.0.0/24");

    // A node's metric subtree never picks up drift records and vice versa.
    let (_, json) = get_json(router, "/api/v1/metrics/nodes/node-a").await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn samples_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kubedrift.redb");

    {
        let store = DriftStore::open(&path).unwrap();
        scraper(&store).scrape_once().await;
        store.close().unwrap();
    }

    let store = DriftStore::open(&path).unwrap();
    assert_eq!(store.len().unwrap(), 3);
    assert_eq!(store.get_by_prefix("/node-b/").unwrap().len(), 1);
}

#[test]
fn second_open_of_same_store_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kubedrift.redb");
    let _held = DriftStore::open(&path).unwrap();
    assert!(DriftStore::open(&path).is_err());
}
