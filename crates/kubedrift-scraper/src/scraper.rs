//! Periodic scrape cycles.
//!
//! Each cycle lists nodes, scrapes every node concurrently (one task per
//! node, each bounded by a timeout), and persists the allow-listed samples.
//! One node's failure never touches its siblings' results.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use kubedrift_drift::ResourceKind;
use kubedrift_metrics::{MetricAllowList, MetricSample, decode, sample_key};
use kubedrift_store::DriftStore;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::ClusterClient;
use crate::error::NodeError;

/// Scrape settings, fixed for the scraper's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeConfig {
    pub period: Duration,
    /// Path under each node's proxy, e.g. `metrics/cadvisor`.
    pub endpoint: String,
    /// Share of the period a single node may take before it is abandoned.
    pub timeout_fraction: f64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            endpoint: "metrics/cadvisor".to_string(),
            timeout_fraction: 0.9,
        }
    }
}

impl ScrapeConfig {
    pub fn node_timeout(&self) -> Duration {
        self.period.mul_f64(self.timeout_fraction.clamp(0.0, 1.0))
    }
}

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Listing,
    Dispatching,
    Collecting,
    Persisting,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Listing => "listing",
            CyclePhase::Dispatching => "dispatching",
            CyclePhase::Collecting => "collecting",
            CyclePhase::Persisting => "persisting",
        };
        f.write_str(s)
    }
}

/// Outcome counts for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Nodes returned by the listing.
    pub nodes: usize,
    pub succeeded: usize,
    /// Not scraped: the name collides with a drift record subtree.
    pub skipped: usize,
    /// Timed out, failed in transport or decode, or panicked.
    pub failed: usize,
    pub persisted: usize,
    /// Samples removed by the allow-list.
    pub dropped: usize,
    pub write_failures: usize,
}

struct NodeOutcome {
    node: String,
    result: Result<ScrapedNode, NodeError>,
}

struct ScrapedNode {
    samples: Vec<MetricSample>,
    dropped: usize,
}

/// Drives scrape cycles against a [`ClusterClient`].
pub struct Scraper<C> {
    client: Arc<C>,
    store: DriftStore,
    allow_list: Arc<MetricAllowList>,
    config: ScrapeConfig,
    phase: watch::Sender<CyclePhase>,
    /// Single permit; held for the whole of a cycle.
    cycle: Arc<Semaphore>,
}

impl<C: ClusterClient> Scraper<C> {
    pub fn new(
        client: C,
        store: DriftStore,
        allow_list: Arc<MetricAllowList>,
        config: ScrapeConfig,
    ) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self {
            client: Arc::new(client),
            store,
            allow_list,
            config,
            phase,
            cycle: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe_phase(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: CyclePhase) {
        self.phase.send_replace(phase);
        debug!(%phase, "scrape cycle phase");
    }

    /// Run one full cycle and report what happened.
    pub async fn scrape_once(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        self.enter(CyclePhase::Listing);
        let nodes = match self.client.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "failed to list nodes; skipping cycle");
                Vec::new()
            }
        };
        report.nodes = nodes.len();
        let nodes: Vec<_> = nodes
            .into_iter()
            .filter(|node| match ResourceKind::from_segment(&node.name) {
                Some(kind) => {
                    warn!(node = %node.name, %kind, "node name shadows drift records; not scraping");
                    false
                }
                None => true,
            })
            .collect();
        report.skipped = report.nodes - nodes.len();
        if nodes.is_empty() {
            self.enter(CyclePhase::Idle);
            return report;
        }

        self.enter(CyclePhase::Dispatching);
        let node_timeout = self.config.node_timeout();
        let (tx, mut rx) = mpsc::channel::<NodeOutcome>(nodes.len());
        for node in nodes {
            let tx = tx.clone();
            let client = Arc::clone(&self.client);
            let allow_list = Arc::clone(&self.allow_list);
            let endpoint = self.config.endpoint.clone();
            tokio::spawn(async move {
                let scrape = scrape_node(&*client, &node.name, &endpoint, &allow_list, node_timeout);
                let result = match tokio::time::timeout(node_timeout, scrape).await {
                    Ok(result) => result,
                    Err(_) => Err(NodeError::Timeout(node_timeout)),
                };
                let _ = tx
                    .send(NodeOutcome {
                        node: node.name,
                        result,
                    })
                    .await;
            });
        }
        // Fan-in ends once every task has sent or died.
        drop(tx);

        self.enter(CyclePhase::Collecting);
        let mut scraped = Vec::new();
        while let Some(outcome) = rx.recv().await {
            match outcome.result {
                Ok(node) => {
                    debug!(node = %outcome.node, samples = node.samples.len(), dropped = node.dropped, "node scraped");
                    report.succeeded += 1;
                    report.dropped += node.dropped;
                    scraped.push((outcome.node, node.samples));
                }
                Err(e) => {
                    warn!(node = %outcome.node, error = %e, "node scrape failed");
                }
            }
        }
        report.failed = report.nodes - report.skipped - report.succeeded;

        self.enter(CyclePhase::Persisting);
        for (node, samples) in scraped {
            for sample in samples {
                if self.persist(&node, &sample) {
                    report.persisted += 1;
                } else {
                    report.write_failures += 1;
                }
            }
        }

        self.enter(CyclePhase::Idle);
        info!(
            nodes = report.nodes,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            persisted = report.persisted,
            dropped = report.dropped,
            write_failures = report.write_failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scrape cycle complete"
        );
        report
    }

    fn persist(&self, node: &str, sample: &MetricSample) -> bool {
        let key = match sample_key(node, sample) {
            Ok(key) => key,
            Err(e) => {
                warn!(%node, metric = %sample.name, error = %e, "cannot key sample");
                return false;
            }
        };
        match self.store.put_json(&key, sample) {
            Ok(()) => {
                debug!(%key, "sample written");
                true
            }
            Err(e) => {
                error!(%key, error = %e, "failed to write sample");
                false
            }
        }
    }
}

impl<C: ClusterClient> Scraper<C> {
    /// Start a cycle in the background unless one is already running.
    pub fn try_start_cycle(self: &Arc<Self>) -> Option<JoinHandle<CycleReport>> {
        let permit = Arc::clone(&self.cycle).try_acquire_owned().ok()?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let report = this.scrape_once().await;
            drop(permit);
            report
        }))
    }

    /// Scrape every `period` until `shutdown` flips. A tick that finds the
    /// previous cycle still running is skipped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            period_ms = self.config.period.as_millis() as u64,
            endpoint = %self.config.endpoint,
            "scraper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.try_start_cycle().is_none() {
                        warn!("previous scrape cycle still running; skipping tick");
                    }
                }
                _ = shutdown.changed() => {
                    info!("scraper shutting down");
                    break;
                }
            }
        }
    }
}

async fn scrape_node<C: ClusterClient>(
    client: &C,
    node: &str,
    endpoint: &str,
    allow_list: &MetricAllowList,
    timeout: Duration,
) -> Result<ScrapedNode, NodeError> {
    let body = client.proxy_get(node, endpoint, timeout).await?;
    let mut samples = decode(&body, now_ms())?;
    let dropped = allow_list.retain(&mut samples);
    for sample in &mut samples {
        sample.tag_node(node);
    }
    Ok(ScrapedNode { samples, dropped })
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
