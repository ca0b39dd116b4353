//! kubedrift-scraper — periodic metric collection from every cluster node.
//!
//! # Cycle
//!
//! ```text
//! Scraper::run()  (fixed period, one cycle at a time)
//!   └── scrape_once()
//!         ├── Listing      ClusterClient::list_nodes()
//!         ├── Dispatching  one task per node, each under a timeout
//!         ├── Collecting   mpsc fan-in: decode → allow-list → tag node
//!         └── Persisting   one DriftStore::put_json per sample
//! ```
//!
//! Listing failures skip the cycle; node failures drop that node's
//! samples; write failures drop that sample. The loop keeps going.

pub mod client;
pub mod error;
pub mod scraper;

pub use client::{ApiServerClient, ClusterClient, NodeRef};
pub use error::{ClusterError, ClusterResult, NodeError};
pub use scraper::{CyclePhase, CycleReport, ScrapeConfig, Scraper};
