//! Error types for cluster access and node scrapes.

use std::time::Duration;

use kubedrift_metrics::DecodeError;
use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Failure talking to the cluster API server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("invalid api server address {0:?}")]
    InvalidAddress(String),

    #[error("failed to connect to {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{uri} returned status {status}")]
    Status { status: u16, uri: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Failure scraping a single node. Scoped to that node's share of a cycle.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("scrape timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
