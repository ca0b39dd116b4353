//! Cluster access: node listing and the per-node metrics proxy.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, HOST, USER_AGENT};
use http_body_util::{BodyExt, Empty};
use kubedrift_drift::resources::Node;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};

/// A node as seen at listing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub name: String,
}

impl NodeRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// What the scraper needs from the cluster.
pub trait ClusterClient: Send + Sync + 'static {
    fn list_nodes(&self) -> impl Future<Output = ClusterResult<Vec<NodeRef>>> + Send;

    /// GET `suffix` on `node` through the API server's node proxy.
    fn proxy_get(
        &self,
        node: &str,
        suffix: &str,
        timeout: Duration,
    ) -> impl Future<Output = ClusterResult<Bytes>> + Send;
}

#[derive(Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<Node>,
}

/// Plain HTTP/1.1 client for the API server, typically reached through
/// `kubectl proxy` or a sidecar that terminates TLS.
#[derive(Debug, Clone)]
pub struct ApiServerClient {
    authority: String,
    token: Option<String>,
    list_timeout: Duration,
}

impl ApiServerClient {
    /// Accepts `host:port` or `http://host:port`.
    pub fn new(api_server: &str) -> ClusterResult<Self> {
        let trimmed = api_server.trim().trim_end_matches('/');
        let authority = trimmed.strip_prefix("http://").unwrap_or(trimmed);
        if authority.is_empty() || authority.contains("://") || authority.contains('/') {
            return Err(ClusterError::InvalidAddress(api_server.to_string()));
        }
        Ok(Self {
            authority: authority.to_string(),
            token: None,
            list_timeout: Duration::from_secs(10),
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    async fn get(&self, path: &str, timeout: Duration) -> ClusterResult<Bytes> {
        match tokio::time::timeout(timeout, self.get_inner(path)).await {
            Ok(result) => result,
            Err(_) => Err(ClusterError::Timeout(timeout)),
        }
    }

    async fn get_inner(&self, path: &str) -> ClusterResult<Bytes> {
        let uri = format!("http://{}{path}", self.authority);

        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .map_err(|e| ClusterError::Connect(format!("{}: {e}", self.authority)))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "api server connection ended with error");
            }
        });

        let mut req = http::Request::builder()
            .method(http::Method::GET)
            .uri(path)
            .header(HOST, &self.authority)
            .header(USER_AGENT, "kubedrift/0.1")
            .header(ACCEPT, "application/json, text/plain");
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = req
            .body(Empty::<Bytes>::new())
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            debug!(%uri, %status, "api server non-2xx");
            return Err(ClusterError::Status {
                status: status.as_u16(),
                uri,
            });
        }
        Ok(body)
    }
}

impl ClusterClient for ApiServerClient {
    async fn list_nodes(&self) -> ClusterResult<Vec<NodeRef>> {
        let body = self.get("/api/v1/nodes", self.list_timeout).await?;
        let list: NodeList =
            serde_json::from_slice(&body).map_err(|e| ClusterError::Decode(e.to_string()))?;
        Ok(list
            .items
            .into_iter()
            .map(|n| NodeRef::new(n.metadata.name))
            .filter(|n| !n.name.is_empty())
            .collect())
    }

    async fn proxy_get(&self, node: &str, suffix: &str, timeout: Duration) -> ClusterResult<Bytes> {
        let path = format!(
            "/api/v1/nodes/{node}/proxy/{}",
            suffix.trim_start_matches('/')
        );
        self.get(&path, timeout).await
    }
}
