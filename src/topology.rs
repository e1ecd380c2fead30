//! The topology client: an external collaborator, owned by reference, that resolves a node tag
//! to a TCP endpoint and enumerates the cluster's current membership.
//!
//! This crate treats it as a black box (section 1, out of scope); only the interface the worker
//! needs is specified here.

use async_trait::async_trait;
use tokio_rustls::rustls::Certificate;
use url::Url;

use crate::error::SubscriptionWorkerError;

/// A cluster member, as returned by the topology client.
#[derive(Debug, Clone)]
pub struct TopologyNode {
    pub cluster_tag: String,
    pub url: Url,
    pub certificate: Option<Certificate>,
}

/// The result of resolving a node tag (or an explicit chosen node) to a TCP endpoint.
#[derive(Debug, Clone)]
pub struct TcpConnectionInfo {
    pub url: Url,
    pub certificate: Option<Certificate>,
    pub requested_node: String,
}

/// Read-only access to cluster topology, shared by reference between the worker and whatever
/// else in the client library also needs it; the worker never tears this down.
#[async_trait]
pub trait TopologyClient: Send + Sync {
    /// Resolve the TCP endpoint to open a subscription connection against. `chosen_node`, when
    /// set, pins the lookup to a specific node tag (used after a redirect); otherwise the
    /// topology client is free to pick one.
    async fn get_tcp_info(
        &self,
        chosen_node: Option<&str>,
    ) -> Result<TcpConnectionInfo, SubscriptionWorkerError>;

    /// The current set of known cluster members.
    async fn get_topology_nodes(&self) -> Result<Vec<TopologyNode>, SubscriptionWorkerError>;

    /// Look up a node by its tag, as used when a `Redirect` names a node the worker must now
    /// connect to.
    async fn find_node(
        &self,
        tag: &str,
    ) -> Result<Option<TopologyNode>, SubscriptionWorkerError> {
        Ok(self
            .get_topology_nodes()
            .await?
            .into_iter()
            .find(|node| node.cluster_tag == tag))
    }
}
