//! Read-only view of cluster state consumed by the scheduler.

use std::future::Future;

use provisio_core::{DaemonSet, LabelSelector, Node, Pod};

use crate::error::StateResult;
use crate::store::StateStore;

/// Lists the cluster objects the scheduler needs.
///
/// Implementations may block on the network; the scheduler performs no
/// retries of its own, and dropping the returned future cancels the read.
pub trait ClusterReader: Send + Sync {
    /// Every daemon set in the cluster.
    fn list_daemon_sets(&self) -> impl Future<Output = StateResult<Vec<DaemonSet>>> + Send;

    /// Nodes whose labels match `selector`.
    fn list_nodes(
        &self,
        selector: &LabelSelector,
    ) -> impl Future<Output = StateResult<Vec<Node>>> + Send;

    /// Pods in `namespace` whose labels match `selector`.
    fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> impl Future<Output = StateResult<Vec<Pod>>> + Send;

    /// A single node by name.
    fn get_node(&self, name: &str) -> impl Future<Output = StateResult<Option<Node>>> + Send;
}

impl ClusterReader for StateStore {
    async fn list_daemon_sets(&self) -> StateResult<Vec<DaemonSet>> {
        StateStore::list_daemon_sets(self)
    }

    async fn list_nodes(&self, selector: &LabelSelector) -> StateResult<Vec<Node>> {
        StateStore::list_nodes(self, selector)
    }

    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> StateResult<Vec<Pod>> {
        StateStore::list_pods(self, namespace, selector)
    }

    async fn get_node(&self, name: &str) -> StateResult<Option<Node>> {
        StateStore::get_node(self, name)
    }
}
