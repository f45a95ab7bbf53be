//! StateStore: redb-backed snapshot of cluster objects.
//!
//! Provides typed put/get/list/delete over nodes, pods and daemon sets.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use provisio_core::{DaemonSet, LabelSelector, Node, Pod};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(PODS).map_err(map_err!(Table))?;
        txn.open_table(DAEMON_SETS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic table access ───────────────────────────────────────

    fn put<T: Serialize>(&self, table: ObjectTable, key: &str, object: &T) -> StateResult<()> {
        let value = serde_json::to_vec(object).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table.insert(key, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: ObjectTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let object: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(object))
            }
            None => Ok(None),
        }
    }

    /// List every object whose key starts with `prefix` (empty: all).
    fn list<T: DeserializeOwned>(&self, table: ObjectTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let object: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(object);
            }
        }
        Ok(results)
    }

    fn delete(&self, table: ObjectTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node.
    pub fn put_node(&self, node: &Node) -> StateResult<()> {
        let key = node.metadata.table_key();
        self.put(NODES, &key, node)?;
        debug!(%key, "node stored");
        Ok(())
    }

    /// Get a node by name.
    pub fn get_node(&self, name: &str) -> StateResult<Option<Node>> {
        self.get(NODES, name)
    }

    /// List nodes whose labels match the selector.
    pub fn list_nodes(&self, selector: &LabelSelector) -> StateResult<Vec<Node>> {
        let nodes: Vec<Node> = self.list(NODES, "")?;
        Ok(nodes
            .into_iter()
            .filter(|n| selector.matches(&n.metadata.labels))
            .collect())
    }

    /// Delete a node by name. Returns true if it existed.
    pub fn delete_node(&self, name: &str) -> StateResult<bool> {
        let existed = self.delete(NODES, name)?;
        debug!(%name, existed, "node deleted");
        Ok(existed)
    }

    // ── Pods ───────────────────────────────────────────────────────

    /// Insert or update a pod.
    pub fn put_pod(&self, pod: &Pod) -> StateResult<()> {
        self.put(PODS, &pod.metadata.table_key(), pod)
    }

    /// Get a pod by `{namespace}/{name}` key.
    pub fn get_pod(&self, key: &str) -> StateResult<Option<Pod>> {
        self.get(PODS, key)
    }

    /// List the pods of one namespace whose labels match the selector.
    pub fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> StateResult<Vec<Pod>> {
        let prefix = format!("{namespace}/");
        let pods: Vec<Pod> = self.list(PODS, &prefix)?;
        Ok(pods
            .into_iter()
            .filter(|p| selector.matches(&p.metadata.labels))
            .collect())
    }

    /// Delete a pod by key. Returns true if it existed.
    pub fn delete_pod(&self, key: &str) -> StateResult<bool> {
        self.delete(PODS, key)
    }

    // ── Daemon sets ────────────────────────────────────────────────

    /// Insert or update a daemon set.
    pub fn put_daemon_set(&self, daemon_set: &DaemonSet) -> StateResult<()> {
        let key = daemon_set.metadata.table_key();
        self.put(DAEMON_SETS, &key, daemon_set)?;
        debug!(%key, "daemon set stored");
        Ok(())
    }

    /// List all daemon sets across namespaces.
    pub fn list_daemon_sets(&self) -> StateResult<Vec<DaemonSet>> {
        self.list(DAEMON_SETS, "")
    }

    /// Delete a daemon set by key. Returns true if it existed.
    pub fn delete_daemon_set(&self, key: &str) -> StateResult<bool> {
        self.delete(DAEMON_SETS, key)
    }
}
