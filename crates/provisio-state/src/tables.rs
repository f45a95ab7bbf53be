//! redb table definitions for the cluster-state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized objects).

use redb::TableDefinition;

/// Shape shared by every object table.
pub type ObjectTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Nodes keyed by `{name}`.
pub const NODES: ObjectTable = TableDefinition::new("nodes");

/// Pods keyed by `{namespace}/{name}`.
pub const PODS: ObjectTable = TableDefinition::new("pods");

/// Daemon sets keyed by `{namespace}/{name}`.
pub const DAEMON_SETS: ObjectTable = TableDefinition::new("daemon_sets");
