//! provisio-state: cluster-state snapshot store for the scheduler.
//!
//! Backed by [redb](https://docs.rs/redb), holds the nodes, pods and
//! daemon sets the scheduler reads while it works. The scheduler only
//! ever reads through the [`ClusterReader`] trait, so a live API client
//! can stand in for the store.
//!
//! # Architecture
//!
//! All objects are JSON-serialized into redb's `&[u8]` value columns.
//! Namespaced objects are keyed `{namespace}/{name}`, which keeps a
//! namespace's objects contiguous for prefix scans.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod reader;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use reader::ClusterReader;
pub use store::StateStore;
