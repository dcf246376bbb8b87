//! JetStream Key/Value — a versioned, history-aware key/value store built
//! on NATS JetStream.
//!
//! This library provides a client-side facade over a persistent JetStream
//! stream, giving callers a per-key history, delete/purge-aware store
//! without any server-side component beyond JetStream itself:
//!
//! - **Bucket lifecycle**: create/update/delete/list/info ([`manager`])
//! - **Entry operations**: get, get-by-revision, put, create,
//!   update-if-revision, delete, purge, purge-deletes, keys, history
//!   ([`store`])
//! - **Watchers**: a long-lived consumer delivering ordered updates with
//!   a one-shot end-of-initial-data signal ([`watcher`])
//! - **Naming & header codec**: mapping `(bucket, key)` to stream/subject
//!   names and back ([`names`])
//!
//! # Architecture
//!
//! ```text
//! KeyValueManager ──creates/administers──> Stream (KV_<bucket>)
//!        │
//!        └──opens──> KeyValueStore ──publish/direct-get/consumer──> Stream
//!                            │
//!                            └──opens──> Watcher (long-lived consumer)
//! ```
//!
//! Every mutation is a single JetStream publish with a header carrying
//! the operation (`PUT` implicit, `DEL`, `PURGE`) or the optimistic
//! concurrency constraint (`Nats-Expected-Last-Subject-Sequence`). There
//! is no client-side locking and no durable client-side state; everything
//! survives only in the backing stream.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use jetstream_kv::{control_plane, KeyValueManager, KvConfig, NatsKvOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = control_plane::connect(
//!         "nats://localhost:4222",
//!         NatsKvOptions::default(),
//!     )
//!     .await?;
//!     let manager = KeyValueManager::new(context);
//!
//!     manager.create(KvConfig::new("profiles")).await?;
//!     let store = manager.get("profiles").await?;
//!
//!     let revision = store.put("alice.age", "32").await?;
//!     let entry = store.get("alice.age").await?.expect("just written");
//!     assert_eq!(entry.revision, revision);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control_plane;
pub mod entry;
pub mod errors;
pub mod manager;
pub mod names;
pub mod store;
pub mod watcher;

pub use config::{BucketStatus, KvConfig, Placement, Republish, StorageType};
pub use control_plane::{control_plane, NatsKvOptions, PurgeDeletesThreshold};
pub use entry::Entry;
pub use errors::{Error, Result};
pub use manager::KeyValueManager;
pub use names::Operation;
pub use store::KeyValueStore;
pub use watcher::{Observer, Watcher, WatcherOptions, WatcherState};

/// Crate version, re-exported for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
