//! # palaver-store
//!
//! The boundary to the replicated document store, reduced to the four
//! primitives the client engine consumes: execute a statement, register a
//! live replication subscription, register a change observer, and fetch an
//! attachment with progress.
//!
//! Replication and conflict resolution live entirely behind this boundary.
//! Observers are modeled as channels: registering one yields a cancel handle
//! plus a receiver that is sent the query's full current result set once
//! immediately and again after every mutation touching the collection.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and local
//! sessions.

pub mod error;
pub mod handle;
pub mod memory;
pub mod query;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use palaver_shared::AttachmentToken;

pub use error::StoreError;
pub use handle::LiveHandle;
pub use memory::MemoryStore;
pub use query::{Filter, Query, Statement};

/// Progress of an attachment transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    Progress { transferred: u64, total: u64 },
    Complete { bytes: Vec<u8> },
    Failed { reason: String },
}

/// The replicated store collaborator.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Run an insert/update/select statement and return the affected rows.
    async fn execute(&self, statement: Statement) -> Result<Vec<Value>, StoreError>;

    /// Open a live replication subscription for a query. The handle's
    /// `cancel` is idempotent.
    fn register_subscription(&self, query: Query) -> Result<LiveHandle, StoreError>;

    /// Register a change observer for a query. The receiver is delivered the
    /// full result set on registration and after every relevant change; a
    /// cancelled observer receives nothing further.
    fn register_observer(
        &self,
        query: Query,
    ) -> Result<(LiveHandle, mpsc::UnboundedReceiver<Vec<Value>>), StoreError>;

    /// Start an asynchronous attachment fetch. Progress ticks and the final
    /// completion or failure arrive on the returned channel.
    fn fetch_attachment(
        &self,
        token: &AttachmentToken,
    ) -> Result<mpsc::UnboundedReceiver<FetchEvent>, StoreError>;
}
